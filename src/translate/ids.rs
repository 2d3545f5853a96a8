const ID_BODY_LEN: usize = 24;

/// Per-request identifier source.
///
/// Each request owns one generator, so ids never depend on process-wide
/// counters and tests can pin the output with [`IdGenerator::with_seed`].
#[derive(Debug)]
pub struct IdGenerator {
    rng: fastrand::Rng,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    fn next(&mut self, prefix: &str) -> String {
        let mut out = String::with_capacity(prefix.len() + ID_BODY_LEN);
        out.push_str(prefix);
        for _ in 0..ID_BODY_LEN {
            out.push(self.rng.alphanumeric());
        }
        out
    }

    pub fn response_id(&mut self) -> String {
        self.next("resp_")
    }

    pub fn message_id(&mut self) -> String {
        self.next("msg_")
    }

    pub fn function_call_id(&mut self) -> String {
        self.next("fc_")
    }

    pub fn call_id(&mut self) -> String {
        self.next("call_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_fixed_length() {
        let mut ids = IdGenerator::new();
        let id = ids.response_id();
        assert!(id.starts_with("resp_"));
        assert_eq!(id.len(), "resp_".len() + ID_BODY_LEN);
        assert!(id["resp_".len()..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(ids.call_id().starts_with("call_"));
    }

    #[test]
    fn seeded_generators_are_reproducible() {
        let mut a = IdGenerator::with_seed(7);
        let mut b = IdGenerator::with_seed(7);
        assert_eq!(a.message_id(), b.message_id());
        assert_eq!(a.function_call_id(), b.function_call_id());
    }

    #[test]
    fn consecutive_ids_differ() {
        let mut ids = IdGenerator::with_seed(1);
        assert_ne!(ids.call_id(), ids.call_id());
    }
}
