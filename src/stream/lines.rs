use memchr::memchr_iter;

/// Incremental splitter for the upstream's `data:` lines.
///
/// Bytes are buffered until a newline completes a line, so a chunk boundary
/// inside a line or inside a multi-byte UTF-8 sequence is harmless. Each
/// complete `data:` line yields its payload; `event:`, `id:`, comment and
/// blank lines carry nothing the accumulator needs and are dropped.
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl DataLineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk and append the payload of every completed `data:`
    /// line to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);
        let scan_start = self.read_offset;
        let mut processed_up_to = self.read_offset;
        for rel in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel;
            push_data_line(&self.buffer[processed_up_to..line_end], out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
        } else if self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024)
        {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self, out: &mut Vec<String>) {
        if self.read_offset < self.buffer.len() {
            push_data_line(&self.buffer[self.read_offset..], out);
        }
        self.buffer.clear();
        self.read_offset = 0;
    }
}

fn push_data_line(line: &[u8], out: &mut Vec<String>) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(value) = line.strip_prefix(b"data:") else {
        return;
    };
    let value = value.strip_prefix(b" ").unwrap_or(value);
    match std::str::from_utf8(value) {
        Ok(text) if !text.trim().is_empty() => out.push(text.to_string()),
        Ok(_) => {}
        Err(err) => tracing::debug!("skipping non-UTF-8 upstream data line: {err}"),
    }
}
