//! Allocation-free JSON boundary scanning over raw bytes.
//!
//! These helpers only locate where a JSON value ends; they never build a
//! value. Callers hand the located slice to `serde_json` once they know it is
//! worth parsing.

use std::ops::Range;

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while let Some(b' ' | b'\n' | b'\r' | b'\t') = bytes.get(i) {
        i += 1;
    }
    i
}

#[inline]
pub(crate) fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'"' => return Some(i + 1),
            b'\\' => i += 2,
            0x00..=0x1F => return None,
            _ => i += 1,
        }
    }
    None
}

/// Deepest container nesting [`value_end`] will follow, matching the
/// recursion limit `serde_json` applies when the slice is parsed afterwards.
pub(crate) const MAX_DEPTH: usize = 128;

/// End offset (exclusive) of the JSON value starting at or after `start`.
///
/// Iterative; nesting deeper than [`MAX_DEPTH`] is rejected.
pub(crate) fn value_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut closers = [0u8; MAX_DEPTH];
    let mut depth = 0;
    let mut i = start;
    loop {
        i = skip_ws(bytes, i);
        let mut end = match *bytes.get(i)? {
            open @ (b'{' | b'[') => {
                if depth == MAX_DEPTH {
                    return None;
                }
                let close = if open == b'{' { b'}' } else { b']' };
                let inner = skip_ws(bytes, i + 1);
                if bytes.get(inner) == Some(&close) {
                    inner + 1
                } else {
                    closers[depth] = close;
                    depth += 1;
                    i = if close == b'}' {
                        member_value_start(bytes, inner)?
                    } else {
                        inner
                    };
                    continue;
                }
            }
            b'"' => string_end(bytes, i)?,
            b't' => literal_end(bytes, i, b"true")?,
            b'f' => literal_end(bytes, i, b"false")?,
            b'n' => literal_end(bytes, i, b"null")?,
            b'-' | b'0'..=b'9' => number_end(bytes, i)?,
            _ => return None,
        };

        // Close finished containers until a separator opens the next value.
        loop {
            let Some(top) = depth.checked_sub(1) else {
                return Some(end);
            };
            let close = closers[top];
            end = skip_ws(bytes, end);
            match *bytes.get(end)? {
                b',' if close == b'}' => {
                    i = member_value_start(bytes, end + 1)?;
                    break;
                }
                b',' => {
                    i = end + 1;
                    break;
                }
                b if b == close => {
                    depth = top;
                    end += 1;
                }
                _ => return None,
            }
        }
    }
}

/// Skip an object member's `"key":` and return the offset after the colon.
fn member_value_start(bytes: &[u8], start: usize) -> Option<usize> {
    let i = skip_ws(bytes, string_end(bytes, skip_ws(bytes, start))?);
    (bytes.get(i) == Some(&b':')).then_some(i + 1)
}

#[inline]
fn literal_end(bytes: &[u8], start: usize, lit: &[u8]) -> Option<usize> {
    let end = start.checked_add(lit.len())?;
    (bytes.get(start..end)? == lit).then_some(end)
}

fn number_end(bytes: &[u8], start: usize) -> Option<usize> {
    let digits_from = |mut i: usize| {
        let from = i;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        (i > from).then_some(i)
    };

    let mut i = start;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    i = match *bytes.get(i)? {
        b'0' => i + 1,
        b'1'..=b'9' => digits_from(i)?,
        _ => return None,
    };
    if bytes.get(i) == Some(&b'.') {
        i = digits_from(i + 1)?;
    }
    if let Some(b'e' | b'E') = bytes.get(i) {
        i += 1;
        if let Some(b'+' | b'-') = bytes.get(i) {
            i += 1;
        }
        i = digits_from(i)?;
    }
    Some(i)
}

/// Range of the value bound to `field_name` at the top level of the object
/// spanning all of `bytes`. A repeated key resolves to its last occurrence.
pub(crate) fn find_top_level_field_value_range(
    bytes: &[u8],
    field_name: &[u8],
) -> Option<Range<usize>> {
    let mut i = skip_ws(bytes, 0);
    if bytes.get(i) != Some(&b'{') {
        return None;
    }
    i = skip_ws(bytes, i + 1);
    if bytes.get(i) == Some(&b'}') {
        return None;
    }

    let mut last_match = None;
    loop {
        let key_end = string_end(bytes, i)?;
        let key = &bytes[i + 1..key_end - 1];
        i = skip_ws(bytes, key_end);
        if bytes.get(i) != Some(&b':') {
            return None;
        }
        let value_start = skip_ws(bytes, i + 1);
        let value_end = value_end(bytes, value_start)?;
        if key == field_name {
            last_match = Some(value_start..value_end);
        }
        i = skip_ws(bytes, value_end);
        match bytes.get(i)? {
            b',' => i = skip_ws(bytes, i + 1),
            b'}' => return last_match,
            _ => return None,
        }
    }
}

/// Iterate over every well-formed JSON object embedded in `text` that has
/// `key` as a top-level field, in order of their opening brace.
pub(crate) fn objects_with_key<'a>(
    text: &'a [u8],
    key: &'a [u8],
) -> impl Iterator<Item = Range<usize>> + 'a {
    memchr::memchr_iter(b'{', text).filter_map(move |start| {
        let end = value_end(text, start)?;
        find_top_level_field_value_range(&text[start..end], key)?;
        Some(start..end)
    })
}
