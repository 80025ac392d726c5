//! Splits a complete RFC 5322 message into the header block and body, and
//! the header block into individual (still-folded) header field blocks, for
//! the whole-message convenience wrappers in [`crate::sign`] and
//! [`crate::verify`]. The streaming [`crate::context::Context`] API itself
//! never needs this — it's only for callers that already have a message in
//! one buffer rather than feeding it in line by line.

/// Splits `message` at the first blank line into `(header_block, body)`.
/// Accepts either CRLF or bare-LF line endings in the boundary itself; the
/// streaming API's own `FIX_CRLF` handling normalizes the body afterwards.
pub(crate) fn split_message(message: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(message, b"\r\n\r\n") {
        (&message[..pos], &message[pos + 4..])
    } else if let Some(pos) = find(message, b"\n\n") {
        (&message[..pos], &message[pos + 2..])
    } else {
        (message, b"")
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits a header block into one entry per field, each still containing
/// its internal folding (continuation lines starting with SP/HTAB), with
/// the line-ending that terminated it removed.
pub(crate) fn split_headers(header_block: &[u8]) -> Vec<Vec<u8>> {
    let mut headers = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for line in header_block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if matches!(line.first(), Some(b' ') | Some(b'\t')) {
            if !current.is_empty() {
                current.extend_from_slice(b"\r\n");
                current.extend_from_slice(line);
            }
        } else {
            if !current.is_empty() {
                headers.push(std::mem::take(&mut current));
            }
            current = line.to_vec();
        }
    }
    if !current.is_empty() {
        headers.push(current);
    }
    headers
}
