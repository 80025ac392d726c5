//! Header and body canonicalization, RFC 6376 section 3.4.
//!
//! Header canonicalization always runs over one complete header at a time,
//! so it needs no internal state. Body canonicalization, on the other hand,
//! must produce byte-identical output no matter how the caller chunks the
//! body across [`crate::context::Context::body`] calls — a message fed one
//! byte at a time must canonicalize exactly like one fed in a single shot.
//! [`BodyCanonicalizer`] is therefore an explicit state machine rather than
//! a function over a complete buffer.

use crate::hash::LimitHasher;
use once_cell::sync::Lazy;

static CRLF: Lazy<memchr::memmem::Finder> = Lazy::new(|| memchr::memmem::Finder::new("\r\n"));

#[derive(PartialEq, Clone, Debug, Copy, Eq, Hash)]
pub enum Type {
    Simple,
    Relaxed,
}

impl Type {
    pub fn canon_name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }

    pub(crate) fn canon_header_into(&self, key: &str, value: &[u8], out: &mut Vec<u8>) {
        match self {
            Self::Simple => canonicalize_header_simple(key, value, out),
            Self::Relaxed => canonicalize_header_relaxed(key, value, out),
        }
    }
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.1
fn canonicalize_header_simple(key: &str, value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.2
fn canonicalize_header_relaxed(key: &str, value: &[u8], out: &mut Vec<u8>) {
    let key = key.to_lowercase();
    let key = key.trim_end();

    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b":");

    let value = trim_ws_start(trim_ws_end(value));
    let mut space_run = false;
    for &c in value {
        match c {
            b'\r' | b'\n' => {}
            b' ' | b'\t' => {
                if space_run {
                    continue;
                }
                space_run = true;
                out.push(b' ');
            }
            _ => {
                space_run = false;
                out.push(c);
            }
        }
    }

    out.extend_from_slice(b"\r\n");
}

fn trim_ws_start(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.first() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => line = &line[1..],
            _ => break,
        }
    }
    line
}

fn trim_ws_end(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.last() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                line = &line[0..line.len() - 1];
            }
            _ => break,
        }
    }
    line
}

/// States of the body canonicalization state machine. Present mostly to
/// document the machine; the actual bookkeeping lives in the `pending*`
/// fields of [`BodyCanonicalizer`] below, since a line boundary can arrive
/// split across arbitrarily many `feed()` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    /// Accumulating bytes of a line that hasn't seen its terminating CRLF yet.
    InLine,
    /// Just emitted (or buffered) a complete line; ready for the next one.
    LineBoundary,
}

/// Streaming body canonicalizer: feed it the body in arbitrarily sized
/// chunks via [`Self::feed`], then call [`Self::finalize`] exactly once at
/// end-of-message. The resulting canonicalized bytes are hashed directly
/// into the supplied [`LimitHasher`] as they're produced, so the body never
/// needs to be buffered in full.
pub(crate) struct BodyCanonicalizer {
    ty: Type,
    state: BodyState,
    /// Bytes of the line currently being accumulated (CRLF not yet seen).
    pending: Vec<u8>,
    /// Count of blank lines seen but not yet known to be non-trailing.
    /// RFC 6376 strips all-blank trailing lines from the body, so a blank
    /// line's canonical "\r\n" can only be emitted once we know a
    /// non-blank line follows it.
    pending_blank_lines: usize,
    saw_content_line: bool,
    saw_any_line: bool,
    saw_any_byte: bool,
}

impl BodyCanonicalizer {
    pub(crate) fn new(ty: Type) -> Self {
        Self {
            ty,
            state: BodyState::LineBoundary,
            pending: Vec::new(),
            pending_blank_lines: 0,
            saw_content_line: false,
            saw_any_line: false,
            saw_any_byte: false,
        }
    }

    pub(crate) fn feed(&mut self, bytes: &[u8], hasher: &mut LimitHasher) {
        if bytes.is_empty() {
            return;
        }
        self.saw_any_byte = true;
        self.pending.extend_from_slice(bytes);
        self.state = BodyState::InLine;
        self.drain_complete_lines(hasher);
    }

    fn drain_complete_lines(&mut self, hasher: &mut LimitHasher) {
        loop {
            match CRLF.find(&self.pending) {
                Some(idx) => {
                    let line: Vec<u8> = self.pending[..idx].to_vec();
                    self.pending.drain(0..idx + 2);
                    self.saw_any_line = true;
                    if line.is_empty() {
                        self.pending_blank_lines += 1;
                    } else {
                        self.flush_pending_blanks(hasher);
                        self.saw_content_line = true;
                        self.emit_line(&line, hasher);
                    }
                    self.state = BodyState::LineBoundary;
                }
                None => break,
            }
        }
        if !self.pending.is_empty() {
            self.state = BodyState::InLine;
        }
    }

    fn flush_pending_blanks(&mut self, hasher: &mut LimitHasher) {
        for _ in 0..self.pending_blank_lines {
            hasher.hash(b"\r\n");
        }
        self.pending_blank_lines = 0;
    }

    fn emit_line(&self, line: &[u8], hasher: &mut LimitHasher) {
        match self.ty {
            Type::Simple => {
                hasher.hash(line);
                hasher.hash(b"\r\n");
            }
            Type::Relaxed => {
                let trimmed = trim_ws_end(line);
                let mut prior = 0;
                for idx in memchr::memchr2_iter(b' ', b'\t', trimmed) {
                    if prior > 0 && idx == prior {
                        prior = idx + 1;
                        continue;
                    }
                    hasher.hash(&trimmed[prior..idx]);
                    hasher.hash(b" ");
                    prior = idx + 1;
                }
                hasher.hash(&trimmed[prior..]);
                hasher.hash(b"\r\n");
            }
        }
    }

    /// Finishes canonicalization: any buffered trailing blank lines are
    /// discarded (RFC 6376: "ignore all empty lines at the end of the
    /// message body"), and a body consisting only of blank lines (or of
    /// zero bytes, for `simple`) collapses to the single defined residual.
    pub(crate) fn finalize(mut self, hasher: &mut LimitHasher) {
        if !self.pending.is_empty() {
            // Body didn't end on a CRLF boundary; treat the remainder as a
            // final content line.
            let leftover = std::mem::take(&mut self.pending);
            self.saw_any_line = true;
            self.flush_pending_blanks(hasher);
            self.saw_content_line = true;
            self.emit_line(&leftover, hasher);
        }

        if self.saw_content_line {
            return;
        }
        if self.saw_any_line {
            // Body was entirely blank lines: exactly one CRLF residual.
            hasher.hash(b"\r\n");
        } else if !self.saw_any_byte && self.ty == Type::Simple {
            // Simple canonicalization of a zero-length body is CRLF.
            hasher.hash(b"\r\n");
        }
        // Relaxed canonicalization of a zero-length body is the empty string.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashImpl;

    fn header_relaxed(key: &str, value: &[u8]) -> Vec<u8> {
        let mut result = vec![];
        canonicalize_header_relaxed(key, value, &mut result);
        result
    }

    #[test]
    fn test_canonicalize_header_relaxed() {
        assert_eq!(header_relaxed("SUBJect", b" AbC\r\n"), b"subject:AbC\r\n");
        assert_eq!(
            header_relaxed("Subject \t", b"\t Your Name\t \r\n"),
            b"subject:Your Name\r\n"
        );
        assert_eq!(
            header_relaxed("Subject \t", b"\t Kimi \t \r\n No \t\r\n Na Wa\r\n"),
            b"subject:Kimi No Na Wa\r\n"
        );
    }

    fn canon_body_whole(ty: Type, data: &[u8]) -> Vec<u8> {
        let mut hasher = LimitHasher {
            hasher: HashImpl::copy_data(),
            limit: usize::MAX,
            hashed: 0,
        };
        let mut canon = BodyCanonicalizer::new(ty);
        canon.feed(data, &mut hasher);
        canon.finalize(&mut hasher);
        hasher.finalize_bytes()
    }

    fn canon_body_chunked(ty: Type, data: &[u8], chunk: usize) -> Vec<u8> {
        let mut hasher = LimitHasher {
            hasher: HashImpl::copy_data(),
            limit: usize::MAX,
            hashed: 0,
        };
        let mut canon = BodyCanonicalizer::new(ty);
        for piece in data.chunks(chunk.max(1)) {
            canon.feed(piece, &mut hasher);
        }
        canon.finalize(&mut hasher);
        hasher.finalize_bytes()
    }

    #[test]
    fn test_canonicalize_body_relaxed() {
        assert_eq!(canon_body_whole(Type::Relaxed, b"\r\n"), b"\r\n");
        assert_eq!(canon_body_whole(Type::Relaxed, b"hey        \r\n"), b"hey\r\n");
        assert_eq!(
            canon_body_whole(Type::Relaxed, b" C \r\nD \t E\r\n\r\n\r\n"),
            b" C\r\nD E\r\n"
        );
        assert_eq!(canon_body_whole(Type::Relaxed, b""), b"");
    }

    #[test]
    fn test_canonicalize_body_simple() {
        assert_eq!(canon_body_whole(Type::Simple, b"\r\n"), b"\r\n");
        assert_eq!(
            canon_body_whole(Type::Simple, b"hey        \r\n"),
            b"hey        \r\n"
        );
        assert_eq!(
            canon_body_whole(Type::Simple, b" C \r\nD \t E\r\n\r\n\r\n"),
            b" C \r\nD \t E\r\n"
        );
        assert_eq!(canon_body_whole(Type::Simple, b""), b"\r\n");
    }

    #[test]
    fn test_chunk_invariance_relaxed() {
        let data: &[u8] = b"  Hello   World  \r\nSecond\tLine\r\n\r\n\r\n";
        let whole = canon_body_whole(Type::Relaxed, data);
        for chunk in [1, 2, 3, 5, 7, 11, 64] {
            assert_eq!(canon_body_chunked(Type::Relaxed, data, chunk), whole);
        }
    }

    #[test]
    fn test_chunk_invariance_simple() {
        let data: &[u8] = b"  Hello   World  \r\nSecond\tLine\r\n\r\n\r\n";
        let whole = canon_body_whole(Type::Simple, data);
        for chunk in [1, 2, 3, 5, 7, 11, 64] {
            assert_eq!(canon_body_chunked(Type::Simple, data, chunk), whole);
        }
    }

    #[test]
    fn test_all_blank_body_collapses_to_one_crlf() {
        assert_eq!(canon_body_whole(Type::Relaxed, b"\r\n\r\n\r\n"), b"\r\n");
        assert_eq!(canon_body_whole(Type::Simple, b"\r\n\r\n\r\n"), b"\r\n");
    }
}
