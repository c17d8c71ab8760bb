//! Line framing helpers.

use thiserror::Error;

/// Maximum accepted line length in bytes, terminator included (64 KiB).
pub const MAX_LINE_BYTES: usize = 65_536;

/// Errors produced while framing a line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Line too long: more than {max} bytes without a newline")]
    LineTooLong { max: usize },
}

/// Decodes one raw line as read off the socket.
///
/// Strips a trailing `\n` or `\r\n` and replaces invalid UTF-8 sequences
/// instead of failing, so a client with an odd encoding still gets relayed.
/// `raw` must hold at most one line; anything longer than [`MAX_LINE_BYTES`]
/// is rejected.
pub fn decode_line(raw: &[u8]) -> Result<String, FrameError> {
    if raw.len() > MAX_LINE_BYTES {
        return Err(FrameError::LineTooLong {
            max: MAX_LINE_BYTES,
        });
    }

    let body = raw.strip_suffix(b"\n").unwrap_or(raw);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    Ok(String::from_utf8_lossy(body).into_owned())
}

/// Encodes a line for the wire by appending the terminator.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_lf_and_crlf() {
        assert_eq!(decode_line(b"hello\n").unwrap(), "hello");
        assert_eq!(decode_line(b"hello\r\n").unwrap(), "hello");
    }

    #[test]
    fn test_unterminated_final_line() {
        // Peer closed without a trailing newline
        assert_eq!(decode_line(b"last words").unwrap(), "last words");
    }

    #[test]
    fn test_only_one_terminator_stripped() {
        assert_eq!(decode_line(b"a\r\r\n").unwrap(), "a\r");
        assert_eq!(decode_line(b"\n").unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let decoded = decode_line(b"caf\xe9\n").unwrap();
        assert_eq!(decoded, "caf\u{FFFD}");
    }

    #[test]
    fn test_line_too_long() {
        let raw = vec![b'x'; MAX_LINE_BYTES + 1];
        assert_eq!(
            decode_line(&raw),
            Err(FrameError::LineTooLong {
                max: MAX_LINE_BYTES
            })
        );
    }

    #[test]
    fn test_encode_appends_newline() {
        assert_eq!(encode_line("bob: hi"), b"bob: hi\n".to_vec());
    }
}
