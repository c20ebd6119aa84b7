//! Netascii line-ending translation (RFC 1350 §1, mode "netascii").

/// Translate host text to netascii: every line break goes out as `\r\n`.
///
/// Existing `\r\n` pairs are collapsed to `\n` first so they are not
/// doubled by the expansion.
pub fn to_netascii(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' if data.get(i + 1) == Some(&b'\n') => {
                out.extend_from_slice(b"\r\n");
                i += 2;
            }
            b'\n' => {
                out.extend_from_slice(b"\r\n");
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Translate netascii text back to host form: `\r\n` becomes `\n`.
pub fn from_netascii(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_endings_are_canonicalized() {
        assert_eq!(to_netascii(b"a\nb\r\nc"), b"a\r\nb\r\nc");
    }

    #[test]
    fn crlf_is_not_doubled() {
        assert_eq!(to_netascii(b"x\r\ny"), b"x\r\ny");
    }

    #[test]
    fn bare_bytes_pass_through() {
        assert_eq!(to_netascii(b"abc"), b"abc");
        assert_eq!(from_netascii(b"abc"), b"abc");
        assert_eq!(to_netascii(b""), b"");
    }

    #[test]
    fn from_netascii_translates_crlf() {
        assert_eq!(from_netascii(b"a\r\nb\r\nc"), b"a\nb\nc");
        // A stray CR without LF is left alone.
        assert_eq!(from_netascii(b"a\rb"), b"a\rb");
    }

    #[test]
    fn lf_only_round_trips() {
        let input = b"line1\nline2\nline3";
        assert_eq!(from_netascii(&to_netascii(input)), input);
    }
}
