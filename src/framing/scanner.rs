//! Resumable search for the `\r\n\r\n` header terminator.

/// Tracks how much of the terminator has been matched so far, so a terminator
/// split across any number of reads is still found.
#[derive(Debug, Clone, Default)]
pub struct HeaderScanner {
    matched: usize,
    scanned: usize,
    found: Option<usize>,
}

impl HeaderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next span of the stream.
    ///
    /// Returns the header end (offset of the first byte after the terminator,
    /// counted from the first byte ever fed) once the terminator completes.
    /// Spans fed after that are ignored.
    pub fn feed(&mut self, span: &[u8]) -> Option<usize> {
        if self.found.is_some() {
            return self.found;
        }
        for (i, &byte) in span.iter().enumerate() {
            self.matched = match (self.matched, byte) {
                (0, b'\r') => 1,
                (1, b'\n') => 2,
                (2, b'\r') => 3,
                (3, b'\n') => {
                    let end = self.scanned + i + 1;
                    self.found = Some(end);
                    return self.found;
                }
                (_, b'\r') => 1,
                _ => 0,
            };
        }
        self.scanned += span.len();
        None
    }
}

/// One-shot search over a complete byte slice.
pub fn find_header_end(bytes: &[u8]) -> Option<usize> {
    HeaderScanner::new().feed(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_terminator_in_one_span() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";
        assert_eq!(find_header_end(data), Some(data.len() - 2));
    }

    #[test]
    fn terminator_split_at_every_position() {
        let data = b"GET / HTTP/1.0\r\nContent-Length: 0\r\n\r\n";
        for split in 1..data.len() {
            let mut scanner = HeaderScanner::new();
            let first = scanner.feed(&data[..split]);
            let end = first.or_else(|| scanner.feed(&data[split..]));
            assert_eq!(end, Some(data.len()), "split at {}", split);
        }
    }

    #[test]
    fn terminator_fed_byte_by_byte() {
        let mut scanner = HeaderScanner::new();
        let mut end = None;
        for byte in b"A: b\r\n\r\nrest" {
            if let Some(found) = scanner.feed(std::slice::from_ref(byte)) {
                end = Some(found);
                break;
            }
        }
        assert_eq!(end, Some(8));
    }

    #[test]
    fn repeated_carriage_returns_do_not_hide_terminator() {
        assert_eq!(find_header_end(b"x\r\r\n\r\n"), Some(6));
        assert_eq!(find_header_end(b"x\r\n\r\r\n\r\n"), Some(8));
    }

    #[test]
    fn lone_newlines_are_not_a_terminator() {
        assert_eq!(find_header_end(b"a\n\nb\r\n\nc\r\r"), None);
    }

    #[test]
    fn spans_after_match_are_ignored() {
        let mut scanner = HeaderScanner::new();
        assert_eq!(scanner.feed(b"\r\n\r\n"), Some(4));
        assert_eq!(scanner.feed(b"\r\n\r\n"), Some(4));
    }
}
