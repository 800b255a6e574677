//! `Content-Length` extraction from a disguised header block.
//!
//! The field name is matched case-insensitively and only at the start of a
//! header line, so `X-Content-Length` or a value that merely contains the
//! words is never picked up.

use crate::error::ParseError;

const TOKEN: &[u8] = b"Content-Length";

/// Parse the declared body length out of `header` (everything up to and
/// including the terminator).
pub fn parse_content_length(header: &[u8]) -> Result<usize, ParseError> {
    let after_token = find_field(header).ok_or(ParseError::MissingContentLength)?;
    let rest = skip_blanks(&header[after_token..]);

    let value = match rest.split_first() {
        Some((b':', value)) => skip_blanks(value),
        _ => return Err(ParseError::MissingColon),
    };

    let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(ParseError::MissingDigits);
    }

    value[..digits]
        .iter()
        .try_fold(0usize, |acc, &d| {
            acc.checked_mul(10)?.checked_add(usize::from(d - b'0'))
        })
        .ok_or(ParseError::LengthOverflow)
}

/// Offset just past the first `Content-Length` name that starts a line.
fn find_field(header: &[u8]) -> Option<usize> {
    let last_start = header.len().checked_sub(TOKEN.len())?;
    (0..=last_start)
        .filter(|&i| i == 0 || header[i - 1] == b'\n')
        .find(|&i| header[i..i + TOKEN.len()].eq_ignore_ascii_case(TOKEN))
        .map(|i| i + TOKEN.len())
}

fn skip_blanks(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(line: &str) -> Vec<u8> {
        format!("HTTP/1.1 200 OK\r\n{}\r\n\r\n", line).into_bytes()
    }

    #[test]
    fn spacing_variants_parse_to_same_value() {
        for line in ["Content-Length:12", "Content-Length: 12", "Content-Length:    12"] {
            assert_eq!(parse_content_length(&header(line)), Ok(12), "{}", line);
        }
    }

    #[test]
    fn case_insensitive_name() {
        assert_eq!(parse_content_length(&header("content-length: 7")), Ok(7));
        assert_eq!(parse_content_length(&header("CONTENT-LENGTH: 7")), Ok(7));
    }

    #[test]
    fn missing_digits() {
        assert_eq!(
            parse_content_length(&header("Content-Length:")),
            Err(ParseError::MissingDigits)
        );
        assert_eq!(
            parse_content_length(&header("Content-Length: abc")),
            Err(ParseError::MissingDigits)
        );
    }

    #[test]
    fn missing_token() {
        assert_eq!(
            parse_content_length(b"HTTP/1.1 200 OK\r\nHost: x\r\n\r\n"),
            Err(ParseError::MissingContentLength)
        );
        assert_eq!(parse_content_length(b""), Err(ParseError::MissingContentLength));
    }

    #[test]
    fn missing_colon() {
        assert_eq!(
            parse_content_length(&header("Content-Length 12")),
            Err(ParseError::MissingColon)
        );
    }

    #[test]
    fn token_must_start_a_line() {
        assert_eq!(
            parse_content_length(&header("X-Content-Length: 3")),
            Err(ParseError::MissingContentLength)
        );
    }

    #[test]
    fn first_line_may_be_the_field() {
        assert_eq!(parse_content_length(b"Content-Length: 0\r\n\r\n"), Ok(0));
    }

    #[test]
    fn digits_stop_at_first_non_digit() {
        assert_eq!(parse_content_length(&header("Content-Length: 42abc")), Ok(42));
    }

    #[test]
    fn overflow_is_reported() {
        let line = format!("Content-Length: {}0", usize::MAX);
        assert_eq!(
            parse_content_length(&header(&line)),
            Err(ParseError::LengthOverflow)
        );
    }
}
