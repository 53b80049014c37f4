//! Line-oriented text grammar spoken by local clients: a `!DP<version>`
//! header line, argument lines of the form `-<name> <value>`, and a doubled
//! delimiter (an empty line) terminating the request. The same token shape
//! doubles as the on-disk config format.

use crate::error::DispatchError;

pub const REQUEST_HEAD: &str = "!DP";

/// The delimiter is a constant, but nothing below assumes its length.
pub const DELIMITER: &str = "\r\n";

pub const ARG_FILE: &str = "f";
pub const ARG_RECIPIENT: &str = "r";

pub const MAX_ARG_NAME: usize = 4;
pub const MAX_ARG_VALUE: usize = 256;
pub const MAX_REQUEST_LEN: usize = 8192;

/// One parsed `name [value]` pair, in arrival order. Names the consumer
/// does not recognize are retained but ignored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestToken {
    pub name: String,
    pub value: Option<String>,
}

impl RequestToken {
    pub fn new(name: &str, value: &str) -> RequestToken {
        RequestToken {
            name: name.to_string(),
            value: if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            },
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Request {
    pub version: u32,
    pub tokens: Vec<RequestToken>,
}

/// Tokenizes a raw client request. Fails with `MalformedRequest` if the
/// header check fails, the request exceeds the maximum read size, or input
/// runs out before the terminating empty line.
pub fn parse(input: &[u8]) -> Result<Request, DispatchError> {
    let delim = DELIMITER.as_bytes();
    if input.len() < delim.len() {
        return Err(DispatchError::MalformedRequest(
            "request shorter than one delimiter".to_string(),
        ));
    }
    if input.len() > MAX_REQUEST_LEN {
        return Err(DispatchError::MalformedRequest(format!(
            "request of {} byte(s) exceeds the maximum of {}",
            input.len(),
            MAX_REQUEST_LEN
        )));
    }

    let mut version = None;
    let mut tokens = Vec::new();
    let mut rest = input;

    while let Some(at) = find_delimiter(rest, delim) {
        let line = &rest[..at];
        rest = &rest[at + delim.len()..];

        match version {
            None => version = Some(parse_head_line(line)?),
            Some(version) => {
                if line.is_empty() {
                    // Doubled delimiter: end of request. Anything after this
                    // point is not processed.
                    return Ok(Request { version, tokens });
                }
                if let Some(token) = parse_arg_line(line) {
                    tokens.push(token);
                }
            }
        }
    }

    Err(DispatchError::MalformedRequest(
        "input exhausted before the terminating empty line".to_string(),
    ))
}

/// Renders a token list back into the line grammar, terminator included.
/// Re-parsing the result yields an equal token list.
pub fn render(version: u32, tokens: &[RequestToken]) -> String {
    let mut out = format!("{}{}{}", REQUEST_HEAD, version, DELIMITER);
    for token in tokens {
        out.push('-');
        out.push_str(&token.name);
        if let Some(value) = &token.value {
            out.push(' ');
            out.push_str(value);
        }
        out.push_str(DELIMITER);
    }
    out.push_str(DELIMITER);
    out
}

fn find_delimiter(input: &[u8], delim: &[u8]) -> Option<usize> {
    if input.len() < delim.len() {
        return None;
    }
    input.windows(delim.len()).position(|w| w == delim)
}

/// `!DP` followed by a decimal protocol version.
fn parse_head_line(line: &[u8]) -> Result<u32, DispatchError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| DispatchError::MalformedRequest("non-utf8 header line".to_string()))?;
    let version = line.strip_prefix(REQUEST_HEAD).ok_or_else(|| {
        DispatchError::MalformedRequest(format!("missing {} header", REQUEST_HEAD))
    })?;
    version.parse::<u32>().map_err(|_| {
        DispatchError::MalformedRequest(format!("invalid protocol version {:?}", version))
    })
}

/// Lines that do not match `-<name> [value]`, or whose name or value exceeds
/// its cap, yield no token.
fn parse_arg_line(line: &[u8]) -> Option<RequestToken> {
    let line = std::str::from_utf8(line).ok()?;
    let rest = line.strip_prefix('-')?;
    let (name, value) = match rest.split_once(' ') {
        Some((name, value)) => (name, value),
        None => (rest, ""),
    };
    // Extra dashes in front of the name are ignored.
    let name = name.trim_start_matches('-');
    if name.is_empty() || name.len() > MAX_ARG_NAME || value.len() > MAX_ARG_VALUE {
        return None;
    }
    Some(RequestToken::new(name, value))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_submission_request() {
        let request = parse(b"!DP1\r\n-f test.txt\r\n-r foo@mahouk.co\r\n\r\n").unwrap();
        assert_eq!(request.version, 1);
        assert_eq!(
            request.tokens,
            vec![
                RequestToken::new("f", "test.txt"),
                RequestToken::new("r", "foo@mahouk.co"),
            ]
        );
    }

    #[test]
    fn test_lines_after_terminator_are_ignored() {
        let request = parse(b"!DP1\r\n-f a.txt\r\n\r\n-r ignored@host\r\n").unwrap();
        assert_eq!(request.tokens, vec![RequestToken::new("f", "a.txt")]);
    }

    #[rstest]
    #[case::empty(b"".as_slice())]
    #[case::wrong_head(b"!XX1\r\n\r\n".as_slice())]
    #[case::missing_version(b"!DP\r\n\r\n".as_slice())]
    #[case::non_numeric_version(b"!DPabc\r\n\r\n".as_slice())]
    #[case::unterminated(b"!DP1\r\n-f test.txt\r\n".as_slice())]
    fn test_malformed_requests(#[case] input: &[u8]) {
        assert!(matches!(
            parse(input),
            Err(DispatchError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut input = b"!DP1\r\n".to_vec();
        input.resize(MAX_REQUEST_LEN + 1, b'x');
        assert!(matches!(
            parse(&input),
            Err(DispatchError::MalformedRequest(_))
        ));
    }

    #[rstest]
    #[case::no_dash(b"f test.txt".as_slice())]
    #[case::name_too_long(b"-toolong test.txt".as_slice())]
    #[case::dashes_only(b"--".as_slice())]
    fn test_invalid_arg_lines_yield_no_token(#[case] line: &[u8]) {
        assert_eq!(parse_arg_line(line), None);
    }

    #[test]
    fn test_value_cap() {
        let line = format!("-f {}", "x".repeat(MAX_ARG_VALUE + 1));
        assert_eq!(parse_arg_line(line.as_bytes()), None);
    }

    #[test]
    fn test_token_without_value() {
        assert_eq!(
            parse_arg_line(b"-v"),
            Some(RequestToken {
                name: "v".to_string(),
                value: None,
            })
        );
    }

    #[test]
    fn test_render_parse_idempotence() {
        let tokens = vec![
            RequestToken::new("f", "notes.txt"),
            RequestToken::new("r", "alice@example.com"),
            RequestToken::new("v", ""),
        ];
        let rendered = render(1, &tokens);
        let reparsed = parse(rendered.as_bytes()).unwrap();
        assert_eq!(reparsed.version, 1);
        assert_eq!(reparsed.tokens, tokens);

        // And once more through the grammar for good measure.
        assert_eq!(render(1, &reparsed.tokens), rendered);
    }
}
