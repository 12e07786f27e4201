//! Output address parsing
//!
//! A cast target is addressed as an optional port and an optional path in
//! one string. All of these are accepted:
//!
//! ```text
//! ""            → (default port, "/")
//! "8080"        → (8080, "/")
//! "8080/"       → (8080, "/")
//! "8080/cat.gif"→ (8080, "/cat.gif")
//! "/cat.gif"    → (default port, "/cat.gif")
//! "cat.gif"     → (default port, "/cat.gif")
//! "cat/dog.gif" → (default port, "/cat/dog.gif")
//! ```
//!
//! An `http:` prefix is tolerated and ignored.

use crate::config::{DEFAULT_HTTP_PATH, DEFAULT_HTTP_PORT};
use crate::error::{CastError, Result};

/// Parse an address string into (port, path)
///
/// A leading segment is a port only when it parses as a `u16`; anything
/// else is part of the path. Fails with `InvalidAddress` when the path
/// would contain whitespace or control characters (they cannot appear in
/// an HTTP request line).
pub fn parse_address(input: &str) -> Result<(u16, String)> {
    let input = input.strip_prefix("http:").unwrap_or(input);

    let (port, path) = match input.find('/') {
        None => {
            if input.is_empty() {
                (DEFAULT_HTTP_PORT, DEFAULT_HTTP_PATH.to_string())
            } else if let Ok(port) = input.parse::<u16>() {
                (port, DEFAULT_HTTP_PATH.to_string())
            } else {
                (DEFAULT_HTTP_PORT, format!("/{input}"))
            }
        }
        Some(0) => (DEFAULT_HTTP_PORT, input.to_string()),
        Some(slash) => {
            let (head, tail) = input.split_at(slash);
            if let Ok(port) = head.parse::<u16>() {
                (port, tail.to_string())
            } else {
                (DEFAULT_HTTP_PORT, format!("/{input}"))
            }
        }
    };

    if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CastError::InvalidAddress(input.to_string()));
    }

    let path = if path == "/" || !path.ends_with('/') {
        path
    } else {
        path.trim_end_matches('/').to_string()
    };
    let path = if path.is_empty() {
        DEFAULT_HTTP_PATH.to_string()
    } else {
        path
    };

    Ok((port, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> (u16, String) {
        parse_address(input).unwrap()
    }

    #[test]
    fn empty_string_is_all_defaults() {
        assert_eq!(parse(""), (DEFAULT_HTTP_PORT, "/".to_string()));
    }

    #[test]
    fn bare_port() {
        assert_eq!(parse("8080"), (8080, "/".to_string()));
    }

    #[test]
    fn port_and_path() {
        assert_eq!(parse("8080/cat.gif"), (8080, "/cat.gif".to_string()));
    }

    #[test]
    fn leading_slash_is_path_only() {
        assert_eq!(parse("/cat.gif"), (DEFAULT_HTTP_PORT, "/cat.gif".to_string()));
    }

    #[test]
    fn bare_name_is_path() {
        assert_eq!(parse("cat.gif"), (DEFAULT_HTTP_PORT, "/cat.gif".to_string()));
    }

    #[test]
    fn non_numeric_head_is_all_path() {
        assert_eq!(
            parse("cat/dog.gif"),
            (DEFAULT_HTTP_PORT, "/cat/dog.gif".to_string())
        );
    }

    #[test]
    fn port_with_trailing_slash() {
        assert_eq!(parse("8080/"), (8080, "/".to_string()));
    }

    #[test]
    fn http_prefix_is_trimmed() {
        assert_eq!(parse("http:8080/cat.gif"), (8080, "/cat.gif".to_string()));
    }

    #[test]
    fn oversized_port_is_treated_as_path() {
        assert_eq!(
            parse("99999999/cat.gif"),
            (DEFAULT_HTTP_PORT, "/99999999/cat.gif".to_string())
        );
    }

    #[test]
    fn whitespace_in_path_is_invalid() {
        assert!(matches!(
            parse_address("cat dog.gif"),
            Err(CastError::InvalidAddress(_))
        ));
    }
}
