//! Parsing of the forwarding target argument (`port`, `host` or `host:port`).

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static PORT_ONLY: LazyLock<Regex> = LazyLock::new(|| build(r"^\d{1,5}$"));
static HOST_ONLY: LazyLock<Regex> = LazyLock::new(|| build(r"(?i)^[-a-z0-9.]+$"));
static HOST_AND_PORT: LazyLock<Regex> = LazyLock::new(|| build(r"(?i)^([-a-z0-9.]+):(\d{1,5})$"));

#[allow(clippy::expect_used)]
fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// The parts of a forwarding target that were present in the argument.
///
/// The port is kept wide so that out-of-range values reach validation
/// instead of being silently truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forwarded {
    pub host: Option<String>,
    pub port: Option<u32>,
}

/// Parse a forwarding target. Unrecognised input yields an empty target.
pub fn parse_forwarded(arg: &str) -> Forwarded {
    debug!(forwarded = arg, "Parsing forwarded target");

    if PORT_ONLY.is_match(arg) {
        return Forwarded {
            host: None,
            port: arg.parse().ok(),
        };
    }
    if HOST_ONLY.is_match(arg) {
        return Forwarded {
            host: Some(arg.to_string()),
            port: None,
        };
    }
    if let Some(caps) = HOST_AND_PORT.captures(arg) {
        return Forwarded {
            host: Some(caps[1].to_string()),
            port: caps[2].parse().ok(),
        };
    }
    Forwarded::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_port() {
        assert_eq!(
            parse_forwarded("600"),
            Forwarded {
                host: None,
                port: Some(600)
            }
        );
        assert_eq!(parse_forwarded("65535").port, Some(65535));
        assert_eq!(parse_forwarded("1").port, Some(1));
    }

    #[test]
    fn parses_a_host() {
        assert_eq!(
            parse_forwarded("mysite.dev"),
            Forwarded {
                host: Some("mysite.dev".into()),
                port: None
            }
        );
    }

    #[test]
    fn parses_host_and_port() {
        assert_eq!(
            parse_forwarded("mysite.dev:88"),
            Forwarded {
                host: Some("mysite.dev".into()),
                port: Some(88)
            }
        );
    }

    #[test]
    fn keeps_out_of_range_port_for_validation() {
        assert_eq!(parse_forwarded("99999").port, Some(99999));
    }

    #[test]
    fn unrecognised_input_is_empty() {
        assert_eq!(parse_forwarded("my site"), Forwarded::default());
        assert_eq!(parse_forwarded("host:123456"), Forwarded::default());
    }
}
