//! Format checks applied to resolved options before a tunnel is requested.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

static BASIC_AUTH: LazyLock<Regex> = LazyLock::new(|| build(r"^[^\s:]+:[^\s:]+$"));
static CNAME: LazyLock<Regex> =
    LazyLock::new(|| build(r"(?i)^[a-z0-9]+(?:[-.][a-z0-9]+)*\.[a-z]{2,5}$"));
static SUBDOMAIN_PREFIX: LazyLock<Regex> = LazyLock::new(|| build(r"(?i)^[a-z0-9][a-z0-9-]+$"));
static CREDENTIAL: LazyLock<Regex> = LazyLock::new(|| build(r"^\S+$"));

#[allow(clippy::expect_used)]
fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// Accepts the closed range [1, 65535].
pub fn validate_port(port: u32) -> Result<u16> {
    debug!(port, "Validating port");
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(Error::InvalidPort(port))
}

pub fn validate_username(username: &str) -> Result<()> {
    debug!(username, "Validating username");
    if CREDENTIAL.is_match(username) {
        Ok(())
    } else {
        Err(Error::InvalidUsername(username.to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    debug!("Validating password");
    if CREDENTIAL.is_match(password) {
        Ok(())
    } else {
        Err(Error::InvalidPassword)
    }
}

pub fn validate_cname(cname: &str) -> Result<()> {
    debug!(cname, "Validating CNAME");
    if CNAME.is_match(cname) {
        Ok(())
    } else {
        Err(Error::InvalidCname(cname.to_string()))
    }
}

pub fn validate_subdomain_prefix(prefix: &str) -> Result<()> {
    debug!(prefix, "Validating subdomain prefix");
    if SUBDOMAIN_PREFIX.is_match(prefix) {
        Ok(())
    } else {
        Err(Error::InvalidSubdomainPrefix(prefix.to_string()))
    }
}

/// Split a `USER:PASS` pair.
pub fn parse_basic_auth(credentials: &str) -> Result<(String, String)> {
    if !BASIC_AUTH.is_match(credentials) {
        return Err(Error::BasicAuthFormat);
    }
    credentials
        .split_once(':')
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
        .ok_or(Error::BasicAuthFormat)
}
