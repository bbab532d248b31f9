//! RTSP authentication (RFC 2617)
//!
//! The upstream answers 401 with a `WWW-Authenticate` challenge. Basic
//! needs a base64 of `user:pass`; Digest needs the MD5 dance:
//!
//! ```text
//! HA1      = md5(user ":" realm ":" pass)
//! HA2      = md5(method ":" uri)
//! response = md5(HA1 ":" nonce ":" HA2)
//! ```
//!
//! The Digest state is kept as a prebuilt header prefix ending at
//! `response="`; each request appends its own response hash.

use std::collections::HashMap;

use base64::prelude::{Engine as _, BASE64_STANDARD};

/// The authentication scheme demanded by a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Basic,
    Digest,
}

/// A parsed `WWW-Authenticate` header value
#[derive(Debug, Clone)]
pub struct Challenge {
    pub scheme: Scheme,
    params: HashMap<String, String>,
}

impl Challenge {
    /// Parse a challenge like `Digest realm="r", nonce="n"`.
    /// Returns `None` for schemes other than Basic and Digest.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, rest) = if let Some(rest) = value.strip_prefix("Basic") {
            (Scheme::Basic, rest)
        } else if let Some(rest) = value.strip_prefix("Digest") {
            (Scheme::Digest, rest)
        } else {
            return None;
        };

        let mut params = HashMap::new();
        for part in rest.split(',') {
            if let Some((name, value)) = part.split_once('=') {
                params.insert(
                    name.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }
        Some(Self { scheme, params })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// The Digest response hash for one request
pub fn digest_response(ha1: &str, nonce: &str, method: &str, uri: &str) -> String {
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
}

/// Authorization state of one upstream source.
///
/// Starts empty (no header line). A Basic challenge installs a fixed
/// line; a Digest challenge installs HA1, the nonce and a header prefix
/// that gets a per-method response appended.
#[derive(Debug, Clone, Default)]
pub struct Authorization {
    basic: String,
    digest_prefix: String,
    ha1: String,
    nonce: String,
}

impl Authorization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install Basic credentials
    pub fn set_basic(&mut self, username: &str, password: &str) {
        let token = BASE64_STANDARD.encode(format!("{}:{}", username, password));
        self.basic = format!("Authorization: Basic {}\r\n", token);
    }

    /// Install Digest state from a challenge
    pub fn set_digest(&mut self, challenge: &Challenge, username: &str, password: &str, uri: &str) {
        let realm = challenge.param("realm").unwrap_or("");
        self.nonce = challenge.param("nonce").unwrap_or("").to_string();
        self.ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
        self.digest_prefix = format!(
            "Authorization: Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm=\"MD5\", response=\"",
            username, realm, self.nonce, uri
        );
    }

    /// The authorization header line for a request, CRLF included;
    /// empty until a challenge has been answered. Digest wins over Basic.
    pub fn header_line(&self, method: &str, uri: &str) -> String {
        if !self.digest_prefix.is_empty() {
            let response = digest_response(&self.ha1, &self.nonce, method, uri);
            return format!("{}{}\"\r\n", self.digest_prefix, response);
        }
        self.basic.clone()
    }
}
