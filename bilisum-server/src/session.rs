//! Caller scope resolution
//!
//! In `global` mode every request sees every analysis. In `session` mode the
//! scope key travels in a request header (default `x-session-id`); a write
//! without one mints a fresh key that the response echoes back.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bilisum_core::config::{ScopeConfig, ScopeMode};
use uuid::Uuid;

/// Which records a list request may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    All,
    Session(String),
    /// Session mode without a key: the caller owns nothing yet.
    Anonymous,
}

impl ReadScope {
    /// Store filter for this scope; `None` for `Anonymous` too, so callers
    /// must short-circuit that case themselves.
    pub fn key(&self) -> Option<&str> {
        match self {
            ReadScope::Session(key) => Some(key),
            ReadScope::All | ReadScope::Anonymous => None,
        }
    }
}

/// Scope a new record is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteScope {
    pub session_id: Option<String>,
    /// True when `session_id` was generated for this request.
    pub minted: bool,
}

fn header_key(config: &ScopeConfig, headers: &HeaderMap) -> Option<String> {
    headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn read_scope(config: &ScopeConfig, headers: &HeaderMap) -> ReadScope {
    match config.mode {
        ScopeMode::Global => ReadScope::All,
        ScopeMode::Session => match header_key(config, headers) {
            Some(key) => ReadScope::Session(key),
            None => ReadScope::Anonymous,
        },
    }
}

pub fn write_scope(config: &ScopeConfig, headers: &HeaderMap) -> WriteScope {
    match config.mode {
        ScopeMode::Global => WriteScope {
            session_id: None,
            minted: false,
        },
        ScopeMode::Session => match header_key(config, headers) {
            Some(key) => WriteScope {
                session_id: Some(key),
                minted: false,
            },
            None => WriteScope {
                session_id: Some(Uuid::new_v4().to_string()),
                minted: true,
            },
        },
    }
}

/// Response headers telling the caller which key a minted write used.
pub fn minted_key_headers(config: &ScopeConfig, scope: &WriteScope) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !scope.minted {
        return headers;
    }

    let name = HeaderName::from_bytes(config.header.as_bytes());
    let value = scope.session_id.as_deref().map(HeaderValue::from_str);
    match (name, value) {
        (Ok(name), Some(Ok(value))) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!(header = %config.header, "Could not encode minted session key header"),
    }
    headers
}
