//! Recorded request snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// One observed request from a visitor.
///
/// Only a configured subset of headers is retained (by default just
/// `user-agent`); header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Request {
    /// Row id, `None` until persisted.
    pub id: Option<i64>,
    /// Owning visitor row id.
    pub visitor_id: i64,
    /// HTTP method, lowercased.
    pub method: String,
    /// Scheme, lowercased ("http" / "https").
    pub protocol: String,
    /// Host header, lowercased.
    pub hostname: String,
    /// Path, without the query string.
    pub path: String,
    /// Parsed query parameters, as received.
    pub query: BTreeMap<String, String>,
    /// Retained headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// When the row was recorded.
    pub created: Timestamp,
    /// When the request was made. May be backdated by the caller when
    /// replaying history; `created` never is.
    pub requested: Timestamp,
}

impl Request {
    /// The retained `user-agent` header, if any.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent").map(String::as_str)
    }
}

/// An unsaved request snapshot handed to the engine by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub method: String,
    pub protocol: String,
    pub hostname: String,
    pub path: String,
    /// Parsed query parameters.
    pub query: BTreeMap<String, String>,
    /// All headers the caller saw; the engine filters before storing.
    pub headers: BTreeMap<String, String>,
    /// Override the observation time (epoch ms). `None` means now.
    pub requested: Option<Timestamp>,
}

impl RequestSnapshot {
    /// Convenience constructor for the common GET case.
    pub fn get(path: &str, user_agent: Option<&str>) -> Self {
        let mut headers = BTreeMap::new();
        if let Some(ua) = user_agent {
            headers.insert("user-agent".to_string(), ua.to_string());
        }
        RequestSnapshot {
            method: "get".to_string(),
            protocol: "http".to_string(),
            hostname: String::new(),
            path: path.to_string(),
            query: BTreeMap::new(),
            headers,
            requested: None,
        }
    }

    /// Turn the snapshot into a storable request for a visitor,
    /// normalizing case and dropping non-retained headers.
    pub fn into_request(
        mut self,
        visitor_id: i64,
        retain_headers: &[String],
        now: Timestamp,
    ) -> Request {
        let headers = std::mem::take(&mut self.headers)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .filter(|(k, _)| retain_headers.iter().any(|r| r == k))
            .collect();
        Request {
            id: None,
            visitor_id,
            method: self.method.to_lowercase(),
            protocol: self.protocol.to_lowercase(),
            hostname: self.hostname.to_lowercase(),
            path: self.path,
            query: self.query,
            headers,
            created: now,
            requested: self.requested.unwrap_or(now),
        }
    }
}
