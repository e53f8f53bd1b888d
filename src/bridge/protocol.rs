//! Wire protocol types for supervisor-store communication.
//!
//! Requests travel supervisor → store as one JSON object per line:
//! `{"action": "SET"|"GET"|"EXISTS"|"STOP", "data": {...}}`.
//!
//! Replies travel store → supervisor as one raw-text line (not JSON). A fixed
//! set of sentinel strings stands in for structured outcomes; everything else
//! is a value echo. Two consequences of the raw-text reply channel:
//!
//! - a stored value literally equal to a sentinel is indistinguishable from
//!   the sentinel (accepted limitation),
//! - values must not contain newlines, and an empty value's echo collapses
//!   into a blank line, which the supervisor rejects as a protocol violation.

use serde::{Deserialize, Serialize};

/// Clean acknowledgment of a STOP request.
pub const ACK_OK: &str = "OK";
/// Affirmative EXISTS reply.
pub const REPLY_YES: &str = "YES";
/// Negative EXISTS reply.
pub const REPLY_NO: &str = "NO";
/// GET reply for a key absent from the store.
pub const NOT_SET: &str = "_NOT_SET";
/// Reply to a well-formed request whose action is not recognized.
pub const UNKNOWN_ACTION: &str = "_UNKNOWN_ACTION";

const KNOWN_ACTIONS: [&str; 4] = ["SET", "GET", "EXISTS", "STOP"];

/// Requests from supervisor to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "UPPERCASE")]
pub enum Request {
    /// Store a value unconditionally, overwriting any previous one.
    Set { key: String, value: String },
    Get { key: String },
    Exists { key: String },
    /// Terminal action: the store acknowledges with `OK` and exits its loop.
    Stop {},
}

/// Typed interpretation of a raw reply line.
///
/// Sentinel decoding happens here, once, so call sites match on variants
/// instead of comparing strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Yes,
    No,
    NotSet,
    UnknownAction,
    Value(String),
}

impl Reply {
    /// Interpret a trimmed reply line.
    pub fn parse(line: &str) -> Self {
        match line {
            ACK_OK => Reply::Ok,
            REPLY_YES => Reply::Yes,
            REPLY_NO => Reply::No,
            NOT_SET => Reply::NotSet,
            UNKNOWN_ACTION => Reply::UnknownAction,
            other => Reply::Value(other.to_string()),
        }
    }

    /// The raw wire text for this reply.
    pub fn as_text(&self) -> &str {
        match self {
            Reply::Ok => ACK_OK,
            Reply::Yes => REPLY_YES,
            Reply::No => REPLY_NO,
            Reply::NotSet => NOT_SET,
            Reply::UnknownAction => UNKNOWN_ACTION,
            Reply::Value(value) => value,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Value(value) => value,
            other => other.as_text().to_string(),
        }
    }
}

/// Store-side classification of one request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Request(Request),
    /// Well-formed JSON object, but the action is not one of the four.
    UnknownAction,
    /// Not valid JSON, empty, or a known action with a bad payload. Skipped
    /// by the store loop rather than answered.
    Malformed,
}

/// Classify one request line the way the store loop handles it.
pub fn parse_request_line(line: &str) -> Incoming {
    let line = line.trim();
    if line.is_empty() {
        return Incoming::Malformed;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Incoming::Malformed,
    };

    match serde_json::from_value::<Request>(value.clone()) {
        Ok(request) => Incoming::Request(request),
        Err(_) => match value.get("action").and_then(serde_json::Value::as_str) {
            Some(action) if !KNOWN_ACTIONS.contains(&action) => Incoming::UnknownAction,
            _ => Incoming::Malformed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_request_serializes() {
        let req = Request::Set {
            key: "color".to_string(),
            value: "blue".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"action": "SET", "data": {"key": "color", "value": "blue"}})
        );
    }

    #[test]
    fn get_request_serializes() {
        let req = Request::Get {
            key: "color".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"action": "GET", "data": {"key": "color"}})
        );
    }

    #[test]
    fn stop_request_carries_empty_data() {
        assert_eq!(
            serde_json::to_value(&Request::Stop {}).unwrap(),
            json!({"action": "STOP", "data": {}})
        );
    }

    #[test]
    fn request_round_trips() {
        let req = Request::Exists {
            key: "PATH".to_string(),
        };
        let line = serde_json::to_string(&req).unwrap();
        assert_eq!(parse_request_line(&line), Incoming::Request(req));
    }

    #[test]
    fn unknown_action_is_distinguished_from_malformed() {
        assert_eq!(
            parse_request_line(r#"{"action": "FROB", "data": {}}"#),
            Incoming::UnknownAction
        );
        // Known action with a bad payload is malformed, not unknown.
        assert_eq!(
            parse_request_line(r#"{"action": "SET", "data": {"key": "k"}}"#),
            Incoming::Malformed
        );
        assert_eq!(parse_request_line("not json"), Incoming::Malformed);
        assert_eq!(parse_request_line(""), Incoming::Malformed);
        assert_eq!(parse_request_line("   "), Incoming::Malformed);
        assert_eq!(parse_request_line(r#"{"data": {}}"#), Incoming::Malformed);
    }

    #[test]
    fn reply_parse_maps_sentinels() {
        assert_eq!(Reply::parse("OK"), Reply::Ok);
        assert_eq!(Reply::parse("YES"), Reply::Yes);
        assert_eq!(Reply::parse("NO"), Reply::No);
        assert_eq!(Reply::parse("_NOT_SET"), Reply::NotSet);
        assert_eq!(Reply::parse("_UNKNOWN_ACTION"), Reply::UnknownAction);
        assert_eq!(Reply::parse("blue"), Reply::Value("blue".to_string()));
    }

    #[test]
    fn reply_text_round_trips() {
        for reply in [
            Reply::Ok,
            Reply::Yes,
            Reply::No,
            Reply::NotSet,
            Reply::UnknownAction,
            Reply::Value("some value".to_string()),
        ] {
            assert_eq!(Reply::parse(reply.as_text()), reply);
        }
    }
}
