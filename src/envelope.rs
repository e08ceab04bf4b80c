//! Wire protocol between the supervisor and an agent worker child process:
//! newline-delimited JSON over the child's stdin/stdout pipes.

use serde::{Deserialize, Serialize};

use crate::context::ContextStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Deliver an inbound chat message to the agent's conversation loop.
    Message { request_id: String, content: String, source: String },
    /// Switch the agent to a different model for subsequent turns.
    SetModel { request_id: String, model: String },
    /// Drop accumulated conversation turns, keeping the system prompt.
    ResetContext { request_id: String },
    /// Ask for current context/token-usage stats without affecting state.
    GetStats { request_id: String },
    /// Ask the worker to exit cleanly.
    Shutdown,
}

impl WorkerRequest {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Message { request_id, .. }
            | Self::SetModel { request_id, .. }
            | Self::ResetContext { request_id }
            | Self::GetStats { request_id } => Some(request_id),
            Self::Shutdown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Final assistant reply text for a `Message` request.
    Reply { request_id: String, content: String },
    /// Acknowledge a model switch or context reset.
    Ack { request_id: String },
    /// Stats payload for a `GetStats` request.
    Stats { request_id: String, stats: ContextStats },
    /// Something went wrong processing the request; the daemon relays this
    /// back to the originating channel rather than silently dropping it.
    Error { request_id: String, message: String },
    /// Unsolicited notice the worker wants surfaced (e.g. heartbeat-driven
    /// proactive message), with no corresponding request to correlate to.
    Notify { content: String },
}

impl WorkerReply {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Reply { request_id, .. }
            | Self::Ack { request_id }
            | Self::Stats { request_id, .. }
            | Self::Error { request_id, .. } => Some(request_id),
            Self::Notify { .. } => None,
        }
    }
}

/// Serialize a value as a single NDJSON line, including the trailing `\n`.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_request_roundtrips() {
        let req = WorkerRequest::Message {
            request_id: "r1".to_string(),
            content: "hello".to_string(),
            source: "telegram".to_string(),
        };
        let line = encode_line(&req).unwrap();
        assert!(line.ends_with('\n'));
        let parsed: WorkerRequest = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed.request_id(), Some("r1"));
    }

    #[test]
    fn shutdown_has_no_request_id() {
        assert_eq!(WorkerRequest::Shutdown.request_id(), None);
    }

    #[test]
    fn reply_roundtrips() {
        let reply = WorkerReply::Reply { request_id: "r2".to_string(), content: "hi there".to_string() };
        let line = encode_line(&reply).unwrap();
        let parsed: WorkerReply = serde_json::from_str(line.trim_end()).unwrap();
        match parsed {
            WorkerReply::Reply { request_id, content } => {
                assert_eq!(request_id, "r2");
                assert_eq!(content, "hi there");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn notify_has_no_request_id_field() {
        let notify = WorkerReply::Notify { content: "pending tasks found".to_string() };
        let line = encode_line(&notify).unwrap();
        assert!(line.contains("\"type\":\"notify\""));
    }
}
