use serde::{Deserialize, Serialize};
use std::path::Path;

use super::provider::{BlobId, RemoteFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    WaitingForNetwork,
    ConnectingToProxy,
    Connecting,
    Updating,
    Ready,
}

/// Notification from the backing service's ordered event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum BackendEvent {
    /// Upload or download progress of a blob
    FileUpdated { file: RemoteFile },
    /// A send or edit finished; the document now lives in `message_id`
    DocumentSent {
        chat_id: i64,
        message_id: i64,
        blob_id: BlobId,
        local_path: String,
    },
    DocumentSendFailed {
        chat_id: i64,
        local_path: String,
        error_code: i32,
        error_message: String,
    },
    ConnectionStateChanged { state: ConnectionState },
    MessagesDeleted { chat_id: i64, message_ids: Vec<i64> },
    #[serde(other)]
    Unknown,
}

impl BackendEvent {
    /// Decode one raw event from the feed
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Local path the event refers to, for upload correlation
    pub fn upload_path(&self) -> Option<&Path> {
        match self {
            BackendEvent::FileUpdated { file } if file.remote.is_uploading_active
                || file.remote.is_uploading_completed =>
            {
                Some(Path::new(&file.local.path))
            }
            BackendEvent::DocumentSent { local_path, .. }
            | BackendEvent::DocumentSendFailed { local_path, .. } => Some(Path::new(local_path)),
            _ => None,
        }
    }

    /// Type tag, for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            BackendEvent::FileUpdated { .. } => "fileUpdated",
            BackendEvent::DocumentSent { .. } => "documentSent",
            BackendEvent::DocumentSendFailed { .. } => "documentSendFailed",
            BackendEvent::ConnectionStateChanged { .. } => "connectionStateChanged",
            BackendEvent::MessagesDeleted { .. } => "messagesDeleted",
            BackendEvent::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tagged_events() {
        let raw = r#"{"@type":"documentSent","chat_id":1,"message_id":42,"blob_id":7,"local_path":"/tmp/x"}"#;
        let event = BackendEvent::decode(raw).unwrap();
        assert_eq!(
            event,
            BackendEvent::DocumentSent {
                chat_id: 1,
                message_id: 42,
                blob_id: 7,
                local_path: "/tmp/x".to_string(),
            }
        );
        assert_eq!(event.upload_path(), Some(Path::new("/tmp/x")));

        let raw = r#"{"@type":"connectionStateChanged","state":"ready"}"#;
        assert_eq!(
            BackendEvent::decode(raw).unwrap(),
            BackendEvent::ConnectionStateChanged {
                state: ConnectionState::Ready
            }
        );
    }

    #[test]
    fn test_decode_file_update_with_partial_fields() {
        let raw = r#"{"@type":"fileUpdated","file":{"id":3,"expected_size":10,"local":{"path":"/c/3","downloaded_size":4,"is_downloading_active":true}}}"#;
        match BackendEvent::decode(raw).unwrap() {
            BackendEvent::FileUpdated { file } => {
                assert_eq!(file.id, 3);
                assert_eq!(file.local.downloaded_size, 4);
                assert!(!file.local.is_downloading_completed);
                assert!(!file.remote.is_uploading_active);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_types_are_tolerated() {
        let raw = r#"{"@type":"updateChatTitle","chat_id":1,"title":"x"}"#;
        assert_eq!(BackendEvent::decode(raw).unwrap(), BackendEvent::Unknown);
        assert!(BackendEvent::decode("{}").is_err());
    }
}
