#[cfg(test)]
mod tests {
    use crate::domain::error::{AppError, ErrorCode, JobError, PollFailure};
    use crate::domain::job::{JobRecord, JobStatus};
    use crate::domain::types::{
        Chat, CreateChatResponse, MediaKind, MediaSource, Message, MessageRole, MessageTimestamp,
        SignedUpload,
    };

    #[test]
    fn test_job_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Uploading).unwrap(),
            "\"uploading\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::GeneratingNotes).unwrap(),
            "\"generating_notes\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_job_record_serialization() {
        let record = JobRecord::new(
            "abc".to_string(),
            Some(MediaSource::video("file:///tmp/clip.mp4")),
            "2026-01-01T00:00:00Z".to_string(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["job_id"], "abc");
        assert_eq!(json["status"], "uploading");
        assert!(json["error"].is_null());
        assert_eq!(json["source"]["kind"], "video");
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::Busy).unwrap(),
            "\"E_BUSY\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::ServerFailed).unwrap(),
            "\"E_SERVER_FAILED\""
        );
    }

    #[test]
    fn test_app_error_serialization() {
        let err: AppError = JobError::from(PollFailure::ServerFailed).into();
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("E_SERVER_FAILED"));
        assert!(json.contains("recoverable"));
    }

    #[test]
    fn test_media_kind_serialization() {
        assert_eq!(serde_json::to_string(&MediaKind::Audio).unwrap(), "\"audio\"");
        assert_eq!(MediaKind::Transcription.as_str(), "transcription");
    }

    #[test]
    fn test_chat_deserialization_camel_case() {
        let chat: Chat = serde_json::from_str(
            r#"{"id":"abc","userId":"u1","notesUrl":"https://x/n.md","status":"generating_notes"}"#,
        )
        .unwrap();
        assert_eq!(chat.id, "abc");
        assert_eq!(chat.user_id.as_deref(), Some("u1"));
        assert_eq!(chat.status.as_deref(), Some("generating_notes"));
        assert!(chat.title.is_none());
    }

    #[test]
    fn test_wire_responses() {
        let created: CreateChatResponse = serde_json::from_str(r#"{"chatId":"abc"}"#).unwrap();
        assert_eq!(created.chat_id, "abc");

        let signed: SignedUpload = serde_json::from_str(
            r#"{"uploadUrl":"https://s3/put","fileKey":"k1","publicUrl":"https://cdn/k1"}"#,
        )
        .unwrap();
        assert_eq!(signed.file_key, "k1");
    }

    #[test]
    fn test_message_timestamp_variants() {
        let iso: Message = serde_json::from_str(
            r#"{"id":"m1","role":"user","text":"hi","createdAt":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(iso.role, MessageRole::User);
        assert!(iso.created_at.to_datetime().is_some());

        let fs: Message = serde_json::from_str(
            r#"{"id":"m2","role":"assistant","text":"yo","createdAt":{"_seconds":1700000000,"_nanoseconds":0}}"#,
        )
        .unwrap();
        assert_eq!(
            fs.created_at,
            MessageTimestamp::Firestore {
                seconds: 1_700_000_000,
                nanoseconds: 0
            }
        );
        assert_eq!(fs.created_at.to_datetime().unwrap().timestamp(), 1_700_000_000);
    }
}
