use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// アップロード種別（署名付き URL の `type` パラメータ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Transcription,
    Notes,
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Transcription => "transcription",
            Self::Notes => "notes",
        }
    }
}

/// ジョブの入力となるローカルメディア。リトライ時の再利用のためジョブが保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// ローカルリソースの URI (`file://` 付きでも可)
    pub uri: String,
    pub kind: MediaKind,
}

impl MediaSource {
    pub fn video(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: MediaKind::Video,
        }
    }

    pub fn audio(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: MediaKind::Audio,
        }
    }

    /// `file://` スキームを除いたローカルパス
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.uri.strip_prefix("file://").unwrap_or(&self.uri))
    }
}

/// アップロード完了後のファイル参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_key: String,
    pub public_url: String,
}

/// `POST /uploads/sign-url` のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub upload_url: String,
    pub file_key: String,
    pub public_url: String,
}

// ─── Chat ────────────────────────────────────────────────────────

/// バックエンドのチャット（= ジョブ）レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub transcription_url: Option<String>,
    #[serde(default)]
    pub notes_url: Option<String>,
    /// サーバー側の処理状態（生文字列、`ServerStatus::from_chat` で解釈する）
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// 履歴一覧の項目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryItem {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAudioResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesDownload {
    pub download_url: String,
}

// ─── Message ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// メッセージ作成時刻。ISO 文字列か Firestore のタイムスタンプ形式で返ってくる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTimestamp {
    Iso(String),
    Firestore {
        #[serde(rename = "_seconds")]
        seconds: i64,
        #[serde(rename = "_nanoseconds")]
        nanoseconds: u32,
    },
}

impl MessageTimestamp {
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Self::Iso(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            Self::Firestore {
                seconds,
                nanoseconds,
            } => chrono::DateTime::from_timestamp(*seconds, *nanoseconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub role: MessageRole,
    pub text: String,
    pub created_at: MessageTimestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub user_message: Message,
    pub ai_message: Message,
}
