pub mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpBackend;

use async_trait::async_trait;

use crate::domain::types::{
    Chat, ChatHistoryItem, CreateChatResponse, MediaKind, Message, ProcessAudioResponse,
    SendMessageResponse, SignedUpload,
};

/// エンドポイント定義
pub mod endpoints {
    pub const CHATS: &str = "/chats";
    pub const CHAT_HISTORY: &str = "/chats/history";
    pub const SIGN_URL: &str = "/uploads/sign-url";

    pub fn chat_by_id(id: &str) -> String {
        format!("/chats/{id}")
    }

    pub fn process_audio(id: &str) -> String {
        format!("/chats/{id}/process-audio")
    }

    pub fn messages(id: &str) -> String {
        format!("/chats/{id}/messages")
    }

    pub fn notes_download(id: &str) -> String {
        format!("/chats/{id}/notes/download")
    }
}

/// バックエンド呼び出しのエラー。
///
/// `status_code` はレスポンスが無い場合 0（ネットワークエラー）、
/// クライアント側タイムアウトは 408。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn timeout() -> Self {
        Self::new(408, "Request timeout")
    }

    pub fn is_network(&self) -> bool {
        self.status_code == 0
    }
}

/// 認証トークンの供給元（認証プロバイダの ID トークン）
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn id_token(&self) -> Result<Option<String>, ApiError>;
}

/// 固定トークン（テスト・CLI 用）
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn id_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.0.clone())
    }
}

/// バックエンド API trait
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn create_chat(&self) -> Result<CreateChatResponse, ApiError>;

    async fn get_chat(&self, chat_id: &str) -> Result<Chat, ApiError>;

    async fn chat_history(&self) -> Result<Vec<ChatHistoryItem>, ApiError>;

    async fn process_audio(
        &self,
        chat_id: &str,
        file_key: &str,
    ) -> Result<ProcessAudioResponse, ApiError>;

    async fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError>;

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
    ) -> Result<SendMessageResponse, ApiError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError>;

    async fn notes_download_url(&self, chat_id: &str) -> Result<String, ApiError>;

    /// 署名付きアップロード先を取得する
    async fn sign_upload(
        &self,
        kind: MediaKind,
        chat_id: Option<&str>,
    ) -> Result<SignedUpload, ApiError>;

    /// 署名付き URL へ直接 PUT する
    async fn put_object(
        &self,
        upload_url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError>;

    /// 任意 URL のテキストを取得する（ノート本文のダウンロード用）
    async fn fetch_text(&self, url: &str) -> Result<String, ApiError>;
}
