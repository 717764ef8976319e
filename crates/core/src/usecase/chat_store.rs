use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::server_status::ServerStatus;
use crate::domain::types::{Chat, ChatHistoryItem, Message, MessageRole, MessageTimestamp};
use crate::infra::api::{ApiError, BackendApi};

/// チャット一覧の再取得（ジョブ完了時にオーケストレーターが呼ぶ）
#[async_trait]
pub trait ChatRefresher: Send + Sync {
    async fn refresh_chats(&self) -> Result<(), ApiError>;
}

/// メッセージ送信エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Chat ID is required")]
    MissingChatId,
    #[error("Authentication failed. Please log in again.")]
    Unauthorized,
    #[error("Chat not found. Please refresh and try again.")]
    NotFound,
    #[error("Network error. Please check your connection.")]
    Network,
    #[error("{0}")]
    Server(String),
}

impl From<ApiError> for ChatError {
    fn from(err: ApiError) -> Self {
        match err.status_code {
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            0 => Self::Network,
            _ if err.message.is_empty() => {
                Self::Server("Failed to send message. Please try again.".to_string())
            }
            _ => Self::Server(err.message),
        }
    }
}

/// UI が読むチャット状態のスナップショット
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatState {
    pub history: Vec<ChatHistoryItem>,
    pub current_chat_id: Option<String>,
    pub current_chat: Option<Chat>,
    pub messages: Vec<Message>,
    pub notes: Option<String>,
}

/// チャット一覧・表示中チャット・メッセージ・ノートを保持するストア
pub struct ChatStore {
    api: Arc<dyn BackendApi>,
    state: RwLock<ChatState>,
}

impl ChatStore {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            api,
            state: RwLock::new(ChatState::default()),
        }
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.read().clone()
    }

    pub fn history(&self) -> Vec<ChatHistoryItem> {
        self.state.read().history.clone()
    }

    /// 履歴一覧を再取得する。
    pub async fn reload_history(&self) -> Result<Vec<ChatHistoryItem>, ApiError> {
        let items = self.api.chat_history().await?;
        self.state.write().history = items.clone();
        Ok(items)
    }

    pub async fn create_chat(&self) -> Result<String, ApiError> {
        let created = self.api.create_chat().await?;
        self.state.write().current_chat_id = Some(created.chat_id.clone());
        Ok(created.chat_id)
    }

    /// チャットを読み込む。完了済みならノート本文も取得する。
    pub async fn load_chat(&self, chat_id: &str) -> Result<Chat, ApiError> {
        let chat = self.api.get_chat(chat_id).await?;
        {
            let mut state = self.state.write();
            state.current_chat_id = Some(chat_id.to_string());
            state.current_chat = Some(chat.clone());
            // 古いノートを表示しないよう先にクリア
            state.notes = None;
        }

        let completed = matches!(
            ServerStatus::from_chat(chat.status.as_deref()),
            Ok(ServerStatus::Completed)
        );
        if completed {
            match self.fetch_notes(chat_id).await {
                Ok(Some(notes)) => {
                    let mut state = self.state.write();
                    if state.current_chat_id.as_deref() == Some(chat_id) {
                        state.notes = Some(notes);
                    }
                }
                Ok(None) => {}
                Err(e) => log::error!("Failed to load notes for chat {chat_id}: {e}"),
            }
        }

        Ok(chat)
    }

    async fn fetch_notes(&self, chat_id: &str) -> Result<Option<String>, ApiError> {
        let url = self.api.notes_download_url(chat_id).await?;
        let text = self.api.fetch_text(&url).await?;
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    pub async fn load_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        let messages = self.api.get_messages(chat_id).await?;
        self.state.write().messages = messages.clone();
        Ok(messages)
    }

    /// メッセージを送信する。
    ///
    /// 送信中は仮のユーザーメッセージを表示し、成功時はサーバーの 2 件で置き換え、
    /// 失敗時は取り除く。
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if chat_id.is_empty() {
            return Err(ChatError::MissingChatId);
        }

        let temp_id = format!("temp-{}", uuid::Uuid::new_v4());
        self.state.write().messages.push(Message {
            id: temp_id.clone(),
            chat_id: Some(chat_id.to_string()),
            role: MessageRole::User,
            text: text.to_string(),
            created_at: MessageTimestamp::Iso(chrono::Utc::now().to_rfc3339()),
        });

        match self.api.send_message(chat_id, text).await {
            Ok(response) => {
                let mut state = self.state.write();
                state.messages.retain(|m| m.id != temp_id);
                state.messages.push(response.user_message);
                state.messages.push(response.ai_message);
                Ok(())
            }
            Err(e) => {
                log::error!("Send message error for chat {chat_id}: {e}");
                self.state.write().messages.retain(|m| m.id != temp_id);
                Err(e.into())
            }
        }
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        self.api.delete_chat(chat_id).await?;
        let mut state = self.state.write();
        state.history.retain(|item| item.id != chat_id);
        if state.current_chat_id.as_deref() == Some(chat_id) {
            state.current_chat_id = None;
            state.current_chat = None;
            state.messages.clear();
            state.notes = None;
        }
        Ok(())
    }

    /// 表示中のチャットをクリアする（履歴は残す）
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.current_chat_id = None;
        state.current_chat = None;
        state.messages.clear();
        state.notes = None;
    }
}

#[async_trait]
impl ChatRefresher for ChatStore {
    async fn refresh_chats(&self) -> Result<(), ApiError> {
        self.reload_history().await.map(|_| ())
    }
}
