//! テスト用のスクリプト可能なバックエンド

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{ApiError, BackendApi};
use crate::domain::types::{
    Chat, ChatHistoryItem, CreateChatResponse, MediaKind, Message, MessageRole, MessageTimestamp,
    ProcessAudioResponse, SendMessageResponse, SignedUpload,
};

#[derive(Default)]
pub(crate) struct MockBackend {
    create_results: Mutex<VecDeque<Result<String, ApiError>>>,
    create_delay: Mutex<Option<Duration>>,
    statuses: Mutex<VecDeque<Result<Option<String>, ApiError>>>,
    fallback_status: Mutex<Option<String>>,
    process_error: Mutex<Option<ApiError>>,
    process_gate: Mutex<Option<Arc<Notify>>>,
    history: Mutex<Vec<ChatHistoryItem>>,
    history_error: Mutex<Option<ApiError>>,
    send_error: Mutex<Option<ApiError>>,
    put_error: Mutex<Option<ApiError>>,
    notes: Mutex<Option<String>>,
    pub uploads: Mutex<Vec<(String, usize, String)>>,
    pub create_calls: AtomicUsize,
    pub get_chat_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.fallback_status.lock() = Some("processing".to_string());
        mock
    }

    /// get_chat が順に返すステータス
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        self.statuses
            .lock()
            .extend(statuses.iter().map(|s| Ok(Some(s.to_string()))));
        self
    }

    pub fn push_status_error(&self, err: ApiError) {
        self.statuses.lock().push_back(Err(err));
    }

    pub fn push_status(&self, status: &str) {
        self.statuses.lock().push_back(Ok(Some(status.to_string())));
    }

    /// キューが空のときに返すステータス
    pub fn set_fallback_status(&self, status: &str) {
        *self.fallback_status.lock() = Some(status.to_string());
    }

    pub fn push_create(&self, result: Result<&str, ApiError>) {
        self.create_results
            .lock()
            .push_back(result.map(str::to_string));
    }

    /// 次の create_chat だけ応答を遅らせる
    pub fn delay_next_create(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub fn fail_process(&self, err: ApiError) {
        *self.process_error.lock() = Some(err);
    }

    pub fn clear_process_error(&self) {
        *self.process_error.lock() = None;
    }

    /// process_audio を外部から解放されるまで待たせる
    pub fn gate_process(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.process_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn set_history(&self, items: Vec<ChatHistoryItem>) {
        *self.history.lock() = items;
    }

    pub fn fail_history(&self, err: ApiError) {
        *self.history_error.lock() = Some(err);
    }

    pub fn fail_send(&self, err: ApiError) {
        *self.send_error.lock() = Some(err);
    }

    pub fn fail_put(&self, err: ApiError) {
        *self.put_error.lock() = Some(err);
    }

    pub fn set_notes(&self, notes: &str) {
        *self.notes.lock() = Some(notes.to_string());
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn message(id: &str, role: MessageRole, text: &str) -> Message {
    Message {
        id: id.to_string(),
        chat_id: None,
        role,
        text: text.to_string(),
        created_at: MessageTimestamp::Iso("2026-01-01T00:00:00Z".to_string()),
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn create_chat(&self) -> Result<CreateChatResponse, ApiError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.create_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.create_results.lock().pop_front();
        match scripted {
            Some(Ok(chat_id)) => Ok(CreateChatResponse { chat_id }),
            Some(Err(e)) => Err(e),
            None => Ok(CreateChatResponse {
                chat_id: format!("chat-{n}"),
            }),
        }
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Chat, ApiError> {
        self.get_chat_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().pop_front();
        let status = match next {
            Some(Ok(status)) => status,
            Some(Err(e)) => return Err(e),
            None => self.fallback_status.lock().clone(),
        };
        Ok(Chat {
            id: chat_id.to_string(),
            user_id: None,
            title: Some("Lecture".to_string()),
            video_url: None,
            transcription_url: None,
            notes_url: None,
            status,
            created_at: None,
            updated_at: None,
        })
    }

    async fn chat_history(&self) -> Result<Vec<ChatHistoryItem>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.history_error.lock().clone() {
            return Err(e);
        }
        Ok(self.history.lock().clone())
    }

    async fn process_audio(
        &self,
        _chat_id: &str,
        _file_key: &str,
    ) -> Result<ProcessAudioResponse, ApiError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.process_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(e) = self.process_error.lock().clone() {
            return Err(e);
        }
        Ok(ProcessAudioResponse {
            success: true,
            message: None,
        })
    }

    async fn get_messages(&self, _chat_id: &str) -> Result<Vec<Message>, ApiError> {
        Ok(vec![message("m1", MessageRole::Assistant, "Here are your notes")])
    }

    async fn send_message(
        &self,
        _chat_id: &str,
        text: &str,
    ) -> Result<SendMessageResponse, ApiError> {
        if let Some(e) = self.send_error.lock().clone() {
            return Err(e);
        }
        Ok(SendMessageResponse {
            user_message: message("u-1", MessageRole::User, text),
            ai_message: message("a-1", MessageRole::Assistant, "answer"),
        })
    }

    async fn delete_chat(&self, _chat_id: &str) -> Result<(), ApiError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notes_download_url(&self, chat_id: &str) -> Result<String, ApiError> {
        Ok(format!("https://storage.test/notes/{chat_id}.md"))
    }

    async fn sign_upload(
        &self,
        kind: MediaKind,
        chat_id: Option<&str>,
    ) -> Result<SignedUpload, ApiError> {
        let chat = chat_id.unwrap_or("none");
        Ok(SignedUpload {
            upload_url: format!("https://storage.test/put/{}/{chat}", kind.as_str()),
            file_key: format!("{}/{chat}", kind.as_str()),
            public_url: format!("https://cdn.test/{}/{chat}", kind.as_str()),
        })
    }

    async fn put_object(
        &self,
        upload_url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        if let Some(e) = self.put_error.lock().clone() {
            return Err(e);
        }
        self.uploads
            .lock()
            .push((upload_url.to_string(), body.len(), content_type.to_string()));
        Ok(())
    }

    async fn fetch_text(&self, _url: &str) -> Result<String, ApiError> {
        self.notes
            .lock()
            .clone()
            .ok_or_else(|| ApiError::new(404, "Download failed with status 404 Not Found"))
    }
}
