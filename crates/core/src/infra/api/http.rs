use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{endpoints, ApiError, BackendApi, TokenProvider};
use crate::domain::types::{
    Chat, ChatHistoryItem, CreateChatResponse, MediaKind, Message, NotesDownload,
    ProcessAudioResponse, SendMessageResponse, SignedUpload,
};

/// reqwest によるバックエンドクライアント
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessAudioRequest<'a> {
    file_key: &'a str,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    text: &'a str,
}

/// エラーレスポンスのボディ
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        log::info!("API client initialized with base URL: {base_url}");

        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Bearer トークンを付与する。取得失敗時は未認証のまま送る。
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.id_token().await {
            Ok(Some(token)) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            Ok(None) => request,
            Err(e) => {
                log::error!("認証トークンの取得に失敗: {e}");
                request
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        response
            .json()
            .await
            .map_err(|e| ApiError::new(status, format!("Response parse error: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::timeout()
    } else {
        ApiError::network(format!("Network error: {e}"))
    }
}

async fn error_from_response(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| "An error occurred".to_string());
    ApiError::new(status, message)
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn create_chat(&self) -> Result<CreateChatResponse, ApiError> {
        self.send_json(self.client.post(self.url(endpoints::CHATS)))
            .await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Chat, ApiError> {
        self.send_json(self.client.get(self.url(&endpoints::chat_by_id(chat_id))))
            .await
    }

    async fn chat_history(&self) -> Result<Vec<ChatHistoryItem>, ApiError> {
        self.send_json(self.client.get(self.url(endpoints::CHAT_HISTORY)))
            .await
    }

    async fn process_audio(
        &self,
        chat_id: &str,
        file_key: &str,
    ) -> Result<ProcessAudioResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&endpoints::process_audio(chat_id)))
            .json(&ProcessAudioRequest { file_key });
        self.send_json(request).await
    }

    async fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        self.send_json(self.client.get(self.url(&endpoints::messages(chat_id))))
            .await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
    ) -> Result<SendMessageResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&endpoints::messages(chat_id)))
            .json(&SendMessageRequest { text });
        self.send_json(request).await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        self.send(self.client.delete(self.url(&endpoints::chat_by_id(chat_id))))
            .await
            .map(|_| ())
    }

    async fn notes_download_url(&self, chat_id: &str) -> Result<String, ApiError> {
        let notes: NotesDownload = self
            .send_json(self.client.get(self.url(&endpoints::notes_download(chat_id))))
            .await?;
        Ok(notes.download_url)
    }

    async fn sign_upload(
        &self,
        kind: MediaKind,
        chat_id: Option<&str>,
    ) -> Result<SignedUpload, ApiError> {
        let mut query = vec![("type", kind.as_str())];
        if let Some(id) = chat_id {
            query.push(("chatId", id));
        }
        let request = self.client.post(self.url(endpoints::SIGN_URL)).query(&query);
        self.send_json(request).await
    }

    async fn put_object(
        &self,
        upload_url: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        // 署名付き URL なので Authorization は付けない
        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                status.as_u16(),
                format!("Upload failed with status {status}"),
            ));
        }
        Ok(())
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ApiError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                status.as_u16(),
                format!("Download failed with status {status}"),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| ApiError::new(status.as_u16(), format!("Response read error: {e}")))
    }
}
