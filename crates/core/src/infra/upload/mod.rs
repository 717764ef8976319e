use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::types::{MediaKind, MediaSource, UploadedFile};
use crate::infra::api::{ApiError, BackendApi};
use crate::infra::convert::{AudioConverter, ConversionError};

/// アップロードエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    #[error("could not get upload URL: {0}")]
    SignedUrl(ApiError),
    #[error("could not read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("{0}")]
    Transfer(ApiError),
    #[error("{0}")]
    Conversion(#[from] ConversionError),
}

/// ジョブの入力メディアをアップロードする trait（オーケストレーターが使う）
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload_media(
        &self,
        job_id: &str,
        source: &MediaSource,
    ) -> Result<UploadedFile, UploadError>;
}

/// 拡張子から Content-Type を推定する。
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// 署名付き URL を取得し、ローカルファイルを直接 PUT する。
///
/// 内部でリトライはしない。元ファイルも削除しない。
pub struct UploadCoordinator {
    api: Arc<dyn BackendApi>,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self { api }
    }

    pub async fn upload(
        &self,
        path: &Path,
        kind: MediaKind,
        chat_id: &str,
    ) -> Result<UploadedFile, UploadError> {
        let signed = self
            .api
            .sign_upload(kind, Some(chat_id))
            .await
            .map_err(UploadError::SignedUrl)?;

        let body = tokio::fs::read(path).await.map_err(|e| UploadError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        log::info!(
            "Uploading {} ({} bytes) for chat {chat_id}",
            path.display(),
            body.len()
        );

        self.api
            .put_object(&signed.upload_url, body, content_type_for(path))
            .await
            .map_err(UploadError::Transfer)?;

        Ok(UploadedFile {
            file_key: signed.file_key,
            public_url: signed.public_url,
        })
    }
}

/// 動画は音声に変換してから、音声はそのままアップロードする。
pub struct MediaPipelineUploader {
    coordinator: UploadCoordinator,
    converter: Arc<dyn AudioConverter>,
}

impl MediaPipelineUploader {
    pub fn new(api: Arc<dyn BackendApi>, converter: Arc<dyn AudioConverter>) -> Self {
        Self {
            coordinator: UploadCoordinator::new(api),
            converter,
        }
    }
}

#[async_trait]
impl MediaUploader for MediaPipelineUploader {
    async fn upload_media(
        &self,
        job_id: &str,
        source: &MediaSource,
    ) -> Result<UploadedFile, UploadError> {
        let path = source.local_path();
        match source.kind {
            MediaKind::Video => {
                let audio = self.converter.to_audio(&path).await?;
                let uploaded = self
                    .coordinator
                    .upload(&audio, MediaKind::Audio, job_id)
                    .await;
                // 変換で作った一時ファイルのみ削除する（成否を問わない）
                if let Err(e) = tokio::fs::remove_file(&audio).await {
                    log::warn!("一時音声ファイルの削除に失敗: {}: {e}", audio.display());
                }
                uploaded
            }
            kind => self.coordinator.upload(&path, kind, job_id).await,
        }
    }
}
