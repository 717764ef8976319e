use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::domain::error::AppError;
use crate::domain::job::JobRecord;
use crate::domain::settings::ClientSettings;
use crate::domain::types::MediaSource;
use crate::infra::api::{ApiError, BackendApi, HttpBackend, TokenProvider};
use crate::infra::convert::FfmpegConverter;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::upload::{MediaPipelineUploader, MediaUploader};
use crate::usecase::chat_store::ChatStore;
use crate::usecase::job_service::{JobEvent, JobService};

/// アプリケーションサービス（UI 層が保持する唯一の入口）
pub struct AppService {
    settings: ClientSettings,
    chats: Arc<ChatStore>,
    jobs: JobService,
    metrics: Arc<Metrics>,
}

impl AppService {
    /// HTTP バックエンドと ffmpeg 変換器で組み立てる。
    pub fn new(settings: ClientSettings, tokens: Arc<dyn TokenProvider>) -> Result<Self, ApiError> {
        let api: Arc<dyn BackendApi> = Arc::new(HttpBackend::new(
            settings.api_base_url.clone(),
            Duration::from_secs(settings.request_timeout_secs),
            tokens,
        )?);
        let converter = Arc::new(FfmpegConverter::new(settings.ffmpeg.clone()));
        log::info!("音声変換: ffmpeg ({})", settings.ffmpeg.binary_path.display());
        let uploader = Arc::new(MediaPipelineUploader::new(api.clone(), converter));
        Ok(Self::with_backend(settings, api, uploader))
    }

    /// バックエンドとアップローダーを差し替えて組み立てる。
    pub fn with_backend(
        settings: ClientSettings,
        api: Arc<dyn BackendApi>,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let chats = Arc::new(ChatStore::new(api.clone()));
        let jobs = JobService::new(api, uploader, chats.clone(), &settings, metrics.clone());
        Self {
            settings,
            chats,
            jobs,
            metrics,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn chat_store(&self) -> &Arc<ChatStore> {
        &self.chats
    }

    pub fn jobs(&self) -> &JobService {
        &self.jobs
    }

    // ==================== Jobs ====================

    pub async fn start_job(&self, source: MediaSource) -> Result<String, AppError> {
        Ok(self.jobs.start_job(source).await?)
    }

    pub fn retry_job(&self, job_id: &str) -> Result<(), AppError> {
        Ok(self.jobs.retry_job(job_id)?)
    }

    pub fn poll_job(&self, job_id: &str) -> Result<bool, AppError> {
        Ok(self.jobs.poll_job(job_id)?)
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.jobs.cancel_job(job_id)
    }

    pub fn cleanup_job(&self, job_id: &str) -> bool {
        self.jobs.cleanup_job(job_id)
    }

    pub fn list_jobs(&self) -> HashMap<String, JobRecord> {
        self.jobs.jobs()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.jobs.subscribe()
    }

    // ==================== Metrics ====================

    pub fn get_metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}
