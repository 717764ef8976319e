use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::error::PollFailure;
use crate::domain::server_status::ServerStatus;
use crate::domain::settings::PollSettings;
use crate::infra::api::{ApiError, BackendApi};

/// ポーリング中に発生するイベント（終端以外）
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// 非終端のサーバー状態を観測した
    Status(ServerStatus),
    /// 一時的な取得エラー。ポーリングは継続する。
    TransientError(ApiError),
}

/// ポーリングの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed(PollFailure),
    /// 外部から停止された。これ以降コールバックは呼ばれない。
    Cancelled,
}

/// チャット（ジョブ）のサーバー状態を一定間隔で確認する。
///
/// 最初の確認は開始から 1 間隔後。成功・失敗を問わず 1 回の確認を 1 試行と数える。
pub struct StatusPoller {
    api: Arc<dyn BackendApi>,
    settings: PollSettings,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn BackendApi>, settings: PollSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// 終端状態・試行回数上限・キャンセルのいずれかまでポーリングする。
    pub async fn run<F>(&self, job_id: &str, cancel: &CancellationToken, mut on_event: F) -> PollOutcome
    where
        F: FnMut(PollEvent) + Send,
    {
        let interval = Duration::from_millis(self.settings.interval_ms);
        let max_attempts = self.settings.max_attempts.max(1);
        let max_failures = self.settings.max_consecutive_failures.max(1);

        let mut attempts = 0u32;
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }

            attempts += 1;
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                result = self.api.get_chat(job_id) => result,
            };

            match fetched {
                Ok(chat) => {
                    consecutive_failures = 0;
                    match ServerStatus::from_chat(chat.status.as_deref()) {
                        Ok(ServerStatus::Completed) => {
                            log::info!("Job {job_id} completed on the server");
                            return PollOutcome::Completed;
                        }
                        Ok(ServerStatus::Failed) => {
                            log::warn!("Job {job_id} failed on the server");
                            return PollOutcome::Failed(PollFailure::ServerFailed);
                        }
                        Ok(status) => {
                            log::debug!("Job {job_id} poll #{attempts}: {status:?}");
                            on_event(PollEvent::Status(status));
                        }
                        Err(unknown) => {
                            log::warn!("Job {job_id} poll #{attempts}: {unknown}");
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log::warn!(
                        "Polling transient error for job {job_id} ({consecutive_failures} in a row): {e}"
                    );
                    on_event(PollEvent::TransientError(e));
                    if consecutive_failures >= max_failures {
                        return PollOutcome::Failed(PollFailure::Timeout);
                    }
                }
            }

            if attempts >= max_attempts {
                log::warn!("Job {job_id}: no terminal status after {attempts} attempts");
                return PollOutcome::Failed(PollFailure::Timeout);
            }
        }
    }
}
