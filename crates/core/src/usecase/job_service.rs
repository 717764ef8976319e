use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::error::{AppError, JobError, NotifyFailure};
use crate::domain::job::{JobRecord, JobStatus};
use crate::domain::settings::ClientSettings;
use crate::domain::types::MediaSource;
use crate::infra::api::BackendApi;
use crate::infra::metrics::Metrics;
use crate::infra::upload::MediaUploader;
use crate::usecase::chat_store::ChatRefresher;
use crate::usecase::poller::{PollEvent, PollOutcome, StatusPoller};

const EVENT_CAPACITY: usize = 64;

/// ジョブ状態の変更通知
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Updated { job: JobRecord },
    Removed { job_id: String },
}

/// バックグラウンドジョブのオーケストレーター。
///
/// ジョブマップを排他的に所有し、1 ジョブにつき 1 タスクで
/// upload → notify → poll を順に実行する。
#[derive(Clone)]
pub struct JobService {
    inner: Arc<Inner>,
}

struct Inner {
    table: Mutex<JobTable>,
    api: Arc<dyn BackendApi>,
    uploader: Arc<dyn MediaUploader>,
    chats: Arc<dyn ChatRefresher>,
    poller: StatusPoller,
    metrics: Arc<Metrics>,
    events: broadcast::Sender<JobEvent>,
    single_flight: bool,
    next_epoch: AtomicU64,
}

#[derive(Default)]
struct JobTable {
    entries: HashMap<String, JobEntry>,
    /// チャット作成待ちの start_job 数（single-flight 判定に含める）
    starting: usize,
}

impl JobTable {
    fn active(&self) -> usize {
        self.entries.values().filter(|e| e.record.is_active()).count()
    }
}

struct JobEntry {
    record: JobRecord,
    /// 実行中タスクの世代。古い世代のタスクからの更新は破棄する。
    epoch: u64,
    task: Option<JobTask>,
}

/// ジョブに紐づくタスクハンドル
struct JobTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl JobTask {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// チャット作成待ちの start_job を数える。future が途中で破棄されても数を戻す。
struct PendingStart<'a> {
    table: &'a Mutex<JobTable>,
    armed: bool,
}

impl PendingStart<'_> {
    /// 取得済みのロック内で数を戻す。
    fn release(mut self, table: &mut JobTable) {
        table.starting -= 1;
        self.armed = false;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.lock().starting -= 1;
        }
    }
}

/// パイプラインのフェーズ
enum Phase {
    Upload(MediaSource),
    Notify { file_key: String },
    Poll,
}

/// パイプラインの中断理由
enum Halt {
    /// ジョブが削除/再実行され、このタスクの更新は無効
    Stale,
    Failed(JobError),
}

impl From<JobError> for Halt {
    fn from(err: JobError) -> Self {
        Self::Failed(err)
    }
}

impl JobService {
    pub fn new(
        api: Arc<dyn BackendApi>,
        uploader: Arc<dyn MediaUploader>,
        chats: Arc<dyn ChatRefresher>,
        settings: &ClientSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let poller = StatusPoller::new(api.clone(), settings.poll.clone());
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(JobTable::default()),
                api,
                uploader,
                chats,
                poller,
                metrics,
                events,
                single_flight: settings.single_flight,
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    /// 状態変更の購読
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// 全ジョブのスナップショット
    pub fn jobs(&self) -> HashMap<String, JobRecord> {
        let table = self.inner.table.lock();
        table
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.record.clone()))
            .collect()
    }

    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        let table = self.inner.table.lock();
        table.entries.get(job_id).map(|e| e.record.clone())
    }

    /// 非終端状態のジョブ数
    pub fn active_jobs(&self) -> usize {
        self.inner.table.lock().active()
    }

    /// ジョブを開始し、チャット ID が確定した時点で返す。
    ///
    /// チャット作成に失敗した場合はジョブを登録せずにエラーを返す。
    pub async fn start_job(&self, source: MediaSource) -> Result<String, JobError> {
        {
            let mut table = self.inner.table.lock();
            if self.inner.single_flight {
                let active = table.active() + table.starting;
                if active > 0 {
                    return Err(JobError::Busy { active });
                }
            }
            table.starting += 1;
        }
        let pending = PendingStart {
            table: &self.inner.table,
            armed: true,
        };

        let created = self.inner.api.create_chat().await;

        let mut table = self.inner.table.lock();
        pending.release(&mut table);

        let job_id = match created {
            Ok(resp) if !resp.chat_id.is_empty() => resp.chat_id,
            Ok(_) => {
                return Err(JobError::Creation("Failed to create chat".to_string()));
            }
            Err(e) => {
                log::error!("チャット作成に失敗: {e}");
                return Err(JobError::Creation(e.message));
            }
        };

        if table.entries.contains_key(&job_id) {
            return Err(JobError::InvalidState(format!(
                "Job {job_id} is already tracked"
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let record = JobRecord::new(job_id.clone(), Some(source.clone()), now);
        let epoch = self.next_epoch();
        let task = self.spawn_pipeline(job_id.clone(), epoch, Some(source));
        table.entries.insert(
            job_id.clone(),
            JobEntry {
                record: record.clone(),
                epoch,
                task: Some(task),
            },
        );
        let _ = self.inner.events.send(JobEvent::Updated { job: record });
        drop(table);

        self.inner.metrics.inc_jobs_started();
        log::info!("ジョブ開始: {job_id}");
        Ok(job_id)
    }

    /// 失敗したジョブを同じチャット ID で再実行する。
    ///
    /// 入力メディアを保持していればアップロードから、無ければポーリングから再開する。
    /// start_job 経由のレコードは常に入力を保持するので、通常はアップロードからやり直す。
    pub fn retry_job(&self, job_id: &str) -> Result<(), JobError> {
        let mut table = self.inner.table.lock();
        if self.inner.single_flight {
            let active = table.active() + table.starting;
            if active > 0 {
                return Err(JobError::Busy { active });
            }
        }

        let entry = table
            .entries
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        entry
            .record
            .reset_for_retry()
            .map_err(|e| JobError::InvalidState(e.message))?;
        entry.record.updated_at = chrono::Utc::now().to_rfc3339();

        let epoch = self.next_epoch();
        entry.epoch = epoch;
        if let Some(old) = entry.task.take() {
            old.stop();
        }
        let source = entry.record.source.clone();
        entry.task = Some(self.spawn_pipeline(job_id.to_string(), epoch, source));

        let _ = self.inner.events.send(JobEvent::Updated {
            job: entry.record.clone(),
        });
        log::info!("ジョブ再実行: {job_id}");
        Ok(())
    }

    /// サーバー状態のポーリングを開始する。既にタスクが動いていれば何もしない。
    ///
    /// 戻り値は新しくポーリングを開始したかどうか。
    pub fn poll_job(&self, job_id: &str) -> Result<bool, JobError> {
        let mut table = self.inner.table.lock();
        let entry = table
            .entries
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if entry.task.as_ref().is_some_and(JobTask::is_live) {
            return Ok(false);
        }
        if entry.record.status.is_terminal() {
            return Err(JobError::InvalidState(format!(
                "Job {job_id} is already {}",
                entry.record.status.as_str()
            )));
        }

        let epoch = self.next_epoch();
        entry.epoch = epoch;
        entry.task = Some(self.spawn_pipeline(job_id.to_string(), epoch, None));
        Ok(true)
    }

    /// 実行中のジョブを中断して削除する。サーバー側の処理は止めない。
    pub fn cancel_job(&self, job_id: &str) -> bool {
        match self.remove(job_id) {
            Some(record) => {
                if record.is_active() {
                    self.inner.metrics.inc_jobs_canceled();
                }
                log::info!("ジョブをキャンセル: {job_id}");
                true
            }
            None => false,
        }
    }

    /// 終了したジョブを一覧から消す（動作は cancel_job と同じ）
    pub fn cleanup_job(&self, job_id: &str) -> bool {
        self.remove(job_id).is_some()
    }

    fn remove(&self, job_id: &str) -> Option<JobRecord> {
        let mut table = self.inner.table.lock();
        let entry = table.entries.remove(job_id)?;
        if let Some(task) = entry.task {
            task.stop();
        }
        let _ = self.inner.events.send(JobEvent::Removed {
            job_id: job_id.to_string(),
        });
        Some(entry.record)
    }

    fn next_epoch(&self) -> u64 {
        self.inner.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// テーブルのロック中に呼ぶ。タスクの最初の更新はロック解放後に適用される。
    fn spawn_pipeline(&self, job_id: String, epoch: u64, source: Option<MediaSource>) -> JobTask {
        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.drive(job_id, epoch, source, token).await;
        });
        JobTask { cancel, handle }
    }
}

impl Inner {
    /// フェーズを順に実行し、結果をジョブレコードに反映する。
    async fn drive(
        self: Arc<Self>,
        job_id: String,
        epoch: u64,
        source: Option<MediaSource>,
        cancel: CancellationToken,
    ) {
        let mut phase = match source {
            Some(source) => Phase::Upload(source),
            None => Phase::Poll,
        };

        let result = loop {
            if cancel.is_cancelled() {
                break Err(Halt::Stale);
            }
            let step = match phase {
                Phase::Upload(source) => self
                    .upload_phase(&job_id, epoch, &source)
                    .await
                    .map(|file_key| Some(Phase::Notify { file_key })),
                Phase::Notify { file_key } => self
                    .notify_phase(&job_id, epoch, &file_key)
                    .await
                    .map(|()| Some(Phase::Poll)),
                Phase::Poll => self.poll_phase(&job_id, epoch, &cancel).await.map(|()| None),
            };
            match step {
                Ok(Some(next)) => phase = next,
                Ok(None) => break Ok(()),
                Err(halt) => break Err(halt),
            }
        };

        match result {
            Ok(()) => self.finish(&job_id, epoch).await,
            Err(Halt::Stale) => log::debug!("Job {job_id} (epoch {epoch}) abandoned"),
            Err(Halt::Failed(err)) => self.fail(&job_id, epoch, err),
        }
    }

    async fn upload_phase(
        &self,
        job_id: &str,
        epoch: u64,
        source: &MediaSource,
    ) -> Result<String, Halt> {
        self.advance(job_id, epoch, JobStatus::Uploading, 0.2)?;

        let started = Instant::now();
        let uploaded = self
            .uploader
            .upload_media(job_id, source)
            .await
            .map_err(|e| JobError::Upload(e.to_string()))?;
        self.metrics
            .record_latency("upload", started.elapsed().as_millis() as u64);

        log::info!("Job {job_id}: uploaded {}", uploaded.file_key);
        Ok(uploaded.file_key)
    }

    async fn notify_phase(&self, job_id: &str, epoch: u64, file_key: &str) -> Result<(), Halt> {
        self.advance(job_id, epoch, JobStatus::Processing, 0.3)?;

        let started = Instant::now();
        let response = self
            .api
            .process_audio(job_id, file_key)
            .await
            .map_err(|e| JobError::from(NotifyFailure::classify(e.status_code, &e.message)))?;
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "server rejected the request".to_string());
            return Err(JobError::from(NotifyFailure::Other(message)).into());
        }
        self.metrics
            .record_latency("notify", started.elapsed().as_millis() as u64);
        Ok(())
    }

    async fn poll_phase(
        &self,
        job_id: &str,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        self.advance(job_id, epoch, JobStatus::Processing, 0.4)?;

        let started = Instant::now();
        let outcome = self
            .poller
            .run(job_id, cancel, |event| match event {
                PollEvent::Status(status) => {
                    self.apply(job_id, epoch, |r| r.observe(status));
                }
                PollEvent::TransientError(_) => self.metrics.inc_poll_transient_errors(),
            })
            .await;

        match outcome {
            PollOutcome::Completed => {
                self.metrics
                    .record_latency("processing", started.elapsed().as_millis() as u64);
                Ok(())
            }
            PollOutcome::Failed(failure) => Err(JobError::Poll(failure).into()),
            PollOutcome::Cancelled => Err(Halt::Stale),
        }
    }

    /// 成功経路上の前進。適用できなければこのタスクは無効。
    fn advance(&self, job_id: &str, epoch: u64, status: JobStatus, progress: f32) -> Result<(), Halt> {
        if self.apply(job_id, epoch, |r| r.advance(status, progress)) {
            Ok(())
        } else {
            Err(Halt::Stale)
        }
    }

    /// レコードを 1 ステップで読み書きする。
    ///
    /// ジョブが削除済み、世代が古い、または遷移が不正な場合は何もせず false。
    fn apply<F>(&self, job_id: &str, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut JobRecord) -> Result<(), AppError>,
    {
        let mut table = self.table.lock();
        let Some(entry) = table.entries.get_mut(job_id) else {
            return false;
        };
        if entry.epoch != epoch {
            return false;
        }
        match f(&mut entry.record) {
            Ok(()) => {
                entry.record.updated_at = chrono::Utc::now().to_rfc3339();
                log::debug!(
                    "Job {job_id}: {} ({:.0}%)",
                    entry.record.status.as_str(),
                    entry.record.progress * 100.0
                );
                let _ = self.events.send(JobEvent::Updated {
                    job: entry.record.clone(),
                });
                true
            }
            Err(e) => {
                log::warn!("Job {job_id}: transition rejected: {e}");
                false
            }
        }
    }

    async fn finish(&self, job_id: &str, epoch: u64) {
        if !self.apply(job_id, epoch, JobRecord::complete) {
            return;
        }
        self.metrics.inc_jobs_completed();
        log::info!("ジョブ完了: {job_id}");

        // 一覧の更新に失敗してもジョブは完了のまま
        if let Err(e) = self.chats.refresh_chats().await {
            log::warn!("Job {job_id}: chat list refresh failed: {e}");
        }
    }

    fn fail(&self, job_id: &str, epoch: u64, err: JobError) {
        let message = err.to_string();
        if self.apply(job_id, epoch, |r| r.fail(message.clone())) {
            self.metrics.inc_job_failed(err.phase());
            log::error!("Job {job_id} failed: {message}");
        }
    }
}
