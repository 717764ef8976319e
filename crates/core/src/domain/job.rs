use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::server_status::ServerStatus;
use super::types::MediaSource;

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Uploading,
    Processing,
    Transcribing,
    GeneratingNotes,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Transcribing => "transcribing",
            Self::GeneratingNotes => "generating_notes",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 成功経路上の順序。Failed は経路外。
    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Uploading => 1,
            Self::Processing => 2,
            Self::Transcribing => 3,
            Self::GeneratingNotes => 4,
            Self::Completed => 5,
            Self::Failed => u8::MAX,
        }
    }
}

/// ジョブレコード（job_id はバックエンドのチャット ID と同一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    /// 0.0–1.0。非終端状態の間は減少しない。
    pub progress: f32,
    /// status == Failed のときのみ Some
    pub error: Option<String>,
    /// リトライ用に保持する入力メディア
    pub source: Option<MediaSource>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRecord {
    /// バックエンドのチャット作成直後のレコード（uploading / 0.1）
    pub fn new(job_id: String, source: Option<MediaSource>, now: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Uploading,
            progress: 0.1,
            error: None,
            source,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// 成功経路上で前進する。後退は無視し、進捗は単調に保つ。
    pub fn advance(&mut self, status: JobStatus, progress: f32) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のジョブ {} は {} に遷移できません",
                self.status.as_str(),
                self.job_id,
                status.as_str()
            )));
        }
        if status.is_terminal() {
            return Err(AppError::internal(format!(
                "終端状態 {} へは advance ではなく complete/fail を使用してください",
                status.as_str()
            )));
        }
        if status.rank() > self.status.rank() {
            self.status = status;
        }
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        Ok(())
    }

    /// ポーリングで観測したサーバー状態を反映する。
    pub fn observe(&mut self, status: ServerStatus) -> Result<(), AppError> {
        self.advance(status.job_status(), status.progress())
    }

    /// 完了: 非終端 → Completed
    pub fn complete(&mut self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のジョブ {} は完了にできません",
                self.status.as_str(),
                self.job_id
            )));
        }
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.error = None;
        Ok(())
    }

    /// 失敗: 非終端 → Failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::invalid_state(format!(
                "{} 状態のジョブ {} は失敗にできません",
                self.status.as_str(),
                self.job_id
            )));
        }
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        Ok(())
    }

    /// リトライ: Failed → Queued（進捗とエラーをリセット）
    pub fn reset_for_retry(&mut self) -> Result<(), AppError> {
        if self.status != JobStatus::Failed {
            return Err(AppError::invalid_state(format!(
                "リトライできるのは failed のジョブのみです (現在: {})",
                self.status.as_str()
            )));
        }
        self.status = JobStatus::Queued;
        self.progress = 0.0;
        self.error = None;
        Ok(())
    }
}
