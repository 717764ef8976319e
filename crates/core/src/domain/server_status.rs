use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// サーバーが返す処理状態。文字列の語彙はここでのみ解釈する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Queued,
    Processing,
    Transcribing,
    GeneratingNotes,
    Completed,
    Failed,
}

/// 語彙外のステータス文字列
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized server status: {0:?}")]
pub struct UnknownStatus(pub String);

impl ServerStatus {
    /// 大文字小文字・区切り文字の揺れを吸収してパースする。
    ///
    /// `done` は `Completed`、`error` は `Failed` の別名。
    pub fn parse(raw: &str) -> Result<Self, UnknownStatus> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "transcribing" => Ok(Self::Transcribing),
            "generating_notes" => Ok(Self::GeneratingNotes),
            "completed" | "done" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }

    /// チャットレコードの `status` フィールドを解釈する。未設定は処理中とみなす。
    pub fn from_chat(status: Option<&str>) -> Result<Self, UnknownStatus> {
        match status {
            None => Ok(Self::Processing),
            Some(raw) => Self::parse(raw),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 進捗スケール上の値
    pub fn progress(&self) -> f32 {
        match self {
            Self::Queued | Self::Processing => 0.5,
            Self::Transcribing => 0.6,
            Self::GeneratingNotes => 0.8,
            Self::Completed => 1.0,
            Self::Failed => 0.0,
        }
    }

    /// 対応するジョブ状態
    pub fn job_status(&self) -> JobStatus {
        match self {
            Self::Queued | Self::Processing => JobStatus::Processing,
            Self::Transcribing => JobStatus::Transcribing,
            Self::GeneratingNotes => JobStatus::GeneratingNotes,
            Self::Completed => JobStatus::Completed,
            Self::Failed => JobStatus::Failed,
        }
    }
}
