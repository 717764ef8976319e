use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_CREATION")]
    Creation,
    #[serde(rename = "E_BUSY")]
    Busy,
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_UPLOAD")]
    Upload,
    #[serde(rename = "E_NOTIFY")]
    Notify,
    #[serde(rename = "E_SERVER_FAILED")]
    ServerFailed,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

/// アプリケーションエラー（UI へのペイロード兼用）
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

// ─── ジョブのフェーズ別エラー ─────────────────────────────────────

/// バックエンドへの処理開始通知 (process-audio) の失敗分類。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyFailure {
    #[error("Authentication failed.")]
    Unauthorized,
    #[error("Chat not found.")]
    ChatNotFound,
    #[error("Server timeout.")]
    Timeout,
    #[error("Network error.")]
    Network,
    #[error("Processing start failed: {0}")]
    Other(String),
}

impl NotifyFailure {
    /// トランスポートのステータスコードとメッセージから分類する。
    ///
    /// 判定順: 401 → 404 → 408/"timeout" → 0/"network" → その他。
    pub fn classify(status_code: u16, message: &str) -> Self {
        let lower = message.to_lowercase();
        match status_code {
            401 => Self::Unauthorized,
            404 => Self::ChatNotFound,
            408 => Self::Timeout,
            _ if lower.contains("timeout") => Self::Timeout,
            0 => Self::Network,
            _ if lower.contains("network") => Self::Network,
            _ => Self::Other(message.to_string()),
        }
    }
}

/// ポーリングの終端失敗。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollFailure {
    /// サーバーが failed/error を返した
    #[error("Processing failed on the server.")]
    ServerFailed,
    /// 試行回数上限、または連続した一時エラーの上限に到達
    #[error("Timeout waiting for server.")]
    Timeout,
}

/// ジョブ操作・パイプラインのエラー。
///
/// フェーズ由来のバリアントの `Display` はそのまま UI に表示される文言。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Could not create chat: {0}")]
    Creation(String),
    #[error("A job is already in progress ({active} active)")]
    Busy { active: usize },
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("Video upload failed: {0}")]
    Upload(String),
    #[error(transparent)]
    Notify(#[from] NotifyFailure),
    #[error(transparent)]
    Poll(#[from] PollFailure),
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Creation(_) => ErrorCode::Creation,
            Self::Busy { .. } => ErrorCode::Busy,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Upload(_) => ErrorCode::Upload,
            Self::Notify(NotifyFailure::Timeout) | Self::Poll(PollFailure::Timeout) => {
                ErrorCode::Timeout
            }
            Self::Notify(_) => ErrorCode::Notify,
            Self::Poll(PollFailure::ServerFailed) => ErrorCode::ServerFailed,
        }
    }

    /// メトリクス用のフェーズ名
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Creation(_) => "create",
            Self::Upload(_) => "upload",
            Self::Notify(_) => "notify",
            Self::Poll(_) => "poll",
            Self::Busy { .. } | Self::NotFound(_) | Self::InvalidState(_) => "request",
        }
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        let recoverable = !matches!(err, JobError::NotFound(_));
        Self {
            code: err.code(),
            message: err.to_string(),
            recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_classification() {
        assert_eq!(NotifyFailure::classify(401, "Unauthorized"), NotifyFailure::Unauthorized);
        assert_eq!(NotifyFailure::classify(404, "nope"), NotifyFailure::ChatNotFound);
        assert_eq!(NotifyFailure::classify(408, "Request timeout"), NotifyFailure::Timeout);
        assert_eq!(NotifyFailure::classify(500, "upstream timeout"), NotifyFailure::Timeout);
        assert_eq!(NotifyFailure::classify(0, "socket closed"), NotifyFailure::Network);
        assert_eq!(NotifyFailure::classify(502, "Network unreachable"), NotifyFailure::Network);
        assert_eq!(
            NotifyFailure::classify(500, "boom"),
            NotifyFailure::Other("boom".to_string())
        );
    }

    #[test]
    fn test_notify_messages() {
        assert_eq!(
            JobError::from(NotifyFailure::Unauthorized).to_string(),
            "Authentication failed."
        );
        assert_eq!(
            JobError::from(NotifyFailure::Other("boom".into())).to_string(),
            "Processing start failed: boom"
        );
    }

    #[test]
    fn test_phase_messages() {
        assert_eq!(
            JobError::Upload("network down".into()).to_string(),
            "Video upload failed: network down"
        );
        assert_eq!(
            JobError::Creation("500".into()).to_string(),
            "Could not create chat: 500"
        );
        assert!(JobError::from(PollFailure::Timeout)
            .to_string()
            .to_lowercase()
            .contains("timeout"));
    }

    #[test]
    fn test_job_error_into_app_error() {
        let app: AppError = JobError::from(PollFailure::Timeout).into();
        assert_eq!(app.code, ErrorCode::Timeout);
        assert!(app.recoverable);

        let app: AppError = JobError::NotFound("x".into()).into();
        assert_eq!(app.code, ErrorCode::NotFound);
        assert!(!app.recoverable);
    }
}
