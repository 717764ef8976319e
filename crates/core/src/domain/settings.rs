use serde::{Deserialize, Serialize};

use crate::infra::convert::FfmpegConfig;

/// API ベース URL を上書きする環境変数
pub const API_URL_ENV: &str = "VN_API_URL";

/// クライアント設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// バックエンドのベース URL
    pub api_base_url: String,
    /// HTTP リクエストのタイムアウト秒数
    pub request_timeout_secs: u64,
    /// ステータスポーリング設定
    pub poll: PollSettings,
    /// 同時に処理できるジョブを 1 件に制限するか
    pub single_flight: bool,
    /// 動画 → 音声変換 (ffmpeg) 設定
    pub ffmpeg: FfmpegConfig,
}

/// ステータスポーリング設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// ポーリング間隔（ミリ秒）
    pub interval_ms: u64,
    /// 最大試行回数（interval_ms × max_attempts が待機上限）
    pub max_attempts: u32,
    /// 連続した一時エラーの上限
    pub max_consecutive_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_attempts: 120,
            max_consecutive_failures: 12,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 30,
            poll: PollSettings::default(),
            single_flight: true,
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl ClientSettings {
    /// デフォルト値に環境変数の上書きを適用する。
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                settings.api_base_url = url.trim_end_matches('/').to_string();
            }
        }
        settings
    }

    /// 保存済み JSON から読み込む（欠けたフィールドはデフォルト値）。
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
