pub mod ffmpeg;

pub use ffmpeg::{FfmpegConfig, FfmpegConverter};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// UI/ログに出すエラー詳細の最大文字数
pub const MAX_DETAIL_CHARS: usize = 200;

/// 変換エラー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionErrorKind {
    /// 変換ツールが見つからない/実行できない
    ToolNotAvailable,
    /// 入力ファイルが存在しない
    InvalidInput,
    /// 変換処理の失敗 (コーデック/コンテナ/ディスク容量等)
    Failed,
    /// タイムアウト
    Timeout,
    /// 正常終了したが出力ファイルが無い
    OutputMissing,
}

/// 動画 → 音声変換のエラー。detail は MAX_DETAIL_CHARS で切り詰め済み。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub kind: ConversionErrorKind,
    pub detail: String,
}

impl ConversionError {
    pub fn new(kind: ConversionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: truncate_chars(&detail.into(), MAX_DETAIL_CHARS),
        }
    }
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

impl std::error::Error for ConversionError {}

/// 文字境界を保って先頭 max 文字に切り詰める。
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// 末尾の空でない行を max 文字に収まる範囲で残す。
///
/// ツールの診断は最後の数行にあり、先頭はバナーであることが多い。
/// 最後の 1 行だけで max を超える場合はその行の末尾 max 文字。
pub fn tail_lines(s: &str, max: usize) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0;
    for line in s.lines().rev().map(str::trim).filter(|l| !l.is_empty()) {
        let len = line.chars().count();
        let sep = usize::from(!kept.is_empty());
        if used + sep + len > max {
            if kept.is_empty() {
                let skip = len - max;
                return line.chars().skip(skip).collect();
            }
            break;
        }
        used += sep + len;
        kept.push(line);
    }
    kept.reverse();
    kept.join("\n")
}

/// 動画 → 音声変換 trait。呼び出しごとに新しい出力パスを返す。
#[async_trait]
pub trait AudioConverter: Send + Sync {
    async fn to_audio(&self, video: &Path) -> Result<PathBuf, ConversionError>;

    fn name(&self) -> &str;
}
