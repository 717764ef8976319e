use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{tail_lines, AudioConverter, ConversionError, ConversionErrorKind, MAX_DETAIL_CHARS};

/// ffmpeg による変換設定。
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// ffmpeg バイナリのパス
    pub binary_path: PathBuf,
    /// 変換後の音声ファイルを置くディレクトリ
    pub output_dir: PathBuf,
    /// AAC ビットレート (例: "128k")
    pub audio_bitrate: String,
    /// タイムアウト秒数
    pub timeout_secs: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("ffmpeg"),
            output_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("vn-core"),
            audio_bitrate: "128k".into(),
            timeout_secs: 300,
        }
    }
}

/// ffmpeg sidecar による動画 → AAC 音声変換。
pub struct FfmpegConverter {
    config: parking_lot::RwLock<FfmpegConfig>,
}

impl FfmpegConverter {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            config: parking_lot::RwLock::new(config),
        }
    }

    /// 設定を更新する。
    pub fn update_config(&self, config: FfmpegConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> FfmpegConfig {
        self.config.read().clone()
    }

    /// タイムスタンプ + 乱数付きの出力パス。同時/再試行の変換で衝突しない。
    fn output_path(config: &FfmpegConfig) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let id = uuid::Uuid::new_v4().simple().to_string();
        config
            .output_dir
            .join(format!("audio_{millis}_{}.m4a", &id[..8]))
    }

    /// ffmpeg 用のコマンドライン引数を構築する。
    fn build_args(config: &FfmpegConfig, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".into(),
            input.to_string_lossy().into(),
            "-vn".into(),
            "-acodec".into(),
            "aac".into(),
            "-b:a".into(),
            config.audio_bitrate.clone(),
            "-y".into(),
            output.to_string_lossy().into(),
        ]
    }

    async fn run_ffmpeg(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        // ロック保持を最小化
        let config = self.config.read().clone();

        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConversionError::new(
                ConversionErrorKind::InvalidInput,
                format!("Input video not found: {}", input.display()),
            ));
        }

        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                ConversionError::new(
                    ConversionErrorKind::Failed,
                    format!("Cannot create output directory: {e}"),
                )
            })?;

        let output_path = Self::output_path(&config);
        let args = Self::build_args(&config, input, &output_path);

        log::debug!("Running ffmpeg: {:?} {:?}", config.binary_path, args);

        let child = Command::new(&config.binary_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConversionError::new(
                    ConversionErrorKind::ToolNotAvailable,
                    format!("ffmpeg binary not found: {:?}", config.binary_path),
                ),
                std::io::ErrorKind::PermissionDenied => ConversionError::new(
                    ConversionErrorKind::ToolNotAvailable,
                    format!("Cannot execute ffmpeg binary: {e}"),
                ),
                _ => ConversionError::new(
                    ConversionErrorKind::Failed,
                    format!("Failed to spawn ffmpeg process: {e}"),
                ),
            })?;

        let output = timeout(Duration::from_secs(config.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| {
                ConversionError::new(
                    ConversionErrorKind::Timeout,
                    format!("ffmpeg timed out after {}s", config.timeout_secs),
                )
            })?
            .map_err(|e| {
                ConversionError::new(ConversionErrorKind::Failed, format!("ffmpeg process error: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("ffmpeg exited with {}: {}", output.status, stderr.trim());
            return Err(failure_from_stderr(&stderr));
        }

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(ConversionError::new(
                ConversionErrorKind::OutputMissing,
                "Audio file was not created after conversion",
            ));
        }

        log::info!("動画を音声に変換しました: {}", output_path.display());
        Ok(output_path)
    }
}

const FAILURE_PREFIX: &str = "FFmpeg failed: ";

/// stderr の末尾（実際のエラー行）を詳細にする。
fn failure_from_stderr(stderr: &str) -> ConversionError {
    let budget = MAX_DETAIL_CHARS - FAILURE_PREFIX.len();
    let tail = tail_lines(stderr, budget);
    let detail = if tail.is_empty() {
        "Unknown error".to_string()
    } else {
        tail
    };
    ConversionError::new(ConversionErrorKind::Failed, format!("{FAILURE_PREFIX}{detail}"))
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn to_audio(&self, video: &Path) -> Result<PathBuf, ConversionError> {
        self.run_ffmpeg(video).await
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> FfmpegConfig {
        FfmpegConfig {
            output_dir: std::env::temp_dir().join("vn-core-test"),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_args() {
        let config = test_config();
        let args = FfmpegConverter::build_args(
            &config,
            Path::new("/videos/clip.mp4"),
            Path::new("/cache/audio.m4a"),
        );
        assert_eq!(
            args,
            vec![
                "-i",
                "/videos/clip.mp4",
                "-vn",
                "-acodec",
                "aac",
                "-b:a",
                "128k",
                "-y",
                "/cache/audio.m4a"
            ]
        );
    }

    #[test]
    fn test_output_paths_are_unique() {
        let config = test_config();
        let a = FfmpegConverter::output_path(&config);
        let b = FfmpegConverter::output_path(&config);
        assert_ne!(a, b);
        assert!(a.starts_with(&config.output_dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("m4a"));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let converter = FfmpegConverter::new(test_config());
        let err = converter
            .to_audio(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ConversionErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let input = std::env::temp_dir().join(format!("vn-core-{}.mp4", uuid::Uuid::new_v4()));
        tokio::fs::write(&input, b"not really a video").await.unwrap();

        let converter = FfmpegConverter::new(FfmpegConfig {
            binary_path: PathBuf::from("/nonexistent/bin/ffmpeg"),
            ..test_config()
        });
        let err = converter.to_audio(&input).await.unwrap_err();
        assert_eq!(err.kind, ConversionErrorKind::ToolNotAvailable);

        let _ = tokio::fs::remove_file(&input).await;
    }

    #[test]
    fn test_failure_keeps_codec_error_not_banner() {
        let stderr = format!(
            "ffmpeg version 6.1 Copyright (c) 2000-2023\n  configuration: {}\n  libavcodec 60.31.102\n[mov,mp4,m4a @ 0x7f] moov atom not found\n/videos/clip.mp4: Invalid data found when processing input\n",
            "--enable-gpl --enable-libx264 ".repeat(20)
        );
        let err = failure_from_stderr(&stderr);

        assert_eq!(err.kind, ConversionErrorKind::Failed);
        assert!(err.detail.starts_with("FFmpeg failed: "));
        assert!(err.detail.ends_with("Invalid data found when processing input"));
        assert!(err.detail.contains("moov atom not found"));
        assert!(!err.detail.contains("configuration"));
        assert!(err.detail.chars().count() <= MAX_DETAIL_CHARS);
    }

    #[test]
    fn test_failure_with_empty_stderr() {
        assert_eq!(failure_from_stderr("\n").detail, "FFmpeg failed: Unknown error");
    }

    #[test]
    fn test_update_config() {
        let converter = FfmpegConverter::new(test_config());
        converter.update_config(FfmpegConfig {
            audio_bitrate: "96k".into(),
            ..test_config()
        });
        assert_eq!(converter.config().audio_bitrate, "96k");
        assert_eq!(converter.name(), "ffmpeg");
    }
}
