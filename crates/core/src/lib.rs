//! 動画 → 音声 → 書き起こし → ノート生成パイプラインのクライアント側コア。
//!
//! `domain` は純粋な型と状態遷移、`infra` はバックエンド/アップロード/変換アダプタ、
//! `usecase` はポーラー・ジョブオーケストレーター・チャットストアを持つ。

pub mod domain;
pub mod infra;
pub mod usecase;
