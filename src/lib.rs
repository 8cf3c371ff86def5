//! vox-metrics - 音声収録の音響解析パイプライン
//!
//! このクレートは、短い音声収録から話し方の音響・タイミング指標を
//! 抽出するパイプラインを提供します。ピッチの振る舞い、ラウドネスの
//! ダイナミクス、声質の近似指標、スペクトル形状、ポーズ構造を計測し、
//! 下流のナラティブ生成・スコアリングに渡す1つのレコードに統合します。
//!
//! # 主な機能
//!
//! - **インジェスト**: base64ペイロードのサイズ検証、マジックバイトによる
//!   フォーマット推定、デコード、16kHzモノラルへの変換、RMS正規化
//! - **VAD (Voice Activity Detection)**: 音声/無音セグメンテーションと
//!   ポーズ・タイミング統計
//! - **特徴抽出**: プロソディ（ピッチ）、ラウドネス、声質近似、
//!   スペクトル形状の4グループを独立に計算
//! - **Whisper API連携**: 文字起こしと語数・フィラーワード統計
//!
//! # アーキテクチャ
//!
//! ```text
//! [base64 payload] → [ingest] → [vad] ──→ [timing metrics]
//!                        │        │
//!                        │        └──→ [speech-only waveform]
//!                        ↓                    ↓
//!                   [transcribe]        [features ×4]
//!                        │                    │
//!                        └────→ [pipeline] ←──┘
//!                                   ↓
//!                            [MetricsRecord]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use vox_metrics::config::Config;
//! use vox_metrics::pipeline::AnalysisPipeline;
//! use vox_metrics::transcribe::WhisperTranscriber;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load_or_default("config.toml")?;
//! let whisper = WhisperTranscriber::new(config.whisper.clone().unwrap())?;
//! let pipeline = AnalysisPipeline::new(config, Box::new(whisper));
//!
//! let record = pipeline.analyze_base64("...").await?;
//! println!("{}", serde_json::to_string_pretty(&record)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dsp;
pub mod error;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod prosody;
pub mod text;
pub mod transcribe;
pub mod types;
pub mod vad;
