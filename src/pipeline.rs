use crate::config::Config;
use crate::error::AnalysisError;
use crate::features;
use crate::ingest;
use crate::text;
use crate::transcribe::Transcriber;
use crate::types::MetricsRecord;
use crate::vad;
use serde::Serialize;

/// パイプラインのステージ
///
/// 1つのランはこの順で厳密に逐次遷移する:
/// `received → ingested → segmented → feature-extracted → transcribed
/// → merged → completed`。いずれかのステージの回復不能なエラーは
/// そのまま `failed` に遷移し、発生ステージとともに記録される。
/// このコアの内部ではリトライしない（リトライは呼び出し層の責務）。
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStage {
    Received,
    Ingested,
    Segmented,
    FeatureExtracted,
    Transcribed,
    Merged,
    Completed,
    Failed,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnalysisStage::Received => "received",
            AnalysisStage::Ingested => "ingested",
            AnalysisStage::Segmented => "segmented",
            AnalysisStage::FeatureExtracted => "feature-extracted",
            AnalysisStage::Transcribed => "transcribed",
            AnalysisStage::Merged => "merged",
            AnalysisStage::Completed => "completed",
            AnalysisStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// ステージ失敗の記録
///
/// どのステージで何が起きたかを保持する。
#[derive(Debug)]
pub struct PipelineFailure {
    /// エラーが発生したステージ
    pub stage: AnalysisStage,
    pub error: AnalysisError,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ステージ {} で失敗: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl PipelineFailure {
    /// 呼び出し側に返してよいメッセージ
    ///
    /// バリデーションエラーはそのまま、内部エラーは一般化した
    /// メッセージを返す（詳細はログにのみ残る）。
    pub fn public_message(&self) -> String {
        if self.error.is_validation() {
            self.error.to_string()
        } else {
            "内部エラーにより解析に失敗しました".to_string()
        }
    }
}

/// 音声解析パイプライン
///
/// 1リクエスト分の解析を逐次実行する。設定は構築時に固定され、
/// ラン間で共有する可変状態は持たない。複数のランは互いに
/// 独立しており、並行実行しても波形・セグメント・レコードを
/// 共有しない。
pub struct AnalysisPipeline {
    config: Config,
    transcriber: Box<dyn Transcriber>,
}

impl AnalysisPipeline {
    pub fn new(config: Config, transcriber: Box<dyn Transcriber>) -> Self {
        Self {
            config,
            transcriber,
        }
    }

    /// base64ペイロードを解析してMetricsRecordを生成
    ///
    /// インジェスト → VADセグメンテーション → 特徴抽出 →
    /// 文字起こし → マージ の順で実行する。特徴グループの
    /// ソフト失敗はランを止めず既定値で埋められるため、
    /// 成功時は常に構造的に完全なレコードが返る。
    pub async fn analyze_base64(
        &self,
        audio_b64: &str,
    ) -> Result<MetricsRecord, PipelineFailure> {
        log::info!(
            "ステージ {}: ペイロード {} 文字",
            AnalysisStage::Received,
            audio_b64.len()
        );

        let waveform = ingest::load_from_base64(audio_b64, &self.config.ingest)
            .map_err(|e| self.fail(AnalysisStage::Ingested, e))?;
        let duration = waveform.duration_seconds();
        log::info!(
            "ステージ {}: {:.2}秒 @ {} Hz",
            AnalysisStage::Ingested,
            duration,
            waveform.sample_rate
        );

        let segments = vad::segment_speech(&waveform, &self.config.vad)
            .map_err(|e| self.fail(AnalysisStage::Segmented, e))?;
        log::info!(
            "ステージ {}: {} セグメント",
            AnalysisStage::Segmented,
            segments.len()
        );

        let timing = vad::compute_timing_metrics(&segments, duration, &self.config.timing);
        let features = features::extract_all(&waveform, Some(&segments), &self.config.features);
        log::info!("ステージ {}", AnalysisStage::FeatureExtracted);

        let transcription = self
            .transcriber
            .transcribe(&waveform)
            .await
            .map_err(|e| {
                self.fail(
                    AnalysisStage::Transcribed,
                    AnalysisError::Transcription(e.to_string()),
                )
            })?;
        log::info!(
            "ステージ {}: {} 文字",
            AnalysisStage::Transcribed,
            transcription.len()
        );

        let stats = text::analyze_transcript(&transcription, duration);
        let record = MetricsRecord {
            transcription,
            duration,
            word_count: stats.word_count,
            speaking_pace: stats.speaking_pace,
            filler_words: stats.filler_words,
            filler_count: stats.filler_count,
            timing,
            prosody: features.prosody,
            loudness: features.loudness,
            quality: features.quality,
            spectral: features.spectral,
        };
        log::info!("ステージ {}", AnalysisStage::Merged);

        log::info!("ステージ {}", AnalysisStage::Completed);
        Ok(record)
    }

    /// ステージ失敗を記録
    fn fail(&self, stage: AnalysisStage, error: AnalysisError) -> PipelineFailure {
        if error.is_validation() {
            log::warn!("ステージ {} でバリデーションエラー: {}", stage, error);
        } else {
            log::error!("ステージ {} で内部エラー: {}", stage, error);
        }
        PipelineFailure { stage, error }
    }
}
