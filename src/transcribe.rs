use crate::config::WhisperConfig;
use crate::types::Waveform;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tempfile::NamedTempFile;

/// 文字起こしコラボレータの共通トレイト
///
/// 完全な波形を渡してプレーンテキストを受け取る不透明な呼び出し。
/// 失敗とタイムアウトはそのランのステージ失敗として報告され、
/// 他のランには影響しない。
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// 波形全体を文字起こし
    async fn transcribe(&self, waveform: &Waveform) -> Result<String>;
}

/// OpenAI Whisper API レスポンス
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI Whisper API バックエンド
///
/// 波形を一時WAVファイルに書き出し、multipartでAPIへ送信する。
/// 一時ファイルは成功・失敗を問わず必ず削除する
/// （削除失敗はwarnログのみで、ランの結果には影響させない）。
pub struct WhisperTranscriber {
    config: WhisperConfig,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Whisper API HTTPクライアント作成失敗")?;

        Ok(Self { config, client })
    }

    /// 波形を一時WAVファイルに書き出し
    ///
    /// ファイル名は衝突しないよう排他的に生成される。
    fn write_temp_wav(&self, waveform: &Waveform) -> Result<NamedTempFile> {
        let temp_file = tempfile::Builder::new()
            .prefix("vox-metrics-")
            .suffix(".wav")
            .tempfile()
            .context("一時WAVファイル作成失敗")?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: waveform.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(temp_file.path(), spec)
            .context("WAVライター作成失敗")?;
        for &sample in &waveform.samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(value).context("WAV書き込み失敗")?;
        }
        writer.finalize().context("WAV finalize失敗")?;

        Ok(temp_file)
    }

    /// Whisper APIを呼び出して文字起こし
    async fn request_transcription(&self, wav_data: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        if let Some(ref language) = self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await
            .context("Whisper API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API エラー: {} - {}", status, error_text);
        }

        let whisper_response: WhisperResponse = response
            .json::<WhisperResponse>()
            .await
            .context("Whisper API レスポンスパース失敗")?;

        Ok(whisper_response.text)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, waveform: &Waveform) -> Result<String> {
        let temp_file = self.write_temp_wav(waveform)?;
        log::debug!(
            "Whisper API: {} サンプルを一時ファイル {:?} 経由で送信",
            waveform.len(),
            temp_file.path()
        );

        let wav_data = std::fs::read(temp_file.path()).context("一時WAVファイル読み込み失敗");

        // リクエストの成否にかかわらず一時ファイルは必ず削除する
        let result = match wav_data {
            Ok(data) => self.request_transcription(data).await,
            Err(e) => Err(e),
        };

        if let Err(e) = temp_file.close() {
            log::warn!("一時WAVファイルの削除に失敗: {}", e);
        }

        result
    }
}
