use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    pub whisper: Option<WhisperConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// インジェスト（取り込み・正規化）設定
///
/// # デフォルト値
///
/// - `max_size_mb`: 25 MB (base64デコード後の推定サイズ上限)
/// - `min_duration_seconds`: 1 秒
/// - `max_duration_seconds`: 300 秒 (5分)
/// - `target_sample_rate`: 16000 Hz
/// - `target_rms`: 0.3
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    #[serde(default = "default_min_duration_seconds")]
    pub min_duration_seconds: u32,
    #[serde(default = "default_max_duration_seconds")]
    pub max_duration_seconds: u32,
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "default_target_rms")]
    pub target_rms: f32,
}

/// VAD (Voice Activity Detection) 設定
///
/// # デフォルト値
///
/// - `frame_duration_ms`: 30 ms (WebRTC VADは10/20/30msのみ対応)
/// - `aggressiveness`: 2 (0-3、大きいほど誤検出が少ない)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VadConfig {
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness: u8,
}

/// ポーズ判定の閾値設定
///
/// # デフォルト値
///
/// - `meaningful_pause_ms`: 200 ms (これを超える無音をポーズとして数える)
/// - `long_pause_ms`: 700 ms (「長いポーズ」の閾値)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_meaningful_pause_ms")]
    pub meaningful_pause_ms: f64,
    #[serde(default = "default_long_pause_ms")]
    pub long_pause_ms: f64,
}

/// 特徴抽出設定
///
/// フレーム長・ホップ長は全サブ抽出器で共有する。
/// ピッチ探索範囲はC2 (~65Hz) からC7 (~2093Hz)。
///
/// # デフォルト値
///
/// - `frame_length`: 2048 サンプル
/// - `hop_length`: 512 サンプル
/// - `pitch_fmin_hz`: 65.4 Hz
/// - `pitch_fmax_hz`: 2093.0 Hz
/// - `min_speech_seconds`: 1.0 秒 (これ以上の音声があればspeech-onlyで解析)
/// - `series_downsample`: 10 (時系列は10フレームに1点)
/// - `series_max_points`: 200 (時系列の上限点数)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_pitch_fmin_hz")]
    pub pitch_fmin_hz: f32,
    #[serde(default = "default_pitch_fmax_hz")]
    pub pitch_fmax_hz: f32,
    #[serde(default = "default_min_speech_seconds")]
    pub min_speech_seconds: f64,
    #[serde(default = "default_series_downsample")]
    pub series_downsample: usize,
    #[serde(default = "default_series_max_points")]
    pub series_max_points: usize,
}

/// OpenAI Whisper API 設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// OpenAI API Key
    pub api_key: String,
    /// Whisper モデル名（通常 "whisper-1"）
    #[serde(default = "default_whisper_model")]
    pub model: String,
    /// 言語コード（"ja", "en" など）。省略可能
    pub language: Option<String>,
    /// API呼び出しのタイムアウト（秒）
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// 出力・ログ設定
///
/// # デフォルト値
///
/// - `log_level`: "info"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default functions
fn default_max_size_mb() -> u32 {
    25
}

fn default_min_duration_seconds() -> u32 {
    1
}

fn default_max_duration_seconds() -> u32 {
    300 // 5分
}

fn default_target_sample_rate() -> u32 {
    16000 // 16kHz - VADとWhisperの両方が対応
}

fn default_target_rms() -> f32 {
    0.3
}

fn default_frame_duration_ms() -> u32 {
    30
}

fn default_aggressiveness() -> u8 {
    2
}

fn default_meaningful_pause_ms() -> f64 {
    200.0
}

fn default_long_pause_ms() -> f64 {
    700.0
}

fn default_frame_length() -> usize {
    2048
}

fn default_hop_length() -> usize {
    512
}

fn default_pitch_fmin_hz() -> f32 {
    65.4 // C2
}

fn default_pitch_fmax_hz() -> f32 {
    2093.0 // C7
}

fn default_min_speech_seconds() -> f64 {
    1.0
}

fn default_series_downsample() -> usize {
    10
}

fn default_series_max_points() -> usize {
    200
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            min_duration_seconds: default_min_duration_seconds(),
            max_duration_seconds: default_max_duration_seconds(),
            target_sample_rate: default_target_sample_rate(),
            target_rms: default_target_rms(),
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: default_frame_duration_ms(),
            aggressiveness: default_aggressiveness(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            meaningful_pause_ms: default_meaningful_pause_ms(),
            long_pause_ms: default_long_pause_ms(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
            pitch_fmin_hz: default_pitch_fmin_hz(),
            pitch_fmax_hz: default_pitch_fmax_hz(),
            min_speech_seconds: default_min_speech_seconds(),
            series_downsample: default_series_downsample(),
            series_max_points: default_series_max_points(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Arguments
    ///
    /// * `path` - 設定ファイルのパス
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use vox_metrics::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// デフォルト値を持つ設定ファイルを生成する。
    /// 既存のファイルは上書きされる。
    ///
    /// # Errors
    ///
    /// ファイルの書き込みに失敗した場合にエラーを返す。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.max_size_mb, 25);
        assert_eq!(config.ingest.min_duration_seconds, 1);
        assert_eq!(config.ingest.max_duration_seconds, 300);
        assert_eq!(config.ingest.target_sample_rate, 16000);
        assert_eq!(config.ingest.target_rms, 0.3);
        assert_eq!(config.vad.frame_duration_ms, 30);
        assert_eq!(config.vad.aggressiveness, 2);
        assert_eq!(config.timing.meaningful_pause_ms, 200.0);
        assert_eq!(config.timing.long_pause_ms, 700.0);
        assert_eq!(config.features.frame_length, 2048);
        assert_eq!(config.features.hop_length, 512);
        assert_eq!(config.features.series_max_points, 200);
        assert!(config.whisper.is_none());
    }

    #[test]
    fn test_write_and_read_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        // デフォルト設定を書き込み
        Config::write_default(path).unwrap();

        // 読み込み
        let config = Config::from_file(path).unwrap();
        assert_eq!(config.ingest.target_sample_rate, 16000);
        assert_eq!(config.timing.long_pause_ms, 700.0);
    }

    #[test]
    fn test_custom_config() {
        let toml_content = r#"
[ingest]
max_size_mb = 10
min_duration_seconds = 2
max_duration_seconds = 120
target_sample_rate = 16000
target_rms = 0.25

[vad]
frame_duration_ms = 20
aggressiveness = 3

[timing]
meaningful_pause_ms = 250.0
long_pause_ms = 800.0

[whisper]
api_key = "sk-test"
model = "whisper-1"
language = "en"
timeout_seconds = 15

[output]
log_level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.ingest.max_size_mb, 10);
        assert_eq!(config.ingest.min_duration_seconds, 2);
        assert_eq!(config.ingest.target_rms, 0.25);
        assert_eq!(config.vad.frame_duration_ms, 20);
        assert_eq!(config.vad.aggressiveness, 3);
        assert_eq!(config.timing.meaningful_pause_ms, 250.0);
        assert_eq!(config.timing.long_pause_ms, 800.0);
        let whisper = config.whisper.unwrap();
        assert_eq!(whisper.api_key, "sk-test");
        assert_eq!(whisper.language.as_deref(), Some("en"));
        assert_eq!(whisper.timeout_seconds, 15);
        assert_eq!(config.output.log_level, "debug");
    }

    #[test]
    fn test_load_or_default_nonexistent() {
        let config = Config::load_or_default("nonexistent_file.toml").unwrap();
        // デフォルト設定が返されることを確認
        assert_eq!(config.ingest.target_sample_rate, 16000);
    }

    #[test]
    fn test_partial_config() {
        // 一部の設定のみ記述した場合、残りはデフォルト値が使われる
        let toml_content = r#"
[ingest]
max_size_mb = 50

[features]
series_max_points = 100
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        // 指定した値
        assert_eq!(config.ingest.max_size_mb, 50);
        assert_eq!(config.features.series_max_points, 100);

        // デフォルト値
        assert_eq!(config.ingest.target_sample_rate, 16000);
        assert_eq!(config.vad.aggressiveness, 2);
        assert_eq!(config.features.frame_length, 2048);
    }
}
