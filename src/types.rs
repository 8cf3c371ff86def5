use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 正規化済みモノラル波形
///
/// [-1.0, 1.0] の範囲のf32サンプル列とサンプリングレートのペア。
/// インジェスト成功後は必ず1サンプル以上を含む。
///
/// # Examples
///
/// ```
/// # use vox_metrics::types::Waveform;
/// let waveform = Waveform::new(vec![0.0f32; 16000], 16000); // 1秒分 @ 16kHz
/// assert_eq!(waveform.duration_seconds(), 1.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    /// PCM音声サンプルの配列 (-1.0 ~ 1.0)
    pub samples: Vec<f32>,

    /// サンプリングレート (Hz)
    ///
    /// 典型的な値: 8000, 16000, 44100, 48000
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// 波形の長さ（秒）
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// サンプル数
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// セグメントの種別
///
/// VADによる音声/無音の分類結果。
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// 音声区間
    Speech,
    /// 無音区間
    Silence,
}

/// 半開区間 `[start_s, end_s)` のセグメント
///
/// セグメント列は `[0, total_duration)` を隙間・重なりなしに分割する
/// （`segment[i].end_s == segment[i+1].start_s`）。
///
/// # Examples
///
/// ```
/// # use vox_metrics::types::{Segment, SegmentKind};
/// let segment = Segment {
///     start_s: 0.0,
///     end_s: 1.5,
///     kind: SegmentKind::Speech,
/// };
/// assert_eq!(segment.duration_s(), 1.5);
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Segment {
    /// 開始時刻（秒）
    pub start_s: f64,

    /// 終了時刻（秒、この時刻は含まない）
    pub end_s: f64,

    /// 音声/無音の種別
    #[serde(rename = "type")]
    pub kind: SegmentKind,
}

impl Segment {
    /// セグメントの長さ（秒）
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// ポーズ（無音区間）イベント
///
/// タイミング指標の一部として、意味のあるポーズを個別に記録する。
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PauseEvent {
    /// 開始時刻（秒）
    pub start_s: f64,

    /// 終了時刻（秒）
    pub end_s: f64,

    /// 長さ（ミリ秒）
    pub duration_ms: f64,
}

/// セグメント列から導出したタイミング指標
///
/// 「意味のあるポーズ」は閾値（デフォルト200ms）を超える無音区間、
/// 「長いポーズ」はさらに高い閾値（デフォルト700ms）を超えるもの。
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct TimingMetrics {
    /// 音声区間の合計（ミリ秒）
    pub total_speech_ms: f64,

    /// 無音区間の合計（ミリ秒）
    pub total_silence_ms: f64,

    /// 音声区間の比率（0.0 ~ 1.0、総時間0のときは0）
    pub speech_ratio: f64,

    /// 無音区間の比率（0.0 ~ 1.0）
    pub silence_ratio: f64,

    /// 意味のあるポーズの数
    pub pause_count: usize,

    /// 意味のあるポーズの平均長（ミリ秒、該当なしのときは0）
    pub mean_pause_ms: f64,

    /// 長いポーズの一覧
    pub long_pauses: Vec<PauseEvent>,

    /// 意味のあるポーズの一覧
    pub pause_events: Vec<PauseEvent>,
}

/// ピッチ時系列の1点
///
/// `f0` が `None` のフレームは無声（unvoiced）。
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PitchPoint {
    /// 時刻（秒）
    pub time: f64,

    /// 基本周波数 (Hz)。無声フレームは null
    pub f0: Option<f32>,
}

/// プロソディ（ピッチ）指標
///
/// 有声フレームのF0統計と可視化用の時系列。
/// 有声フレームが1つもない場合は全て0・空の時系列となる
/// （無音や無声の発話は正当な入力でありエラーではない）。
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ProsodyMetrics {
    pub pitch_mean: f32,
    pub pitch_std: f32,
    pub pitch_p5: f32,
    pub pitch_p50: f32,
    pub pitch_p95: f32,
    /// p95 - p5 (Hz)
    pub pitch_range_hz: f32,
    pub pitch_series: Vec<PitchPoint>,
}

/// ラウドネス時系列の1点
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RmsPoint {
    /// 時刻（秒）
    pub time: f64,

    /// フレームRMS（線形値）
    pub rms: f32,
}

/// ラウドネス・エネルギー指標
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct LoudnessMetrics {
    pub rms_mean: f32,
    pub rms_std: f32,

    /// ダイナミックレンジ (dB)
    ///
    /// クリップ内の最大フレームRMSを基準としたdB値の最大-最小
    pub dynamic_range_db: f32,
    pub rms_series: Vec<RmsPoint>,
}

/// 声質指標の算出方法
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityMethod {
    /// スペクトル統計からの近似計算
    SpectralProxy,
    /// 計算失敗時のフォールバック既定値
    Fallback,
}

/// 声質の近似指標
///
/// 臨床的なjitter/shimmer/HNRではなく、スペクトル平坦度・
/// ゼロ交差率・ロールオフから固定式で写像した近似値。
/// `is_approximation` は常にtrueで、`method` により近似計算と
/// フォールバック既定値を区別する。
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QualityMetrics {
    /// jitter近似 (0 ~ 5 %)
    pub jitter_local: f32,

    /// shimmer近似 (0 ~ 8 %)
    pub shimmer_local: f32,

    /// HNR近似 (dB、下限5)
    pub hnr_mean: f32,

    pub method: QualityMethod,
    pub is_approximation: bool,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        // 失敗時の既定値。HNRは15dB（中立的な「良好」値）とし、
        // 下流のスコアリングが誤って警告を出さないようにする
        Self {
            jitter_local: 0.0,
            shimmer_local: 0.0,
            hnr_mean: 15.0,
            method: QualityMethod::Fallback,
            is_approximation: true,
        }
    }
}

/// スペクトル形状指標
///
/// 13次のMFCC（フレーム間の平均と標準偏差）と
/// スペクトル重心・ロールオフ・帯域幅の平均。
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SpectralMetrics {
    /// MFCC係数の平均（13要素）
    pub mfcc_means: Vec<f32>,

    /// MFCC係数の標準偏差（13要素）
    pub mfcc_stds: Vec<f32>,

    pub spectral_centroid_mean: f32,
    pub rolloff_mean: f32,
    pub bandwidth_mean: f32,
}

impl Default for SpectralMetrics {
    fn default() -> Self {
        Self {
            mfcc_means: vec![0.0; 13],
            mfcc_stds: vec![0.0; 13],
            spectral_centroid_mean: 0.0,
            rolloff_mean: 0.0,
            bandwidth_mean: 0.0,
        }
    }
}

/// パイプライン全体の出力レコード
///
/// 文字起こし・語数統計・タイミング指標・4つの特徴グループを
/// 1つに統合した不変のレコード。下流のナラティブ生成・
/// スコアリングに渡される唯一の成果物。
///
/// # JSON出力例
///
/// ```json
/// {
///   "transcription": "こんにちは、今日は…",
///   "duration": 12.5,
///   "word_count": 42,
///   "speaking_pace": 201,
///   "filler_words": {"um": 2},
///   "filler_count": 2,
///   "timing": {},
///   "prosody": {},
///   "loudness": {},
///   "quality": {},
///   "spectral": {}
/// }
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct MetricsRecord {
    /// 文字起こしテキスト
    pub transcription: String,

    /// 波形の長さ（秒）
    pub duration: f64,

    /// 語数
    pub word_count: usize,

    /// 話速 (words per minute、長さ0のときは0)
    pub speaking_pace: u32,

    /// フィラーワードの出現回数（検出されたもののみ）
    pub filler_words: BTreeMap<String, u32>,

    /// フィラーワードの合計数
    pub filler_count: u32,

    pub timing: TimingMetrics,
    pub prosody: ProsodyMetrics,
    pub loudness: LoudnessMetrics,
    pub quality: QualityMetrics,
    pub spectral: SpectralMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_duration() {
        let waveform = Waveform::new(vec![0.0; 32000], 16000);
        assert_eq!(waveform.duration_seconds(), 2.0);
        assert_eq!(waveform.len(), 32000);
        assert!(!waveform.is_empty());
    }

    #[test]
    fn test_waveform_zero_rate() {
        let waveform = Waveform::new(vec![0.0; 100], 0);
        assert_eq!(waveform.duration_seconds(), 0.0);
    }

    #[test]
    fn test_segment_duration() {
        let segment = Segment {
            start_s: 1.0,
            end_s: 3.5,
            kind: SegmentKind::Silence,
        };
        assert_eq!(segment.duration_s(), 2.5);
    }

    #[test]
    fn test_segment_kind_serialization() {
        let json = serde_json::to_string(&SegmentKind::Speech).unwrap();
        assert_eq!(json, r#""speech""#);
        let json = serde_json::to_string(&SegmentKind::Silence).unwrap();
        assert_eq!(json, r#""silence""#);
    }

    #[test]
    fn test_segment_serializes_kind_as_type() {
        let segment = Segment {
            start_s: 0.0,
            end_s: 1.0,
            kind: SegmentKind::Speech,
        };
        let json = serde_json::to_string(&segment).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "speech");
    }

    #[test]
    fn test_quality_default_is_fallback() {
        let quality = QualityMetrics::default();
        assert_eq!(quality.hnr_mean, 15.0);
        assert_eq!(quality.method, QualityMethod::Fallback);
        assert!(quality.is_approximation);
    }

    #[test]
    fn test_quality_method_serialization() {
        let json = serde_json::to_string(&QualityMethod::SpectralProxy).unwrap();
        assert_eq!(json, r#""spectral_proxy""#);
    }

    #[test]
    fn test_spectral_default_dimensions() {
        let spectral = SpectralMetrics::default();
        assert_eq!(spectral.mfcc_means.len(), 13);
        assert_eq!(spectral.mfcc_stds.len(), 13);
        assert!(spectral.mfcc_means.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_metrics_record_json_keys() {
        let record = MetricsRecord {
            transcription: "test".to_string(),
            duration: 2.0,
            word_count: 1,
            speaking_pace: 30,
            filler_words: BTreeMap::new(),
            filler_count: 0,
            timing: TimingMetrics::default(),
            prosody: ProsodyMetrics::default(),
            loudness: LoudnessMetrics::default(),
            quality: QualityMetrics::default(),
            spectral: SpectralMetrics::default(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        for key in [
            "transcription",
            "duration",
            "word_count",
            "speaking_pace",
            "filler_words",
            "timing",
            "prosody",
            "loudness",
            "quality",
            "spectral",
        ] {
            assert!(parsed.get(key).is_some(), "missing key: {}", key);
        }
    }
}
