use crate::config::FeatureConfig;
use crate::dsp::{self, SpectrumAnalyzer};
use crate::prosody::PitchTracker;
use crate::types::{
    LoudnessMetrics, PitchPoint, ProsodyMetrics, QualityMetrics, QualityMethod, RmsPoint, Segment,
    SpectralMetrics, Waveform,
};
use crate::vad;

/// dB変換時の振幅下限（librosaのamplitude_to_dbと同じ流儀）
const DB_AMIN: f32 = 1e-5;

/// ダイナミックレンジの上限 (dB)
const DB_TOP: f32 = 80.0;

/// MFCC係数の数
const NUM_MFCC: usize = 13;

/// メルフィルタバンクのチャンネル数
const NUM_MELS: usize = 26;

/// スペクトルロールオフの累積割合
const ROLLOFF_PERCENT: f32 = 0.85;

/// jitter近似の上限 (%)
const JITTER_CEIL: f32 = 5.0;

/// shimmer近似の上限 (%)
const SHIMMER_CEIL: f32 = 8.0;

/// HNR近似の下限 (dB)
const HNR_FLOOR: f32 = 5.0;

/// 4つの特徴グループをまとめた結果
///
/// 各グループは独立に計算され、1つの失敗が他を妨げることはない。
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    pub prosody: ProsodyMetrics,
    pub loudness: LoudnessMetrics,
    pub quality: QualityMetrics,
    pub spectral: SpectralMetrics,
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

fn round4(value: f32) -> f32 {
    (value * 10000.0).round() / 10000.0
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn std_dev(values: &[f32], mean_value: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v - mean_value) * (v - mean_value))
        .sum::<f32>()
        / values.len() as f32;
    variance.sqrt()
}

/// 線形補間によるパーセンタイル
fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let fraction = rank - lower as f32;
    if lower + 1 >= sorted.len() {
        return sorted[sorted.len() - 1];
    }
    sorted[lower] + fraction * (sorted[lower + 1] - sorted[lower])
}

/// プロソディ（ピッチ）特徴を抽出
///
/// 失敗時は全て0の既定レコードを返し、パイプラインは止めない。
pub fn extract_prosody(waveform: &Waveform, config: &FeatureConfig) -> ProsodyMetrics {
    match try_extract_prosody(waveform, config) {
        Ok(metrics) => metrics,
        Err(reason) => {
            log::error!("プロソディ抽出失敗: {}", reason);
            ProsodyMetrics::default()
        }
    }
}

fn try_extract_prosody(
    waveform: &Waveform,
    config: &FeatureConfig,
) -> Result<ProsodyMetrics, String> {
    if config.frame_length == 0 || config.hop_length == 0 {
        return Err("フレーム設定が不正".to_string());
    }

    let tracker = PitchTracker::new(waveform.sample_rate, config);
    let track = tracker.track(&waveform.samples);

    let mut voiced: Vec<f32> = track.iter().filter_map(|&f| f).collect();
    if voiced.is_empty() {
        // 有声フレームなしは正当な結果（無音・無声発話）であり失敗ではない
        log::warn!("有声フレームが検出されませんでした");
        return Ok(ProsodyMetrics::default());
    }

    let pitch_mean = mean(&voiced);
    let pitch_std = std_dev(&voiced, pitch_mean);
    voiced.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pitch_p5 = percentile(&voiced, 5.0);
    let pitch_p50 = percentile(&voiced, 50.0);
    let pitch_p95 = percentile(&voiced, 95.0);

    // 可視化用の時系列は間引いた上で点数上限を適用
    let pitch_series: Vec<PitchPoint> = track
        .iter()
        .enumerate()
        .step_by(config.series_downsample.max(1))
        .take(config.series_max_points)
        .map(|(i, &f0)| PitchPoint {
            time: tracker.frame_time(i),
            f0,
        })
        .collect();

    Ok(ProsodyMetrics {
        pitch_mean: round2(pitch_mean),
        pitch_std: round2(pitch_std),
        pitch_p5: round2(pitch_p5),
        pitch_p50: round2(pitch_p50),
        pitch_p95: round2(pitch_p95),
        pitch_range_hz: round2(pitch_p95 - pitch_p5),
        pitch_series,
    })
}

/// ラウドネス・エネルギー特徴を抽出
pub fn extract_loudness(waveform: &Waveform, config: &FeatureConfig) -> LoudnessMetrics {
    match try_extract_loudness(waveform, config) {
        Ok(metrics) => metrics,
        Err(reason) => {
            log::error!("ラウドネス抽出失敗: {}", reason);
            LoudnessMetrics::default()
        }
    }
}

fn try_extract_loudness(
    waveform: &Waveform,
    config: &FeatureConfig,
) -> Result<LoudnessMetrics, String> {
    if config.frame_length == 0 || config.hop_length == 0 {
        return Err("フレーム設定が不正".to_string());
    }

    let rms_frames: Vec<f32> =
        dsp::frames(&waveform.samples, config.frame_length, config.hop_length)
            .map(dsp::frame_rms)
            .collect();

    if rms_frames.is_empty() {
        log::warn!("RMSフレームが1つも取れませんでした");
        return Ok(LoudnessMetrics::default());
    }

    // クリップ内の最大フレームRMSを基準にdBへ変換
    let reference = rms_frames.iter().cloned().fold(0.0f32, f32::max);
    let db_frames: Vec<f32> = rms_frames
        .iter()
        .map(|&rms| {
            let db = 20.0 * (rms.max(DB_AMIN)).log10() - 20.0 * (reference.max(DB_AMIN)).log10();
            db.max(-DB_TOP)
        })
        .collect();

    let max_db = db_frames.iter().cloned().fold(f32::MIN, f32::max);
    let min_db = db_frames.iter().cloned().fold(f32::MAX, f32::min);

    let rms_mean = mean(&rms_frames);
    let rms_std = std_dev(&rms_frames, rms_mean);

    let hop_seconds = config.hop_length as f64 / waveform.sample_rate as f64;
    let rms_series: Vec<RmsPoint> = rms_frames
        .iter()
        .enumerate()
        .step_by(config.series_downsample.max(1))
        .take(config.series_max_points)
        .map(|(i, &rms)| RmsPoint {
            time: i as f64 * hop_seconds,
            rms,
        })
        .collect();

    Ok(LoudnessMetrics {
        rms_mean: round4(rms_mean),
        rms_std: round4(rms_std),
        dynamic_range_db: round2(max_db - min_db),
        rms_series,
    })
}

/// 声質の近似特徴を抽出
///
/// スペクトル平坦度・ゼロ交差率・ロールオフの3つの統計を
/// 固定式でjitter/shimmer/HNR相当の値に写像する。
/// 臨床測定ではないため常に `is_approximation: true` で返す。
/// 失敗時は中立的な既定値（HNR 15dB）にフォールバックする。
pub fn extract_quality(waveform: &Waveform, config: &FeatureConfig) -> QualityMetrics {
    match try_extract_quality(waveform, config) {
        Ok(metrics) => metrics,
        Err(reason) => {
            log::error!("声質抽出失敗: {}", reason);
            QualityMetrics::default()
        }
    }
}

fn try_extract_quality(
    waveform: &Waveform,
    config: &FeatureConfig,
) -> Result<QualityMetrics, String> {
    if config.frame_length == 0 || config.hop_length == 0 {
        return Err("フレーム設定が不正".to_string());
    }

    let analyzer = SpectrumAnalyzer::new(
        waveform.sample_rate,
        config.frame_length,
        config.hop_length,
    );
    let magnitude_frames = analyzer.magnitude_frames(&waveform.samples);
    if magnitude_frames.is_empty() {
        return Err("スペクトルフレームが1つも取れませんでした".to_string());
    }
    let frequencies = analyzer.bin_frequencies();

    let flatness_values: Vec<f32> = magnitude_frames
        .iter()
        .map(|m| dsp::spectral_flatness(m))
        .collect();
    let rolloff_values: Vec<f32> = magnitude_frames
        .iter()
        .map(|m| dsp::spectral_rolloff(m, &frequencies, ROLLOFF_PERCENT))
        .collect();
    let zcr_values: Vec<f32> =
        dsp::frames(&waveform.samples, config.frame_length, config.hop_length)
            .map(dsp::zero_crossing_rate)
            .collect();

    let flatness_mean = mean(&flatness_values);
    let zcr_mean = mean(&zcr_values);
    let rolloff_mean = mean(&rolloff_values);
    log::debug!(
        "声質プロキシ統計: flatness={:.4} zcr={:.4} rolloff={:.1}",
        flatness_mean,
        zcr_mean,
        rolloff_mean
    );

    // 近似式。実測との対応は名目的なレンジ合わせのみ
    let jitter_proxy = (zcr_mean * 10.0).min(JITTER_CEIL);
    let shimmer_proxy = (flatness_mean * 20.0).min(SHIMMER_CEIL);
    let hnr_proxy = (15.0 - flatness_mean * 30.0).max(HNR_FLOOR);

    Ok(QualityMetrics {
        jitter_local: round2(jitter_proxy),
        shimmer_local: round2(shimmer_proxy),
        hnr_mean: round2(hnr_proxy),
        method: QualityMethod::SpectralProxy,
        is_approximation: true,
    })
}

/// スペクトル形状特徴を抽出
pub fn extract_spectral(waveform: &Waveform, config: &FeatureConfig) -> SpectralMetrics {
    match try_extract_spectral(waveform, config) {
        Ok(metrics) => metrics,
        Err(reason) => {
            log::error!("スペクトル抽出失敗: {}", reason);
            SpectralMetrics::default()
        }
    }
}

fn try_extract_spectral(
    waveform: &Waveform,
    config: &FeatureConfig,
) -> Result<SpectralMetrics, String> {
    if config.frame_length == 0 || config.hop_length == 0 {
        return Err("フレーム設定が不正".to_string());
    }

    let analyzer = SpectrumAnalyzer::new(
        waveform.sample_rate,
        config.frame_length,
        config.hop_length,
    );
    let magnitude_frames = analyzer.magnitude_frames(&waveform.samples);
    if magnitude_frames.is_empty() {
        return Err("スペクトルフレームが1つも取れませんでした".to_string());
    }
    let frequencies = analyzer.bin_frequencies();

    let mfccs = dsp::mfcc_frames(
        &magnitude_frames,
        waveform.sample_rate,
        config.frame_length,
        NUM_MFCC,
        NUM_MELS,
    );

    let mut mfcc_means = vec![0.0f32; NUM_MFCC];
    let mut mfcc_stds = vec![0.0f32; NUM_MFCC];
    for coefficient in 0..NUM_MFCC {
        let values: Vec<f32> = mfccs.iter().map(|frame| frame[coefficient]).collect();
        let m = mean(&values);
        mfcc_means[coefficient] = round3(m);
        mfcc_stds[coefficient] = round3(std_dev(&values, m));
    }

    let centroid_values: Vec<f32> = magnitude_frames
        .iter()
        .map(|m| dsp::spectral_centroid(m, &frequencies))
        .collect();
    let rolloff_values: Vec<f32> = magnitude_frames
        .iter()
        .map(|m| dsp::spectral_rolloff(m, &frequencies, ROLLOFF_PERCENT))
        .collect();
    let bandwidth_values: Vec<f32> = magnitude_frames
        .iter()
        .zip(&centroid_values)
        .map(|(m, &c)| dsp::spectral_bandwidth(m, &frequencies, c))
        .collect();

    Ok(SpectralMetrics {
        mfcc_means,
        mfcc_stds,
        spectral_centroid_mean: round2(mean(&centroid_values)),
        rolloff_mean: round2(mean(&rolloff_values)),
        bandwidth_mean: round2(mean(&bandwidth_values)),
    })
}

/// 全特徴グループを抽出
///
/// セグメント列が与えられ、音声のみの波形が十分な長さ
/// （デフォルト1秒以上）であれば音声のみを解析対象にする。
/// それ以外は全体波形を使う。どちらを選んでも戻り値の形は同一。
pub fn extract_all(
    waveform: &Waveform,
    segments: Option<&[Segment]>,
    config: &FeatureConfig,
) -> FeatureSet {
    let analysis_waveform: Waveform = match segments {
        Some(segments) if !segments.is_empty() => {
            let speech_only = vad::extract_speech_only(waveform, segments);
            if speech_only.duration_seconds() >= config.min_speech_seconds {
                log::info!(
                    "音声区間のみで解析: {:.1}秒 / 全体 {:.1}秒",
                    speech_only.duration_seconds(),
                    waveform.duration_seconds()
                );
                speech_only
            } else {
                log::warn!("音声区間が短すぎるため全体波形で解析します");
                waveform.clone()
            }
        }
        _ => waveform.clone(),
    };

    FeatureSet {
        prosody: extract_prosody(&analysis_waveform, config),
        loudness: extract_loudness(&analysis_waveform, config),
        quality: extract_quality(&analysis_waveform, config),
        spectral: extract_spectral(&analysis_waveform, config),
    }
}
