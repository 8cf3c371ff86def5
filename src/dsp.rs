use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// 対数エネルギーの下限
const ENERGY_FLOOR: f32 = 1e-10;

/// フレーム数を計算
///
/// センタリングなしのスライディングフレーム。
/// フレーム1つ分に満たない波形は0を返す。
pub fn frame_count(num_samples: usize, frame_length: usize, hop_length: usize) -> usize {
    if frame_length == 0 || hop_length == 0 || num_samples < frame_length {
        return 0;
    }
    (num_samples - frame_length) / hop_length + 1
}

/// 波形を重なり付きフレームに分割するイテレータ
///
/// 末尾の不完全なフレームは生成しない。
pub fn frames<'a>(
    samples: &'a [f32],
    frame_length: usize,
    hop_length: usize,
) -> impl Iterator<Item = &'a [f32]> {
    let count = frame_count(samples.len(), frame_length, hop_length);
    (0..count).map(move |i| &samples[i * hop_length..i * hop_length + frame_length])
}

/// Hann窓（periodic形式）
pub fn hann_window(len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}

/// フレームのRMS (Root Mean Square)
pub fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_of_squares / frame.len() as f64).sqrt()) as f32
}

/// フレームのゼロ交差率
///
/// 隣接サンプル間の符号変化の割合 (0.0 ~ 1.0)。
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

/// 窓掛け+FFTによる振幅スペクトル計算器
///
/// フレーム長ごとにFFTプランと窓を使い回す。
pub struct SpectrumAnalyzer {
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    frame_length: usize,
    hop_length: usize,
    sample_rate: u32,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, frame_length: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_length);
        Self {
            fft,
            window: hann_window(frame_length),
            frame_length,
            hop_length,
            sample_rate,
        }
    }

    /// FFTビンの中心周波数一覧 (0 ~ Nyquist)
    pub fn bin_frequencies(&self) -> Vec<f32> {
        let half = self.frame_length / 2 + 1;
        (0..half)
            .map(|k| k as f32 * self.sample_rate as f32 / self.frame_length as f32)
            .collect()
    }

    /// 全フレームの振幅スペクトル
    ///
    /// 戻り値は `[num_frames][frame_length/2 + 1]`。
    pub fn magnitude_frames(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let half = self.frame_length / 2 + 1;
        let mut result = Vec::with_capacity(frame_count(
            samples.len(),
            self.frame_length,
            self.hop_length,
        ));
        let mut buf = vec![Complex::new(0.0f32, 0.0f32); self.frame_length];

        for frame in frames(samples, self.frame_length, self.hop_length) {
            for (i, &s) in frame.iter().enumerate() {
                buf[i] = Complex::new(s * self.window[i], 0.0);
            }
            self.fft.process(&mut buf);
            result.push(buf[..half].iter().map(|c| c.norm()).collect());
        }
        result
    }
}

/// スペクトル重心 (Hz)
///
/// 振幅で重み付けした周波数の平均。全ビンが0のときは0。
pub fn spectral_centroid(magnitudes: &[f32], frequencies: &[f32]) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = magnitudes
        .iter()
        .zip(frequencies)
        .map(|(&m, &f)| m * f)
        .sum();
    weighted / total
}

/// スペクトルロールオフ (Hz)
///
/// 累積振幅が全体の `roll_percent` に達する最小の周波数。
pub fn spectral_rolloff(magnitudes: &[f32], frequencies: &[f32], roll_percent: f32) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = total * roll_percent;
    let mut cumulative = 0.0f32;
    for (&m, &f) in magnitudes.iter().zip(frequencies) {
        cumulative += m;
        if cumulative >= threshold {
            return f;
        }
    }
    *frequencies.last().unwrap_or(&0.0)
}

/// スペクトル帯域幅 (Hz)
///
/// 重心まわりの振幅重み付き2次モーメントの平方根。
pub fn spectral_bandwidth(magnitudes: &[f32], frequencies: &[f32], centroid: f32) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let variance: f32 = magnitudes
        .iter()
        .zip(frequencies)
        .map(|(&m, &f)| m * (f - centroid) * (f - centroid))
        .sum::<f32>()
        / total;
    variance.max(0.0).sqrt()
}

/// スペクトル平坦度 (0.0 ~ 1.0)
///
/// パワースペクトルの幾何平均/算術平均。
/// ホワイトノイズで1に近づき、純音で0に近づく。
pub fn spectral_flatness(magnitudes: &[f32]) -> f32 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let n = magnitudes.len() as f32;
    let mut log_sum = 0.0f32;
    let mut sum = 0.0f32;
    for &m in magnitudes {
        let power = (m * m).max(ENERGY_FLOOR);
        log_sum += power.ln();
        sum += power;
    }
    let geometric = (log_sum / n).exp();
    let arithmetic = sum / n;
    if arithmetic <= 0.0 {
        return 0.0;
    }
    (geometric / arithmetic).clamp(0.0, 1.0)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// 三角メルフィルタバンクの重み行列
///
/// 戻り値は `[num_mels][fft_size/2 + 1]`。
pub fn mel_filterbank(
    num_mels: usize,
    fft_size: usize,
    sample_rate: u32,
    low_freq: f32,
    high_freq: f32,
) -> Vec<Vec<f32>> {
    let half_fft = fft_size / 2 + 1;
    let mel_low = hz_to_mel(low_freq);
    let mel_high = hz_to_mel(high_freq);

    // メル軸上で等間隔の点をHzへ戻し、FFTビン番号に変換
    let bin_indices: Vec<usize> = (0..num_mels + 2)
        .map(|i| {
            let mel = mel_low + i as f32 * (mel_high - mel_low) / (num_mels + 1) as f32;
            let hz = mel_to_hz(mel);
            let bin = (hz * fft_size as f32 / sample_rate as f32).floor() as isize;
            bin.max(0).min(half_fft as isize - 1) as usize
        })
        .collect();

    let mut fb = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let mut filter = vec![0.0f32; half_fft];
        let left = bin_indices[m];
        let center = bin_indices[m + 1];
        let right = bin_indices[m + 2];

        if center > left {
            for k in left..=center {
                filter[k] = (k - left) as f32 / (center - left) as f32;
            }
        }
        if right > center {
            for k in center..=right {
                filter[k] = (right - k) as f32 / (right - center) as f32;
            }
        }
        fb.push(filter);
    }
    fb
}

/// DCT-II（正規直交スケーリング）
///
/// 対数メルエネルギーからケプストラム係数を取り出す。
pub fn dct_ii(input: &[f32], num_coefficients: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; num_coefficients];
    }
    let scale0 = (1.0 / n as f32).sqrt();
    let scale = (2.0 / n as f32).sqrt();
    (0..num_coefficients)
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f32 * (2 * i + 1) as f32 / (2 * n) as f32).cos())
                .sum();
            if k == 0 {
                sum * scale0
            } else {
                sum * scale
            }
        })
        .collect()
}

/// 振幅スペクトル列からMFCCを計算
///
/// パワースペクトル → メルフィルタバンク → 対数 → DCT-II。
/// 戻り値は `[num_frames][num_coefficients]`。
pub fn mfcc_frames(
    magnitude_frames: &[Vec<f32>],
    sample_rate: u32,
    fft_size: usize,
    num_coefficients: usize,
    num_mels: usize,
) -> Vec<Vec<f32>> {
    if magnitude_frames.is_empty() {
        return Vec::new();
    }
    let filterbank = mel_filterbank(num_mels, fft_size, sample_rate, 0.0, sample_rate as f32 / 2.0);

    magnitude_frames
        .iter()
        .map(|magnitudes| {
            let log_mel: Vec<f32> = filterbank
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .iter()
                        .zip(magnitudes)
                        .map(|(&w, &m)| w * m * m)
                        .sum();
                    energy.max(ENERGY_FLOOR).ln()
                })
                .collect();
            dct_ii(&log_mel, num_coefficients)
        })
        .collect()
}
