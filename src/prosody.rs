//! YIN法によるピッチ（基本周波数）トラッカー
//!
//! 差分関数と累積平均正規化差分 (CMND) に基づく古典的なYIN実装。
//! フレーム毎にF0推定値と有声/無声の判定を返す。
//! 無声フレームは `None` として表現し、統計からは除外される。

use crate::config::FeatureConfig;

/// CMNDの有声判定閾値
///
/// この値を下回る最初の谷をピッチ周期として採用する
const YIN_THRESHOLD: f32 = 0.1;

pub struct PitchTracker {
    sample_rate: u32,
    frame_length: usize,
    hop_length: usize,
    fmin_hz: f32,
    fmax_hz: f32,
}

impl PitchTracker {
    pub fn new(sample_rate: u32, config: &FeatureConfig) -> Self {
        Self {
            sample_rate,
            frame_length: config.frame_length,
            hop_length: config.hop_length,
            fmin_hz: config.pitch_fmin_hz,
            fmax_hz: config.pitch_fmax_hz,
        }
    }

    /// 全フレームのF0を推定
    ///
    /// 戻り値はフレーム毎の `Some(f0_hz)` (有声) / `None` (無声)。
    /// フレーム1つ分に満たない波形は空のVecを返す。
    pub fn track(&self, samples: &[f32]) -> Vec<Option<f32>> {
        crate::dsp::frames(samples, self.frame_length, self.hop_length)
            .map(|frame| self.estimate_frame(frame))
            .collect()
    }

    /// フレームの時刻（秒）
    pub fn frame_time(&self, frame_index: usize) -> f64 {
        frame_index as f64 * self.hop_length as f64 / self.sample_rate as f64
    }

    /// 1フレームのF0を推定
    fn estimate_frame(&self, frame: &[f32]) -> Option<f32> {
        let window = self.frame_length / 2;
        let tau_min = ((self.sample_rate as f32 / self.fmax_hz).floor() as usize).max(2);
        let tau_max = ((self.sample_rate as f32 / self.fmin_hz).ceil() as usize).min(window - 1);
        if tau_min >= tau_max {
            return None;
        }

        // 差分関数 d(tau)
        let mut difference = vec![0.0f32; tau_max + 1];
        for tau in 1..=tau_max {
            let mut sum = 0.0f32;
            for j in 0..window {
                let delta = frame[j] - frame[j + tau];
                sum += delta * delta;
            }
            difference[tau] = sum;
        }

        // 累積平均正規化差分 d'(tau)
        let mut cmnd = vec![1.0f32; tau_max + 1];
        let mut running_sum = 0.0f32;
        for tau in 1..=tau_max {
            running_sum += difference[tau];
            cmnd[tau] = if running_sum > 0.0 {
                difference[tau] * tau as f32 / running_sum
            } else {
                // 無音フレーム: 正規化できないので1のまま（無声扱い）
                1.0
            };
        }

        // 閾値を下回る最初の谷を探す
        let mut tau = tau_min;
        while tau <= tau_max {
            if cmnd[tau] < YIN_THRESHOLD {
                while tau + 1 <= tau_max && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                break;
            }
            tau += 1;
        }
        if tau > tau_max || cmnd[tau] >= YIN_THRESHOLD {
            return None;
        }

        // 放物線補間でサブサンプル精度に補正
        let refined_tau = parabolic_interpolation(&cmnd, tau);
        let f0 = self.sample_rate as f32 / refined_tau;
        if f0 < self.fmin_hz || f0 > self.fmax_hz {
            return None;
        }
        Some(f0)
    }
}

/// CMNDの谷の位置を放物線補間で補正
fn parabolic_interpolation(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return index as f32;
    }
    let left = values[index - 1];
    let center = values[index];
    let right = values[index + 1];
    let denominator = 2.0 * (left - 2.0 * center + right);
    if denominator.abs() < 1e-12 {
        return index as f32;
    }
    index as f32 + (left - right) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tracker() -> PitchTracker {
        PitchTracker::new(16000, &FeatureConfig::default())
    }

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_pure_tone_detected() {
        let samples = sine(220.0, 16000, 1.0);
        let track = tracker().track(&samples);
        assert!(!track.is_empty());

        let voiced: Vec<f32> = track.iter().filter_map(|&f| f).collect();
        assert!(!voiced.is_empty());
        let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
        assert!((mean - 220.0).abs() < 5.0, "mean f0 = {}", mean);
    }

    #[test]
    fn test_harmonic_stack_tracks_fundamental() {
        // 150Hz基本波 + 2/3次倍音
        let n = 32000;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / 16000.0;
                ((2.0 * PI * 150.0 * t).sin()
                    + 0.5 * (2.0 * PI * 300.0 * t).sin()
                    + 0.25 * (2.0 * PI * 450.0 * t).sin())
                    / 1.75
            })
            .collect();

        let track = tracker().track(&samples);
        let voiced: Vec<f32> = track.iter().filter_map(|&f| f).collect();
        assert!(!voiced.is_empty());
        let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
        assert!((mean - 150.0).abs() < 10.0, "mean f0 = {}", mean);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let samples = vec![0.0f32; 16000];
        let track = tracker().track(&samples);
        assert!(!track.is_empty());
        assert!(track.iter().all(|f| f.is_none()));
    }

    #[test]
    fn test_short_input_yields_no_frames() {
        let samples = vec![0.0f32; 100]; // フレーム長未満
        let track = tracker().track(&samples);
        assert!(track.is_empty());
    }

    #[test]
    fn test_frame_time() {
        let t = tracker();
        assert_eq!(t.frame_time(0), 0.0);
        // hop 512 @ 16kHz = 32ms
        assert!((t.frame_time(1) - 0.032).abs() < 1e-9);
    }

    #[test]
    fn test_parabolic_interpolation_at_edges() {
        let values = vec![1.0, 0.5, 1.0];
        assert_eq!(parabolic_interpolation(&values, 0), 0.0);
        assert_eq!(parabolic_interpolation(&values, 2), 2.0);
        // 対称な谷は中心のまま
        assert!((parabolic_interpolation(&values, 1) - 1.0).abs() < 1e-6);
    }
}
