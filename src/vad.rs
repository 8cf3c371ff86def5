use crate::config::{TimingConfig, VadConfig};
use crate::error::AnalysisError;
use crate::types::{PauseEvent, Segment, SegmentKind, TimingMetrics, Waveform};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// f32サンプルをi16に変換する際のスケール係数
const I16_SCALE: f32 = 32767.0;

/// フレーム分類エラーを個別にログへ出す上限
///
/// 病的な入力でログが溢れないよう、これを超えた分は件数のみ数える
const MAX_LOGGED_FRAME_ERRORS: u32 = 3;

/// 波形を音声/無音セグメント列に分割
///
/// WebRTC VADでフレーム毎に音声/非音声を分類し、同種の隣接フレームを
/// 1つのセグメントにマージする。セグメント列は波形の先頭から
/// （末尾の不完全フレームを除き）隙間・重なりなしに並ぶ。
///
/// # Arguments
///
/// * `waveform` - 分類対象の波形（サンプリングレートは
///   8000/16000/32000/48000 Hzのいずれかであること）
/// * `config` - フレーム長 (10/20/30ms) と感度 (0-3)
///
/// # Errors
///
/// 対応外のサンプリングレートでは `UnsupportedSampleRate` を返す。
/// 呼び出し側で事前にリサンプルすること（インジェストは16kHzを保証する）。
///
/// # Edge cases
///
/// * フレーム1つ分に満たない波形 → 空のセグメント列
/// * フレーム単位の分類失敗 → そのフレームを無音として続行
pub fn segment_speech(
    waveform: &Waveform,
    config: &VadConfig,
) -> Result<Vec<Segment>, AnalysisError> {
    let sample_rate = waveform.sample_rate;
    let vad_rate = match sample_rate {
        8000 => SampleRate::Rate8kHz,
        16000 => SampleRate::Rate16kHz,
        32000 => SampleRate::Rate32kHz,
        48000 => SampleRate::Rate48kHz,
        other => return Err(AnalysisError::UnsupportedSampleRate(other)),
    };
    let vad_mode = match config.aggressiveness {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        _ => VadMode::VeryAggressive,
    };

    let mut vad = Vad::new();
    vad.set_sample_rate(vad_rate);
    vad.set_mode(vad_mode);

    let frame_size = (sample_rate as u64 * config.frame_duration_ms as u64 / 1000) as usize;

    // 固定小数点16bit表現に変換
    let samples_i16: Vec<i16> = waveform
        .samples
        .iter()
        .map(|&s| {
            if s.is_finite() {
                (s.clamp(-1.0, 1.0) * I16_SCALE) as i16
            } else {
                0
            }
        })
        .collect();

    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<Segment> = None;
    let mut frame_error_count = 0u32;

    let mut offset = 0usize;
    while offset + frame_size <= samples_i16.len() {
        let frame_f32 = &waveform.samples[offset..offset + frame_size];
        let frame_i16 = &samples_i16[offset..offset + frame_size];

        let is_speech = match classify_frame(&mut vad, frame_f32, frame_i16) {
            Ok(is_speech) => is_speech,
            Err(reason) => {
                frame_error_count += 1;
                if frame_error_count <= MAX_LOGGED_FRAME_ERRORS {
                    log::warn!("VADフレーム分類失敗 (オフセット {}): {}", offset, reason);
                }
                // 分類できないフレームは無音として継続
                false
            }
        };

        let start_s = offset as f64 / sample_rate as f64;
        let end_s = (offset + frame_size) as f64 / sample_rate as f64;
        let kind = if is_speech {
            SegmentKind::Speech
        } else {
            SegmentKind::Silence
        };

        match current.as_mut() {
            Some(segment) if segment.kind == kind => {
                segment.end_s = end_s;
            }
            _ => {
                if let Some(finished) = current.take() {
                    segments.push(finished);
                }
                current = Some(Segment {
                    start_s,
                    end_s,
                    kind,
                });
            }
        }

        offset += frame_size;
    }

    if let Some(finished) = current {
        segments.push(finished);
    }

    if frame_error_count > MAX_LOGGED_FRAME_ERRORS {
        log::warn!("VAD分類失敗が合計 {} フレーム", frame_error_count);
    }

    Ok(segments)
}

/// 1フレームの音声/非音声を分類
///
/// 非有限サンプルを含むフレームと分類器内部の失敗はエラーとして返し、
/// 呼び出し側で無音に縮退させる。
fn classify_frame(vad: &mut Vad, frame_f32: &[f32], frame_i16: &[i16]) -> Result<bool, String> {
    if frame_f32.iter().any(|s| !s.is_finite()) {
        return Err("非有限サンプルを含むフレーム".to_string());
    }
    vad.is_voice_segment(frame_i16)
        .map_err(|_| "分類器内部エラー".to_string())
}

/// ミリ秒をマイクロ秒精度に丸める
///
/// 秒単位の減算で生じる浮動小数の誤差が閾値比較
/// （200ms/700msちょうどは除外）を乱さないようにする
fn to_precise_ms(duration_s: f64) -> f64 {
    (duration_s * 1000.0 * 1000.0).round() / 1000.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// セグメント列からタイミング指標を計算
///
/// 種別毎の合計時間・比率・ポーズ統計を導出する。
/// 比率は総時間が0のとき0（ゼロ除算なし）。
/// ポーズは閾値を厳密に超えるもののみを数える
/// （ちょうど200ms/700msのセグメントは含まれない）。
/// ポーズは発話の中断を指すため、音声セグメントが1つもない
/// 全無音のクリップにはポーズは存在しない。
pub fn compute_timing_metrics(
    segments: &[Segment],
    total_duration: f64,
    config: &TimingConfig,
) -> TimingMetrics {
    let has_speech = segments.iter().any(|s| s.kind == SegmentKind::Speech);

    let mut speech_duration = 0.0f64;
    let mut silence_duration = 0.0f64;
    let mut pause_events: Vec<PauseEvent> = Vec::new();

    for segment in segments {
        let duration = segment.duration_s();
        match segment.kind {
            SegmentKind::Speech => speech_duration += duration,
            SegmentKind::Silence => {
                silence_duration += duration;
                if has_speech {
                    pause_events.push(PauseEvent {
                        start_s: segment.start_s,
                        end_s: segment.end_s,
                        duration_ms: to_precise_ms(duration),
                    });
                }
            }
        }
    }

    let meaningful_pauses: Vec<PauseEvent> = pause_events
        .iter()
        .filter(|p| p.duration_ms > config.meaningful_pause_ms)
        .cloned()
        .collect();
    let long_pauses: Vec<PauseEvent> = pause_events
        .iter()
        .filter(|p| p.duration_ms > config.long_pause_ms)
        .cloned()
        .collect();

    let speech_ratio = if total_duration > 0.0 {
        speech_duration / total_duration
    } else {
        0.0
    };
    let silence_ratio = if total_duration > 0.0 {
        silence_duration / total_duration
    } else {
        0.0
    };
    let mean_pause_ms = if meaningful_pauses.is_empty() {
        0.0
    } else {
        meaningful_pauses.iter().map(|p| p.duration_ms).sum::<f64>()
            / meaningful_pauses.len() as f64
    };

    TimingMetrics {
        total_speech_ms: speech_duration * 1000.0,
        total_silence_ms: silence_duration * 1000.0,
        speech_ratio: round_to(speech_ratio, 3),
        silence_ratio: round_to(silence_ratio, 3),
        pause_count: meaningful_pauses.len(),
        mean_pause_ms: round_to(mean_pause_ms, 1),
        long_pauses,
        pause_events: meaningful_pauses,
    }
}

/// 音声区間のみを連結した波形を取り出す
///
/// 音声セグメントが1つもない場合は元の波形をそのまま返す
/// （検出が完全に失敗しても下流のピッチ・声質抽出が
/// 空の信号を受け取らないためのフォールバック。エラーではない）。
pub fn extract_speech_only(waveform: &Waveform, segments: &[Segment]) -> Waveform {
    let speech_segments: Vec<&Segment> = segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Speech)
        .collect();

    if speech_segments.is_empty() {
        log::warn!("音声セグメントなし。全体波形をそのまま使用します");
        return waveform.clone();
    }

    let sample_rate = waveform.sample_rate;
    let mut samples = Vec::new();
    for segment in speech_segments {
        let start = (segment.start_s * sample_rate as f64) as usize;
        let end = ((segment.end_s * sample_rate as f64) as usize).min(waveform.samples.len());
        if start < end {
            samples.extend_from_slice(&waveform.samples[start..end]);
        }
    }

    Waveform::new(samples, sample_rate)
}
