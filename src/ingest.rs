use crate::config::IngestConfig;
use crate::error::AnalysisError;
use crate::types::Waveform;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rubato::{FftFixedInOut, Resampler};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// マジックバイトから推定した音声コンテナフォーマット
///
/// 拡張子やMIMEタイプは信用せず、先頭バイトのみで判定する。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SniffedFormat {
    /// MP4/M4A系コンテナ
    M4a,
    /// RIFF/WAV
    Wav,
    /// ID3タグ付きまたは生のMP3
    Mp3,
    /// Ogg
    Ogg,
    /// WebM (EBML)
    Webm,
    /// FLAC
    Flac,
}

impl SniffedFormat {
    /// マジックバイトからフォーマットを推定
    ///
    /// どのシグネチャにも一致しない場合はM4Aとみなす。
    /// モバイル録音で最も一般的なコンテナであり、厳密な拒否よりも
    /// 寛容なデコードを優先する意図的なフォールバック。
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() >= 8 && (&bytes[..4] == b"ftyp" || &bytes[4..8] == b"ftyp") {
            SniffedFormat::M4a
        } else if bytes.len() >= 4 && &bytes[..4] == b"RIFF" {
            SniffedFormat::Wav
        } else if (bytes.len() >= 3 && &bytes[..3] == b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xfb)
        {
            SniffedFormat::Mp3
        } else if bytes.len() >= 4 && &bytes[..4] == b"OggS" {
            SniffedFormat::Ogg
        } else if bytes.len() >= 4 && &bytes[..4] == [0x1a, 0x45, 0xdf, 0xa3] {
            SniffedFormat::Webm
        } else if bytes.len() >= 4 && &bytes[..4] == b"fLaC" {
            SniffedFormat::Flac
        } else {
            SniffedFormat::M4a
        }
    }

    /// デコーダへのヒントに使う拡張子
    pub fn extension(&self) -> &'static str {
        match self {
            SniffedFormat::M4a => "m4a",
            SniffedFormat::Wav => "wav",
            SniffedFormat::Mp3 => "mp3",
            SniffedFormat::Ogg => "ogg",
            SniffedFormat::Webm => "webm",
            SniffedFormat::Flac => "flac",
        }
    }
}

/// base64エンコード済みペイロードのサイズを事前検証
///
/// デコード後サイズをエンコード長の3/4として見積もり、
/// 上限超過なら一切のデコードを行わずに `SizeExceeded` を返す。
pub fn validate_encoded_size(encoded_len: usize, max_size_mb: u32) -> Result<(), AnalysisError> {
    // base64はデコード後の約4/3のサイズになる
    let estimated_bytes = encoded_len as f64 * 3.0 / 4.0;
    let estimated_mb = estimated_bytes / (1024.0 * 1024.0);

    if estimated_mb > max_size_mb as f64 {
        return Err(AnalysisError::SizeExceeded {
            estimated_mb,
            limit_mb: max_size_mb,
        });
    }
    Ok(())
}

/// 波形の長さが設定範囲内かを検証
pub fn validate_duration(waveform: &Waveform, config: &IngestConfig) -> Result<(), AnalysisError> {
    let seconds = waveform.duration_seconds();

    if seconds < config.min_duration_seconds as f64 {
        return Err(AnalysisError::TooShort {
            seconds,
            min_seconds: config.min_duration_seconds,
        });
    }
    if seconds > config.max_duration_seconds as f64 {
        return Err(AnalysisError::TooLong {
            seconds,
            max_seconds: config.max_duration_seconds,
        });
    }
    Ok(())
}

/// RMSレベルを目標値に正規化
///
/// RMSが0より大きければ `target_rms / rms` 倍にスケールし、
/// 常に [-1.0, 1.0] にハードクリップする。
/// 全無音（RMS == 0）の入力はスケールせずそのまま返す。
pub fn normalize(mut waveform: Waveform, target_rms: f32) -> Waveform {
    let rms = crate::dsp::frame_rms(&waveform.samples);

    if rms > 0.0 {
        let scale = target_rms / rms;
        for sample in &mut waveform.samples {
            *sample *= scale;
        }
    }

    for sample in &mut waveform.samples {
        *sample = sample.clamp(-1.0, 1.0);
    }
    waveform
}

/// サンプリングレート変換
///
/// レートが一致する場合は入力をそのまま返す（再計算なし）。
/// 変換時はFFTベースのリサンプラでチャンク毎に処理し、
/// 出力を理論長に切り詰める。
pub fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AnalysisError> {
    if from_rate == to_rate {
        return Ok(samples);
    }
    if samples.is_empty() {
        return Ok(samples);
    }

    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, 1024, 1)
        .map_err(|e| AnalysisError::DecodeFailed(format!("リサンプラ初期化失敗: {}", e)))?;

    let expected_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected_len + delay + 1024);
    let mut position = 0usize;

    // 末尾はゼロ埋めチャンクを流し、遅延分を含めて必要な出力長まで回す
    while output.len() < expected_len + delay {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; needed];
        if position < samples.len() {
            let available = (samples.len() - position).min(needed);
            chunk[..available].copy_from_slice(&samples[position..position + available]);
            position += available;
        }

        let processed = resampler
            .process(&[chunk], None)
            .map_err(|e| AnalysisError::DecodeFailed(format!("リサンプル処理失敗: {}", e)))?;
        output.extend_from_slice(&processed[0]);
    }

    Ok(output[delay..delay + expected_len].to_vec())
}

/// 生バイト列をデコードしてモノラル波形に変換
///
/// symphoniaでデコードし、多チャンネルはチャンネル平均で
/// モノラル化、指定レートへリサンプルする。
pub fn decode_bytes(
    bytes: &[u8],
    format: SniffedFormat,
    target_sample_rate: u32,
) -> Result<Waveform, AnalysisError> {
    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AnalysisError::DecodeFailed(format!("コンテナ解析失敗: {}", e)))?;

    let mut reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::DecodeFailed("音声トラックが見つかりません".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::DecodeFailed(format!("デコーダ作成失敗: {}", e)))?;

    let mut source_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut mono: Vec<f32> = Vec::new();
    let mut decode_error_count = 0u32;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AnalysisError::DecodeFailed(format!(
                    "パケット読み取り失敗: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                source_rate = spec.rate;
                let channels = spec.channels.count().max(1);

                let mut sample_buffer =
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buffer.copy_interleaved_ref(decoded);

                for frame in sample_buffer.samples().chunks_exact(channels) {
                    mono.push(frame.iter().sum::<f32>() / channels as f32);
                }
            }
            // 破損パケットはスキップして続行
            Err(SymphoniaError::DecodeError(e)) => {
                decode_error_count += 1;
                if decode_error_count <= 3 {
                    log::warn!("破損パケットをスキップ: {}", e);
                }
            }
            Err(e) => {
                return Err(AnalysisError::DecodeFailed(format!("デコード失敗: {}", e)))
            }
        }
    }

    if decode_error_count > 3 {
        log::warn!("デコード中に合計 {} 個の破損パケット", decode_error_count);
    }

    if mono.is_empty() || source_rate == 0 {
        return Err(AnalysisError::DecodeFailed(
            "デコード結果が空です".to_string(),
        ));
    }

    let resampled = resample(mono, source_rate, target_sample_rate)?;
    Ok(Waveform::new(resampled, target_sample_rate))
}

/// base64ペイロードから正規化済み波形を生成
///
/// サイズ検証 → base64デコード → フォーマット推定 → デコード →
/// リサンプル → 長さ検証 → RMS正規化 の順で処理する。
///
/// # Errors
///
/// * `SizeExceeded` - 推定サイズが上限超過（デコード前に判定）
/// * `DecodeFailed` - base64または音声デコードの失敗
/// * `TooShort` / `TooLong` - 長さが設定範囲外
pub fn load_from_base64(audio_b64: &str, config: &IngestConfig) -> Result<Waveform, AnalysisError> {
    validate_encoded_size(audio_b64.len(), config.max_size_mb)?;

    let bytes = BASE64
        .decode(audio_b64.trim())
        .map_err(|e| AnalysisError::DecodeFailed(format!("base64デコード失敗: {}", e)))?;

    let format = SniffedFormat::detect(&bytes);
    log::info!("検出フォーマット: .{}", format.extension());

    let waveform = decode_bytes(&bytes, format, config.target_sample_rate)?;
    validate_duration(&waveform, config)?;

    Ok(normalize(waveform, config.target_rms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// サイン波をWAVバイト列にエンコード
    fn sine_wav_bytes(freq: f32, sample_rate: u32, seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (sample_rate as f32 * seconds) as usize;
            for i in 0..n {
                let t = i as f32 / sample_rate as f32;
                let sample =
                    ((2.0 * std::f32::consts::PI * freq * t).sin() * 10000.0) as i16;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_detect_wav() {
        let bytes = b"RIFF....WAVEfmt ";
        assert_eq!(SniffedFormat::detect(bytes), SniffedFormat::Wav);
    }

    #[test]
    fn test_detect_mp3_id3() {
        assert_eq!(SniffedFormat::detect(b"ID3\x04\x00\x00\x00"), SniffedFormat::Mp3);
        assert_eq!(SniffedFormat::detect(&[0xff, 0xfb, 0x90, 0x00]), SniffedFormat::Mp3);
    }

    #[test]
    fn test_detect_ogg() {
        assert_eq!(SniffedFormat::detect(b"OggS\x00\x02"), SniffedFormat::Ogg);
    }

    #[test]
    fn test_detect_flac() {
        assert_eq!(SniffedFormat::detect(b"fLaC\x00\x00"), SniffedFormat::Flac);
    }

    #[test]
    fn test_detect_webm() {
        assert_eq!(
            SniffedFormat::detect(&[0x1a, 0x45, 0xdf, 0xa3, 0x00]),
            SniffedFormat::Webm
        );
    }

    #[test]
    fn test_detect_m4a_ftyp_offset() {
        // MP4系はサイズフィールドの後にftypが来る
        assert_eq!(
            SniffedFormat::detect(b"\x00\x00\x00\x20ftypM4A "),
            SniffedFormat::M4a
        );
    }

    #[test]
    fn test_unknown_defaults_to_m4a() {
        assert_eq!(SniffedFormat::detect(b"\x01\x02\x03\x04\x05\x06\x07\x08"), SniffedFormat::M4a);
        assert_eq!(SniffedFormat::detect(b""), SniffedFormat::M4a);
    }

    #[test]
    fn test_validate_encoded_size_ok() {
        // 1MB相当のbase64
        assert!(validate_encoded_size(1024 * 1024, 25).is_ok());
    }

    #[test]
    fn test_validate_encoded_size_exceeded() {
        // デコード後 ~30MB 相当のエンコード長 (30MB * 4/3)
        let encoded_len = 30 * 1024 * 1024 * 4 / 3 + 1024;
        let result = validate_encoded_size(encoded_len, 25);
        assert!(matches!(
            result,
            Err(AnalysisError::SizeExceeded { limit_mb: 25, .. })
        ));
    }

    #[test]
    fn test_validate_duration_bounds() {
        let config = IngestConfig::default();

        let short = Waveform::new(vec![0.0; 8000], 16000); // 0.5秒
        assert!(matches!(
            validate_duration(&short, &config),
            Err(AnalysisError::TooShort { .. })
        ));

        let ok = Waveform::new(vec![0.0; 32000], 16000); // 2秒
        assert!(validate_duration(&ok, &config).is_ok());

        let long = Waveform::new(vec![0.0; 16000 * 301], 16000); // 301秒
        assert!(matches!(
            validate_duration(&long, &config),
            Err(AnalysisError::TooLong { .. })
        ));
    }

    #[test]
    fn test_normalize_quiet_audio() {
        let samples = vec![0.01f32; 16000];
        let normalized = normalize(Waveform::new(samples, 16000), 0.3);
        let rms = crate::dsp::frame_rms(&normalized.samples);
        assert!((rms - 0.3).abs() < 0.01, "rms = {}", rms);
    }

    #[test]
    fn test_normalize_clips_to_valid_range() {
        // 範囲外の値を含む入力でも出力は常に [-1, 1]
        let samples = vec![2.0f32, -3.0, 0.5, -0.5];
        let normalized = normalize(Waveform::new(samples, 16000), 0.9);
        assert!(normalized
            .samples
            .iter()
            .all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_normalize_silence_unchanged() {
        let samples = vec![0.0f32; 16000];
        let normalized = normalize(Waveform::new(samples.clone(), 16000), 0.3);
        assert_eq!(normalized.samples, samples);
    }

    #[test]
    fn test_resample_identity() {
        let samples: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.001).sin()).collect();
        let resampled = resample(samples.clone(), 16000, 16000).unwrap();
        assert_eq!(resampled, samples);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![0.0f32; 32000];
        let resampled = resample(samples, 32000, 16000).unwrap();
        assert_eq!(resampled.len(), 16000);
    }

    #[test]
    fn test_resample_preserves_duration() {
        let samples = vec![0.1f32; 44100];
        let resampled = resample(samples, 44100, 16000).unwrap();
        assert_eq!(resampled.len(), 16000);
    }

    #[test]
    fn test_load_from_base64_wav_roundtrip() {
        let wav = sine_wav_bytes(440.0, 16000, 2.0);
        let encoded = BASE64.encode(&wav);

        let config = IngestConfig::default();
        let waveform = load_from_base64(&encoded, &config).unwrap();

        assert_eq!(waveform.sample_rate, 16000);
        assert!((waveform.duration_seconds() - 2.0).abs() < 0.05);
        // 正規化後のRMSは目標値近傍
        let rms = crate::dsp::frame_rms(&waveform.samples);
        assert!((rms - config.target_rms).abs() < 0.05, "rms = {}", rms);
    }

    #[test]
    fn test_load_from_base64_resamples() {
        let wav = sine_wav_bytes(440.0, 48000, 2.0);
        let encoded = BASE64.encode(&wav);

        let config = IngestConfig::default();
        let waveform = load_from_base64(&encoded, &config).unwrap();

        assert_eq!(waveform.sample_rate, 16000);
        assert!((waveform.duration_seconds() - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_load_from_base64_rejects_garbage() {
        let result = load_from_base64("これはbase64ではない!!", &IngestConfig::default());
        assert!(matches!(result, Err(AnalysisError::DecodeFailed(_))));
    }

    #[test]
    fn test_load_from_base64_rejects_short_audio() {
        let wav = sine_wav_bytes(440.0, 16000, 0.5);
        let encoded = BASE64.encode(&wav);
        let result = load_from_base64(&encoded, &IngestConfig::default());
        assert!(matches!(result, Err(AnalysisError::TooShort { .. })));
    }

    #[test]
    fn test_load_from_base64_oversized_rejected_before_decode() {
        // ~30MB相当のペイロードは中身を見る前に拒否される
        let encoded = "A".repeat(30 * 1024 * 1024 * 4 / 3 + 1024);
        let result = load_from_base64(&encoded, &IngestConfig::default());
        assert!(matches!(result, Err(AnalysisError::SizeExceeded { .. })));
    }
}
