mod config;
mod dsp;
mod error;
mod features;
mod ingest;
mod pipeline;
mod prosody;
mod text;
mod transcribe;
mod types;
mod vad;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use config::Config;
use env_logger::Env;
use pipeline::AnalysisPipeline;
use transcribe::WhisperTranscriber;

/// 診断用のコマンドラインハーネス
///
/// 音声ファイルを読み込んでパイプラインを1回実行し、
/// MetricsRecordをJSONで標準出力に書き出す。
/// サービング層（HTTP等）はこのクレートの範囲外。
#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = std::env::args().collect();

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    if args.len() < 2 {
        eprintln!("使い方: vox-metrics [config.toml] <audio-file>");
        eprintln!("        vox-metrics --generate-config [path]");
        std::process::exit(2);
    }

    // 引数: [設定ファイル] 音声ファイル
    let (config_path, audio_path) = if args.len() > 2 {
        (args[1].as_str(), args[2].as_str())
    } else {
        ("config.toml", args[1].as_str())
    };

    let config = Config::load_or_default(config_path)?;

    let whisper_config = config
        .whisper
        .clone()
        .context("設定に [whisper] セクションがありません (api_key が必要です)")?;
    let transcriber = WhisperTranscriber::new(whisper_config)?;

    log::info!("vox-metrics を起動します");

    let audio_bytes = std::fs::read(audio_path)
        .with_context(|| format!("音声ファイルの読み込みに失敗: {}", audio_path))?;
    let payload = BASE64.encode(&audio_bytes);

    let pipeline = AnalysisPipeline::new(config, Box::new(transcriber));

    match pipeline.analyze_base64(&payload).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.public_message());
            anyhow::bail!("解析失敗 (ステージ {})", failure.stage)
        }
    }
}
