use regex_lite::Regex;
use std::collections::BTreeMap;

/// 検出対象のフィラーワード一覧
///
/// 大文字小文字を無視した単語単位の完全一致で数える
const FILLER_WORDS: &[&str] = &["um", "uh", "like", "you know", "so", "actually", "basically"];

/// 文字起こしテキストから導出する語数統計
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptStats {
    pub word_count: usize,

    /// 話速 (words per minute)。長さ0のときは0
    pub speaking_pace: u32,

    /// 出現したフィラーワードと回数（出現したもののみ）
    pub filler_words: BTreeMap<String, u32>,

    /// フィラーワードの合計数
    pub filler_count: u32,
}

/// 語数・話速・フィラーワードを一括計算
///
/// # Arguments
///
/// * `text` - 文字起こしテキスト
/// * `duration_seconds` - 波形の実測長（秒）
pub fn analyze_transcript(text: &str, duration_seconds: f64) -> TranscriptStats {
    let word_count = text.split_whitespace().count();

    let speaking_pace = if duration_seconds > 0.0 {
        (word_count as f64 * 60.0 / duration_seconds) as u32
    } else {
        0
    };

    let filler_words = detect_filler_words(text);
    let filler_count = filler_words.values().sum();

    TranscriptStats {
        word_count,
        speaking_pace,
        filler_words,
        filler_count,
    }
}

/// フィラーワードの出現回数を数える
///
/// 単語境界付きのパターンで照合し、0回のエントリは含めない。
pub fn detect_filler_words(text: &str) -> BTreeMap<String, u32> {
    let text_lower = text.to_lowercase();
    let mut counts = BTreeMap::new();

    for &filler in FILLER_WORDS {
        let pattern = format!(r"\b{}\b", filler.replace(' ', r"\s+"));
        let regex = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(e) => {
                log::warn!("フィラーワードのパターン構築に失敗 ({}): {}", filler, e);
                continue;
            }
        };
        let count = regex.find_iter(&text_lower).count() as u32;
        if count > 0 {
            counts.insert(filler.to_string(), count);
        }
    }

    counts
}
