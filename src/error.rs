use thiserror::Error;

/// 解析パイプラインの回復可能なエラー
///
/// バリデーションエラー（サイズ・長さ・フォーマット）は利用者が
/// 修正可能なのでメッセージをそのまま返してよい。内部エラー
/// （デコーダ内部の失敗など）は詳細をログにのみ残し、
/// 呼び出し側には一般化したメッセージを返す。
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 推定デコード後サイズが上限を超過
    #[error("音声ファイルが大きすぎます: {estimated_mb:.1}MB が上限 {limit_mb}MB を超過")]
    SizeExceeded { estimated_mb: f64, limit_mb: u32 },

    /// ペイロードのデコードに失敗（破損・未対応コーデックなど）
    #[error("音声のデコードに失敗: {0}")]
    DecodeFailed(String),

    /// 波形が短すぎる
    #[error("音声が短すぎます: {seconds:.1}秒 は最小 {min_seconds}秒 未満")]
    TooShort { seconds: f64, min_seconds: u32 },

    /// 波形が長すぎる
    #[error("音声が長すぎます: {seconds:.1}秒 が上限 {max_seconds}秒 を超過")]
    TooLong { seconds: f64, max_seconds: u32 },

    /// VADが対応していないサンプリングレート
    #[error("サンプリングレート {0} Hz は未対応です。8000, 16000, 32000, 48000 のいずれかにリサンプルしてください")]
    UnsupportedSampleRate(u32),

    /// 文字起こしコラボレータの失敗（タイムアウト含む）
    #[error("文字起こしに失敗: {0}")]
    Transcription(String),
}

impl AnalysisError {
    /// 利用者が修正可能なバリデーションエラーかどうか
    ///
    /// trueのエラーはメッセージをそのまま報告してよい。
    /// falseのエラー（内部エラー）は詳細をログにのみ残す。
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AnalysisError::SizeExceeded { .. }
                | AnalysisError::TooShort { .. }
                | AnalysisError::TooLong { .. }
                | AnalysisError::UnsupportedSampleRate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let err = AnalysisError::SizeExceeded {
            estimated_mb: 30.0,
            limit_mb: 25,
        };
        assert!(err.is_validation());

        let err = AnalysisError::TooShort {
            seconds: 0.5,
            min_seconds: 1,
        };
        assert!(err.is_validation());

        let err = AnalysisError::UnsupportedSampleRate(22050);
        assert!(err.is_validation());

        let err = AnalysisError::DecodeFailed("broken".to_string());
        assert!(!err.is_validation());

        let err = AnalysisError::Transcription("timeout".to_string());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_error_messages_carry_bounds() {
        let err = AnalysisError::SizeExceeded {
            estimated_mb: 30.2,
            limit_mb: 25,
        };
        let msg = err.to_string();
        assert!(msg.contains("30.2"));
        assert!(msg.contains("25"));

        let err = AnalysisError::TooLong {
            seconds: 400.0,
            max_seconds: 300,
        };
        assert!(err.to_string().contains("300"));
    }
}
