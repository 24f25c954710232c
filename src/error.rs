//! エラー型の定義

use thiserror::Error;

/// 状態機械に保存されるパースエラーコード
///
/// `AppResponse` が `ERROR` 状態に遷移したときに記録される。
/// サイズを小さく保つため詳細メッセージは持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorCode {
    /// ステータスラインが不正
    MalformedStatusLine,
    /// ヘッダー行が不正
    MalformedHeader,
    /// ボディのフレーミングを決定するヘッダーが矛盾している
    ConflictingFraming,
    /// chunked ボディが不正
    InvalidChunk,
    /// ヘッダー行 (またはヘッダー全体) が大きすぎる
    HeaderTooLarge,
    /// ヘッダー数超過
    TooManyHeaders,
    /// ボディ完了前に接続が閉じられた
    UnexpectedEof,
    /// 101 レスポンスに Upgrade ヘッダーがない
    UpgradeWithoutHeader,
}

impl ParseErrorCode {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorCode::MalformedStatusLine => "MALFORMED_STATUS_LINE",
            ParseErrorCode::MalformedHeader => "MALFORMED_HEADER",
            ParseErrorCode::ConflictingFraming => "CONFLICTING_FRAMING",
            ParseErrorCode::InvalidChunk => "INVALID_CHUNK",
            ParseErrorCode::HeaderTooLarge => "HEADER_TOO_LARGE",
            ParseErrorCode::TooManyHeaders => "TOO_MANY_HEADERS",
            ParseErrorCode::UnexpectedEof => "UNEXPECTED_EOF",
            ParseErrorCode::UpgradeWithoutHeader => "UPGRADE_WITHOUT_HEADER",
        }
    }
}

impl std::fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// upstream_http11 のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// レスポンスのパースに失敗した
    #[error("parse error ({code}): {detail}")]
    Parse {
        code: ParseErrorCode,
        detail: String,
    },
    /// 既に ERROR 状態になっている
    #[error("response already failed: {0}")]
    AlreadyFailed(ParseErrorCode),
    /// 現在の状態では許可されない操作
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    pub(crate) fn parse(code: ParseErrorCode, detail: impl Into<String>) -> Self {
        Error::Parse {
            code,
            detail: detail.into(),
        }
    }

    /// 保存されているパースエラーコードを取得
    pub fn code(&self) -> Option<ParseErrorCode> {
        match self {
            Error::Parse { code, .. } | Error::AlreadyFailed(code) => Some(*code),
            Error::InvalidState(_) => None,
        }
    }
}
