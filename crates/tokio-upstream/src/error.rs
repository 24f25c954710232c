//! tokio-upstream エラー型

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use upstream_http11::AppResponse;

/// エラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// バックエンドとの I/O エラー
    BackendIo,
    /// クライアントへの書き込みエラー
    ClientIo,
    /// バックエンドからの応答待ちがタイムアウトした
    Timeout,
    /// バックエンドのレスポンスが HTTP として不正
    Protocol,
    /// レスポンスが完了する前にバックエンドが接続を閉じた
    ConnectionClosed,
    /// 不正なバックエンドアドレス
    InvalidAddress,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendIo => "backend I/O error",
            ErrorKind::ClientIo => "client I/O error",
            ErrorKind::Timeout => "backend timeout",
            ErrorKind::Protocol => "backend protocol error",
            ErrorKind::ConnectionClosed => "backend connection closed",
            ErrorKind::InvalidAddress => "invalid backend address",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// tokio-upstream エラー
///
/// 種類、人が読むための詳細、機械処理向けの注釈を持つ。
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    annotations: BTreeMap<String, String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            annotations: BTreeMap::new(),
            source: None,
        }
    }

    pub(crate) fn backend_io(e: std::io::Error) -> Self {
        Self::new(ErrorKind::BackendIo, e.to_string()).with_source(e)
    }

    pub(crate) fn client_io(e: std::io::Error) -> Self {
        Self::new(ErrorKind::ClientIo, e.to_string()).with_source(e)
    }

    /// レスポンスのパースエラーから作成し、状態機械の状態を注釈として付ける
    pub(crate) fn protocol(e: upstream_http11::Error, response: &AppResponse) -> Self {
        let mut error = Self::new(ErrorKind::Protocol, e.to_string())
            .annotate("http_state", response.http_state_str())
            .annotate("body_type", response.body_type_str());
        if let Some(code) = e.code() {
            error = error.annotate("parse_error", code.as_str());
        }
        if response.status_code() != 0 {
            error = error.annotate("status_code", response.status_code().to_string());
        }
        error.with_source(e)
    }

    fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// 注釈を追加 (同じ名前は上書き)
    pub fn annotate(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// 注釈を取得
    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations.get(name).map(String::as_str)
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
