//! アプリケーションレスポンスの状態機械
//!
//! バックエンドのアプリケーションプロセスから届く HTTP/1.x レスポンスを
//! 到着した分だけ逐次解釈し、ヘッダーの終端、ボディの有無と種類、
//! レスポンスの完了、接続を再利用できるかどうかを追跡する。
//!
//! 1 接続につき 1 インスタンスを保持するため、状態はできるだけ小さく保つ。
//! I/O は一切行わない。
//!
//! ## 使い方
//!
//! ```rust
//! use upstream_http11::{AppResponse, BodyType, Event, HttpState};
//!
//! let mut resp = AppResponse::new();
//! let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
//!
//! let feed = resp.feed(data).unwrap();
//! assert_eq!(feed.event, Event::HeadersParsed);
//! assert_eq!(resp.body_type(), BodyType::ContentLength);
//!
//! let feed = resp.feed(&data[feed.consumed..]).unwrap();
//! assert_eq!(feed.event, Event::Body(b"hello"));
//! assert_eq!(resp.http_state(), HttpState::Complete);
//! assert!(resp.can_keep_alive());
//! ```

use std::fmt;
use std::num::NonZeroU64;

use crate::chunked::{ChunkEvent, ChunkedBodyParserState};
use crate::error::{Error, ParseErrorCode};
use crate::head::{HeaderEvent, HeaderParserState};
use crate::header_table::HeaderTable;
use crate::limits::DecoderLimits;

/// 内部用ヘッダーの接頭辞
///
/// アプリケーションがプロキシ宛てに送るヘッダーで、クライアントには転送しない。
pub const SECURE_HEADER_PREFIX: &str = "!~";

/// 状態機械のフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpState {
    /// ヘッダーをパース中
    ParsingHeaders,
    /// ヘッダーのパース直後の内部状態 (呼び出し側からは観測されない)
    ParsedHeaders,
    /// レスポンスが完了した
    Complete,
    /// Content-Length で長さが決まるボディを受信中
    ParsingBodyWithLength,
    /// chunked ボディを受信中
    ParsingChunkedBody,
    /// 接続が閉じられるまで続くボディを受信中
    ParsingBodyUntilEof,
    /// 接続がアップグレードされた
    Upgraded,
    /// 100 Continue のステータスラインを受信した
    OneHundredContinue,
    /// エラーが発生した (終端状態)
    Error,
}

impl HttpState {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpState::ParsingHeaders => "PARSING_HEADERS",
            HttpState::ParsedHeaders => "PARSED_HEADERS",
            HttpState::Complete => "COMPLETE",
            HttpState::ParsingBodyWithLength => "PARSING_BODY_WITH_LENGTH",
            HttpState::ParsingChunkedBody => "PARSING_CHUNKED_BODY",
            HttpState::ParsingBodyUntilEof => "PARSING_BODY_UNTIL_EOF",
            HttpState::Upgraded => "UPGRADED",
            HttpState::OneHundredContinue => "ONEHUNDRED_CONTINUE",
            HttpState::Error => "ERROR",
        }
    }
}

impl fmt::Display for HttpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ボディの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// ボディなし
    NoBody,
    /// 接続がアップグレードされた
    Upgrade,
    /// Content-Length で指定された固定長
    ContentLength,
    /// Transfer-Encoding: chunked
    Chunked,
    /// 接続が閉じるまでがボディ
    UntilEof,
}

impl BodyType {
    /// ログ出力用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyType::NoBody => "NO_BODY",
            BodyType::Upgrade => "UPGRADE",
            BodyType::ContentLength => "CONTENT_LENGTH",
            BodyType::Chunked => "CHUNKED",
            BodyType::UntilEof => "UNTIL_EOF",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// トークナイザーの状態
///
/// ヘッダーのパース中と chunked ボディの受信中は同時に発生しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// `HttpState::ParsingHeaders` の間だけ有効
    Headers(HeaderParserState),
    /// `HttpState::ParsingChunkedBody` の間だけ有効
    ChunkedBody(ChunkedBodyParserState),
    None,
}

/// ボディの進捗、またはエラーコード
///
/// どのバリアントが入っているかは `BodyType` と `HttpState` から決まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyInfo {
    /// `BodyType::NoBody` / `BodyType::Upgrade`、またはヘッダーのパース中
    NoBody,
    /// `BodyType::ContentLength`
    ContentLength(NonZeroU64),
    /// `BodyType::Chunked`
    Chunked { end_chunk_reached: bool },
    /// `BodyType::UntilEof`
    UntilEof { end_reached: bool },
    /// `HttpState::Error`
    ParseError(ParseErrorCode),
}

/// レスポンスのボディ有無に影響するリクエスト側の情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// HEAD リクエストへのレスポンス
    pub head_request: bool,
    /// CONNECT リクエストへのレスポンス (2xx でトンネルになる)
    pub connect_request: bool,
}

/// `AppResponse::feed` が報告するイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// データをすべて消費したが、次のイベントにはまだ届かない
    NeedMore,
    /// ヘッダーを読み終えた
    ///
    /// この時点で `body_type()` が確定している。ボディがなければ
    /// `http_state()` は既に `Complete`。
    HeadersParsed,
    /// ボディデータ (chunked の場合はデコード済みのデータ)
    ///
    /// Content-Length の最後のデータを返した時点で `Complete` に遷移する。
    Body(&'a [u8]),
    /// chunked ボディの終端チャンクを読み終えた
    BodyComplete,
    /// 100 Continue を受信した
    OneHundredContinue,
    /// 接続がアップグレードされた。以降のデータは HTTP レスポンスではない
    Upgraded,
}

/// `AppResponse::feed` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feed<'a> {
    /// 消費したバイト数
    pub consumed: usize,
    pub event: Event<'a>,
}

/// バックエンドから受信中のレスポンス
#[derive(Debug, Clone)]
pub struct AppResponse {
    http_major: u8,
    http_minor: u8,
    http_state: HttpState,
    want_keep_alive: bool,
    one_hundred_continue_sent: bool,
    has_date_header: bool,
    body_type: BodyType,
    status_code: u16,
    parser_state: ParserState,
    headers: HeaderTable,
    secure_headers: HeaderTable,
    aux: BodyInfo,
    body_already_read: u64,
    request: RequestContext,
    limits: DecoderLimits,
}

impl Default for AppResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl AppResponse {
    /// 新しいレスポンス状態を作成
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    /// 制限付きでレスポンス状態を作成
    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self {
            http_major: 0,
            http_minor: 0,
            http_state: HttpState::ParsingHeaders,
            want_keep_alive: false,
            one_hundred_continue_sent: false,
            has_date_header: false,
            body_type: BodyType::NoBody,
            status_code: 0,
            parser_state: ParserState::Headers(HeaderParserState::new()),
            headers: HeaderTable::with_capacity(16),
            secure_headers: HeaderTable::with_capacity(0),
            aux: BodyInfo::NoBody,
            body_already_read: 0,
            request: RequestContext::default(),
            limits,
        }
    }

    /// リクエスト側の情報を設定 (ヘッダーを読み終える前に呼ぶ)
    pub fn set_request_context(&mut self, request: RequestContext) {
        self.request = request;
    }

    pub fn request_context(&self) -> RequestContext {
        self.request
    }

    /// 制限設定を取得
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// 接続を再利用するために初期状態へ戻す
    ///
    /// 確保済みのヘッダーテーブルの容量は保持する。
    pub fn reset(&mut self) {
        self.begin_cycle();
        self.one_hundred_continue_sent = false;
        self.request = RequestContext::default();
    }

    /// 同じ接続で次のステータスラインを待つ状態にする
    fn begin_cycle(&mut self) {
        self.http_major = 0;
        self.http_minor = 0;
        self.http_state = HttpState::ParsingHeaders;
        self.want_keep_alive = false;
        self.has_date_header = false;
        self.body_type = BodyType::NoBody;
        self.status_code = 0;
        self.parser_state = ParserState::Headers(HeaderParserState::new());
        self.headers.clear();
        self.secure_headers.clear();
        self.aux = BodyInfo::NoBody;
        self.body_already_read = 0;
    }

    /// 受信データを投入する
    ///
    /// 1 回の呼び出しで最大 1 つのイベントまで進める。呼び出し側は
    /// `consumed` バイトを捨て、残りのデータで再度呼び出す。
    ///
    /// `OneHundredContinue` 状態でデータを投入すると、同じインスタンスで
    /// 新しいレスポンスのパースを始める。
    pub fn feed<'a>(&mut self, data: &'a [u8]) -> Result<Feed<'a>, Error> {
        match self.http_state {
            HttpState::ParsingHeaders => self.feed_headers(data),
            HttpState::OneHundredContinue => {
                if data.is_empty() {
                    return Ok(Feed {
                        consumed: 0,
                        event: Event::NeedMore,
                    });
                }
                tracing::trace!("starting a new response cycle after 100 Continue");
                self.begin_cycle();
                self.feed_headers(data)
            }
            HttpState::ParsingBodyWithLength => Ok(self.feed_body_with_length(data)),
            HttpState::ParsingChunkedBody => self.feed_chunked_body(data),
            HttpState::ParsingBodyUntilEof => Ok(Feed {
                consumed: data.len(),
                event: if data.is_empty() {
                    Event::NeedMore
                } else {
                    Event::Body(data)
                },
            }),
            HttpState::Complete => Err(Error::InvalidState("response already complete")),
            HttpState::Upgraded => Err(Error::InvalidState("connection has been upgraded")),
            HttpState::ParsedHeaders => Err(Error::InvalidState("headers are being classified")),
            HttpState::Error => Err(Error::AlreadyFailed(self.parse_error_code())),
        }
    }

    /// バックエンドとの接続が閉じられたことを通知する
    ///
    /// 接続が閉じるまで続くボディはここで完了する。長さが決まっているボディや
    /// chunked ボディの途中、ヘッダーの途中であればエラーになる。
    pub fn feed_eof(&mut self) -> Result<(), Error> {
        match self.http_state {
            HttpState::ParsingBodyUntilEof => {
                self.aux = BodyInfo::UntilEof { end_reached: true };
                self.transition(HttpState::Complete);
                Ok(())
            }
            HttpState::ParsingHeaders
            | HttpState::ParsedHeaders
            | HttpState::ParsingBodyWithLength
            | HttpState::ParsingChunkedBody => Err(self.fail(Error::parse(
                ParseErrorCode::UnexpectedEof,
                format!("backend closed the connection during {}", self.http_state),
            ))),
            HttpState::Complete | HttpState::Upgraded | HttpState::OneHundredContinue => {
                // 閉じた接続は再利用できない
                self.want_keep_alive = false;
                Ok(())
            }
            HttpState::Error => Err(Error::AlreadyFailed(self.parse_error_code())),
        }
    }

    fn feed_headers<'a>(&mut self, data: &'a [u8]) -> Result<Feed<'a>, Error> {
        let mut consumed = 0;
        while consumed < data.len() {
            let ParserState::Headers(parser) = &mut self.parser_state else {
                return Err(Error::InvalidState("header parser is not active"));
            };
            let (n, event) = match parser.next_event(&data[consumed..], &self.limits) {
                Ok(v) => v,
                Err(e) => return Err(self.fail(e)),
            };
            consumed += n;
            match event {
                None => {}
                Some(HeaderEvent::StatusLine {
                    major,
                    minor,
                    status_code,
                }) => {
                    self.http_major = major;
                    self.http_minor = minor;
                    self.status_code = status_code;
                }
                Some(HeaderEvent::Header { name, value }) => {
                    if let Err(e) = self.add_header(name, value) {
                        return Err(self.fail(e));
                    }
                }
                Some(HeaderEvent::HeadersEnd) => {
                    self.transition(HttpState::ParsedHeaders);
                    let event = self.on_headers_complete()?;
                    return Ok(Feed { consumed, event });
                }
            }
        }
        Ok(Feed {
            consumed,
            event: Event::NeedMore,
        })
    }

    fn add_header(&mut self, name: String, value: String) -> Result<(), Error> {
        if let Some(stripped) = name.strip_prefix(SECURE_HEADER_PREFIX) {
            if stripped.is_empty() {
                return Err(Error::parse(
                    ParseErrorCode::MalformedHeader,
                    "invalid header line: empty secure header name",
                ));
            }
            self.secure_headers.insert(stripped, value);
            return Ok(());
        }
        if name.eq_ignore_ascii_case("Date") {
            self.has_date_header = true;
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// ヘッダー終端でボディの種類を決めて次の状態へ遷移する
    fn on_headers_complete(&mut self) -> Result<Event<'static>, Error> {
        if self.status_code == 100 {
            self.parser_state = ParserState::None;
            self.transition(HttpState::OneHundredContinue);
            return Ok(Event::OneHundredContinue);
        }

        let (body_type, aux) = match self.determine_body_type() {
            Ok(v) => v,
            Err(e) => return Err(self.fail(e)),
        };
        self.body_type = body_type;
        self.aux = aux;
        self.want_keep_alive = self.connection_wants_keep_alive()
            && !matches!(body_type, BodyType::UntilEof | BodyType::Upgrade);
        tracing::debug!(
            status_code = self.status_code,
            body_type = %body_type,
            want_keep_alive = self.want_keep_alive,
            "response headers parsed"
        );

        let (state, parser, event) = match body_type {
            BodyType::NoBody => (HttpState::Complete, ParserState::None, Event::HeadersParsed),
            BodyType::Upgrade => (HttpState::Upgraded, ParserState::None, Event::Upgraded),
            BodyType::ContentLength => (
                HttpState::ParsingBodyWithLength,
                ParserState::None,
                Event::HeadersParsed,
            ),
            BodyType::Chunked => (
                HttpState::ParsingChunkedBody,
                ParserState::ChunkedBody(ChunkedBodyParserState::new()),
                Event::HeadersParsed,
            ),
            BodyType::UntilEof => (
                HttpState::ParsingBodyUntilEof,
                ParserState::None,
                Event::HeadersParsed,
            ),
        };
        self.parser_state = parser;
        self.transition(state);
        Ok(event)
    }

    /// ボディの種類を決定
    ///
    /// RFC 9112 Section 6.3 の優先順位に従う:
    /// 1. HEAD レスポンス、1xx/204/304 はボディなし
    /// 2. 101 Switching Protocols、CONNECT への 2xx はアップグレード
    /// 3. Transfer-Encoding: chunked
    /// 4. 正の Content-Length
    /// 5. それ以外は接続が閉じるまでがボディ
    fn determine_body_type(&self) -> Result<(BodyType, BodyInfo), Error> {
        let status = self.status_code;

        if status == 101 {
            if self.request.head_request {
                return Ok((BodyType::NoBody, BodyInfo::NoBody));
            }
            if !self.headers.contains("Upgrade") {
                return Err(Error::parse(
                    ParseErrorCode::UpgradeWithoutHeader,
                    "101 response without Upgrade header",
                ));
            }
            return Ok((BodyType::Upgrade, BodyInfo::NoBody));
        }

        if self.request.head_request || !status_has_body(status) {
            return Ok((BodyType::NoBody, BodyInfo::NoBody));
        }

        if self.request.connect_request && (200..300).contains(&status) {
            return Ok((BodyType::Upgrade, BodyInfo::NoBody));
        }

        let (chunked, content_length) =
            resolve_body_headers(&self.headers, self.limits.strict_framing)?;
        if chunked {
            return Ok((
                BodyType::Chunked,
                BodyInfo::Chunked {
                    end_chunk_reached: false,
                },
            ));
        }

        match content_length {
            Some(len) => match NonZeroU64::new(len) {
                Some(len) => Ok((BodyType::ContentLength, BodyInfo::ContentLength(len))),
                None => Ok((BodyType::NoBody, BodyInfo::NoBody)),
            },
            None => Ok((
                BodyType::UntilEof,
                BodyInfo::UntilEof { end_reached: false },
            )),
        }
    }

    /// Connection ヘッダーとバージョンからキープアライブの意思を判定
    ///
    /// close トークンが最優先、次に keep-alive トークン、
    /// どちらもなければ HTTP/1.1 以降はキープアライブ。
    fn connection_wants_keep_alive(&self) -> bool {
        let mut has_keep_alive = false;
        for token in self.headers.connection_tokens() {
            if token.eq_ignore_ascii_case("close") {
                return false;
            }
            if token.eq_ignore_ascii_case("keep-alive") {
                has_keep_alive = true;
            }
        }
        has_keep_alive || (self.http_major, self.http_minor) >= (1, 1)
    }

    fn feed_body_with_length<'a>(&mut self, data: &'a [u8]) -> Feed<'a> {
        let BodyInfo::ContentLength(len) = self.aux else {
            return Feed {
                consumed: 0,
                event: Event::NeedMore,
            };
        };
        let remaining = len.get().saturating_sub(self.body_already_read);
        let n = remaining.min(data.len() as u64) as usize;
        if n == 0 {
            return Feed {
                consumed: 0,
                event: Event::NeedMore,
            };
        }
        self.body_already_read += n as u64;
        if self.body_already_read >= len.get() {
            self.transition(HttpState::Complete);
        }
        Feed {
            consumed: n,
            event: Event::Body(&data[..n]),
        }
    }

    fn feed_chunked_body<'a>(&mut self, data: &'a [u8]) -> Result<Feed<'a>, Error> {
        let ParserState::ChunkedBody(parser) = &mut self.parser_state else {
            return Err(Error::InvalidState("chunked body parser is not active"));
        };
        let (consumed, event) = match parser.next_event(data, &self.limits) {
            Ok(v) => v,
            Err(e) => return Err(self.fail(e)),
        };
        let event = match event {
            None => Event::NeedMore,
            Some(ChunkEvent::Data(chunk)) => Event::Body(chunk),
            Some(ChunkEvent::End) => {
                self.aux = BodyInfo::Chunked {
                    end_chunk_reached: true,
                };
                self.parser_state = ParserState::None;
                self.transition(HttpState::Complete);
                Event::BodyComplete
            }
        };
        Ok(Feed { consumed, event })
    }

    fn transition(&mut self, next: HttpState) {
        tracing::trace!(from = %self.http_state, to = %next, "response state transition");
        self.http_state = next;
    }

    /// ERROR 状態へ遷移してエラーを返す
    fn fail(&mut self, error: Error) -> Error {
        let Some(code) = error.code() else {
            return error;
        };
        tracing::debug!(state = %self.http_state, %error, "response parse error");
        self.http_state = HttpState::Error;
        self.aux = BodyInfo::ParseError(code);
        self.parser_state = ParserState::None;
        self.want_keep_alive = false;
        error
    }

    fn parse_error_code(&self) -> ParseErrorCode {
        match self.aux {
            BodyInfo::ParseError(code) => code,
            // ERROR 状態では必ず ParseError が入っている
            _ => ParseErrorCode::MalformedStatusLine,
        }
    }

    /// ボディをすべて読み終えたか
    pub fn body_fully_read(&self) -> bool {
        if self.http_state == HttpState::Error {
            return false;
        }
        match (self.body_type, self.aux) {
            (BodyType::NoBody, _) => true,
            (BodyType::Upgrade, _) => false,
            (BodyType::ContentLength, BodyInfo::ContentLength(len)) => {
                self.body_already_read >= len.get()
            }
            (BodyType::Chunked, BodyInfo::Chunked { end_chunk_reached }) => end_chunk_reached,
            (BodyType::UntilEof, BodyInfo::UntilEof { end_reached }) => end_reached,
            _ => false,
        }
    }

    /// ボディがあるか
    pub fn has_body(&self) -> bool {
        matches!(
            self.body_type,
            BodyType::ContentLength | BodyType::Chunked | BodyType::UntilEof
        )
    }

    /// バックエンド接続をプールに戻して再利用できるか
    pub fn can_keep_alive(&self) -> bool {
        self.want_keep_alive && self.body_fully_read()
    }

    /// ログ出力用の状態名
    pub fn http_state_str(&self) -> &'static str {
        self.http_state.as_str()
    }

    /// ログ出力用のボディ種別名
    pub fn body_type_str(&self) -> &'static str {
        self.body_type.as_str()
    }

    pub fn http_state(&self) -> HttpState {
        self.http_state
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn http_major(&self) -> u8 {
        self.http_major
    }

    pub fn http_minor(&self) -> u8 {
        self.http_minor
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn want_keep_alive(&self) -> bool {
        self.want_keep_alive
    }

    pub fn has_date_header(&self) -> bool {
        self.has_date_header
    }

    /// 100 Continue をクライアントへ転送済みか
    pub fn one_hundred_continue_sent(&self) -> bool {
        self.one_hundred_continue_sent
    }

    /// 100 Continue をクライアントへ転送したことを記録する
    pub fn mark_one_hundred_continue_sent(&mut self) {
        self.one_hundred_continue_sent = true;
    }

    /// Content-Length ボディとして読んだバイト数
    pub fn body_already_read(&self) -> u64 {
        self.body_already_read
    }

    /// Content-Length の値 (`BodyType::ContentLength` の場合のみ)
    pub fn content_length(&self) -> Option<u64> {
        match (self.body_type, self.aux) {
            (BodyType::ContentLength, BodyInfo::ContentLength(len)) => Some(len.get()),
            _ => None,
        }
    }

    /// 保存されたエラーコード (`HttpState::Error` の場合のみ)
    pub fn parse_error(&self) -> Option<ParseErrorCode> {
        match (self.http_state, self.aux) {
            (HttpState::Error, BodyInfo::ParseError(code)) => Some(code),
            _ => None,
        }
    }

    pub fn body_info(&self) -> BodyInfo {
        self.aux
    }

    pub fn parser_state(&self) -> &ParserState {
        &self.parser_state
    }

    /// 受信したヘッダー
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// 内部用ヘッダー (クライアントには転送しない)
    pub fn secure_headers(&self) -> &HeaderTable {
        &self.secure_headers
    }
}

/// ステータスコードからボディがあるかどうかを判定
fn status_has_body(status_code: u16) -> bool {
    // 1xx, 204, 304 はボディなし
    !((100..200).contains(&status_code) || status_code == 204 || status_code == 304)
}

/// ボディ関連ヘッダーを解決
///
/// `strict` の場合、chunked と Content-Length が同時にあれば優先順位で解決せずエラーにする。
/// そうでなければ chunked を優先し、Content-Length の値は検証しない。
fn resolve_body_headers(
    headers: &HeaderTable,
    strict: bool,
) -> Result<(bool, Option<u64>), Error> {
    let chunked = parse_transfer_encoding(headers)?;
    if chunked && !strict {
        return Ok((true, None));
    }

    let content_length = parse_content_length(headers)?;
    if chunked && content_length.is_some() {
        return Err(Error::parse(
            ParseErrorCode::ConflictingFraming,
            "both Transfer-Encoding and Content-Length",
        ));
    }

    Ok((chunked, content_length))
}

/// Transfer-Encoding ヘッダーを解析
///
/// RFC 9112 Section 6.1: chunked は一度だけ指定可能で、最後のコーディングでなければならない。
/// 複数の Transfer-Encoding ヘッダーは連結して単一のリストとして扱う。
fn parse_transfer_encoding(headers: &HeaderTable) -> Result<bool, Error> {
    let conflicting = |detail: &str| {
        Error::parse(
            ParseErrorCode::ConflictingFraming,
            format!("invalid Transfer-Encoding: {detail}"),
        )
    };

    let mut found = false;
    let mut last_is_chunked = false;
    for value in headers.get_all("Transfer-Encoding") {
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(conflicting("empty token"));
            }
            if last_is_chunked {
                return Err(conflicting("chunked is not the final coding"));
            }
            found = true;
            last_is_chunked = token.eq_ignore_ascii_case("chunked");
        }
    }

    if found && !last_is_chunked {
        return Err(conflicting("chunked is not the final coding"));
    }
    Ok(found)
}

/// Content-Length ヘッダーを解析
fn parse_content_length(headers: &HeaderTable) -> Result<Option<u64>, Error> {
    let mut value: Option<u64> = None;
    for raw in headers.get_all("Content-Length") {
        // RFC 9110 Section 8.6: 同じ値のリストは 1 つの値として扱える
        for item in raw.split(',') {
            let parsed = parse_content_length_value(item)?;
            match value {
                Some(prev) if prev != parsed => {
                    return Err(Error::parse(
                        ParseErrorCode::ConflictingFraming,
                        "invalid Content-Length: mismatched values",
                    ));
                }
                _ => value = Some(parsed),
            }
        }
    }
    Ok(value)
}

/// Content-Length 値をパース
fn parse_content_length_value(input: &str) -> Result<u64, Error> {
    let input = input.trim();
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse(
            ParseErrorCode::MalformedHeader,
            "invalid Content-Length: not a number",
        ));
    }
    input.parse::<u64>().map_err(|_| {
        Error::parse(
            ParseErrorCode::MalformedHeader,
            "invalid Content-Length: overflow",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_headers(input: &[u8]) -> AppResponse {
        let mut resp = AppResponse::new();
        let feed = resp.feed(input).unwrap();
        assert_eq!(feed.consumed, input.len());
        resp
    }

    #[test]
    fn state_strings() {
        assert_eq!(HttpState::ParsingHeaders.as_str(), "PARSING_HEADERS");
        assert_eq!(HttpState::OneHundredContinue.to_string(), "ONEHUNDRED_CONTINUE");
        assert_eq!(BodyType::UntilEof.as_str(), "UNTIL_EOF");
        assert_eq!(BodyType::ContentLength.to_string(), "CONTENT_LENGTH");
    }

    #[test]
    fn initial_state() {
        let resp = AppResponse::new();
        assert_eq!(resp.http_state(), HttpState::ParsingHeaders);
        assert!(matches!(resp.parser_state(), ParserState::Headers(_)));
        assert!(!resp.can_keep_alive());
        assert!(!resp.has_body());
    }

    #[test]
    fn zero_content_length_is_no_body() {
        let resp = parse_headers(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(resp.body_type(), BodyType::NoBody);
        assert_eq!(resp.http_state(), HttpState::Complete);
        assert!(resp.can_keep_alive());
    }

    #[test]
    fn head_request_has_no_body() {
        let mut resp = AppResponse::new();
        resp.set_request_context(RequestContext {
            head_request: true,
            ..RequestContext::default()
        });
        resp.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n")
            .unwrap();
        assert_eq!(resp.body_type(), BodyType::NoBody);
        assert!(resp.body_fully_read());
    }

    #[test]
    fn connect_2xx_is_tunnel() {
        let mut resp = AppResponse::new();
        resp.set_request_context(RequestContext {
            connect_request: true,
            ..RequestContext::default()
        });
        let feed = resp.feed(b"HTTP/1.1 200 Connection Established\r\n\r\n").unwrap();
        assert_eq!(feed.event, Event::Upgraded);
        assert_eq!(resp.body_type(), BodyType::Upgrade);
        assert!(!resp.can_keep_alive());
    }

    #[test]
    fn switching_protocols() {
        let mut resp = AppResponse::new();
        let feed = resp
            .feed(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Upgrade: websocket\r\nConnection: Upgrade\r\n\r\nframe",
            )
            .unwrap();
        assert_eq!(feed.event, Event::Upgraded);
        assert_eq!(resp.http_state(), HttpState::Upgraded);
        assert!(!resp.body_fully_read());
        assert!(!resp.has_body());
        assert!(resp.feed(b"frame").is_err());
        assert_eq!(resp.http_state(), HttpState::Upgraded);

        let mut resp = AppResponse::new();
        let err = resp.feed(b"HTTP/1.1 101 Switching Protocols\r\n\r\n").unwrap_err();
        assert_eq!(err.code(), Some(ParseErrorCode::UpgradeWithoutHeader));
        assert_eq!(resp.http_state(), HttpState::Error);
    }

    #[test]
    fn keep_alive_rules() {
        let resp = parse_headers(b"HTTP/1.0 204 No Content\r\n\r\n");
        assert!(!resp.want_keep_alive());

        let resp = parse_headers(b"HTTP/1.0 204 No Content\r\nConnection: keep-alive\r\n\r\n");
        assert!(resp.want_keep_alive());

        let resp =
            parse_headers(b"HTTP/1.1 204 No Content\r\nConnection: keep-alive, close\r\n\r\n");
        assert!(!resp.want_keep_alive());

        let resp = parse_headers(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(resp.body_type(), BodyType::UntilEof);
        assert!(!resp.want_keep_alive());
    }

    #[test]
    fn until_eof_completes_on_eof() {
        let mut resp = parse_headers(b"HTTP/1.0 200 OK\r\n\r\n");
        assert_eq!(resp.http_state(), HttpState::ParsingBodyUntilEof);
        let feed = resp.feed(b"some data").unwrap();
        assert_eq!(feed.event, Event::Body(b"some data"));
        assert!(!resp.body_fully_read());
        resp.feed_eof().unwrap();
        assert_eq!(resp.http_state(), HttpState::Complete);
        assert!(resp.body_fully_read());
        assert!(!resp.can_keep_alive());
    }

    #[test]
    fn secure_headers_and_date() {
        let resp = parse_headers(
            b"HTTP/1.1 204 No Content\r\n!~Backend-Id: 42\r\n\
              Date: Mon, 19 Oct 2026 00:00:00 GMT\r\n\r\n",
        );
        assert_eq!(resp.secure_headers().get("backend-id"), Some("42"));
        assert!(!resp.headers().contains("!~Backend-Id"));
        assert!(resp.has_date_header());

        let resp = parse_headers(b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(!resp.has_date_header());
    }

    #[test]
    fn empty_secure_header_name_is_error() {
        let mut resp = AppResponse::new();
        let err = resp.feed(b"HTTP/1.1 200 OK\r\n!~: x\r\n\r\n").unwrap_err();
        assert_eq!(err.code(), Some(ParseErrorCode::MalformedHeader));
    }

    #[test]
    fn conflicting_framing() {
        for input in [
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n"[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked, gzip\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n",
        ] {
            let mut resp = AppResponse::new();
            let err = resp.feed(input).unwrap_err();
            assert_eq!(err.code(), Some(ParseErrorCode::ConflictingFraming), "{input:?}");
            assert_eq!(resp.parse_error(), Some(ParseErrorCode::ConflictingFraming));
        }
    }

    #[test]
    fn lenient_framing_prefers_chunked() {
        let mut resp = AppResponse::with_limits(DecoderLimits {
            strict_framing: false,
            ..DecoderLimits::default()
        });
        resp.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap();
        assert_eq!(resp.body_type(), BodyType::Chunked);
        assert_eq!(resp.content_length(), None);
    }

    #[test]
    fn same_content_length_values_are_merged() {
        let resp = parse_headers(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5, 5\r\nContent-Length: 5\r\n\r\n",
        );
        assert_eq!(resp.content_length(), Some(5));
    }

    #[test]
    fn gzip_then_chunked_is_chunked() {
        let resp = parse_headers(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
        assert_eq!(resp.body_type(), BodyType::Chunked);
        assert!(matches!(resp.parser_state(), ParserState::ChunkedBody(_)));
    }

    #[test]
    fn eof_during_body_is_error() {
        let mut resp = parse_headers(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
        resp.feed(b"12345").unwrap();
        let err = resp.feed_eof().unwrap_err();
        assert_eq!(err.code(), Some(ParseErrorCode::UnexpectedEof));
        assert!(!resp.can_keep_alive());
        assert_eq!(
            resp.feed_eof().unwrap_err(),
            Error::AlreadyFailed(ParseErrorCode::UnexpectedEof)
        );
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut resp = parse_headers(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n");
        resp.feed(b"abc").unwrap();
        resp.mark_one_hundred_continue_sent();
        resp.reset();
        assert_eq!(resp.http_state(), HttpState::ParsingHeaders);
        assert_eq!(resp.body_type(), BodyType::NoBody);
        assert_eq!(resp.body_already_read(), 0);
        assert!(resp.headers().is_empty());
        assert!(!resp.one_hundred_continue_sent());

        resp.feed(b"HTTP/1.1 304 Not Modified\r\n\r\n").unwrap();
        assert_eq!(resp.http_state(), HttpState::Complete);
    }
}
