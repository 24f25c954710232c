//! # upstream_http11
//!
//! バックエンドのアプリケーションプロセスから届く HTTP/1.x レスポンスの
//! フレーミングを逐次追跡するライブラリ (Sans I/O)
//!
//! ## 特徴
//!
//! - **Sans I/O**: I/O を完全に分離した設計
//! - **逐次処理**: 任意の長さに分割されたデータをそのまま投入できる
//! - **厳格なフレーミング**: 曖昧な Transfer-Encoding / Content-Length はエラーにする
//! - **小さな状態**: 接続ごとに 1 つ保持する前提
//!
//! ## 使い方
//!
//! ```rust
//! use upstream_http11::{AppResponse, Event, HttpState};
//!
//! let mut resp = AppResponse::new();
//! let mut data: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
//! let mut body = Vec::new();
//!
//! while resp.http_state() != HttpState::Complete {
//!     let feed = resp.feed(data).unwrap();
//!     if let Event::Body(chunk) = feed.event {
//!         body.extend_from_slice(chunk);
//!     }
//!     data = &data[feed.consumed..];
//! }
//!
//! assert_eq!(body, b"hello");
//! assert!(resp.can_keep_alive());
//! ```

mod app_response;
mod chunked;
mod encoder;
mod error;
mod head;
mod header_table;
mod limits;

pub use app_response::{
    AppResponse, BodyInfo, BodyType, Event, Feed, HttpState, ParserState, RequestContext,
    SECURE_HEADER_PREFIX,
};
pub use chunked::{ChunkEvent, ChunkedBodyParserState};
pub use encoder::{encode_continue, encode_head, encode_head_at, reason_phrase};
pub use error::{Error, ParseErrorCode};
pub use head::{HeaderEvent, HeaderParserState};
pub use header_table::HeaderTable;
pub use limits::DecoderLimits;
