//! tokio_upstream - Tokio integration for upstream_http11
//!
//! アプリケーションサーバー (バックエンド) のレスポンスを受信し、
//! クライアントへ中継するための非同期ライブラリ。
//!
//! ## 特徴
//!
//! - **upstream_http11 ベース**: Sans I/O の `AppResponse` をそのまま駆動する
//! - **TCP / Unix ドメインソケット**: ローカルのバックエンドに接続する
//! - **Keep-Alive**: 再利用できる接続だけをプールへ戻す
//!
//! ## 使い方
//!
//! ```ignore
//! use std::time::Duration;
//! use tokio::io::AsyncWriteExt;
//! use tokio_upstream::{BackendAddress, BackendConnection, ConnectionPool, Relay};
//! use upstream_http11::RequestContext;
//!
//! let address: BackendAddress = "unix:/tmp/app.sock".parse()?;
//! let pool = ConnectionPool::new(8);
//! let relay = Relay::new();
//!
//! let mut backend = match pool.checkout() {
//!     Some(conn) => conn,
//!     None => BackendConnection::connect(&address, Duration::from_secs(5)).await?,
//! };
//! backend.write_all(b"GET / HTTP/1.1\r\nHost: app\r\n\r\n").await?;
//!
//! let mut response = relay.new_response(RequestContext::default());
//! let outcome = relay.relay_response(&mut backend, &mut client, &mut response).await?;
//! if outcome.reusable {
//!     pool.checkin(backend, &response);
//! }
//! ```

mod connection;
mod error;
mod pool;
mod relay;

pub use connection::{BackendAddress, BackendConnection};
pub use error::{Error, ErrorKind, Result};
pub use pool::ConnectionPool;
pub use relay::{Relay, RelayOutcome};

// Re-export upstream_http11 types
pub use upstream_http11::{AppResponse, BodyType, DecoderLimits, HttpState, RequestContext};
