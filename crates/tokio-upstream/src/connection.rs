//! バックエンド接続
//!
//! アプリケーションサーバーへの接続は TCP または Unix ドメインソケット。
//!
//! ```ignore
//! use tokio_upstream::{BackendAddress, BackendConnection};
//!
//! let address: BackendAddress = "unix:/tmp/app.sock".parse()?;
//! let conn = BackendConnection::connect(&address, Duration::from_secs(5)).await?;
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

/// バックエンドのアドレス
///
/// `tcp://host:port` または `unix:/path/to/socket` 形式で指定する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendAddress {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for BackendAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("tcp://") {
            if rest.is_empty() || !rest.contains(':') {
                return Err(Error::new(
                    ErrorKind::InvalidAddress,
                    "tcp address must be host:port",
                )
                .annotate("address", s));
            }
            return Ok(BackendAddress::Tcp(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("unix:") {
            if rest.is_empty() {
                return Err(
                    Error::new(ErrorKind::InvalidAddress, "empty unix socket path")
                        .annotate("address", s),
                );
            }
            return Ok(BackendAddress::Unix(PathBuf::from(rest)));
        }
        Err(
            Error::new(ErrorKind::InvalidAddress, "unsupported address scheme")
                .annotate("address", s),
        )
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendAddress::Tcp(addr) => write!(f, "tcp://{}", addr),
            BackendAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

enum BackendStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// バックエンドへの接続
///
/// TCP と Unix ドメインソケットを同じように読み書きできる。
pub struct BackendConnection {
    stream: BackendStream,
    address: BackendAddress,
}

impl BackendConnection {
    /// 接続を確立
    pub async fn connect(address: &BackendAddress, timeout: Duration) -> Result<Self> {
        let stream = match address {
            BackendAddress::Tcp(addr) => {
                let stream = tokio::time::timeout(timeout, TcpStream::connect(addr.as_str()))
                    .await
                    .map_err(|_| connect_timeout(address))?
                    .map_err(|e| Error::backend_io(e).annotate("address", address.to_string()))?;
                stream
                    .set_nodelay(true)
                    .map_err(|e| Error::backend_io(e).annotate("address", address.to_string()))?;
                BackendStream::Tcp(stream)
            }
            #[cfg(unix)]
            BackendAddress::Unix(path) => {
                let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
                    .await
                    .map_err(|_| connect_timeout(address))?
                    .map_err(|e| Error::backend_io(e).annotate("address", address.to_string()))?;
                BackendStream::Unix(stream)
            }
            #[cfg(not(unix))]
            BackendAddress::Unix(_) => {
                return Err(Error::new(
                    ErrorKind::InvalidAddress,
                    "unix sockets are not supported on this platform",
                )
                .annotate("address", address.to_string()));
            }
        };
        tracing::debug!(address = %address, "connected to backend");
        Ok(Self {
            stream,
            address: address.clone(),
        })
    }

    /// 接続先アドレス
    pub fn address(&self) -> &BackendAddress {
        &self.address
    }
}

fn connect_timeout(address: &BackendAddress) -> Error {
    Error::new(ErrorKind::Timeout, "backend connect timed out")
        .annotate("address", address.to_string())
}

impl fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConnection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for BackendConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            BackendStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            BackendStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BackendConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().stream {
            BackendStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            BackendStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            BackendStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            BackendStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().stream {
            BackendStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            BackendStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
