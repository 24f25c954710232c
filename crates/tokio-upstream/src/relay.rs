//! バックエンドのレスポンスをクライアントへ中継する
//!
//! バックエンドから読んだバイト列を `AppResponse` に投入し、イベントに応じて
//! クライアントへ書き出す。
//!
//! - ヘッダーは `encode_head` で再エンコードする (Date がなければ付与される)
//! - chunked ボディはチャンクの区切りごとそのまま転送する
//! - Content-Length と接続終了までのボディはデータ部分だけを転送する
//! - 100 Continue は 1 度だけクライアントへ転送する
//! - 103 Early Hints などの中間レスポンスは転送した後、最終レスポンスを待つ

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use upstream_http11::{
    AppResponse, BodyType, DecoderLimits, Event, HttpState, RequestContext, encode_continue,
    encode_head,
};

use crate::error::{Error, ErrorKind, Result};

/// 中継の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub status_code: u16,
    pub body_type: BodyType,
    /// クライアントへ転送したボディのバイト数 (chunked はデコード後の長さ)
    pub body_bytes: u64,
    /// バックエンド接続をプールへ戻せるか
    pub reusable: bool,
    /// レスポンスの後ろに読み込んでいたバイト列
    ///
    /// アップグレード後はトンネルの先頭データになる。
    pub leftover: Vec<u8>,
}

/// レスポンス中継の設定
#[derive(Debug, Clone)]
pub struct Relay {
    limits: DecoderLimits,
    read_buffer_size: usize,
    read_timeout: Option<Duration>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            limits: DecoderLimits::default(),
            read_buffer_size: 8192,
            read_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// パーサーの制限を設定
    pub fn limits(mut self, limits: DecoderLimits) -> Self {
        self.limits = limits;
        self
    }

    /// バックエンドからの 1 回の読み込みサイズを設定
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// 読み取りタイムアウトを設定 (None で無効)
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// この設定の制限を持つ `AppResponse` を作成
    pub fn new_response(&self, request: RequestContext) -> AppResponse {
        let mut response = AppResponse::with_limits(self.limits.clone());
        response.set_request_context(request);
        response
    }

    /// レスポンスを 1 つ中継する
    ///
    /// レスポンスが完了するか、接続がアップグレードされた時点で戻る。
    /// `response` はヘッダーを読み始める前の状態で渡すこと。
    pub async fn relay_response<B, C>(
        &self,
        backend: &mut B,
        client: &mut C,
        response: &mut AppResponse,
    ) -> Result<RelayOutcome>
    where
        B: AsyncRead + Unpin,
        C: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut pending: Vec<u8> = Vec::new();
        let mut body_bytes = 0u64;

        loop {
            let mut offset = 0;
            while offset < pending.len() && !is_finished(response.http_state()) {
                let before = response.http_state();
                let feed = response
                    .feed(&pending[offset..])
                    .map_err(|e| Error::protocol(e, response))?;
                let raw = &pending[offset..offset + feed.consumed];

                match feed.event {
                    Event::NeedMore => {}
                    Event::OneHundredContinue => {
                        if response.one_hundred_continue_sent() {
                            tracing::trace!("dropping repeated 100 Continue");
                        } else {
                            let head =
                                encode_continue(response.http_major(), response.http_minor());
                            write_client(client, &head).await?;
                            client.flush().await.map_err(Error::client_io)?;
                            response.mark_one_hundred_continue_sent();
                        }
                    }
                    Event::HeadersParsed | Event::Upgraded => {
                        write_client(client, &encode_head(response)).await?;
                    }
                    Event::Body(data) => {
                        body_bytes += data.len() as u64;
                        if before != HttpState::ParsingChunkedBody {
                            write_client(client, data).await?;
                        }
                    }
                    Event::BodyComplete => {}
                }
                // chunked はサイズ行や終端、トレーラーも含めてそのまま流す
                if before == HttpState::ParsingChunkedBody {
                    write_client(client, raw).await?;
                }

                if feed.consumed == 0 && feed.event == Event::NeedMore {
                    break;
                }
                offset += feed.consumed;

                if is_interim(response) {
                    client.flush().await.map_err(Error::client_io)?;
                    tracing::trace!(
                        status_code = response.status_code(),
                        "interim response relayed"
                    );
                    start_final_response(response);
                }
            }
            pending.drain(..offset);

            if is_finished(response.http_state()) {
                break;
            }

            let n = self.read_backend(backend, &mut buf, response).await?;
            if n == 0 {
                response
                    .feed_eof()
                    .map_err(|e| Error::protocol(e, response))?;
                if is_finished(response.http_state()) {
                    break;
                }
                return Err(Error::new(
                    ErrorKind::ConnectionClosed,
                    "backend closed the connection before sending a final response",
                )
                .annotate("http_state", response.http_state_str()));
            }
            pending.extend_from_slice(&buf[..n]);
        }

        client.flush().await.map_err(Error::client_io)?;

        let outcome = RelayOutcome {
            status_code: response.status_code(),
            body_type: response.body_type(),
            body_bytes,
            reusable: response.can_keep_alive() && pending.is_empty(),
            leftover: pending,
        };
        tracing::debug!(
            status_code = outcome.status_code,
            body_type = %outcome.body_type,
            body_bytes = outcome.body_bytes,
            reusable = outcome.reusable,
            "response relayed"
        );
        Ok(outcome)
    }

    async fn read_backend<B>(
        &self,
        backend: &mut B,
        buf: &mut [u8],
        response: &AppResponse,
    ) -> Result<usize>
    where
        B: AsyncRead + Unpin,
    {
        let result = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, backend.read(buf))
                .await
                .map_err(|_| {
                    Error::new(ErrorKind::Timeout, "backend read timed out")
                        .annotate("http_state", response.http_state_str())
                })?,
            None => backend.read(buf).await,
        };
        result.map_err(Error::backend_io)
    }
}

fn is_finished(state: HttpState) -> bool {
    matches!(state, HttpState::Complete | HttpState::Upgraded)
}

/// 100 と 101 以外の 1xx (102 Processing, 103 Early Hints など) を読み終えたか
fn is_interim(response: &AppResponse) -> bool {
    response.http_state() == HttpState::Complete && (102..200).contains(&response.status_code())
}

/// 同じリクエストに対する最終レスポンスを待つ状態に戻す
fn start_final_response(response: &mut AppResponse) {
    let request = response.request_context();
    let continue_sent = response.one_hundred_continue_sent();
    response.reset();
    response.set_request_context(request);
    if continue_sent {
        response.mark_one_hundred_continue_sent();
    }
}

async fn write_client<C>(client: &mut C, data: &[u8]) -> Result<()>
where
    C: AsyncWrite + Unpin,
{
    client.write_all(data).await.map_err(Error::client_io)
}
