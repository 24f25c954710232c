//! chunked ボディトークナイザー
//!
//! RFC 9112 Section 7.1:
//! chunked-body = *chunk last-chunk trailer-section CRLF

use crate::error::{Error, ParseErrorCode};
use crate::head::parse_header_line;
use crate::limits::DecoderLimits;

/// chunked ボディトークナイザーが報告するイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent<'a> {
    /// チャンクデータ (入力データの部分スライス)
    Data(&'a [u8]),
    /// 終端チャンクとトレーラーを読み終えた
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    /// チャンクサイズ行待ち
    Size,
    /// チャンクデータ待ち
    Data { remaining: u64 },
    /// チャンクデータ後の CR 待ち
    DataCr,
    /// チャンクデータ後の LF 待ち
    DataLf,
    /// トレーラー行待ち
    Trailer,
    /// 完了
    Done,
}

/// chunked ボディトークナイザーの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBodyParserState {
    phase: ChunkPhase,
    /// サイズ行・トレーラー行の途中までのデータ
    line: Vec<u8>,
    trailer_count: usize,
}

impl Default for ChunkedBodyParserState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedBodyParserState {
    pub fn new() -> Self {
        Self {
            phase: ChunkPhase::Size,
            line: Vec::new(),
            trailer_count: 0,
        }
    }

    /// 終端チャンクまで読み終えたか
    pub fn is_done(&self) -> bool {
        self.phase == ChunkPhase::Done
    }

    /// 次のイベントまで読み進める
    ///
    /// 戻り値は `(消費したバイト数, イベント)`。
    /// イベントに到達せずにデータを使い切った場合は `None` を返す。
    pub fn next_event<'a>(
        &mut self,
        data: &'a [u8],
        limits: &DecoderLimits,
    ) -> Result<(usize, Option<ChunkEvent<'a>>), Error> {
        let mut pos = 0;
        while pos < data.len() || matches!(self.phase, ChunkPhase::Done) {
            match self.phase {
                ChunkPhase::Size => {
                    let Some(line_end) = self.take_line(&data[pos..], limits.max_chunk_line_size)?
                    else {
                        return Ok((data.len(), None));
                    };
                    pos += line_end;
                    let size = parse_chunk_size(&std::mem::take(&mut self.line))?;
                    self.phase = if size == 0 {
                        ChunkPhase::Trailer
                    } else {
                        ChunkPhase::Data { remaining: size }
                    };
                }
                ChunkPhase::Data { remaining } => {
                    let available = (data.len() - pos) as u64;
                    let n = remaining.min(available) as usize;
                    let chunk = &data[pos..pos + n];
                    let remaining = remaining - n as u64;
                    self.phase = if remaining == 0 {
                        ChunkPhase::DataCr
                    } else {
                        ChunkPhase::Data { remaining }
                    };
                    return Ok((pos + n, Some(ChunkEvent::Data(chunk))));
                }
                ChunkPhase::DataCr => {
                    if data[pos] != b'\r' {
                        return Err(invalid_chunk("expected CRLF after chunk data"));
                    }
                    pos += 1;
                    self.phase = ChunkPhase::DataLf;
                }
                ChunkPhase::DataLf => {
                    if data[pos] != b'\n' {
                        return Err(invalid_chunk("expected CRLF after chunk data"));
                    }
                    pos += 1;
                    self.phase = ChunkPhase::Size;
                }
                ChunkPhase::Trailer => {
                    let Some(line_end) =
                        self.take_line(&data[pos..], limits.max_header_line_size)?
                    else {
                        return Ok((data.len(), None));
                    };
                    pos += line_end;
                    let line = std::mem::take(&mut self.line);
                    if line.is_empty() {
                        self.phase = ChunkPhase::Done;
                        return Ok((pos, Some(ChunkEvent::End)));
                    }
                    if self.trailer_count >= limits.max_headers_count {
                        return Err(Error::parse(
                            ParseErrorCode::TooManyHeaders,
                            format!(
                                "too many trailers: {} > {}",
                                self.trailer_count + 1,
                                limits.max_headers_count
                            ),
                        ));
                    }
                    // 不正なトレーラー行はエラーにする
                    parse_header_line(&line)?;
                    self.trailer_count += 1;
                }
                ChunkPhase::Done => {
                    return Err(Error::InvalidState("chunked body already complete"));
                }
            }
        }
        Ok((pos, None))
    }

    /// CRLF で終わる行を `self.line` に集める
    ///
    /// 行が完結したら CRLF を含めた消費バイト数を返し、`self.line` には CRLF を除いた内容が残る。
    /// 完結しなければ全データを取り込んで `None` を返す。
    fn take_line(&mut self, data: &[u8], limit: usize) -> Result<Option<usize>, Error> {
        let (consumed, complete) = match data.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (data.len(), false),
        };
        let line_size = self.line.len() + consumed;
        if line_size.saturating_sub(2) > limit {
            let code = if self.phase == ChunkPhase::Trailer {
                ParseErrorCode::HeaderTooLarge
            } else {
                ParseErrorCode::InvalidChunk
            };
            return Err(Error::parse(
                code,
                format!("chunk line too long: {} > {}", line_size, limit),
            ));
        }
        self.line.extend_from_slice(&data[..consumed]);
        if !complete {
            return Ok(None);
        }
        if !self.line.ends_with(b"\r\n") {
            return Err(invalid_chunk("bare LF line terminator"));
        }
        self.line.truncate(self.line.len() - 2);
        Ok(Some(consumed))
    }
}

/// チャンクサイズをパース (拡張は無視)
fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    let size = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    // BWS は拡張の ';' の前にだけ置ける
    let size = size.trim_ascii_end();
    if size.is_empty() || !size.iter().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid_chunk("invalid chunk size"));
    }
    // 16 進数の桁だけで構成されていることは確認済み
    let size = std::str::from_utf8(size).map_err(|_| invalid_chunk("invalid chunk size"))?;
    u64::from_str_radix(size, 16).map_err(|_| invalid_chunk("chunk size overflow"))
}

fn invalid_chunk(detail: &str) -> Error {
    Error::parse(
        ParseErrorCode::InvalidChunk,
        format!("invalid chunked encoding: {detail}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8], step: usize) -> Result<(Vec<u8>, bool), Error> {
        let limits = DecoderLimits::default();
        let mut parser = ChunkedBodyParserState::new();
        let mut body = Vec::new();
        for part in input.chunks(step) {
            let mut offset = 0;
            while offset < part.len() {
                let (n, event) = parser.next_event(&part[offset..], &limits)?;
                offset += n;
                match event {
                    Some(ChunkEvent::Data(data)) => body.extend_from_slice(data),
                    Some(ChunkEvent::End) => return Ok((body, true)),
                    None => {}
                }
            }
        }
        Ok((body, parser.is_done()))
    }

    #[test]
    fn decodes_chunks_and_terminator() {
        let input = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        assert_eq!(decode(input, 1024).unwrap(), (b"hello world".to_vec(), true));
        assert_eq!(decode(input, 1).unwrap(), (b"hello world".to_vec(), true));
    }

    #[test]
    fn accepts_trailers() {
        let input = b"3\r\nabc\r\n0\r\nX-Checksum: 42\r\n\r\n";
        assert_eq!(decode(input, 7).unwrap(), (b"abc".to_vec(), true));
    }

    #[test]
    fn incomplete_body_is_not_done() {
        let (body, done) = decode(b"5\r\nhello\r\n", 3).unwrap();
        assert_eq!(body, b"hello");
        assert!(!done);
    }

    #[test]
    fn leaves_following_bytes_unconsumed() {
        let limits = DecoderLimits::default();
        let mut parser = ChunkedBodyParserState::new();
        let input = b"0\r\n\r\nHTTP/1.1";
        let (n, event) = parser.next_event(input, &limits).unwrap();
        assert_eq!(event, Some(ChunkEvent::End));
        assert_eq!(&input[n..], b"HTTP/1.1");
    }

    #[test]
    fn invalid_chunks() {
        for input in [
            &b"zz\r\n"[..],
            b"\r\n",
            b"5\r\nhelloXX",
            b"5\n",
            b"10000000000000000\r\n",
            b"  5\r\nhello\r\n",
            b"\t5\r\nhello\r\n",
        ] {
            let err = decode(input, 2).unwrap_err();
            assert_eq!(err.code(), Some(ParseErrorCode::InvalidChunk), "{input:?}");
        }
    }

    #[test]
    fn whitespace_before_extension() {
        let input = b"5 ;name=value\r\nhello\r\n0\r\n\r\n";
        assert_eq!(decode(input, 3).unwrap(), (b"hello".to_vec(), true));
    }

    #[test]
    fn invalid_trailer_is_rejected() {
        let err = decode(b"0\r\nno colon\r\n\r\n", 64).unwrap_err();
        assert_eq!(err.code(), Some(ParseErrorCode::MalformedHeader));
    }

    #[test]
    fn chunk_line_limit() {
        let err = decode(&[b'1'; 80], 80).unwrap_err();
        assert_eq!(err.code(), Some(ParseErrorCode::InvalidChunk));
    }
}
