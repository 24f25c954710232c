//! ヘッダートークナイザー
//!
//! ネットワークから届いた任意の長さのデータを受け取り、
//! 完結した行ごとに構造イベントを返す。1 バイトずつ投入しても
//! まとめて投入しても同じイベント列になる。

use crate::error::{Error, ParseErrorCode};
use crate::limits::DecoderLimits;

/// ヘッダートークナイザーが報告するイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEvent {
    /// ステータスラインをパースした
    StatusLine {
        major: u8,
        minor: u8,
        status_code: u16,
    },
    /// ヘッダーを 1 つパースした
    Header { name: String, value: String },
    /// 空行に到達した
    HeadersEnd,
}

/// ヘッダートークナイザーの状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderParserState {
    /// 行の途中までのデータ
    line: Vec<u8>,
    status_line_seen: bool,
    header_count: usize,
    /// ステータスラインからの累計バイト数
    head_size: usize,
}

impl HeaderParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次のイベントまで読み進める
    ///
    /// 戻り値は `(消費したバイト数, イベント)`。
    /// 行が完結しなかった場合は全データを消費して `None` を返す。
    /// `HeadersEnd` を返した後に渡されたデータは消費しない。
    pub fn next_event(
        &mut self,
        data: &[u8],
        limits: &DecoderLimits,
    ) -> Result<(usize, Option<HeaderEvent>), Error> {
        let (consumed, complete) = match data.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (data.len(), false),
        };

        self.head_size = self.head_size.saturating_add(consumed);
        if self.head_size > limits.max_head_size {
            return Err(Error::parse(
                ParseErrorCode::HeaderTooLarge,
                format!(
                    "response head too large: {} > {}",
                    self.head_size, limits.max_head_size
                ),
            ));
        }

        // CRLF の 2 バイトは行長に含めない
        let line_size = self.line.len() + consumed;
        if line_size.saturating_sub(2) > limits.max_header_line_size {
            return Err(Error::parse(
                ParseErrorCode::HeaderTooLarge,
                format!(
                    "header line too long: {} > {}",
                    line_size, limits.max_header_line_size
                ),
            ));
        }

        self.line.extend_from_slice(&data[..consumed]);
        if !complete {
            return Ok((consumed, None));
        }

        let line = std::mem::take(&mut self.line);
        let line = line
            .strip_suffix(b"\r\n")
            .ok_or_else(|| self.line_error("bare LF line terminator"))?;

        let event = if !self.status_line_seen {
            let (major, minor, status_code) = parse_status_line(line)?;
            self.status_line_seen = true;
            HeaderEvent::StatusLine {
                major,
                minor,
                status_code,
            }
        } else if line.is_empty() {
            HeaderEvent::HeadersEnd
        } else {
            if self.header_count >= limits.max_headers_count {
                return Err(Error::parse(
                    ParseErrorCode::TooManyHeaders,
                    format!(
                        "too many headers: {} > {}",
                        self.header_count + 1,
                        limits.max_headers_count
                    ),
                ));
            }
            let (name, value) = parse_header_line(line)?;
            self.header_count += 1;
            HeaderEvent::Header { name, value }
        };

        Ok((consumed, Some(event)))
    }

    fn line_error(&self, detail: &str) -> Error {
        let code = if self.status_line_seen {
            ParseErrorCode::MalformedHeader
        } else {
            ParseErrorCode::MalformedStatusLine
        };
        Error::parse(code, detail)
    }
}

/// ステータスラインをパース
///
/// RFC 9112 Section 4:
/// status-line = HTTP-version SP status-code SP [ reason-phrase ]
///
/// reason-phrase は obs-text を含み得るため、バイト列のまま検証する。
fn parse_status_line(line: &[u8]) -> Result<(u8, u8, u16), Error> {
    let malformed = |detail: String| Error::parse(ParseErrorCode::MalformedStatusLine, detail);

    let mut parts = line.splitn(3, |&b| b == b' ');
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default();

    let (major, minor) = match version {
        b"HTTP/1.0" => (1, 0),
        b"HTTP/1.1" => (1, 1),
        _ => {
            return Err(malformed(format!(
                "unsupported HTTP version: {}",
                String::from_utf8_lossy(version)
            )));
        }
    };

    if status.len() != 3 || !status.iter().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!(
            "invalid status code: {}",
            String::from_utf8_lossy(status)
        )));
    }
    let status_code = status
        .iter()
        .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'));
    if !(100..=599).contains(&status_code) {
        return Err(malformed(format!("status code out of range: {status_code}")));
    }

    if !is_valid_reason_phrase(reason) {
        return Err(malformed("invalid reason phrase".to_string()));
    }

    Ok((major, minor, status_code))
}

/// ヘッダー行をパース
///
/// 値に含まれる obs-text (0x80-0xFF) は受け付ける。UTF-8 として不正な
/// バイトは U+FFFD に置き換えて保持する。
pub(crate) fn parse_header_line(line: &[u8]) -> Result<(String, String), Error> {
    let malformed = |detail: &str| {
        Error::parse(
            ParseErrorCode::MalformedHeader,
            format!("invalid header line: {detail}"),
        )
    };

    if line.starts_with(b" ") || line.starts_with(b"\t") {
        return Err(malformed("obs-fold"));
    }
    if line.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(malformed("contains CR/LF"));
    }

    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| malformed("missing colon"))?;
    let (name, value) = (&line[..colon], &line[colon + 1..]);
    if name.is_empty() {
        return Err(malformed("empty name"));
    }
    if !is_valid_header_name(name) {
        return Err(malformed("invalid name"));
    }

    // ヘッダー値の検証 (RFC 9110 Section 5.5)
    let value = trim_ows(value);
    if !value.iter().copied().all(is_valid_field_vchar) {
        return Err(malformed("invalid value (contains control characters)"));
    }

    // トークン文字は ASCII のみなので名前はそのまま文字列になる
    let name = String::from_utf8_lossy(name).into_owned();
    let value = String::from_utf8_lossy(value).into_owned();
    Ok((name, value))
}

/// 前後の SP / HTAB を取り除く
fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

/// ヘッダー名が有効か確認
fn is_valid_header_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().copied().all(is_token_char)
}

/// トークン文字か確認
fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~'
    )
}

/// ヘッダー値に許可される文字か確認 (RFC 9110 Section 5.5)
///
/// field-vchar = VCHAR / obs-text に加えて SP と HTAB を許可する
fn is_valid_field_vchar(b: u8) -> bool {
    matches!(b, 0x09 | 0x20..=0x7E | 0x80..=0xFF)
}

/// reason-phrase が有効か確認 (RFC 9112 Section 4)
fn is_valid_reason_phrase(phrase: &[u8]) -> bool {
    phrase.iter().copied().all(is_valid_field_vchar)
}
