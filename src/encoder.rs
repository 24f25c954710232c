//! レスポンスヘッダーの再エンコード
//!
//! リレーがクライアントへ転送するヘッダー部を組み立てる。
//! 内部用ヘッダーは含めず、Date ヘッダーがなければ補う。

use std::time::SystemTime;

use crate::app_response::{AppResponse, BodyType};

/// レスポンスのヘッダー部をエンコード
///
/// ステータスライン、受信したヘッダー (内部用ヘッダーを除く)、
/// 必要なら Date ヘッダー、空行の順に出力する。ボディは含めない。
/// chunked ボディの場合、Content-Length は転送しない (RFC 9112 Section 6.3)。
pub fn encode_head(response: &AppResponse) -> Vec<u8> {
    encode_head_at(response, SystemTime::now())
}

/// 時刻を指定してレスポンスのヘッダー部をエンコード
pub fn encode_head_at(response: &AppResponse, now: SystemTime) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line: VERSION SP STATUS-CODE SP REASON-PHRASE CRLF
    push_version(&mut buf, response.http_major(), response.http_minor());
    buf.push(b' ');
    buf.extend_from_slice(response.status_code().to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(reason_phrase(response.status_code()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    // Headers
    let chunked = response.body_type() == BodyType::Chunked;
    for (name, value) in response.headers().iter() {
        if chunked && name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    if !response.has_date_header() {
        buf.extend_from_slice(b"Date: ");
        buf.extend_from_slice(httpdate::fmt_http_date(now).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // End of headers
    buf.extend_from_slice(b"\r\n");
    buf
}

/// 100 Continue のステータスをエンコード
pub fn encode_continue(major: u8, minor: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(25);
    push_version(&mut buf, major, minor);
    buf.extend_from_slice(b" 100 Continue\r\n\r\n");
    buf
}

fn push_version(buf: &mut Vec<u8>, major: u8, minor: u8) {
    buf.extend_from_slice(b"HTTP/");
    buf.extend_from_slice(major.to_string().as_bytes());
    buf.push(b'.');
    buf.extend_from_slice(minor.to_string().as_bytes());
}

/// ステータスコードに対応する標準の reason-phrase
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Content Too Large",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        422 => "Unprocessable Content",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
