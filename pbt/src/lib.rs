//! PBT テスト共通ユーティリティ

use proptest::prelude::*;

// ========================================
// ヘッダー生成
// ========================================

fn token_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
    ]
}

/// フレーミングに影響しないヘッダー名
pub fn header_name() -> impl Strategy<Value = String> {
    proptest::collection::vec(token_char(), 1..=24)
        .prop_map(|chars| chars.into_iter().collect::<String>())
        .prop_filter("framing headers are generated separately", |name| {
            ![
                "content-length",
                "transfer-encoding",
                "connection",
                "upgrade",
                "date",
            ]
            .contains(&name.to_ascii_lowercase().as_str())
        })
}

/// 前後に空白を持たないヘッダー値
pub fn header_value() -> impl Strategy<Value = String> {
    "[!-~]([ -~]{0,30}[!-~])?".prop_map(|s| s)
}

pub fn headers() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((header_name(), header_value()), 0..8)
}

/// ボディを持てるステータスコード
pub fn status_with_body() -> impl Strategy<Value = u16> {
    prop_oneof![200u16..=203, 205u16..=206, 300u16..=303, 400u16..=451, 500u16..=511]
}

/// ボディを持てないステータスコード (100 Continue / 101 Switching Protocols を除く)
pub fn status_without_body() -> impl Strategy<Value = u16> {
    prop_oneof![102u16..=199, Just(204u16), Just(304u16)]
}

pub fn body() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 1..256)
}

/// 受信データの分割位置
pub fn split_sizes() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..=17, 1..16)
}

// ========================================
// レスポンス組み立て
// ========================================

/// ステータスラインとヘッダーからレスポンスのヘッダー部を組み立てる
pub fn build_head(minor: u8, status: u16, headers: &[(String, String)]) -> Vec<u8> {
    let mut buf = format!("HTTP/1.{minor} {status} Reason\r\n").into_bytes();
    for (name, value) in headers {
        buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    buf
}

/// ボディを chunked でエンコード
pub fn encode_chunked(body: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for chunk in body.chunks(chunk_size.max(1)) {
        buf.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        buf.extend_from_slice(chunk);
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"0\r\n\r\n");
    buf
}

/// データを `sizes` の長さで順番に (足りなければ繰り返して) 分割する
pub fn split_by<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes[i % sizes.len()].max(1).min(rest.len());
        let (head, tail) = rest.split_at(size);
        parts.push(head);
        rest = tail;
        i += 1;
    }
    parts
}
