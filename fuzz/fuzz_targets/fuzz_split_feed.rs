#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use upstream_http11::{AppResponse, Event};

#[derive(Arbitrary, Debug)]
struct FuzzSplit {
    data: Vec<u8>,
    split_hint: u8,
}

/// 結果を比較できる形にまとめる
fn decode(data: &[u8], split_size: usize) -> (Vec<u8>, Option<String>, String, String) {
    let mut resp = AppResponse::new();
    let mut body = Vec::new();
    let mut error = None;
    'outer: for part in data.chunks(split_size) {
        let mut rest = part;
        while !rest.is_empty() {
            match resp.feed(rest) {
                Ok(feed) => {
                    if let Event::Body(chunk) = feed.event {
                        body.extend_from_slice(chunk);
                    }
                    rest = &rest[feed.consumed..];
                }
                Err(e) => {
                    error = e.code().map(|c| c.to_string());
                    break 'outer;
                }
            }
        }
    }
    (
        body,
        error,
        resp.http_state_str().to_string(),
        resp.body_type_str().to_string(),
    )
}

fuzz_target!(|input: FuzzSplit| {
    if input.data.is_empty() {
        return;
    }
    let split_size = (input.split_hint as usize % 32) + 1;
    let whole = decode(&input.data, input.data.len());
    let split = decode(&input.data, split_size);
    assert_eq!(whole, split);
});
