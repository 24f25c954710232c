#![no_main]

use libfuzzer_sys::fuzz_target;
use upstream_http11::{AppResponse, DecoderLimits, HttpState, RequestContext};

fn run(resp: &mut AppResponse, mut data: &[u8]) {
    while !data.is_empty() {
        match resp.feed(data) {
            Ok(feed) => data = &data[feed.consumed..],
            Err(_) => break,
        }
    }
    let _ = resp.feed_eof();

    // 再利用できると判断したなら、ボディは必ず読み終えている
    if resp.can_keep_alive() {
        assert!(resp.body_fully_read());
        assert_ne!(resp.http_state(), HttpState::Error);
    }
    if resp.http_state() == HttpState::Error {
        assert!(resp.parse_error().is_some());
    }
}

fuzz_target!(|data: &[u8]| {
    // 通常のレスポンス
    let mut resp = AppResponse::new();
    run(&mut resp, data);

    // HEAD リクエストへのレスポンス
    resp.reset();
    resp.set_request_context(RequestContext {
        head_request: true,
        ..RequestContext::default()
    });
    run(&mut resp, data);

    // 緩いフレーミング設定
    let mut resp = AppResponse::with_limits(DecoderLimits {
        strict_framing: false,
        ..DecoderLimits::default()
    });
    run(&mut resp, data);
});
