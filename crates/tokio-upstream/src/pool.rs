//! アイドル状態のバックエンド接続を保持するプール

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use upstream_http11::AppResponse;

/// 再利用可能なバックエンド接続のプール
///
/// 取り出しは最後に戻した接続から行う。
#[derive(Debug)]
pub struct ConnectionPool<C> {
    idle: Mutex<VecDeque<C>>,
    max_idle: usize,
}

impl<C> ConnectionPool<C> {
    /// 最大 `max_idle` 本のアイドル接続を保持するプールを作成
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// アイドル接続を取り出す
    pub fn checkout(&self) -> Option<C> {
        let conn = self.lock().pop_back();
        tracing::trace!(hit = conn.is_some(), "connection pool checkout");
        conn
    }

    /// レスポンスを読み終えた接続を戻す
    ///
    /// `can_keep_alive()` でない接続やプールが満杯の場合は受け取らずに捨てる。
    /// 戻した場合は true を返す。
    pub fn checkin(&self, conn: C, response: &AppResponse) -> bool {
        if !response.can_keep_alive() {
            tracing::debug!(
                http_state = response.http_state_str(),
                want_keep_alive = response.want_keep_alive(),
                "discarding backend connection"
            );
            return false;
        }
        let mut idle = self.lock();
        if idle.len() >= self.max_idle {
            tracing::debug!(max_idle = self.max_idle, "connection pool is full");
            return false;
        }
        idle.push_back(conn);
        true
    }

    /// アイドル接続の数
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<C>> {
        // 中身は接続のキューだけなので、パニック後も使い続けて問題ない
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}
