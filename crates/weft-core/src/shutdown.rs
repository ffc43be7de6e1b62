//! Cancellation signal shared by every blocking loop.
//!
//! `watch::channel(false)` を使う。`true` を送るか、Sender を drop すると
//! 待機中のループはすべて抜ける。

use tokio::sync::watch;

/// New cancel signal: keep the sender, hand receivers to loops.
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once cancellation was requested or the sender was dropped.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Non-blocking check.
pub fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}
