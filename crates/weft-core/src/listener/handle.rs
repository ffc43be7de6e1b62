//! ListenerHandle - 関数ごとの listener の状態（観測用）
//!
//! 状態を書き換えるのは handle を作った側（factory / decorator）だけ。
//! 外部には読み取り専用のメソッドだけを公開する。

use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

use crate::domain::{FunctionId, ListenerError, ListenerId, ListenerState};

/// Observable lifecycle of one function's listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    function: FunctionId,
    state: Arc<watch::Sender<ListenerState>>,
    fault: Arc<OnceLock<ListenerError>>,
}

impl ListenerHandle {
    pub fn new(function: FunctionId) -> Self {
        let (state, _) = watch::channel(ListenerState::Created);
        Self {
            id: ListenerId::generate(),
            function,
            state: Arc::new(state),
            fault: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch state changes (e.g. wait until `Running`).
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// The fault recorded against this function, if any.
    pub fn fault(&self) -> Option<ListenerError> {
        self.fault.get().cloned()
    }

    /// Apply `next` if it is a legal transition from the current state.
    pub(crate) fn transition(&self, next: ListenerState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Record the first fault and move to `Faulted`.
    pub(crate) fn fault_with(&self, err: ListenerError) {
        let _ = self.fault.set(err);
        self.transition(ListenerState::Faulted);
    }
}
