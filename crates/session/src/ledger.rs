//! Correlation of in-flight requests with their replies.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use edgewire_packet::{Datagram, DatagramType, ErrorCondition, Value};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

type ResultCallback = Box<dyn FnOnce(&str, Vec<Value>) + Send>;
type ErrorCallback = Box<dyn FnOnce(&str, ErrorCondition, String) + Send>;
type TimeoutCallback = Box<dyn FnOnce(&str, Duration) + Send>;

/// Continuations for one outbound request. At most one of them runs.
///
/// Unset callbacks are skipped. Callbacks run on the task that settled the
/// call (the read loop or the timer), without any ledger lock held.
#[derive(Default)]
pub struct Callbacks {
    on_result: Option<ResultCallback>,
    on_error: Option<ErrorCallback>,
    on_timeout: Option<TimeoutCallback>,
}

impl Callbacks {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs with the request id and the result arguments.
    #[must_use]
    pub fn on_result(mut self, f: impl FnOnce(&str, Vec<Value>) + Send + 'static) -> Self {
        self.on_result = Some(Box::new(f));
        self
    }

    /// Runs with the request id and the `[condition, message]` of the error.
    #[must_use]
    pub fn on_error(
        mut self,
        f: impl FnOnce(&str, ErrorCondition, String) + Send + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Runs with the request id and the timeout that elapsed.
    #[must_use]
    pub fn on_timeout(mut self, f: impl FnOnce(&str, Duration) + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(f));
        self
    }

    /// Callbacks that forward the outcome to a channel.
    ///
    /// The receiver yields `Err(RecvError)` if the callbacks are dropped
    /// unused, which happens when the ledger is cleared.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Result<Vec<Value>>>) {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let complete = move |outcome: Result<Vec<Value>>| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(outcome);
            }
        };

        let on_result = {
            let complete = complete.clone();
            move |_: &str, arguments| complete(Ok(arguments))
        };
        let on_error = {
            let complete = complete.clone();
            move |_: &str, condition, message| complete(Err(Error::Remote { condition, message }))
        };
        let on_timeout = move |_: &str, timeout| complete(Err(Error::Timeout(timeout)));

        let callbacks = Self::new()
            .on_result(on_result)
            .on_error(on_error)
            .on_timeout(on_timeout);

        (callbacks, rx)
    }
}

impl Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_result", &self.on_result.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

struct PendingCall {
    registration: u64,
    callbacks: Mutex<Callbacks>,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Concurrent table of requests awaiting a reply.
///
/// Whoever removes an entry owns its callbacks, so a reply racing its own
/// timeout settles the call exactly once.
#[derive(Clone, Default)]
pub struct CallLedger {
    pending: Arc<DashMap<String, PendingCall>>,
    next_registration: Arc<AtomicU64>,
}

impl Debug for CallLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLedger")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl CallLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks request `id` and arms its timeout.
    ///
    /// A live entry with the same id is replaced; its callbacks are dropped
    /// without running. Must be called within a tokio runtime.
    pub fn register(&self, id: impl Into<String>, timeout: Duration, callbacks: Callbacks) {
        let id = id.into();
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);

        let replaced = self.pending.insert(
            id.clone(),
            PendingCall {
                registration,
                callbacks: Mutex::new(callbacks),
                timer: None,
            },
        );
        if let Some(mut replaced) = replaced {
            replaced.cancel_timer();
            warn!(call_id = %id, "replaced pending call with the same id");
        }

        let pending = Arc::clone(&self.pending);
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let expired = pending.remove_if(&timer_id, |_, call| call.registration == registration);
            if let Some((id, call)) = expired {
                debug!(call_id = %id, ?timeout, "call timed out");
                if let Some(on_timeout) = call.callbacks.into_inner().on_timeout {
                    on_timeout(&id, timeout);
                }
            }
        });

        match self.pending.get_mut(&id) {
            Some(mut call) if call.registration == registration => {
                call.timer = Some(timer.abort_handle());
            }
            _ => timer.abort(),
        }
    }

    /// Settles the call answered by a `T_RESULT` or `T_ERROR` datagram.
    ///
    /// Returns `false`, and does nothing, if no call with that id is pending
    /// or the datagram is not a reply.
    pub fn resolve(&self, datagram: Datagram) -> bool {
        if !matches!(datagram.kind, DatagramType::Result | DatagramType::Error) {
            return false;
        }

        let Some((id, mut call)) = self.pending.remove(&datagram.id) else {
            return false;
        };
        call.cancel_timer();
        let callbacks = call.callbacks.into_inner();

        if datagram.kind == DatagramType::Result {
            if let Some(on_result) = callbacks.on_result {
                on_result(&id, datagram.arguments);
            }
        } else {
            let (condition, message) = datagram.error_parts();
            if let Some(on_error) = callbacks.on_error {
                on_error(&id, condition, message);
            }
        }
        true
    }

    /// Forgets call `id` without running any callback.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.remove(id).is_some_and(|(_, mut call)| {
            call.cancel_timer();
            true
        })
    }

    /// Forgets every call and stops every timer.
    pub fn clear(&self) {
        self.pending.retain(|_, call| {
            call.cancel_timer();
            false
        });
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether call `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }
}
