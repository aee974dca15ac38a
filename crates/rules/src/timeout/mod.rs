//! Cancellable one-shot timers shared by all rule instances.
//!
//! A rule registers a [`TimeoutCallback`] with a delay and an opaque payload.
//! When the delay elapses the callback runs with [`TimeoutReason::Timeout`];
//! if the timer is cancelled first it runs with [`TimeoutReason::Cancelled`].
//! Either way it runs exactly once. A message returned by the callback is
//! handed to the registered [`MessageSink`](beast_core::MessageSink), which
//! is how rules re-inject synthetic events into the pipeline.

mod manager;


use std::any::Any;

use beast_core::Message;

pub use self::manager::TimeoutManager;

/// Identifier handed out by [`TimeoutManager::register`]. Monotonically increasing.
pub type TimeoutId = u64;

/// Opaque payload carried from `register` to the callback.
pub type TimeoutData = Box<dyn Any + Send>;

/// Why a timeout callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutReason {
    /// The delay elapsed.
    Timeout,
    /// [`TimeoutManager::cancel`] won the race against expiry.
    Cancelled,
}

/// Receiver of timer expiry and cancellation.
pub trait TimeoutCallback: Send + Sync {
    /// Called exactly once per registered id. Must not block on locks held by
    /// the code that calls `cancel`.
    fn timeout(&self, id: TimeoutId, reason: TimeoutReason, data: Option<TimeoutData>)
        -> Option<Message>;
}
