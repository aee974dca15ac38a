//! Capability for handing a message back to the dispatcher.

use std::sync::Arc;

use crate::message::Message;

/// Anything that accepts messages for asynchronous dispatch.
///
/// Implementations must return immediately and never panic; a sink that is
/// shutting down drops the message.
pub trait MessageSink: Send + Sync {
    fn manage(&self, message: Message);
}

impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    fn manage(&self, message: Message) {
        (**self).manage(message)
    }
}
