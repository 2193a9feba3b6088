//! Subscriber contract.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{BusResult, Message, MessageBus};

/// Anything that can receive messages.
///
/// `on_message` gets the bus back so the handler can publish follow-up
/// messages synchronously.
pub trait Subscriber {
    /// Name used in logs and error reports.
    fn subscriber_id(&self) -> &str;

    fn on_message(&mut self, msg: &Message, bus: &MessageBus) -> BusResult<()>;
}

/// Handle stored by the bus.  The owner keeps another clone to drive the
/// subscriber outside message delivery (e.g. an agent's `run`).
pub type SharedSubscriber = Rc<RefCell<dyn Subscriber>>;

/// Wrap a concrete subscriber for [`MessageBus::subscribe`].
pub fn shared<S: Subscriber + 'static>(subscriber: S) -> Rc<RefCell<S>> {
    Rc::new(RefCell::new(subscriber))
}

/// Closure adapter used by [`MessageBus::subscribe_fn`].
pub struct FnSubscriber<F> {
    name:    String,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: FnMut(&Message, &MessageBus) -> BusResult<()>,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self { name: name.into(), handler }
    }
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: FnMut(&Message, &MessageBus) -> BusResult<()>,
{
    fn subscriber_id(&self) -> &str {
        &self.name
    }

    fn on_message(&mut self, msg: &Message, bus: &MessageBus) -> BusResult<()> {
        (self.handler)(msg, bus)
    }
}
