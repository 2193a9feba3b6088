//! `hydro-bus`: the in-process message bus.
//!
//! `publish` calls every subscriber of a topic, in subscription order, before
//! it returns.  A handler may publish in turn; the nested delivery completes
//! inside the outer one, so a perception → control → actuator chain resolves
//! within a single call stack.  There is no queue, no thread, and no
//! persistence beyond an optional in-memory log.
//!
//! | Module         | Contents                                              |
//! |----------------|-------------------------------------------------------|
//! | [`bus`]        | `MessageBus`, `BusStats`                              |
//! | [`message`]    | `Message`                                             |
//! | [`subscriber`] | `Subscriber` trait, `SharedSubscriber`, `FnSubscriber` |
//! | [`error`]      | `BusError`, `BusResult`                               |

pub mod bus;
pub mod error;
pub mod message;
pub mod subscriber;

#[cfg(test)]
mod tests;

pub use bus::{BusStats, DEFAULT_MAX_DEPTH, MessageBus};
pub use error::{BusError, BusResult};
pub use message::Message;
pub use subscriber::{FnSubscriber, SharedSubscriber, Subscriber, shared};
