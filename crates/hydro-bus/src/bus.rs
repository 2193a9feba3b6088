//! `MessageBus`: synchronous topic routing.
//!
//! # Delivery
//!
//! ```text
//! publish("state.res")
//!   ├─ perception handler          (depth 1)
//!   └─ control agent handler       (depth 1)
//!        └─ publish("action.gate")
//!             └─ gate inbox        (depth 2)
//! ```
//!
//! The subscriber list of a topic is copied before delivery starts, so a
//! handler that subscribes or unsubscribes affects the next publish, never
//! the one in flight.  No `RefCell` borrow of the bus is held while a handler
//! runs.

use std::cell::{Cell, RefCell};
#[cfg(not(feature = "fx-hash"))]
use std::collections::HashMap;
use std::rc::Rc;

use hydro_core::{Payload, SimConfig, SubscriptionId, Tick};
#[cfg(feature = "fx-hash")]
use rustc_hash::FxHashMap as HashMap;
use tracing::{trace, warn};

use crate::{BusError, BusResult, Message, SharedSubscriber, Subscriber, subscriber::FnSubscriber};

/// Default bound on nested publish depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Counters accumulated over the bus lifetime.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStats {
    /// Calls to `publish`.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Publishes that found no subscriber.
    pub unrouted:  u64,
}

struct Subscription {
    id:      SubscriptionId,
    name:    String,
    handler: SharedSubscriber,
}

#[derive(Default)]
struct BusState {
    topics:  HashMap<String, Vec<Subscription>>,
    next_id: u64,
    log:     Option<Vec<Message>>,
    stats:   BusStats,
    tick:    Tick,
    dt:      f64,
}

/// In-process publish/subscribe hub.  Owned by one simulation instance.
pub struct MessageBus {
    state:     RefCell<BusState>,
    depth:     Cell<usize>,
    max_depth: usize,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            state:     RefCell::new(BusState { dt: 1.0, ..BusState::default() }),
            depth:     Cell::new(0),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bus honouring `retain_message_log` and `max_cascade_depth`.
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new()
            .with_log(config.retain_message_log)
            .with_max_depth(config.max_cascade_depth)
    }

    /// Keep every published message in an append-only log.
    pub fn with_log(self, enabled: bool) -> Self {
        self.state.borrow_mut().log = enabled.then(Vec::new);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    // ── Clock ─────────────────────────────────────────────────────────────

    /// Set the tick stamped on subsequent messages.  Called by the harness.
    pub fn set_clock(&self, tick: Tick, dt_secs: f64) {
        let mut st = self.state.borrow_mut();
        st.tick = tick;
        st.dt = dt_secs;
    }

    pub fn tick(&self) -> Tick {
        self.state.borrow().tick
    }

    pub fn dt(&self) -> f64 {
        self.state.borrow().dt
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Register `handler` on `topic`.  Delivery follows subscription order.
    ///
    /// The same handler may be subscribed to several topics.
    pub fn subscribe(&self, topic: impl Into<String>, handler: SharedSubscriber) -> SubscriptionId {
        let name = handler
            .try_borrow()
            .map(|h| h.subscriber_id().to_owned())
            .unwrap_or_else(|_| String::from("<busy>"));
        let mut st = self.state.borrow_mut();
        let id = SubscriptionId(st.next_id);
        st.next_id += 1;
        st.topics.entry(topic.into()).or_default().push(Subscription { id, name, handler });
        id
    }

    /// Register a closure on `topic`.
    pub fn subscribe_fn<F>(&self, topic: impl Into<String>, name: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: FnMut(&Message, &MessageBus) -> BusResult<()> + 'static,
    {
        let sub: Rc<RefCell<dyn Subscriber>> = Rc::new(RefCell::new(FnSubscriber::new(name, handler)));
        self.subscribe(topic, sub)
    }

    /// Remove a subscription.  Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut st = self.state.borrow_mut();
        let mut removed = false;
        st.topics.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state.borrow().topics.get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.borrow().topics.keys().cloned().collect();
        topics.sort_unstable();
        topics
    }

    // ── Publishing ────────────────────────────────────────────────────────

    /// Deliver `payload` to every subscriber of `topic` before returning.
    ///
    /// Returns the number of handlers invoked.  A topic with no subscriber is
    /// a no-op that returns `Ok(0)`.  The first handler error aborts the
    /// remaining deliveries of this publish and propagates to the caller.
    pub fn publish(&self, topic: &str, payload: Payload) -> BusResult<usize> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(BusError::CascadeTooDeep { topic: topic.to_owned(), limit: self.max_depth });
        }

        let (msg, targets) = {
            let mut st = self.state.borrow_mut();
            st.stats.published += 1;
            let msg = Message::new(topic, payload, st.tick);
            if let Some(log) = st.log.as_mut() {
                log.push(msg.clone());
            }
            let targets: Vec<(String, SharedSubscriber)> = st
                .topics
                .get(topic)
                .map(|subs| subs.iter().map(|s| (s.name.clone(), Rc::clone(&s.handler))).collect())
                .unwrap_or_default();
            if targets.is_empty() {
                st.stats.unrouted += 1;
            }
            (msg, targets)
        };

        if targets.is_empty() {
            trace!(topic, tick = msg.published_tick.0, "publish with no subscribers");
            return Ok(0);
        }

        self.depth.set(depth + 1);
        let result = self.deliver(&msg, &targets);
        self.depth.set(depth);
        result
    }

    fn deliver(&self, msg: &Message, targets: &[(String, SharedSubscriber)]) -> BusResult<usize> {
        let mut delivered = 0;
        for (name, handler) in targets {
            let Ok(mut sub) = handler.try_borrow_mut() else {
                warn!(subscriber = %name, topic = %msg.topic, "re-entrant delivery refused");
                return Err(BusError::Reentrant { subscriber: name.clone(), topic: msg.topic.clone() });
            };
            sub.on_message(msg, self).map_err(|e| match e {
                BusError::Rejected(reason) => {
                    BusError::Handler { subscriber: name.clone(), topic: msg.topic.clone(), reason }
                }
                nested => nested,
            })?;
            delivered += 1;
            self.state.borrow_mut().stats.delivered += 1;
        }
        Ok(delivered)
    }

    // ── Introspection ─────────────────────────────────────────────────────

    pub fn stats(&self) -> BusStats {
        self.state.borrow().stats
    }

    /// Copy of the message log; empty when logging is disabled.
    pub fn message_log(&self) -> Vec<Message> {
        self.state.borrow().log.clone().unwrap_or_default()
    }

    /// Number of logged messages.
    pub fn log_len(&self) -> usize {
        self.state.borrow().log.as_ref().map_or(0, Vec::len)
    }

    pub fn is_logging(&self) -> bool {
        self.state.borrow().log.is_some()
    }

    /// Current nesting depth (0 outside any delivery).
    pub fn depth(&self) -> usize {
        self.depth.get()
    }
}
