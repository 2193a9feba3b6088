//! Per-component message inboxes.
//!
//! One subscriber serves every component: it is subscribed once per distinct
//! input topic and fans each message out to the components listening on it.
//! Messages wait here until the component's turn in the physical phase.

use std::mem;
#[cfg(not(feature = "fx-hash"))]
use std::collections::HashMap;

use hydro_bus::{BusResult, Message, MessageBus, Subscriber};
use hydro_core::{ComponentIdx, Payload};
#[cfg(feature = "fx-hash")]
use rustc_hash::FxHashMap as HashMap;

pub(crate) const INBOX_ID: &str = "component-inbox";

#[derive(Default)]
pub(crate) struct ComponentInbox {
    routes:  HashMap<String, Vec<ComponentIdx>>,
    pending: Vec<Vec<(String, Payload)>>,
}

impl ComponentInbox {
    pub(crate) fn new(component_count: usize) -> Self {
        Self { routes: HashMap::default(), pending: vec![Vec::new(); component_count] }
    }

    /// Route `topic` to `idx`.  Returns `true` when the topic is new (the
    /// caller must subscribe the inbox to it).
    pub(crate) fn route(&mut self, topic: &str, idx: ComponentIdx) -> bool {
        match self.routes.get_mut(topic) {
            Some(targets) => {
                if !targets.contains(&idx) {
                    targets.push(idx);
                }
                false
            }
            None => {
                self.routes.insert(topic.to_owned(), vec![idx]);
                true
            }
        }
    }

    /// Take every message buffered for `idx`, in arrival order.
    pub(crate) fn drain(&mut self, idx: ComponentIdx) -> Vec<(String, Payload)> {
        mem::take(&mut self.pending[idx.index()])
    }
}

impl Subscriber for ComponentInbox {
    fn subscriber_id(&self) -> &str {
        INBOX_ID
    }

    fn on_message(&mut self, msg: &Message, _bus: &MessageBus) -> BusResult<()> {
        if let Some(targets) = self.routes.get(&msg.topic) {
            for idx in targets {
                self.pending[idx.index()].push((msg.topic.clone(), msg.payload.clone()));
            }
        }
        Ok(())
    }
}
