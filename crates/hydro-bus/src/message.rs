use hydro_core::{Payload, Tick};

/// One published message.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub topic:          String,
    pub payload:        Payload,
    /// Tick of the bus clock when `publish` was called.
    pub published_tick: Tick,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Payload, published_tick: Tick) -> Self {
        Self { topic: topic.into(), payload, published_tick }
    }

    /// Last dot-separated segment of the topic (`"command.gate_1.opening"` → `"opening"`).
    pub fn leaf(&self) -> &str {
        Self::leaf_of(&self.topic)
    }

    /// [`Message::leaf`] for a bare topic string.
    pub fn leaf_of(topic: &str) -> &str {
        topic.rsplit('.').next().unwrap_or(topic)
    }
}
