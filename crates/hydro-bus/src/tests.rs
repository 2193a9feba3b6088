//! Unit tests for hydro-bus.

#[cfg(test)]
mod delivery {
    use std::cell::RefCell;
    use std::rc::Rc;

    use hydro_core::{Payload, Tick};

    use crate::{BusError, Message, MessageBus};

    fn recorder(bus: &MessageBus, topic: &str, name: &str, log: &Rc<RefCell<Vec<String>>>) {
        let log = Rc::clone(log);
        let tag = name.to_owned();
        bus.subscribe_fn(topic, name, move |msg: &Message, _: &MessageBus| {
            log.borrow_mut().push(format!("{tag}:{}", msg.topic));
            Ok(())
        });
    }

    #[test]
    fn fan_out_in_subscription_order() {
        let bus = MessageBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["h1", "h2", "h3"] {
            recorder(&bus, "t", name, &log);
        }
        assert_eq!(bus.publish("t", Payload::scalar(1.0)).unwrap(), 3);
        assert_eq!(*log.borrow(), ["h1:t", "h2:t", "h3:t"]);
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = MessageBus::new();
        assert_eq!(bus.publish("nobody.listens", Payload::scalar(1.0)).unwrap(), 0);
        let stats = bus.stats();
        assert_eq!((stats.published, stats.delivered, stats.unrouted), (1, 0, 1));
    }

    #[test]
    fn cascade_completes_before_outer_publish_returns() {
        let bus = MessageBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.subscribe_fn("state", "controller", |_: &Message, bus: &MessageBus| {
            bus.publish("action", Payload::scalar(0.5)).map(|_| ())
        });
        recorder(&bus, "action", "actuator", &log);
        recorder(&bus, "state", "monitor", &log);

        bus.publish("state", Payload::scalar(10.0)).unwrap();
        // The nested delivery to the actuator happens before the second
        // subscriber of "state" runs.
        assert_eq!(*log.borrow(), ["actuator:action", "monitor:state"]);
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn messages_carry_the_bus_tick() {
        let bus = MessageBus::new().with_log(true);
        bus.set_clock(Tick(7), 0.5);
        bus.publish("a", Payload::scalar(1.0)).unwrap();
        let log = bus.message_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].published_tick, Tick(7));
        assert_eq!(bus.dt(), 0.5);
    }

    #[test]
    fn log_disabled_by_default() {
        let bus = MessageBus::new();
        bus.publish("a", Payload::new()).unwrap();
        assert!(!bus.is_logging());
        assert_eq!(bus.log_len(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = MessageBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let id = bus.subscribe_fn("t", "once", move |_: &Message, _: &MessageBus| {
            l.borrow_mut().push("hit".to_owned());
            Ok(())
        });
        bus.publish("t", Payload::new()).unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish("t", Payload::new()).unwrap(), 0);
        assert_eq!(log.borrow().len(), 1);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn handler_rejection_names_the_subscriber() {
        let bus = MessageBus::new();
        bus.subscribe_fn("t", "picky", |_: &Message, _: &MessageBus| Err(BusError::rejected("bad value")));
        let err = bus.publish("t", Payload::new()).unwrap_err();
        assert_eq!(err, BusError::Handler {
            subscriber: "picky".into(),
            topic:      "t".into(),
            reason:     "bad value".into(),
        });
    }

    #[test]
    fn nested_failure_keeps_innermost_offender() {
        let bus = MessageBus::new();
        bus.subscribe_fn("outer", "relay", |_: &Message, bus: &MessageBus| {
            bus.publish("inner", Payload::new()).map(|_| ())
        });
        bus.subscribe_fn("inner", "sink", |_: &Message, _: &MessageBus| Err(BusError::rejected("boom")));
        match bus.publish("outer", Payload::new()) {
            Err(BusError::Handler { subscriber, topic, .. }) => {
                assert_eq!(subscriber, "sink");
                assert_eq!(topic, "inner");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn self_publish_is_refused_as_reentrant() {
        let bus = MessageBus::new();
        bus.subscribe_fn("echo", "parrot", |_: &Message, bus: &MessageBus| {
            bus.publish("echo", Payload::new()).map(|_| ())
        });
        let err = bus.publish("echo", Payload::new()).unwrap_err();
        assert_eq!(err, BusError::Reentrant { subscriber: "parrot".into(), topic: "echo".into() });
    }

    #[test]
    fn cascade_depth_is_bounded() {
        let bus = MessageBus::new().with_max_depth(4);
        for i in 0..10 {
            let next = format!("t{}", i + 1);
            bus.subscribe_fn(format!("t{i}"), format!("hop{i}"), move |_: &Message, bus: &MessageBus| {
                bus.publish(&next, Payload::new()).map(|_| ())
            });
        }
        let err = bus.publish("t0", Payload::new()).unwrap_err();
        assert_eq!(err, BusError::CascadeTooDeep { topic: "t4".into(), limit: 4 });
    }

    #[test]
    fn leaf_segment() {
        let msg = Message::new("command.gate_1.opening", Payload::new(), Tick::ZERO);
        assert_eq!(msg.leaf(), "opening");
        let msg = Message::new("plain", Payload::new(), Tick::ZERO);
        assert_eq!(msg.leaf(), "plain");
    }
}

#[cfg(test)]
mod shared_subscribers {
    use hydro_core::Payload;

    use crate::{BusResult, Message, MessageBus, Subscriber, shared};

    struct Counter {
        seen: Vec<f64>,
    }

    impl Subscriber for Counter {
        fn subscriber_id(&self) -> &str {
            "counter"
        }

        fn on_message(&mut self, msg: &Message, _bus: &MessageBus) -> BusResult<()> {
            self.seen.push(msg.payload.scalar_value().unwrap_or(f64::NAN));
            Ok(())
        }
    }

    #[test]
    fn owner_and_bus_share_one_instance() {
        let bus = MessageBus::new();
        let counter = shared(Counter { seen: Vec::new() });
        bus.subscribe("a", counter.clone());
        bus.subscribe("b", counter.clone());
        bus.publish("a", Payload::scalar(1.0)).unwrap();
        bus.publish("b", Payload::scalar(2.0)).unwrap();
        assert_eq!(counter.borrow().seen, [1.0, 2.0]);
        assert_eq!(bus.subscriber_count("a"), 1);
        assert_eq!(bus.stats().delivered, 2);
    }
}
