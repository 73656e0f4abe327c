use std::{any::Any, any::TypeId, sync::Arc};

use parking_lot::Mutex;
use postbus::{
    EventBus, EventBusError, EventRef, EventType, HandlerSet, Hierarchy, NoSubscriberEvent,
    Subscriber, ThreadMode, WeakEventBus,
};
use pretty_assertions::assert_eq;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug)]
struct OrderPlaced {
    id: u64,
}
impl Hierarchy for OrderPlaced {}

#[derive(Debug)]
struct OrderShipped;
impl Hierarchy for OrderShipped {}

struct Named {
    name: &'static str,
    log: Log,
}

impl Subscriber for Named {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &Named, order: &OrderPlaced| {
            s.log.lock().push(format!("{}:{}", s.name, order.id));
            Ok(())
        });
    }
}

fn named(name: &'static str, log: &Log) -> Arc<Named> {
    Arc::new(Named {
        name,
        log: log.clone(),
    })
}

#[test]
fn test_higher_priority_runs_first() {
    let bus = EventBus::new();
    let log = new_log();
    bus.register_with_priority(&named("low", &log), 0).unwrap();
    bus.register_with_priority(&named("high", &log), 10).unwrap();
    bus.register_with_priority(&named("mid", &log), 5).unwrap();
    bus.register_with_priority(&named("low2", &log), 0).unwrap();

    bus.post(OrderPlaced { id: 1 }).unwrap();
    assert_eq!(*log.lock(), vec!["high:1", "mid:1", "low:1", "low2:1"]);
}

/// Posts a follow-up event from inside its handler.
struct Relay {
    bus: EventBus,
    log: Log,
}

impl Subscriber for Relay {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers
            .on(ThreadMode::Posting, |s: &Relay, order: &OrderPlaced| {
                s.log.lock().push(format!("relay:placed:{}", order.id));
                s.bus.post(OrderShipped)?;
                s.log.lock().push("relay:posted".to_string());
                Ok(())
            })
            .on(ThreadMode::Posting, |s: &Relay, _: &OrderShipped| {
                s.log.lock().push("relay:shipped".to_string());
                Ok(())
            });
    }
}

#[test]
fn test_nested_post_is_queued_behind_current_event() {
    let bus = EventBus::new();
    let log = new_log();
    let relay = Arc::new(Relay {
        bus: bus.clone(),
        log: log.clone(),
    });
    bus.register_with_priority(&relay, 1).unwrap();
    bus.register(&named("audit", &log)).unwrap();

    bus.post(OrderPlaced { id: 3 }).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "relay:placed:3",
            "relay:posted",
            "audit:3",
            "relay:shipped"
        ]
    );
}

#[test]
fn test_unregister() {
    let bus = EventBus::new();
    let log = new_log();
    let subscriber = named("gone", &log);

    assert!(!bus.unregister(&subscriber));
    bus.register(&subscriber).unwrap();
    assert!(bus.is_registered(&subscriber));
    assert!(bus.has_subscriber_for_event::<OrderPlaced>());

    assert!(bus.unregister(&subscriber));
    assert!(!bus.is_registered(&subscriber));
    assert!(!bus.has_subscriber_for_event::<OrderPlaced>());
    bus.post(OrderPlaced { id: 1 }).unwrap();
    assert!(log.lock().is_empty());
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let bus = EventBus::new();
    let log = new_log();
    let subscriber = named("once", &log);
    bus.register(&subscriber).unwrap();
    let result = bus.register_with_priority(&subscriber, 3);
    assert!(matches!(
        result,
        Err(EventBusError::DuplicateSubscription { .. })
    ));

    bus.post(OrderPlaced { id: 9 }).unwrap();
    assert_eq!(*log.lock(), vec!["once:9"]);
}

#[test]
fn test_subscriber_without_handlers_is_rejected() {
    struct Silent;
    impl Subscriber for Silent {
        fn declare_handlers(_: &mut HandlerSet<Self>) {}
    }

    let bus = EventBus::new();
    let silent = Arc::new(Silent);
    assert!(matches!(
        bus.register(&silent),
        Err(EventBusError::NoHandlersFound { .. })
    ));
    assert!(!bus.is_registered(&silent));
}

#[test]
fn test_typo_in_handler_name_is_rejected() {
    struct Typo;
    impl Subscriber for Typo {
        fn declare_handlers(handlers: &mut HandlerSet<Self>) {
            handlers.handler("onEventBackground", |_: &Typo, _: &OrderPlaced| Ok(()));
        }
    }

    let bus = EventBus::new();
    assert!(matches!(
        bus.register(&Arc::new(Typo)),
        Err(EventBusError::IllegalHandlerName { .. })
    ));

    let lenient = EventBus::builder()
        .skip_method_verification_for::<Typo>()
        .build();
    // The only handler is skipped, which leaves none
    assert!(matches!(
        lenient.register(&Arc::new(Typo)),
        Err(EventBusError::NoHandlersFound { .. })
    ));
}

// Hierarchy: Refund -> Payment, both Auditable

trait Auditable {}
impl Hierarchy for dyn Auditable {}

#[derive(Debug)]
struct Payment {
    amount: u32,
}
impl Hierarchy for Payment {
    fn interfaces() -> Vec<EventType> {
        vec![EventType::of::<dyn Auditable>()]
    }
}

#[derive(Debug)]
struct Refund {
    payment: Payment,
}
impl Hierarchy for Refund {
    fn superclass() -> Option<EventType> {
        Some(EventType::of::<Payment>())
    }

    fn project(&self, target: TypeId) -> Option<&dyn Any> {
        if target == TypeId::of::<Payment>() {
            Some(&self.payment)
        } else {
            None
        }
    }
}

struct Ledger {
    log: Log,
}

impl Subscriber for Ledger {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers
            .on(ThreadMode::Posting, |s: &Ledger, refund: &Refund| {
                s.log
                    .lock()
                    .push(format!("refund:{}", refund.payment.amount));
                Ok(())
            })
            .on(ThreadMode::Posting, |s: &Ledger, payment: &Payment| {
                s.log.lock().push(format!("payment:{}", payment.amount));
                Ok(())
            })
            .on_type(
                ThreadMode::Posting,
                EventType::of::<dyn Auditable>(),
                |s: &Ledger, event: &EventRef| {
                    s.log.lock().push(format!("audit:{}", event.event_type().name()));
                    Ok(())
                },
            );
    }
}

#[test]
fn test_supertypes_and_interfaces_match() {
    let bus = EventBus::new();
    let log = new_log();
    bus.register(&Arc::new(Ledger { log: log.clone() })).unwrap();

    bus.post(Refund {
        payment: Payment { amount: 40 },
    })
    .unwrap();
    let log = log.lock().clone();
    assert_eq!(log.len(), 3);
    // Own type, then the parent, then the parent's interfaces
    assert_eq!(log[0], "refund:40");
    assert_eq!(log[1], "payment:40");
    assert!(log[2].starts_with("audit:") && log[2].ends_with("Refund"));
}

#[test]
fn test_exact_matching_without_inheritance() {
    let bus = EventBus::builder().event_inheritance(false).build();
    let log = new_log();
    bus.register(&Arc::new(Ledger { log: log.clone() })).unwrap();

    bus.post(Refund {
        payment: Payment { amount: 5 },
    })
    .unwrap();
    assert_eq!(*log.lock(), vec!["refund:5"]);
    assert!(bus.has_subscriber_for_event::<Refund>());
    assert!(bus.has_subscriber_for_event::<dyn Auditable>());
}

struct Sink {
    original: Mutex<Vec<EventRef>>,
    senders: Mutex<Vec<WeakEventBus>>,
}

impl Subscriber for Sink {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &Sink, event: &NoSubscriberEvent| {
            s.original.lock().push(event.original_event.clone());
            s.senders.lock().push(event.event_bus.clone());
            Ok(())
        });
    }
}

#[test]
fn test_unheard_event_yields_one_no_subscriber_event() {
    let bus = EventBus::new();
    let sink = Arc::new(Sink {
        original: Mutex::new(Vec::new()),
        senders: Mutex::new(Vec::new()),
    });
    bus.register(&sink).unwrap();

    let unheard: EventRef = Arc::new(OrderShipped);
    bus.post_event(unheard.clone()).unwrap();

    let original = sink.original.lock();
    assert_eq!(original.len(), 1);
    assert!(Arc::ptr_eq(&original[0], &unheard));
    let senders = sink.senders.lock();
    assert!(senders[0].refers_to(&bus));
    assert!(!senders[0].refers_to(&EventBus::new()));
}

#[test]
fn test_no_subscriber_event_can_be_disabled() {
    let bus = EventBus::builder().send_no_subscriber_event(false).build();
    let sink = Arc::new(Sink {
        original: Mutex::new(Vec::new()),
        senders: Mutex::new(Vec::new()),
    });
    bus.register(&sink).unwrap();
    bus.post(OrderShipped).unwrap();
    assert!(sink.original.lock().is_empty());
}

/// Cancels every order it sees and records the outcome.
struct Gatekeeper {
    bus: EventBus,
    outcomes: Mutex<Vec<Result<(), String>>>,
}

impl Subscriber for Gatekeeper {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &Gatekeeper, order: &OrderPlaced| {
            let outcome = s
                .bus
                .cancel_event_delivery(order)
                .map_err(|e| e.to_string());
            s.outcomes.lock().push(outcome);
            Ok(())
        });
    }
}

#[test]
fn test_cancellation_stops_only_the_current_event() {
    let bus = EventBus::new();
    let log = new_log();
    let gatekeeper = Arc::new(Gatekeeper {
        bus: bus.clone(),
        outcomes: Mutex::new(Vec::new()),
    });
    bus.register_with_priority(&gatekeeper, 100).unwrap();
    bus.register(&named("behind", &log)).unwrap();

    bus.post(OrderPlaced { id: 1 }).unwrap();
    bus.post(OrderPlaced { id: 2 }).unwrap();
    assert!(log.lock().is_empty());
    assert_eq!(gatekeeper.outcomes.lock().len(), 2);
    assert!(gatekeeper.outcomes.lock().iter().all(|o| o.is_ok()));

    bus.unregister(&gatekeeper);
    bus.post(OrderPlaced { id: 3 }).unwrap();
    assert_eq!(*log.lock(), vec!["behind:3"]);
}

#[test]
fn test_cancellation_outside_handler_fails() {
    let bus = EventBus::new();
    let result = bus.cancel_event_delivery(&OrderPlaced { id: 1 });
    assert!(matches!(result, Err(EventBusError::IllegalCancellation(_))));
}

/// Tries to cancel a different instance than the one it received.
struct WrongInstance {
    bus: EventBus,
    outcome: Mutex<Option<bool>>,
}

impl Subscriber for WrongInstance {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &WrongInstance, order: &OrderPlaced| {
            let other = OrderPlaced { id: order.id };
            let result = s.bus.cancel_event_delivery(&other);
            *s.outcome.lock() = Some(matches!(
                result,
                Err(EventBusError::IllegalCancellation(_))
            ));
            Ok(())
        });
    }
}

#[test]
fn test_cancelling_another_instance_fails() {
    let bus = EventBus::new();
    let subscriber = Arc::new(WrongInstance {
        bus: bus.clone(),
        outcome: Mutex::new(None),
    });
    bus.register(&subscriber).unwrap();
    bus.post(OrderPlaced { id: 4 }).unwrap();
    assert_eq!(*subscriber.outcome.lock(), Some(true));
}

#[test]
fn test_buses_are_independent() {
    let first = EventBus::new();
    let second = EventBus::new();
    let log = new_log();
    first.register(&named("first", &log)).unwrap();

    second.post(OrderPlaced { id: 1 }).unwrap();
    assert!(log.lock().is_empty());
    first.post(OrderPlaced { id: 2 }).unwrap();
    assert_eq!(*log.lock(), vec!["first:2"]);
}

#[test]
fn test_clear_caches_keeps_subscriptions() {
    let bus = EventBus::new();
    let log = new_log();
    bus.register(&named("kept", &log)).unwrap();

    bus.clear_caches();
    bus.post(OrderPlaced { id: 5 }).unwrap();
    bus.register(&named("late", &log)).unwrap();
    bus.post(OrderPlaced { id: 6 }).unwrap();
    assert_eq!(*log.lock(), vec!["kept:5", "kept:6", "late:6"]);
}

#[derive(Debug)]
struct Shipment {
    weight: u32,
}
impl Hierarchy for Shipment {}

/// The embedded parent sits behind another field.
#[derive(Debug)]
#[repr(C)]
struct ExpressShipment {
    lane: u64,
    shipment: Shipment,
}
impl Hierarchy for ExpressShipment {
    fn superclass() -> Option<EventType> {
        Some(EventType::of::<Shipment>())
    }

    fn project(&self, target: TypeId) -> Option<&dyn Any> {
        (target == TypeId::of::<Shipment>()).then_some(&self.shipment as &dyn Any)
    }
}

struct ShipmentGate {
    bus: EventBus,
    outcomes: Mutex<Vec<Result<(), String>>>,
}

impl Subscriber for ShipmentGate {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &ShipmentGate, shipment: &Shipment| {
            let outcome = s
                .bus
                .cancel_event_delivery(shipment)
                .map_err(|e| e.to_string());
            s.outcomes.lock().push(outcome);
            Ok(())
        });
    }
}

#[derive(Default)]
struct Scale {
    weighed: Mutex<Vec<u32>>,
}

impl Subscriber for Scale {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &Scale, shipment: &Shipment| {
            s.weighed.lock().push(shipment.weight);
            Ok(())
        });
    }
}

#[test]
fn test_supertype_handler_cancels_projected_event() {
    let bus = EventBus::new();
    let gate = Arc::new(ShipmentGate {
        bus: bus.clone(),
        outcomes: Mutex::new(Vec::new()),
    });
    let scale = Arc::new(Scale::default());
    bus.register_with_priority(&gate, 10).unwrap();
    bus.register(&scale).unwrap();

    bus.post(ExpressShipment {
        lane: 7,
        shipment: Shipment { weight: 12 },
    })
    .unwrap();
    bus.post(Shipment { weight: 3 }).unwrap();

    assert_eq!(*gate.outcomes.lock(), vec![Ok(()), Ok(())]);
    assert!(scale.weighed.lock().is_empty());

    bus.unregister(&gate);
    bus.post(ExpressShipment {
        lane: 1,
        shipment: Shipment { weight: 5 },
    })
    .unwrap();
    assert_eq!(*scale.weighed.lock(), vec![5]);
}
