use std::sync::Arc;

use parking_lot::Mutex;
use postbus::{
    BusConfig, EventBus, HandlerSet, Hierarchy, LooperThread, NoSubscriberEvent, Subscriber,
    ThreadMode,
};
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct OrderPlaced {
    id: u64,
}
impl Hierarchy for OrderPlaced {}

#[derive(Debug)]
struct InventoryChecked;
impl Hierarchy for InventoryChecked {}

struct Step {
    name: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
}

impl Subscriber for Step {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &Step, order: &OrderPlaced| {
            s.journal.lock().push(format!("{}#{}", s.name, order.id));
            Ok(())
        });
    }
}

#[derive(Default)]
struct DeadLetters {
    count: Mutex<usize>,
}

impl Subscriber for DeadLetters {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |s: &DeadLetters, _: &NoSubscriberEvent| {
            *s.count.lock() += 1;
            Ok(())
        });
    }
}

#[test]
fn test_order_flow() {
    let config: BusConfig = postbus::config::from_str(r#"{ "main_thread_budget": 5 }"#).unwrap();
    let looper = Arc::new(LooperThread::spawn("order-ui").unwrap());
    let bus = EventBus::builder()
        .config(config)
        .main_thread(looper)
        .build();

    let journal = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::new(Step {
        name: "A",
        journal: journal.clone(),
    });
    let b = Arc::new(Step {
        name: "B",
        journal: journal.clone(),
    });
    let dead_letters = Arc::new(DeadLetters::default());
    bus.register_with_priority(&a, 0).unwrap();
    bus.register_with_priority(&b, 5).unwrap();
    bus.register(&dead_letters).unwrap();

    bus.post(OrderPlaced { id: 42 }).unwrap();
    assert_eq!(*journal.lock(), vec!["B#42", "A#42"]);

    bus.post(InventoryChecked).unwrap();
    assert_eq!(*dead_letters.count.lock(), 1);

    assert!(bus.unregister(&dead_letters));
    // Nobody hears the NoSubscriberEvent either, and it is not re-posted
    bus.post(InventoryChecked).unwrap();
    assert_eq!(*dead_letters.count.lock(), 1);
}
