use std::sync::Arc;

use postbus::{EventBus, EventBusError, HandlerSet, Hierarchy, Subscriber, ThreadMode};

#[derive(Debug)]
struct Heartbeat;
impl Hierarchy for Heartbeat {}

struct Monitor;

impl Subscriber for Monitor {
    fn declare_handlers(handlers: &mut HandlerSet<Self>) {
        handlers.on(ThreadMode::Posting, |_: &Monitor, _: &Heartbeat| Ok(()));
    }
}

// Only test in this binary touching the process-wide instance
#[test]
fn test_installed_default_is_shared() {
    let installed = EventBus::builder()
        .log_no_subscriber_messages(false)
        .install_default()
        .unwrap();
    let monitor = Arc::new(Monitor);
    installed.register(&monitor).unwrap();

    let default = EventBus::get_default();
    assert!(default.is_registered(&monitor));
    assert!(!default.config().log_no_subscriber_messages);

    let second = EventBus::builder().install_default();
    assert!(matches!(second, Err(EventBusError::DefaultInstanceExists)));
    assert!(EventBus::get_default().unregister(&monitor));
}
