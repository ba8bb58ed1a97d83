use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use frame_relay::{
    dispatch::{ApplicationListener, EventDispatchHub, ListenerOutcome},
    FrameRelayConfig,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

#[tokio::test(start_paused = true)]
async fn test_event_before_listener_is_delivered_exactly_once() {
    let hub = EventDispatchHub::new(&FrameRelayConfig::default());
    let received = Arc::new(Mutex::new(Vec::new()));

    let completion = hub.dispatch("tab-updated", vec![json!(7), json!({ "status": "complete" })]);

    let sink = received.clone();
    let listener: ApplicationListener = Arc::new(move |args: &[Value]| {
        sink.lock().unwrap().push(args.to_vec());
        ListenerOutcome::pending(async { Ok(json!("seen")) })
    });
    hub.add_listener("tab-updated", listener.clone());
    // 2つ目の登録では再生されない
    hub.add_listener("tab-updated", listener);

    assert_eq!(completion.await, vec![Ok(json!("seen"))]);
    assert_eq!(
        *received.lock().unwrap(),
        vec![vec![json!(7), json!({ "status": "complete" })]]
    );
    assert_eq!(hub.deferred_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_registration_doubles_invocations() {
    let hub = EventDispatchHub::new(&FrameRelayConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let listener: ApplicationListener = Arc::new(move |_: &[Value]| {
        counter.fetch_add(1, Ordering::SeqCst);
        ListenerOutcome::pending(async { Ok(Value::Null) })
    });

    let first = hub.add_listener("activated", listener.clone());
    hub.add_listener("activated", listener);
    hub.dispatch("activated", vec![]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(hub.remove_listener("activated", first));
    hub.dispatch("activated", vec![]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_events_keep_their_order_per_type() {
    let hub = EventDispatchHub::new(&FrameRelayConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = hub.dispatch("navigated", vec![json!("first")]);
    let other = hub.dispatch("closed", vec![json!("other")]);
    let second = hub.dispatch("navigated", vec![json!("second")]);

    let sink = order.clone();
    hub.add_listener(
        "navigated",
        Arc::new(move |args: &[Value]| {
            sink.lock().unwrap().push(args[0].clone());
            ListenerOutcome::pending(async { Ok(Value::Null) })
        }),
    );

    assert_eq!(*order.lock().unwrap(), vec![json!("first"), json!("second")]);
    assert_eq!(hub.deferred_count(), 1);
    assert_eq!(first.await, vec![Ok(Value::Null)]);
    assert_eq!(second.await, vec![Ok(Value::Null)]);
    drop(other);
}
