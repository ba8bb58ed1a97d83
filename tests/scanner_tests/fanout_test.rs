use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use frame_relay::{
    messaging::{
        fanout::{FanoutError, FanoutState},
        protocol::{Command, CommandResponse},
        WindowBus,
    },
    page::SimulatedPage,
    Error, FrameElement, FrameRelayConfig, FrameScanner, ScanSession,
};
use proptest::prelude::*;
use serde_json::{json, Value};

use super::{page_from, path, session_for};

fn three_frames() -> Value {
    json!({
        "nodes": [
            { "kind": "frame", "selector": "#f1", "document": { "nodes": [] } },
            { "kind": "frame", "selector": "#f2", "document": { "nodes": [] } },
            { "kind": "frame", "selector": "#f3", "document": { "nodes": [] } }
        ]
    })
}

#[tokio::test(start_paused = true)]
async fn test_one_throwing_listener_still_awaits_the_others() {
    let session = session_for(three_frames());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    for selector in ["#f1", "#f2", "#f3"] {
        let context = session.page().resolve(&path(&[selector])).unwrap();
        let delivered = delivered.clone();
        session
            .scanner(context)
            .unwrap()
            .fanout()
            .add_message_listener("collect", move |_, _| {
                let delivered = delivered.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    delivered.lock().unwrap().push(selector);
                    if selector == "#f2" {
                        return Err(Error::internal("collector crashed"));
                    }
                    Ok(CommandResponse::new(json!(selector)))
                }
            })
            .unwrap();
    }
    let top = session.top().unwrap();
    top.initialize_frames().await.unwrap();

    let err = top
        .fanout()
        .send_command_to_all_frames("collect", Value::Null)
        .await
        .unwrap_err();

    let mut delivered = delivered.lock().unwrap().clone();
    delivered.sort();
    assert_eq!(delivered, vec!["#f1", "#f2", "#f3"]);
    match err {
        FanoutError::CommandFailed { errors, .. } => {
            assert_eq!(errors.len(), 1);
            assert!(errors.errors[0].to_string().contains("collector crashed"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_frame_without_content_fails_initialization() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "frame", "selector": "#live", "document": { "nodes": [] } },
            { "kind": "frame", "selector": "#ghost" }
        ]
    }));
    let top = session.top().unwrap();

    let err = top.initialize_frames().await.unwrap_err();

    assert!(err.to_string().contains("content context"));
    assert_eq!(top.fanout().state().await, FanoutState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_frame_without_scanner_is_excluded_after_timeout() {
    let session = session_for(three_frames());
    // attached after the session, so nothing answers inside it
    session.page().add_frame(session.page().top(), "#late", None).unwrap();
    let top = session.top().unwrap();

    top.initialize_frames().await.unwrap();

    let responsive = top.fanout().responsive_frames().await.unwrap();
    assert_eq!(responsive.len(), 3);
    let late = session.page().document(session.page().top()).unwrap().element_by_selector("#late").unwrap();
    assert!(!responsive.contains(&FrameElement::new(late)));
}

#[tokio::test(start_paused = true)]
async fn test_lagging_frames_still_answer_retained_pings() {
    let frames: Vec<Value> = (1..=6)
        .map(|i| json!({ "kind": "frame", "selector": format!("#f{}", i), "document": { "nodes": [] } }))
        .collect();
    let config = FrameRelayConfig {
        bus_capacity: 4,
        ..Default::default()
    };
    let session = ScanSession::new(page_from(json!({ "nodes": frames })), config).unwrap();
    let top = session.top().unwrap();

    // six pings overflow the bus; only the last four are still buffered
    top.initialize_frames().await.unwrap();

    let doc = session.page().document(session.page().top()).unwrap();
    let expected: Vec<FrameElement> = ["#f3", "#f4", "#f5", "#f6"]
        .iter()
        .map(|selector| FrameElement::new(doc.element_by_selector(selector).unwrap()))
        .collect();
    assert_eq!(top.fanout().responsive_frames().await.unwrap(), expected);
}

#[tokio::test]
async fn test_ping_spreads_initialization_down_the_tree() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "frame", "selector": "#outer", "document": { "nodes": [
                { "kind": "frame", "selector": "#inner", "document": { "nodes": [] } }
            ] } }
        ]
    }));
    let outer_context = session.page().resolve(&path(&["#outer"])).unwrap();
    let outer = session.scanner(outer_context).unwrap();

    session.top().unwrap().initialize_frames().await.unwrap();

    for _ in 0..100 {
        if outer.fanout().state().await == FanoutState::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(outer.fanout().responsive_frames().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_direct_window_send_round_trip() {
    let session = session_for(three_frames());
    let child_context = session.page().resolve(&path(&["#f2"])).unwrap();
    session
        .scanner(child_context)
        .unwrap()
        .fanout()
        .add_message_listener("repeat-twice", |command: Command, _| async move {
            let text = command.payload.as_str().unwrap_or_default().to_string();
            Ok(CommandResponse::new(json!(format!("{}{}", text, text))))
        })
        .unwrap();

    let response = session
        .top()
        .unwrap()
        .fanout()
        .send_message_to_window(child_context, Command::with_payload("repeat-twice", json!("ab")))
        .await
        .unwrap();

    assert_eq!(response.payload, json!("abab"));
}

fn responsive_set_after_ping(responds: Vec<bool>) -> (Vec<FrameElement>, Vec<FrameElement>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async move {
        let config = FrameRelayConfig::default();
        let bus = Arc::new(WindowBus::new(config.bus_capacity));
        let page = SimulatedPage::new();
        let top = page.top();

        let mut expected = Vec::new();
        let mut scanners = Vec::new();
        for (index, responds) in responds.iter().enumerate() {
            let (element, child) = page.add_frame(top, &format!("#f{}", index), None).unwrap();
            if *responds {
                expected.push(FrameElement::new(element));
                scanners.push(
                    FrameScanner::attach(&bus, page.host(child), page.document(child).unwrap(), &config).unwrap(),
                );
            }
        }
        let top_scanner = FrameScanner::attach(&bus, page.host(top), page.document(top).unwrap(), &config).unwrap();

        top_scanner.initialize_frames().await.unwrap();
        let responsive = top_scanner.fanout().responsive_frames().await.unwrap();
        (responsive, expected)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_responsive_set_is_exactly_the_responders(responds in prop::collection::vec(any::<bool>(), 0..5)) {
        let (responsive, expected) = responsive_set_after_ping(responds);
        prop_assert_eq!(responsive, expected);
    }

    #[test]
    fn test_repeat_twice_doubles_any_string(text in ".{0,40}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let doubled = runtime.block_on(async {
            let session = session_for(three_frames());
            let child_context = session.page().resolve(&path(&["#f1"])).unwrap();
            session
                .scanner(child_context)
                .unwrap()
                .messenger()
                .add_listener("repeat-twice", |command: Command, _| async move {
                    let text = command.payload.as_str().unwrap_or_default().to_string();
                    Ok(CommandResponse::new(json!(format!("{}{}", text, text))))
                })
                .unwrap();
            session
                .top()
                .unwrap()
                .messenger()
                .send_to_context(child_context, Command::with_payload("repeat-twice", json!(text.clone())))
                .await
                .unwrap()
        });
        prop_assert_eq!(doubled.payload, json!(format!("{}{}", text, text)));
    }
}

#[tokio::test]
async fn test_page_built_from_spec_matches_scanner_count() {
    let page = page_from(three_frames());
    assert_eq!(page.contexts().len(), 4);
}
