use std::time::Duration;

use frame_relay::{dom::Document, tab_stops::TabStopRequirementId::KeyboardTraps};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

use super::{document, element, findings, path, session_for};

fn trap_page() -> serde_json::Value {
    json!({
        "nodes": [
            { "kind": "element", "selector": "#a", "tab_index": 0 },
            { "kind": "element", "selector": "#widget", "tab_index": 0, "traps_focus": true },
            { "kind": "element", "selector": "#b", "tab_index": 0 }
        ]
    })
}

fn traps(findings: &[(frame_relay::tab_stops::TabStopRequirementId, Vec<String>)]) -> Vec<Vec<String>> {
    findings
        .iter()
        .filter(|(requirement, _)| *requirement == KeyboardTraps)
        .map(|(_, selector)| selector.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_focus_after_delay_is_one_trap() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#widget")).await;

    let start = Instant::now();
    doc.press_key("Tab").await;
    assert!(start.elapsed() >= Duration::from_millis(500));

    assert_eq!(traps(&findings(&session).await), vec![path(&["#widget"])]);
}

#[tokio::test(start_paused = true)]
async fn test_focus_that_moves_on_is_not_a_trap() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#a")).await;
    doc.press_key("Tab").await;

    assert_eq!(doc.active_element(), Some(element(&doc, "#widget")));
    assert!(traps(&findings(&session).await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tab_without_focused_element_is_ignored() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    // フォーカスなしでTabを押す
    doc.press_key("Tab").await;

    assert!(traps(&findings(&session).await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_other_keys_do_not_check_for_traps() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#widget")).await;
    doc.press_key("Enter").await;

    assert!(traps(&findings(&session).await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_trap_in_nested_frame_is_reported_with_frame_path() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "frame", "selector": "#checkout", "document": trap_page() }
        ]
    }));
    let top = session.top().unwrap();
    let doc = document(&session, &["#checkout"]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#widget")).await;
    doc.press_key("Tab").await;

    assert_eq!(
        traps(&findings(&session).await),
        vec![path(&["#checkout", "#widget"])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_trap_check_finishing_after_stop_is_dropped() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#widget")).await;

    let pending = doc.press_key("Tab");
    top.stop_tab_stops().await.unwrap();
    pending.await;

    assert!(traps(&findings(&session).await).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_trap_check_from_previous_run_is_not_reported_in_next_run() {
    let session = session_for(trap_page());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#widget")).await;

    let pending = doc.press_key("Tab");
    top.stop_tab_stops().await.unwrap();
    top.start_tab_stops().await.unwrap();
    pending.await;

    assert!(top.is_running());
    assert!(traps(&findings(&session).await).is_empty());
}
