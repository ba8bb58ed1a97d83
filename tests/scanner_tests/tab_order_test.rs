use frame_relay::tab_stops::TabStopRequirementId::{KeyboardNavigation, TabOrder};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{document, element, findings, path, session_for};

fn three_buttons() -> serde_json::Value {
    json!({
        "nodes": [
            { "kind": "element", "selector": "#a", "html": "<button>A</button>", "tab_index": 0 },
            { "kind": "element", "selector": "#b", "html": "<button>B</button>", "tab_index": 0 },
            { "kind": "element", "selector": "#c", "html": "<button>C</button>", "tab_index": 0 }
        ]
    })
}

#[tokio::test(start_paused = true)]
async fn test_forward_focus_reports_only_unreachable_elements() {
    let session = session_for(three_buttons());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#a")).await;
    doc.focus(element(&doc, "#c")).await;
    top.stop_tab_stops().await.unwrap();

    assert_eq!(findings(&session).await, vec![(KeyboardNavigation, path(&["#b"]))]);
}

#[tokio::test(start_paused = true)]
async fn test_backward_focus_names_later_focused_element() {
    let session = session_for(three_buttons());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#c")).await;
    doc.focus(element(&doc, "#a")).await;
    top.stop_tab_stops().await.unwrap();

    let results = top.tab_stop_results().await;
    assert_eq!(
        findings(&session).await,
        vec![(TabOrder, path(&["#a"])), (KeyboardNavigation, path(&["#b"]))]
    );
    assert!(results[0].description.contains("#a"));
    assert!(results[0].description.contains("#c"));
    assert_eq!(results[0].html, "<button>A</button>");
}

#[tokio::test(start_paused = true)]
async fn test_revisits_are_not_compared() {
    let session = session_for(three_buttons());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    doc.focus(element(&doc, "#a")).await;
    doc.focus(element(&doc, "#b")).await;
    // 既に訪問済みの要素に戻る
    doc.focus(element(&doc, "#a")).await;
    doc.focus(element(&doc, "#c")).await;
    top.stop_tab_stops().await.unwrap();

    assert!(findings(&session).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_positive_tabindex_is_reported_on_start() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "element", "selector": "#first", "tab_index": 0 },
            { "kind": "element", "selector": "#second", "tab_index": 1 }
        ]
    }));
    let top = session.top().unwrap();

    top.start_tab_stops().await.unwrap();

    assert_eq!(findings(&session).await, vec![(TabOrder, path(&["#first"]))]);
    assert!(top.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_results_from_nested_frames_carry_frame_selectors() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "element", "selector": "#a", "tab_index": 0 },
            { "kind": "frame", "selector": "#outer", "document": { "nodes": [
                { "kind": "element", "selector": "#b", "tab_index": 0 },
                { "kind": "element", "selector": "#c", "tab_index": 0 },
                { "kind": "frame", "selector": "#inner", "document": { "nodes": [
                    { "kind": "element", "selector": "#d", "tab_index": 0 }
                ] } }
            ] } }
        ]
    }));
    let top = session.top().unwrap();
    let outer = document(&session, &["#outer"]);

    top.start_tab_stops().await.unwrap();
    outer.focus(element(&outer, "#c")).await;
    outer.focus(element(&outer, "#b")).await;
    top.stop_tab_stops().await.unwrap();

    assert_eq!(
        findings(&session).await,
        vec![
            (TabOrder, path(&["#outer", "#b"])),
            (KeyboardNavigation, path(&["#a"])),
            (KeyboardNavigation, path(&["#outer", "#inner", "#d"])),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_begins_with_fresh_state() {
    let session = session_for(three_buttons());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    top.start_tab_stops().await.unwrap();
    for selector in ["#a", "#b", "#c"] {
        doc.focus(element(&doc, selector)).await;
    }
    top.stop_tab_stops().await.unwrap();
    assert!(findings(&session).await.is_empty());
    assert!(!top.is_running());

    top.start_tab_stops().await.unwrap();
    top.stop_tab_stops().await.unwrap();

    assert_eq!(
        findings(&session).await,
        vec![
            (KeyboardNavigation, path(&["#a"])),
            (KeyboardNavigation, path(&["#b"])),
            (KeyboardNavigation, path(&["#c"])),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_focus_outside_a_run_is_ignored() {
    let session = session_for(three_buttons());
    let top = session.top().unwrap();
    let doc = document(&session, &[]);

    doc.focus(element(&doc, "#c")).await;
    doc.focus(element(&doc, "#a")).await;
    assert_eq!(doc.listener_count(), 0);

    top.start_tab_stops().await.unwrap();
    assert_eq!(doc.listener_count(), 2);
    top.stop_tab_stops().await.unwrap();
    assert_eq!(doc.listener_count(), 0);

    assert_eq!(findings(&session).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sandboxed_and_dead_frames_are_skipped() {
    let session = session_for(json!({
        "nodes": [
            { "kind": "element", "selector": "#a", "tab_index": 0 },
            { "kind": "frame", "selector": "#sandboxed", "sandbox": "allow-forms", "document": { "nodes": [
                { "kind": "element", "selector": "#hidden", "tab_index": 0 }
            ] } },
            { "kind": "frame", "selector": "#ghost" },
            { "kind": "frame", "selector": "#live", "document": { "nodes": [
                { "kind": "element", "selector": "#b", "tab_index": 0 }
            ] } }
        ]
    }));
    let top = session.top().unwrap();

    top.start_tab_stops().await.unwrap();
    top.stop_tab_stops().await.unwrap();

    assert_eq!(
        findings(&session).await,
        vec![
            (KeyboardNavigation, path(&["#a"])),
            (KeyboardNavigation, path(&["#live", "#b"])),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_from_child_frame_is_rejected() {
    let session = session_for(json!({
        "nodes": [ { "kind": "frame", "selector": "#f", "document": { "nodes": [] } } ]
    }));
    let child_context = session.page().resolve(&path(&["#f"])).unwrap();
    let child = session.scanner(child_context).unwrap();

    let err = child.start_tab_stops().await.unwrap_err();
    assert!(err.to_string().contains("top context"));
}
