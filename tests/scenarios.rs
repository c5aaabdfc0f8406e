// End-to-end scenarios: native page activity through delegates, the
// bubbling dispatcher and the rule engine down to integration calls.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use mockall::predicate::eq;
use serde_json::{json, Value};
use tagline::{Event, Integration, IntegrationError, Page, Rule, Runtime};
use tagline_core::fixture::PageFixture;
use tagline_core::ElementId;
use tagline_rules::{ConditionError, IntegrationHandle, MethodIntegration};
use test_case::test_case;
use tokio::sync::mpsc;

mock! {
    pub Vendor {}

    #[async_trait::async_trait]
    impl Integration for Vendor {
        async fn invoke(&self, method: &str, settings: Value) -> Result<(), IntegrationError>;
    }
}

fn nested_page() -> Page {
    let fixture: PageFixture = serde_json::from_value(json!({
        "viewport": {"scrollTop": 0, "height": 800},
        "body": [{
            "tag": "div",
            "id": "outer",
            "class": "module",
            "children": [
                {"tag": "input", "id": "inner", "properties": {"value": ""}},
                {
                    "tag": "section",
                    "id": "a",
                    "children": [{
                        "tag": "div",
                        "id": "b",
                        "children": [{"tag": "button", "id": "c"}]
                    }]
                },
                {"tag": "img", "id": "hero", "layout": {"top": 100, "height": 200}}
            ]
        }]
    }))
    .unwrap();
    fixture.build().unwrap()
}

fn rule(value: Value) -> Rule {
    serde_json::from_value(value).unwrap()
}

fn recorder() -> (IntegrationHandle, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let integration = MethodIntegration::new("recorder").method("track", move |settings: Value| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(settings);
            Ok(())
        }
    });
    (Arc::new(integration), rx)
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<Value>) -> Vec<Value> {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let mut out = Vec::new();
    while let Ok(value) = rx.try_recv() {
        out.push(value);
    }
    out
}

fn set_value(page: &Page, element: ElementId, value: &str) {
    page.document_mut()
        .set_property(element, "value", json!(value))
        .unwrap();
}

#[tokio::test]
async fn change_on_descendant_satisfies_ancestor_rule() {
    let page = nested_page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut vendor = MockVendor::new();
    vendor
        .expect_invoke()
        .with(eq("track"), eq(json!({"value": "foo", "matched": "outer"})))
        .times(1)
        .returning(move |_, settings| {
            let _ = tx.send(settings);
            Ok(())
        });

    let runtime = Runtime::builder(page.clone())
        .integration("vendor", Arc::new(vendor))
        .build();
    let report = runtime.load_rules(&[rule(json!({
        "id": "outer-change",
        "events": [{
            "type": "change",
            "settings": {"selector": "#outer", "value": "foo", "bubbleFireIfParent": true}
        }],
        "conditions": [],
        "actions": [{
            "integrationIds": ["vendor"],
            "method": "track",
            "settings": {"value": "%target.value%", "matched": "%this.id%"}
        }]
    }))]);
    assert!(report.is_clean());

    let inner = page.element_by_id("inner").unwrap();
    set_value(&page, inner, "foo");
    page.dispatch_event("change", inner).unwrap();
    assert_eq!(rx.recv().await.unwrap()["matched"], json!("outer"));

    set_value(&page, inner, "bar");
    page.dispatch_event("change", inner).unwrap();
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dwell_of_500ms_fires_once_with_its_delay() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    runtime.load_rules(&[rule(json!({
        "events": [{"type": "entersViewport", "settings": {"selector": "#hero", "delay": 500}}],
        "actions": [{
            "integrationIds": ["recorder"],
            "method": "track",
            "settings": {"delay": "%event.inviewDelay%"}
        }]
    }))]);

    page.fire_load();
    tokio::time::sleep(Duration::from_millis(501)).await;
    assert_eq!(drain(&mut rx).await, vec![json!({"delay": 500})]);

    page.scroll_to(5000.0);
    page.scroll_to(0.0);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_the_viewport_at_300ms_never_fires() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    runtime.load_rules(&[rule(json!({
        "events": [{"type": "entersViewport", "settings": {"selector": "#hero", "delay": 500}}],
        "actions": [{"integrationIds": ["recorder"], "method": "track"}]
    }))]);

    page.fire_load();
    tokio::time::sleep(Duration::from_millis(300)).await;
    page.scroll_to(5000.0);
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_catches_layout_changes_without_scroll() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    runtime.load_rules(&[rule(json!({
        "events": [{"type": "entersViewport", "settings": {"selector": "#hero"}}],
        "actions": [{"integrationIds": ["recorder"], "method": "track"}]
    }))]);
    runtime.start_polling().unwrap();

    tokio::time::sleep(runtime.config().poll_interval + Duration::from_millis(1)).await;
    assert_eq!(drain(&mut rx).await.len(), 1);
    runtime.stop_polling();
}

#[test_case(json!({"selector": "#a"}), 0 ; "ancestor ignores bubbled event by default")]
#[test_case(json!({"selector": "#a", "bubbleFireIfParent": true}), 1 ; "ancestor opts into bubbled event")]
#[test_case(json!({"selector": "#c"}), 1 ; "target always fires")]
#[test_case(json!({"selector": "button, #missing"}), 1 ; "selector groups match the target")]
#[tokio::test]
async fn click_bubbling(settings: Value, expected: usize) {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    runtime.load_rules(&[rule(json!({
        "events": [{"type": "click", "settings": settings}],
        "actions": [{"integrationIds": ["recorder"], "method": "track"}]
    }))]);

    let c = page.element_by_id("c").unwrap();
    page.dispatch_event("click", c).unwrap();
    assert_eq!(drain(&mut rx).await.len(), expected);
}

#[tokio::test]
async fn bubble_stop_shields_outer_ancestors() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    let report = runtime.load_rules(&[
        rule(json!({
            "id": "b",
            "events": [{"type": "click", "settings": {
                "selector": "#b", "bubbleFireIfParent": true, "bubbleStop": true
            }}],
            "actions": [{"integrationIds": ["recorder"], "method": "track", "settings": {"rule": "b"}}]
        })),
        rule(json!({
            "id": "a",
            "events": [{"type": "click", "settings": {
                "selector": "#a", "bubbleFireIfParent": true, "bubbleFireIfChildFired": true
            }}],
            "actions": [{"integrationIds": ["recorder"], "method": "track", "settings": {"rule": "a"}}]
        })),
    ]);
    assert_eq!(report.initialized.len(), 2);

    let c = page.element_by_id("c").unwrap();
    page.dispatch_event("click", c).unwrap();
    assert_eq!(drain(&mut rx).await, vec![json!({"rule": "b"})]);
}

#[tokio::test]
async fn failing_condition_stops_later_conditions_and_actions() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let later = Arc::new(AtomicUsize::new(0));
    let counter = later.clone();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .condition(
            "counted",
            move |_: &Value, _: &Event, _: Option<ElementId>| -> Result<bool, ConditionError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            },
        )
        .build();
    runtime.load_rules(&[rule(json!({
        "events": [{"type": "click", "settings": {"selector": "#c"}}],
        "conditions": [
            {"type": "elementMatches", "settings": {"selector": ".never"}},
            {"type": "counted"}
        ],
        "actions": [{"integrationIds": ["recorder"], "method": "track"}]
    }))]);

    let c = page.element_by_id("c").unwrap();
    page.dispatch_event("click", c).unwrap();
    assert!(drain(&mut rx).await.is_empty());
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_types_are_reported_without_blocking_other_rules() {
    let page = nested_page();
    let (recorder, mut rx) = recorder();
    let runtime = Runtime::builder(page.clone())
        .integration("recorder", recorder)
        .build();
    let report = runtime.load_rules(&[
        rule(json!({
            "id": "typo",
            "events": [{"type": "clikc", "settings": {"selector": "#c"}}],
            "actions": [{"integrationIds": ["recorder"], "method": "track"}]
        })),
        rule(json!({
            "id": "fine",
            "events": [{"type": "click", "settings": {"selector": "#c"}}],
            "actions": [{"integrationIds": ["recorder"], "method": "track"}]
        })),
    ]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].rule, "typo");

    let c = page.element_by_id("c").unwrap();
    page.dispatch_event("click", c).unwrap();
    assert_eq!(drain(&mut rx).await.len(), 1);
}
