#![cfg(not(target_arch = "wasm32"))]

use firebase_db_bridge::database::{
    Database, DatabaseOptions, DatabaseResult, EventType, InMemoryBridge,
};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

fn init_database(url: &str) -> DatabaseResult<(Arc<InMemoryBridge>, Database)> {
    let bridge = Arc::new(InMemoryBridge::new());
    let options = DatabaseOptions::default().with_database_url(url);
    let database = Database::with_options(bridge.clone(), options)?;
    Ok((bridge, database))
}

#[tokio::test(flavor = "multi_thread")]
async fn value_listener_emits_initial_and_updates() {
    let (_, database) = init_database("https://value.example.com").unwrap();
    let reference = database.reference("counters/main");

    let events: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();

    let handle = reference
        .on(
            EventType::Value,
            move |snapshot| captured.lock().unwrap().push(snapshot.val().cloned()),
            |err| panic!("unexpected listener error: {err}"),
        )
        .await
        .expect("register value listener");

    reference.set(json!(1)).await.unwrap();
    reference.set(json!(2)).await.unwrap();
    handle.cancel().await.unwrap();
    reference.set(json!(3)).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.as_slice(), &[None, Some(json!(1)), Some(json!(2))]);
}

#[tokio::test(flavor = "multi_thread")]
async fn ordered_limited_query_returns_children_in_order() {
    let (_, database) = init_database("https://leaderboard.example.com").unwrap();
    let scores = database.reference("scores");
    for (name, points) in [("ada", 30), ("alan", 10), ("grace", 50), ("linus", 20)] {
        scores.child(name).set(json!({ "points": points })).await.unwrap();
    }

    let snapshot = scores
        .order_by_child("points")
        .start_at(15)
        .limit_to_first(2)
        .once(EventType::Value)
        .await
        .unwrap();

    let keys: Vec<&str> = snapshot.children().map(|child| child.key()).collect();
    assert_eq!(keys, vec!["linus", "ada"]);
    let points: Vec<Option<Value>> = snapshot
        .children()
        .map(|child| child.val().map(|value| value["points"].clone()))
        .collect();
    assert_eq!(points, vec![Some(json!(20)), Some(json!(30))]);
    assert_eq!(snapshot.key(), Some("scores"));
}

#[tokio::test(flavor = "multi_thread")]
async fn push_creates_ordered_children() {
    let (_, database) = init_database("https://chat.example.com").unwrap();
    let messages = database.reference("rooms/general/messages");

    let first = messages.push(json!({ "text": "hi" })).await.unwrap();
    let second = messages.push(json!({ "text": "there" })).await.unwrap();
    assert_eq!(first.parent().unwrap().path(), messages.path());

    let snapshot = messages.order_by_key().once(EventType::Value).await.unwrap();
    let keys: Vec<&str> = snapshot.children().map(|child| child.key()).collect();
    assert_eq!(keys, vec![first.key().unwrap(), second.key().unwrap()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_merges_and_remove_clears() {
    let (bridge, database) = init_database("https://profiles.example.com").unwrap();
    let profile = database.reference("users/ada");
    profile
        .set_with_priority(json!({ "name": "Ada" }), 1)
        .await
        .unwrap();

    let mut values = Map::new();
    values.insert("born".into(), json!(1815));
    values.insert("languages/first".into(), json!("analytical engine"));
    profile.update(values).await.unwrap();

    let snapshot = profile.once(EventType::Value).await.unwrap();
    assert_eq!(
        snapshot.val(),
        Some(&json!({
            "name": "Ada",
            "born": 1815,
            "languages": { "first": "analytical engine" }
        }))
    );
    assert_eq!(snapshot.priority(), Some(&json!(1)));
    assert!(snapshot.has_children());

    profile.remove().await.unwrap();
    let snapshot = profile.once(EventType::Value).await.unwrap();
    assert!(!snapshot.exists());
    assert_eq!(
        bridge.value_at("https://profiles.example.com", "/users"),
        None
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn connectivity_toggles_reach_the_store() {
    let (bridge, database) = init_database("https://offline.example.com").unwrap();
    database.go_offline().await.unwrap();
    assert!(!bridge.is_online("https://offline.example.com"));
    database.go_online().await.unwrap();
    assert!(bridge.is_online("https://offline.example.com"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_listener_reports_through_error_callback() {
    let (bridge, database) = init_database("https://events.example.com").unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let captured = errors.clone();

    let err = database
        .reference("feed")
        .on(
            EventType::ChildAdded,
            |_| panic!("no snapshot expected"),
            move |err| captured.lock().unwrap().push(err.code_str()),
        )
        .await
        .unwrap_err();

    assert!(err.is_bridge_error());
    assert_eq!(errors.lock().unwrap().as_slice(), &["database/bridge"]);
    assert_eq!(database.active_listener_count(), 0);
    assert_eq!(bridge.listener_count(), 0);
}
