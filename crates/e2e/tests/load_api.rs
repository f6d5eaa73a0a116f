//! The REST load scenario against an in-process mock of the to-do API

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use todo_e2e::api::{run_load, LoadConfig, TodoApiClient, VirtualUser};

#[derive(Default)]
struct Store {
    next_id: u64,
    lists: HashMap<String, Value>,
    items: HashMap<String, (String, Value)>,
    /// Reject list creation with 500
    fail_create_list: bool,
    /// Reject item deletion with 500
    fail_delete_item: bool,
    /// Reject list deletion with 500
    fail_delete_list: bool,
}

type Shared = Arc<Mutex<Store>>;

impl Store {
    fn id(&mut self) -> String {
        self.next_id += 1;
        format!("id-{}", self.next_id)
    }
}

async fn get_lists(State(store): State<Shared>) -> Json<Value> {
    let store = store.lock().unwrap();
    Json(Value::Array(store.lists.values().cloned().collect()))
}

async fn create_list(State(store): State<Shared>, Json(mut body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if store.fail_create_list {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })));
    }
    let id = store.id();
    body["id"] = json!(id);
    store.lists.insert(id, body.clone());
    (StatusCode::CREATED, Json(body))
}

async fn get_list(State(store): State<Shared>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match store.lock().unwrap().lists.get(&id) {
        Some(list) => (StatusCode::OK, Json(list.clone())),
        None => (StatusCode::NOT_FOUND, Json(Value::Null)),
    }
}

async fn update_list(
    State(store): State<Shared>,
    Path(id): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if !store.lists.contains_key(&id) {
        return (StatusCode::NOT_FOUND, Json(Value::Null));
    }
    body["id"] = json!(id);
    store.lists.insert(id, body.clone());
    (StatusCode::OK, Json(body))
}

async fn delete_list(State(store): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut store = store.lock().unwrap();
    if store.fail_delete_list {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match store.lists.remove(&id) {
        Some(_) => {
            store.items.retain(|_, (list, _)| *list != id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn get_items(State(store): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    let store = store.lock().unwrap();
    let items = store
        .items
        .values()
        .filter(|(list, _)| *list == id)
        .map(|(_, item)| item.clone())
        .collect();
    Json(Value::Array(items))
}

async fn create_item(
    State(store): State<Shared>,
    Path(list_id): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if !store.lists.contains_key(&list_id) {
        return (StatusCode::NOT_FOUND, Json(Value::Null));
    }
    let id = store.id();
    body["id"] = json!(id);
    body["listId"] = json!(list_id);
    store.items.insert(id, (list_id, body.clone()));
    (StatusCode::CREATED, Json(body))
}

async fn get_item(
    State(store): State<Shared>,
    Path((_list_id, item_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match store.lock().unwrap().items.get(&item_id) {
        Some((_, item)) => (StatusCode::OK, Json(item.clone())),
        None => (StatusCode::NOT_FOUND, Json(Value::Null)),
    }
}

async fn update_item(
    State(store): State<Shared>,
    Path((list_id, item_id)): Path<(String, String)>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut store = store.lock().unwrap();
    if !store.items.contains_key(&item_id) {
        return (StatusCode::NOT_FOUND, Json(Value::Null));
    }
    body["id"] = json!(item_id);
    body["listId"] = json!(list_id);
    store.items.insert(item_id, (list_id, body.clone()));
    (StatusCode::OK, Json(body))
}

async fn delete_item(
    State(store): State<Shared>,
    Path((_list_id, item_id)): Path<(String, String)>,
) -> StatusCode {
    let mut store = store.lock().unwrap();
    if store.fail_delete_item {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match store.items.remove(&item_id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn items_by_state(
    State(store): State<Shared>,
    Path((list_id, state)): Path<(String, String)>,
) -> Json<Value> {
    let store = store.lock().unwrap();
    let items = store
        .items
        .values()
        .filter(|(list, item)| *list == list_id && item["state"] == json!(state))
        .map(|(_, item)| item.clone())
        .collect();
    Json(Value::Array(items))
}

/// Serve the mock API on an ephemeral port
async fn spawn_api(store: Shared) -> String {
    let app = Router::new()
        .route("/lists", get(get_lists).post(create_list))
        .route("/lists/:id", get(get_list).put(update_list).delete(delete_list))
        .route("/lists/:id/items", get(get_items).post(create_item))
        .route(
            "/lists/:id/items/:item_id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/lists/:id/state/:state", get(items_by_state))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn quick(host: String, users: usize, iterations: usize) -> LoadConfig {
    LoadConfig {
        host,
        users,
        iterations,
        wait_min_ms: 0,
        wait_max_ms: 10,
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_full_scenario_succeeds_and_cleans_up() {
    let store = Shared::default();
    let host = spawn_api(store.clone()).await;

    let report = run_load(&quick(host, 3, 2)).await.unwrap();

    assert_eq!(report.iterations, 6);
    assert_eq!(report.total_failures(), 0, "{:?}", report.requests);
    // eleven requests per successful iteration, no cleanup needed
    assert_eq!(report.total_requests(), 66);
    assert_eq!(report.requests["Create List"].requests, 6);
    assert_eq!(report.requests["Get List Items by State"].requests, 6);
    assert!(!report.requests.contains_key("Cleanup Delete List"));

    let store = store.lock().unwrap();
    assert!(store.lists.is_empty());
    assert!(store.items.is_empty());
}

#[tokio::test]
async fn test_failed_list_creation_skips_dependents() {
    let store = Shared::default();
    store.lock().unwrap().fail_create_list = true;
    let host = spawn_api(store.clone()).await;

    let report = run_load(&quick(host, 1, 1)).await.unwrap();

    assert_eq!(report.total_requests(), 2);
    assert_eq!(report.requests["Create List"].failures, 1);
    assert_eq!(report.requests["Get All Lists"].failures, 0);
    assert!(!report.requests.contains_key("Get List by ID"));
}

#[tokio::test]
async fn test_leftovers_are_cleaned_up_on_stop() {
    let store = Shared::default();
    {
        let mut store = store.lock().unwrap();
        store.fail_delete_item = true;
        store.fail_delete_list = true;
    }
    let host = spawn_api(store.clone()).await;

    let client = TodoApiClient::new(&host, Duration::from_secs(5)).unwrap();
    let mut user = VirtualUser::new(client);

    user.run_iteration().await;
    {
        let mut store = store.lock().unwrap();
        assert_eq!(store.lists.len(), 1);
        assert_eq!(store.items.len(), 1);
        store.fail_delete_item = false;
        store.fail_delete_list = false;
    }

    user.stop().await;
    let report = user.into_report();

    assert_eq!(report.requests["Delete List Item"].failures, 1);
    assert_eq!(report.requests["Delete List"].failures, 1);
    assert_eq!(report.requests["Cleanup Delete Item"].failures, 0);
    assert_eq!(report.requests["Cleanup Delete List"].failures, 0);

    let store = store.lock().unwrap();
    assert!(store.lists.is_empty());
    assert!(store.items.is_empty());
}

#[tokio::test]
async fn test_payloads_reach_the_api() {
    let store = Shared::default();
    let host = spawn_api(store.clone()).await;
    let client = TodoApiClient::new(&host, Duration::from_secs(5)).unwrap();

    let resp = client
        .post("/lists", &json!({ "name": "n", "description": "d" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let resp = client.get(&format!("/lists/{}", id)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client.delete(&format!("/lists/{}", id)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 204);
}
