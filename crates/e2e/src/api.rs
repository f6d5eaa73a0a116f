//! REST load scenario against the to-do API
//!
//! Each virtual user walks the full list/item lifecycle once per iteration:
//!
//! ```text
//! GET /lists -> POST /lists -> GET/PUT /lists/{id} -> GET /lists/{id}/items
//!   -> POST /lists/{id}/items -> GET/PUT /lists/{id}/items/{itemId}
//!   -> GET /lists/{id}/state/inprogress -> DELETE item -> DELETE list
//! ```
//!
//! Requests that depend on an id are skipped when the create call failed.
//! Whatever is still alive when the user stops is deleted as cleanup.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::playwright::duration_secs;

const LIST_NAME: &str = "My Awesome List";
const LIST_DESCRIPTION: &str = "A description for my awesome list";
const ITEM_NAME: &str = "Important Task";
const ITEM_DESCRIPTION: &str = "Details about this important task";

const OK: &[u16] = &[200];
const CREATED: &[u16] = &[201];
const DELETED: &[u16] = &[200, 204];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Todo,
    InProgress,
    Done,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Todo => "todo",
            ItemState::InProgress => "inprogress",
            ItemState::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPayload {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub name: String,
    pub state: ItemState,
    pub due_date: Option<String>,
    pub completed_date: Option<String>,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: Option<String>,
}

/// Load run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// API base URL
    pub host: String,

    /// Concurrent virtual users
    pub users: usize,

    /// Scenario runs per user
    pub iterations: usize,

    /// Pause between iterations, picked uniformly from this range
    pub wait_min_ms: u64,
    pub wait_max_ms: u64,

    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3100".to_string(),
            users: 1,
            iterations: 1,
            wait_min_ms: 1000,
            wait_max_ms: 3000,
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> E2eResult<()> {
        if self.users == 0 {
            return Err(E2eError::InvalidConfig("users must be at least 1".to_string()));
        }
        if self.wait_min_ms > self.wait_max_ms {
            return Err(E2eError::InvalidConfig(format!(
                "wait_min_ms ({}) exceeds wait_max_ms ({})",
                self.wait_min_ms, self.wait_max_ms
            )));
        }
        Ok(())
    }
}

/// Latency and failure counts for one named request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub requests: u64,
    pub failures: u64,
    pub total_ms: u64,
    pub min_ms: Option<u64>,
    pub max_ms: u64,
}

impl RequestStats {
    fn record(&mut self, elapsed_ms: u64, success: bool) {
        self.requests += 1;
        if !success {
            self.failures += 1;
        }
        self.total_ms += elapsed_ms;
        self.min_ms = Some(self.min_ms.map_or(elapsed_ms, |m| m.min(elapsed_ms)));
        self.max_ms = self.max_ms.max(elapsed_ms);
    }

    fn merge(&mut self, other: &RequestStats) {
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_ms += other.total_ms;
        self.min_ms = match (self.min_ms, other.min_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_ms = self.max_ms.max(other.max_ms);
    }

    pub fn avg_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.requests as f64
        }
    }
}

/// Aggregated result of a load run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub iterations: u64,
    pub duration_ms: u64,
    pub requests: BTreeMap<String, RequestStats>,
}

impl LoadReport {
    pub fn total_requests(&self) -> u64 {
        self.requests.values().map(|s| s.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.requests.values().map(|s| s.failures).sum()
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.iterations += other.iterations;
        for (name, stats) in other.requests {
            self.requests.entry(name).or_default().merge(&stats);
        }
    }

    fn record(&mut self, name: &str, elapsed_ms: u64, success: bool) {
        self.requests
            .entry(name.to_string())
            .or_default()
            .record(elapsed_ms, success);
    }
}

/// Thin client for the to-do REST API
#[derive(Debug, Clone)]
pub struct TodoApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl TodoApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> E2eResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    pub fn post<T: Serialize>(&self, path: &str, body: &T) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
    }

    pub fn put<T: Serialize>(&self, path: &str, body: &T) -> RequestBuilder {
        self.http
            .put(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
    }
}

/// One simulated API user with its own names and created ids
pub struct VirtualUser {
    client: TodoApiClient,
    list_name: String,
    item_name: String,
    list_id: Option<String>,
    item_id: Option<String>,
    report: LoadReport,
}

impl VirtualUser {
    pub fn new(client: TodoApiClient) -> Self {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            client,
            list_name: format!("{} {}", LIST_NAME, suffix),
            item_name: format!("{} {}", ITEM_NAME, suffix),
            list_id: None,
            item_id: None,
            report: LoadReport::default(),
        }
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn into_report(self) -> LoadReport {
        self.report
    }

    /// Send a request and record it; returns the body on an expected status
    async fn send(&mut self, name: &str, request: RequestBuilder, expected: &[u16]) -> Option<String> {
        let start = Instant::now();
        let result = request.send().await;

        let (success, body) = match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let url = resp.url().to_string();
                let body = resp.text().await.unwrap_or_default();
                if expected.contains(&status) {
                    (true, Some(body))
                } else {
                    let err = E2eError::Api { name: name.to_string(), status, body };
                    warn!("{}", err);
                    debug!("Request URL: {}", url);
                    (false, None)
                }
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                (false, None)
            }
        };

        self.report.record(name, start.elapsed().as_millis() as u64, success);
        body
    }

    fn created_id(name: &str, body: &str) -> Option<String> {
        match serde_json::from_str::<Created>(body) {
            Ok(Created { id: Some(id) }) => Some(id),
            Ok(Created { id: None }) => {
                warn!("{}: 'id' not found in response: {}", name, body);
                None
            }
            Err(e) => {
                warn!("{}: failed to parse response ({}): {}", name, e, body);
                None
            }
        }
    }

    /// One pass through the list/item lifecycle
    pub async fn run_iteration(&mut self) {
        debug!("Starting API scenario run");
        self.report.iterations += 1;

        let req = self.client.get("/lists");
        self.send("Get All Lists", req, OK).await;

        let payload = ListPayload {
            name: self.list_name.clone(),
            description: LIST_DESCRIPTION.to_string(),
        };
        let req = self.client.post("/lists", &payload);
        self.list_id = self
            .send("Create List", req, CREATED)
            .await
            .and_then(|body| Self::created_id("Create List", &body));

        let Some(list_id) = self.list_id.clone() else {
            warn!("Skipping dependent list operations as list creation failed");
            return;
        };
        let list_path = format!("/lists/{}", list_id);

        let req = self.client.get(&list_path);
        self.send("Get List by ID", req, OK).await;

        let payload = ListPayload {
            name: format!("{} - Updated", self.list_name),
            description: format!("{} - Updated", LIST_DESCRIPTION),
        };
        let req = self.client.put(&list_path, &payload);
        self.send("Update List by ID", req, OK).await;

        let items_path = format!("{}/items", list_path);
        let req = self.client.get(&items_path);
        self.send("Get All Items in List", req, OK).await;

        let payload = ItemPayload {
            name: self.item_name.clone(),
            state: ItemState::Todo,
            due_date: Some(chrono::Utc::now().to_rfc3339()),
            completed_date: None,
            description: ITEM_DESCRIPTION.to_string(),
        };
        let req = self.client.post(&items_path, &payload);
        self.item_id = self
            .send("Create List Item", req, CREATED)
            .await
            .and_then(|body| Self::created_id("Create List Item", &body));

        if let Some(item_id) = self.item_id.clone() {
            let item_path = format!("{}/{}", items_path, item_id);

            let req = self.client.get(&item_path);
            self.send("Get List Item by ID", req, OK).await;

            let payload = ItemPayload {
                name: format!("{} - Updated", self.item_name),
                state: ItemState::InProgress,
                due_date: Some(chrono::Utc::now().to_rfc3339()),
                completed_date: None,
                description: format!("{} - Updated", ITEM_DESCRIPTION),
            };
            let req = self.client.put(&item_path, &payload);
            self.send("Update List Item", req, OK).await;

            let state_path = format!("{}/state/{}", list_path, ItemState::InProgress.as_str());
            let req = self.client.get(&state_path);
            self.send("Get List Items by State", req, OK).await;

            let req = self.client.delete(&item_path);
            if self.send("Delete List Item", req, DELETED).await.is_some() {
                self.item_id = None;
            }
        }

        let req = self.client.delete(&list_path);
        if self.send("Delete List", req, DELETED).await.is_some() {
            self.list_id = None;
        }
    }

    /// Delete anything a failed iteration left behind
    pub async fn stop(&mut self) {
        if let (Some(list_id), Some(item_id)) = (self.list_id.clone(), self.item_id.clone()) {
            info!("Cleaning up item {} from list {}", item_id, list_id);
            let req = self.client.delete(&format!("/lists/{}/items/{}", list_id, item_id));
            if self.send("Cleanup Delete Item", req, DELETED).await.is_some() {
                self.item_id = None;
            }
        }

        if let Some(list_id) = self.list_id.clone() {
            info!("Cleaning up list {}", list_id);
            let req = self.client.delete(&format!("/lists/{}", list_id));
            if self.send("Cleanup Delete List", req, DELETED).await.is_some() {
                self.list_id = None;
            }
        }
    }
}

/// Run `users` concurrent virtual users and merge their statistics
pub async fn run_load(config: &LoadConfig) -> E2eResult<LoadReport> {
    config.validate()?;

    info!(
        "Starting load run: {} user(s) x {} iteration(s) against {}",
        config.users, config.iterations, config.host
    );

    let start = Instant::now();
    let mut handles = Vec::with_capacity(config.users);

    for _ in 0..config.users {
        let client = TodoApiClient::new(&config.host, config.request_timeout)?;
        let config = config.clone();

        handles.push(tokio::spawn(async move {
            let mut user = VirtualUser::new(client);
            for i in 0..config.iterations {
                if i > 0 {
                    let wait = rand::thread_rng().gen_range(config.wait_min_ms..=config.wait_max_ms);
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                user.run_iteration().await;
            }
            user.stop().await;
            user.into_report()
        }));
    }

    let mut report = LoadReport::default();
    for result in futures::future::join_all(handles).await {
        match result {
            Ok(user_report) => report.merge(user_report),
            Err(e) => warn!("Virtual user task failed: {}", e),
        }
    }
    report.duration_ms = start.elapsed().as_millis() as u64;

    for (name, stats) in &report.requests {
        info!(
            "{:<28} {:>5} req {:>4} fail  avg {:>7.1} ms  max {:>5} ms",
            name,
            stats.requests,
            stats.failures,
            stats.avg_ms(),
            stats.max_ms
        );
    }
    info!(
        "Load run finished: {} requests, {} failures in {} ms",
        report.total_requests(),
        report.total_failures(),
        report.duration_ms
    );

    Ok(report)
}
