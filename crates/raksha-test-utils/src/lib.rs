//! Testing utilities for the RakshaNet workspace
//!
//! Scripted network, recording sinks and link openers shared by the
//! integration tests of every crate.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use raksha_cache::{FetchError, Fetcher, Payload, Request};
use raksha_safety::{
    AlertChannel, AlertPayload, ChannelError, Coordinates, LinkOpener, NotificationSink,
    PhoneNumber, UserId,
};
use reqwest::Method;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const ORIGIN: &str = "https://raksha.test";
pub const BACKEND: &str = "https://backend.test";

/// Scripted answer for one URL
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(Payload),
    Fail,
    Hang,
}

/// One request seen by [`ScriptedNetwork`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Vec<u8>>,
}

impl SeenRequest {
    pub fn json(&self) -> Option<serde_json::Value> {
        self.body.as_deref().and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// In-memory network with an online switch
///
/// Unknown URLs answer 404 while online. Offline, every request fails as
/// unreachable regardless of its script.
#[derive(Debug)]
pub struct ScriptedNetwork {
    online: AtomicBool,
    replies: Mutex<HashMap<String, Reply>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl Default for ScriptedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            replies: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Network serving the stock shell under [`ORIGIN`]
    pub fn with_shell() -> Self {
        let net = Self::new();
        for entry in raksha_cache::DEFAULT_SHELL {
            let url = if entry.starts_with("http") {
                (*entry).to_string()
            } else {
                format!("{ORIGIN}{entry}")
            };
            net.respond(&url, Payload::ok("text/html", format!("shell:{entry}")));
        }
        net
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn respond(&self, url: &str, payload: Payload) {
        self.replies.lock().insert(url.to_string(), Reply::Respond(payload));
    }

    pub fn respond_json(&self, url: &str, status: u16, body: &serde_json::Value) {
        let bytes = serde_json::to_vec(body).unwrap();
        self.respond(url, Payload::new(status, Some("application/json".into()), bytes));
    }

    pub fn fail(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Fail);
    }

    pub fn hang(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Hang);
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    pub fn seen_to(&self, url: &str) -> Vec<SeenRequest> {
        self.seen.lock().iter().filter(|r| r.url == url).cloned().collect()
    }

    pub fn count_to(&self, url: &str) -> usize {
        self.seen.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Payload, FetchError> {
        let url = request.url.to_string();
        self.seen.lock().push(SeenRequest {
            method: request.method.clone(),
            url: url.clone(),
            body: request.body.as_ref().map(|(_, b)| b.clone()),
        });

        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::unreachable(url, "offline"));
        }

        let reply = self.replies.lock().get(&url).cloned();
        match reply {
            Some(Reply::Respond(payload)) => Ok(payload),
            Some(Reply::Fail) => Err(FetchError::unreachable(url, "connection refused")),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(Payload::new(404, Some("text/plain".into()), "not found")),
        }
    }
}

/// Call recorded by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Armed { user: UserId, minutes: u32 },
    CheckedIn { user: UserId },
    Sos { user: UserId, coordinates: Option<Coordinates> },
}

/// Notification sink that records calls, optionally hanging forever first
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    hang: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every call records and then never completes
    pub fn hanging() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hang: true,
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn sos_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SinkCall::Sos { .. }))
            .count()
    }

    async fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
        if self.hang {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_armed(&self, user: &UserId, minutes: u32) {
        self.record(SinkCall::Armed {
            user: user.clone(),
            minutes,
        })
        .await;
    }

    async fn notify_checked_in(&self, user: &UserId) {
        self.record(SinkCall::CheckedIn { user: user.clone() }).await;
    }

    async fn notify_sos(&self, user: &UserId, coordinates: Option<Coordinates>) {
        self.record(SinkCall::Sos {
            user: user.clone(),
            coordinates,
        })
        .await;
    }
}

/// Link opener that records links, optionally refusing them
#[derive(Debug, Default)]
pub struct RecordingOpener {
    links: Mutex<Vec<String>>,
    refuse: bool,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            links: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    pub fn links(&self) -> Vec<String> {
        self.links.lock().clone()
    }
}

impl LinkOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<(), String> {
        self.links.lock().push(url.to_string());
        if self.refuse {
            Err("no handler".to_string())
        } else {
            Ok(())
        }
    }
}

/// Channel counting deliveries
#[derive(Debug, Default)]
pub struct CountingChannel {
    delivered: AtomicUsize,
    last: Mutex<Option<AlertPayload>>,
}

impl CountingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<AlertPayload> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl AlertChannel for CountingChannel {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn deliver(
        &self,
        payload: &AlertPayload,
        _contacts: &[PhoneNumber],
    ) -> Result<(), ChannelError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(payload.clone());
        Ok(())
    }
}

/// Poll `condition` until it holds, yielding to spawned tasks between checks
///
/// Panics after `within` of tokio time.
pub async fn eventually<F>(within: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {within:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Await `fut`, panicking if it takes longer than `within`
pub async fn within<T>(within: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(within, fut)
        .await
        .unwrap_or_else(|_| panic!("future did not complete within {within:?}"))
}
