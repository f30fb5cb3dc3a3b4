//! Install atomicity and offline routing against a scripted network

use pretty_assertions::assert_eq;
use raksha_cache::prelude::*;
use raksha_cache::{CacheInstaller, InstallError, ShellManifest, VersionedCacheStore};
use raksha_test_utils::{eventually, ScriptedNetwork, BACKEND, ORIGIN};
use reqwest::{Method, Url};
use std::sync::Arc;
use std::time::Duration;

fn config() -> CacheConfig {
    CacheConfig::new().with_origin(format!("{ORIGIN}/")).with_routing(
        raksha_cache::RoutingPolicy::default().with_network_only_host("backend.test"),
    )
}

fn agent(net: &Arc<ScriptedNetwork>) -> CacheAgent {
    CacheAgent::new(&config(), Arc::clone(net) as Arc<dyn Fetcher>).unwrap()
}

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

#[tokio::test]
async fn install_and_activate_serves_shell_offline() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);

    let activation = agent.start().await;
    assert_eq!(activation.live_tag.as_deref(), Some("rakshanet-v1"));
    assert!(agent.clients_claimed());

    net.set_online(false);
    let page = agent
        .on_request(Request::navigate(url(&format!("{ORIGIN}/pages/journey.html"))))
        .await
        .unwrap();
    assert_eq!(page.source, ResponseSource::Cache);
    assert_eq!(page.text(), "shell:/pages/journey.html");
}

#[tokio::test]
async fn uncached_navigation_falls_back_to_shell_root() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);
    agent.start().await;
    net.set_online(false);

    let page = agent
        .on_request(Request::navigate(url(&format!("{ORIGIN}/pages/unknown.html"))))
        .await
        .unwrap();
    assert_eq!(page.source, ResponseSource::Shell);
    assert_eq!(page.text(), "shell:/index.html");

    let err = agent
        .on_request(Request::get(url(&format!("{ORIGIN}/src/unknown.js"))))
        .await
        .unwrap_err();
    assert!(err.is_network_unavailable());
}

#[tokio::test]
async fn failed_install_keeps_previous_generation_live() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let store = Arc::new(VersionedCacheStore::new());
    let manifest = ShellManifest::rakshanet(url(&format!("{ORIGIN}/")));

    let v1 = CacheInstaller::new(Arc::clone(&store), Arc::clone(&net) as Arc<dyn Fetcher>, "v1");
    v1.install(&manifest).await.unwrap();
    v1.activate();

    net.fail(&format!("{ORIGIN}/src/map.js"));
    let v2 = CacheInstaller::new(Arc::clone(&store), Arc::clone(&net) as Arc<dyn Fetcher>, "v2");
    let err = v2.install(&manifest).await.unwrap_err();
    assert!(matches!(err, InstallError::Fetch { .. }));

    let activation = v2.activate();
    assert_eq!(activation.live_tag.as_deref(), Some("v1"));
    assert!(!activation.swapped);
    assert_eq!(store.generation_count(), 1);
}

#[tokio::test]
async fn bad_status_aborts_first_install() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    net.respond(
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
        Payload::new(503, None, "busy"),
    );
    let agent = agent(&net);

    assert!(agent.on_install().await.is_none());
    let activation = agent.on_activate();
    assert_eq!(activation.live_tag, None);
    assert!(agent.store().live().is_none());
}

#[tokio::test]
async fn reinstall_sweeps_old_generation() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);
    agent.start().await;
    agent.start().await;
    agent.start().await;
    assert_eq!(agent.store().generation_count(), 1);
}

#[tokio::test]
async fn backend_reads_are_never_served_from_cache() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let logs = format!("{BACKEND}/logs/asha%40raksha.test");
    net.respond_json(&logs, 200, &serde_json::json!([{"reason": "SOS", "time": "t"}]));
    let agent = agent(&net);
    agent.start().await;

    let online = agent.on_request(Request::get(url(&logs))).await.unwrap();
    assert_eq!(online.source, ResponseSource::Network);

    // Give any (incorrect) passive write a chance to land.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(agent.store().lookup(&ResourceKey::parse(&logs).unwrap()).await.is_none());

    net.set_online(false);
    let err = agent.on_request(Request::get(url(&logs))).await.unwrap_err();
    assert!(err.is_network_unavailable());
}

#[tokio::test]
async fn network_first_writes_behind() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let tips = format!("{ORIGIN}/pages/extra-tips.html");
    net.respond(&tips, Payload::ok("text/html", "tips"));
    let agent = agent(&net);
    agent.start().await;

    let first = agent.on_request(Request::navigate(url(&tips))).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    let key = ResourceKey::parse(&tips).unwrap();
    let store = Arc::clone(agent.store());
    let mut cached = false;
    for _ in 0..50 {
        if store.lookup(&key).await.is_some() {
            cached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(cached, "write-behind never landed");

    net.set_online(false);
    let offline = agent.on_request(Request::navigate(url(&tips))).await.unwrap();
    assert_eq!(offline.source, ResponseSource::Cache);
    assert_eq!(offline.text(), "tips");
}

#[tokio::test]
async fn post_is_network_only_even_for_shell_urls() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);
    agent.start().await;
    net.set_online(false);

    let request = Request::parse(Method::POST, &format!("{ORIGIN}/index.html"), Destination::Document)
        .unwrap();
    assert_eq!(agent.router().route(&request), RoutingDecision::NetworkOnly);
    assert!(agent.on_request(request).await.is_err());
}

#[tokio::test]
async fn offline_head_is_not_answered_with_a_cached_body() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);
    agent.start().await;
    net.set_online(false);

    let tips = format!("{ORIGIN}/pages/safety-tips.html");
    let get = agent.on_request(Request::get(url(&tips))).await.unwrap();
    assert_eq!(get.source, ResponseSource::Cache);

    let head = Request::parse(Method::HEAD, &tips, Destination::Fetch).unwrap();
    assert!(agent.on_request(head).await.is_err());

    let head_navigation = Request::parse(Method::HEAD, &tips, Destination::Document).unwrap();
    assert!(agent.on_request(head_navigation).await.is_err());
}

#[tokio::test]
async fn non_success_responses_are_not_cached() {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let agent = agent(&net);
    agent.start().await;

    let missing = format!("{ORIGIN}/missing.png");
    let response = agent.on_request(Request::get(url(&missing))).await.unwrap();
    assert_eq!(response.status(), 404);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let key = ResourceKey::parse(&missing).unwrap();
    assert!(agent.store().lookup(&key).await.is_none());
    eventually(Duration::from_millis(50), || net.count_to(&missing) == 1).await;
}
