//! Backend client, contacts and activity over a scripted network

use pretty_assertions::assert_eq;
use raksha_cache::{CacheAgent, CacheConfig, Fetcher, RouteError, RoutingPolicy};
use raksha_safety::{
    ActivityError, ActivityLog, BackendClient, BackendConfig, BackendError, BackendNotifier,
    ContactBook, ContactError, ContactSource, Coordinates, Identity, IdentityPolicy,
    NotificationSink, PhoneNumber, SafetyContext, Severity, UserId,
};
use raksha_test_utils::{ScriptedNetwork, BACKEND, ORIGIN};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const USER: &str = "asha@raksha.test";
const USER_PATH: &str = "asha%40raksha.test";

struct Rig {
    net: Arc<ScriptedNetwork>,
    agent: CacheAgent,
    backend: Arc<BackendClient>,
    ctx: SafetyContext,
}

fn rig() -> Rig {
    let net = Arc::new(ScriptedNetwork::with_shell());
    let config = CacheConfig::new()
        .with_origin(format!("{ORIGIN}/"))
        .with_routing(RoutingPolicy::default().with_network_only_host("backend.test"));
    let agent = CacheAgent::new(&config, Arc::clone(&net) as Arc<dyn Fetcher>).unwrap();
    let backend = Arc::new(
        BackendClient::new(
            &BackendConfig::default()
                .with_base_url(BACKEND)
                .with_timeout(Duration::from_secs(5)),
            agent.router().clone(),
        )
        .unwrap(),
    );
    let (ctx, identity) = SafetyContext::new(IdentityPolicy::Required);
    identity.sign_in(Identity::new(None, USER));
    Rig {
        net,
        agent,
        backend,
        ctx,
    }
}

#[tokio::test]
async fn start_timer_posts_user_and_minutes() {
    let rig = rig();
    let url = format!("{BACKEND}/start-timer");
    rig.net.respond_json(
        &url,
        200,
        &json!({"message": "Safety timer started", "fires_at": "10:01:00", "duration_min": 1}),
    );

    let reply = rig.backend.start_timer(&UserId::new(USER), 1).await.unwrap();
    assert_eq!(reply.duration_min, Some(1));

    let seen = rig.net.seen_to(&url);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].json().unwrap(), json!({"userId": USER, "minutes": 1}));
}

#[tokio::test]
async fn sos_carries_coordinates_when_known() {
    let rig = rig();
    let url = format!("{BACKEND}/sos");
    rig.net.respond_json(&url, 200, &json!({"message": "SOS alert sent"}));

    rig.backend
        .sos(&UserId::new(USER), Some(Coordinates::new(12.5, 77.25)))
        .await
        .unwrap();
    rig.backend.sos(&UserId::new(USER), None).await.unwrap();

    let bodies: Vec<_> = rig.net.seen_to(&url).iter().filter_map(|r| r.json()).collect();
    assert_eq!(bodies[0], json!({"userId": USER, "lat": 12.5, "lng": 77.25}));
    assert_eq!(bodies[1], json!({"userId": USER}));
}

#[tokio::test]
async fn offline_logs_fail_instead_of_serving_stale_data() {
    let rig = rig();
    rig.agent.start().await;
    let url = format!("{BACKEND}/logs/{USER_PATH}");
    rig.net.respond_json(&url, 200, &json!([{"reason": "SOS button triggered", "time": "t1"}]));
    let activity = ActivityLog::new(Arc::clone(&rig.backend), rig.ctx.clone());

    let online = activity.recent().await.unwrap();
    assert_eq!(online[0].severity(), Severity::Danger);

    rig.net.set_online(false);
    let err = activity.recent().await.unwrap_err();
    match err {
        ActivityError::Backend(e) => {
            assert!(e.is_offline());
            assert!(matches!(e, BackendError::Network(RouteError::NetworkUnavailable { .. })));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn invalid_date_is_rejected_before_any_request() {
    let rig = rig();
    let activity = ActivityLog::new(Arc::clone(&rig.backend), rig.ctx.clone());
    let before = rig.net.seen().len();

    assert!(matches!(
        activity.on_date("06/15/2025").await,
        Err(ActivityError::InvalidDate(_))
    ));
    assert_eq!(rig.net.seen().len(), before);

    let url = format!("{BACKEND}/logs/{USER_PATH}/date/2025-06-15");
    rig.net.respond_json(&url, 200, &json!([]));
    assert!(activity.on_date("2025-06-15").await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_decode() {
    let rig = rig();
    rig.net.respond_json(
        &format!("{BACKEND}/stats/{USER_PATH}"),
        200,
        &json!({"total_alerts": 4, "alerts_today": 1, "alerts_this_week": 2, "week_number": 24}),
    );
    let stats = ActivityLog::new(Arc::clone(&rig.backend), rig.ctx.clone())
        .stats()
        .await
        .unwrap();
    assert_eq!(stats.total_alerts, 4);
    assert_eq!(stats.week_number, Some(24));
    assert_eq!(stats.first_alert, None);
}

#[tokio::test]
async fn server_error_is_a_status_error() {
    let rig = rig();
    rig.net.respond_json(&format!("{BACKEND}/check-in"), 500, &json!({"error": "boom"}));
    let err = rig.backend.check_in(&UserId::new(USER)).await.unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 500, .. }));
    assert!(!err.is_offline());
}

#[tokio::test(start_paused = true)]
async fn hanging_backend_times_out() {
    let rig = rig();
    rig.net.hang(&format!("{BACKEND}/check-in"));
    let err = rig.backend.check_in(&UserId::new(USER)).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout { after_ms: 5000, .. }));
}

#[tokio::test]
async fn notifier_swallows_every_failure() {
    let rig = rig();
    rig.net.set_online(false);
    let notifier = BackendNotifier::new(Arc::clone(&rig.backend));
    let user = UserId::new(USER);

    notifier.notify_armed(&user, 1).await;
    notifier.notify_checked_in(&user).await;
    notifier.notify_sos(&user, None).await;

    assert_eq!(rig.net.seen().len(), 3);
}

#[tokio::test]
async fn contacts_validate_before_submission() {
    let rig = rig();
    let book = ContactBook::new(Arc::clone(&rig.backend), rig.ctx.clone());

    let err = book.add("98765 43210").await.unwrap_err();
    assert!(matches!(err, ContactError::InvalidPhone { .. }));
    assert!(rig.net.seen().is_empty());

    let url = format!("{BACKEND}/add-contact");
    rig.net.respond_json(&url, 200, &json!({"message": "Contact saved"}));
    book.add("+91 98765 43210").await.unwrap();
    assert_eq!(
        rig.net.seen_to(&url)[0].json().unwrap(),
        json!({"userId": USER, "phone": "+919876543210"})
    );
}

#[tokio::test]
async fn remove_posts_to_delete_contact() {
    let rig = rig();
    let book = ContactBook::new(Arc::clone(&rig.backend), rig.ctx.clone());
    let url = format!("{BACKEND}/delete-contact");
    rig.net.respond_json(&url, 200, &json!({"message": "Contact removed"}));

    book.remove("+919876543210").await.unwrap();
    assert_eq!(rig.net.seen_to(&url)[0].method, Method::POST);
}

#[tokio::test]
async fn contact_source_falls_back_to_last_known_list_offline() {
    let rig = rig();
    let book = ContactBook::new(Arc::clone(&rig.backend), rig.ctx.clone());
    rig.net.respond_json(
        &format!("{BACKEND}/contacts/{USER_PATH}"),
        200,
        &json!({"contacts": ["+919876543210", "not-a-phone", "+44 20 7946 0958"], "count": 3}),
    );

    let user = UserId::new(USER);
    let online = book.contacts(&user).await;
    assert_eq!(online.len(), 2);

    rig.net.set_online(false);
    let offline = book.contacts(&user).await;
    assert_eq!(offline, online);
}

#[tokio::test]
async fn contacts_are_read_for_the_alerting_user_after_sign_out() {
    let rig = rig();
    let (ctx, identity) = SafetyContext::new(IdentityPolicy::Required);
    let book = ContactBook::new(Arc::clone(&rig.backend), ctx);
    let url = format!("{BACKEND}/contacts/{USER_PATH}");
    rig.net.respond_json(&url, 200, &json!({"contacts": ["+919876543210"], "count": 1}));

    identity.sign_out();
    let phones = book.contacts(&UserId::new(USER)).await;
    assert_eq!(phones, vec![PhoneNumber::parse("+919876543210").unwrap()]);
    assert_eq!(rig.net.count_to(&url), 1);

    book.contacts(&UserId::anonymous()).await;
    assert_eq!(rig.net.count_to(&url), 1);
}

#[tokio::test]
async fn signed_out_user_cannot_manage_contacts() {
    let rig = rig();
    let (ctx, _identity) = SafetyContext::new(IdentityPolicy::Required);
    let book = ContactBook::new(Arc::clone(&rig.backend), ctx);
    assert!(matches!(book.refresh().await, Err(ContactError::AuthRequired)));
}
