//! Fanout correctness: the eligible set is a flat membership filter, live pushes reach only
//! eligible connected workers, and external notification failures never leak into order flow.
use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use vdp_common::Tenge;
use visit_dispatch_engine::{
    db_types::Role,
    dispatch::Dispatcher,
    events::EventProducers,
    gateway::{GatewayEvent, RealtimeGateway, EVENT_BUFFER_SIZE},
    order_objects::NewOrderRequest,
    test_utils::{prepare_env::prepare_test_env, prepare_env::random_db_path, seed},
    traits::{AccessClaims, AuthApiError, NotificationChannel, NotifyError, NotifyPayload, TokenVerifier, WorkerDirectory},
    OrderFlowApi,
    SqliteDatabase,
};

const CLIENT: i64 = 1;
const W1: i64 = 100;
const W2: i64 = 101;

/// Token verifier with a fixed token table, standing in for the external identity service.
struct StaticVerifier(HashMap<String, AccessClaims>);

impl StaticVerifier {
    fn with_users(users: &[(i64, Role)]) -> Self {
        let map = users
            .iter()
            .map(|(id, role)| (format!("token-{id}"), AccessClaims::new(*id, vec![*role])))
            .collect();
        Self(map)
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthApiError> {
        self.0.get(token).cloned().ok_or_else(|| AuthApiError::InvalidToken("unknown token".to_string()))
    }
}

/// Records every external notification instead of delivering it.
#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(i64, NotifyPayload)>>>,
}

impl NotificationChannel for RecordingNotifier {
    async fn notify(&self, user_id: i64, payload: NotifyPayload) -> Result<(), NotifyError> {
        self.sent.lock().push((user_id, payload));
        Ok(())
    }
}

/// Hangs long enough to trip any reasonable timeout.
#[derive(Clone)]
struct StuckNotifier;

impl NotificationChannel for StuckNotifier {
    async fn notify(&self, _user_id: i64, _payload: NotifyPayload) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn order_request(district: &str) -> NewOrderRequest {
    NewOrderRequest {
        service_type: "injection".to_string(),
        city: "Almaty".to_string(),
        district: district.to_string(),
        address: "Abay ave 10".to_string(),
        scheduled_at: chrono::Utc::now(),
        price: Some(Tenge::from(5000)),
        comment: None,
    }
}

async fn recv_event(rx: &mut mpsc::Receiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.expect("timed out waiting for event").unwrap()
}

fn assert_no_event(rx: &mut mpsc::Receiver<GatewayEvent>) {
    match rx.try_recv() {
        Err(mpsc::error::TryRecvError::Empty) => {},
        other => panic!("expected silence, got {other:?}"),
    }
}

#[tokio::test]
async fn eligibility_is_a_flat_membership_filter() {
    let db = new_db().await;
    seed::seed_worker(&db, W1, "Almaty", &["A", "B"], true).await;
    seed::seed_worker(&db, W2, "Almaty", &["C"], true).await;
    seed::seed_worker(&db, 102, "Astana", &["A"], true).await; // right district, wrong city
    seed::seed_worker(&db, 103, "Almaty", &["A"], false).await; // not approved

    let eligible = db.list_eligible_workers("Almaty", "A").await.unwrap();
    assert_eq!(eligible, vec![W1]);
    let eligible = db.list_eligible_workers("Almaty", "C").await.unwrap();
    assert_eq!(eligible, vec![W2]);
}

#[tokio::test]
async fn fanout_reaches_eligible_connected_workers_only() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, W1, "Almaty", &["A", "B"], true).await;
    seed::seed_worker(&db, W2, "Almaty", &["C"], true).await;

    let verifier = StaticVerifier::with_users(&[(CLIENT, Role::Client), (W1, Role::Medic), (W2, Role::Medic)]);
    let gateway = Arc::new(RealtimeGateway::new(db.clone(), verifier));
    let notifier = RecordingNotifier::default();
    let dispatcher = Dispatcher::new(db.clone(), notifier.clone(), gateway.clone());

    let (tx1, mut rx1) = mpsc::channel(EVENT_BUFFER_SIZE);
    let conn1 = gateway.register(tx1);
    gateway.authenticate(conn1, &format!("token-{W1}")).unwrap();
    let (tx2, mut rx2) = mpsc::channel(EVENT_BUFFER_SIZE);
    let conn2 = gateway.register(tx2);
    gateway.authenticate(conn2, &format!("token-{W2}")).unwrap();
    // drain the hello frames
    for rx in [&mut rx1, &mut rx2] {
        assert!(matches!(recv_event(rx).await, GatewayEvent::Connected { .. }));
        assert!(matches!(recv_event(rx).await, GatewayEvent::Authenticated { .. }));
    }

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.create_order(CLIENT, order_request("A")).await.unwrap();
    dispatcher.dispatch_new_order(&order).await;

    match recv_event(&mut rx1).await {
        GatewayEvent::NewOrderAvailable { order: pushed } => assert_eq!(pushed.order_id, order.order_id),
        other => panic!("W1 expected the order push, got {other:?}"),
    }
    assert_no_event(&mut rx2);

    let sent = notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, W1);
    assert!(matches!(sent[0].1, NotifyPayload::NewOrderAvailable { .. }));
}

#[tokio::test]
async fn offline_workers_discover_orders_by_polling() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, W1, "Almaty", &["A"], true).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.create_order(CLIENT, order_request("A")).await.unwrap();
    // no gateway, no dispatcher: the worker was offline for the whole fanout

    let available = api.available_orders(W1).await.unwrap();
    assert_eq!(available.iter().map(|o| &o.order_id).collect::<Vec<_>>(), vec![&order.order_id]);

    // once somebody takes it, it leaves the list
    api.accept_order(&order.order_id, W1).await.unwrap();
    assert!(api.available_orders(W1).await.unwrap().is_empty());
}

#[tokio::test]
async fn losers_get_a_benign_retraction_when_the_race_settles() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, W1, "Almaty", &["A"], true).await;
    seed::seed_worker(&db, W2, "Almaty", &["A"], true).await;

    let verifier = StaticVerifier::with_users(&[(CLIENT, Role::Client), (W1, Role::Medic), (W2, Role::Medic)]);
    let gateway = Arc::new(RealtimeGateway::new(db.clone(), verifier));
    let notifier = RecordingNotifier::default();
    let dispatcher = Dispatcher::new(db.clone(), notifier.clone(), gateway.clone());

    let (tx2, mut rx2) = mpsc::channel(EVENT_BUFFER_SIZE);
    let conn2 = gateway.register(tx2);
    gateway.authenticate(conn2, &format!("token-{W2}")).unwrap();
    let (txc, mut rxc) = mpsc::channel(EVENT_BUFFER_SIZE);
    let connc = gateway.register(txc);
    gateway.authenticate(connc, &format!("token-{CLIENT}")).unwrap();
    for rx in [&mut rx2, &mut rxc] {
        recv_event(rx).await;
        recv_event(rx).await;
    }

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.create_order(CLIENT, order_request("A")).await.unwrap();
    let accepted = api.accept_order(&order.order_id, W1).await.unwrap();
    dispatcher.announce_accepted(&accepted).await;

    // W2 lost: the order is retracted from their pending list, no error surface
    match recv_event(&mut rx2).await {
        GatewayEvent::OrderTaken { order_id } => assert_eq!(order_id, order.order_id),
        other => panic!("W2 expected a retraction, got {other:?}"),
    }
    // the client learns their visit is assigned
    match recv_event(&mut rxc).await {
        GatewayEvent::OrderStatusChanged { order_id, status } => {
            assert_eq!(order_id, order.order_id);
            assert_eq!(status, visit_dispatch_engine::db_types::OrderStatusType::Accepted);
        },
        other => panic!("client expected a status push, got {other:?}"),
    }
}

#[tokio::test]
async fn a_stuck_notification_channel_cannot_stall_dispatch() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, W1, "Almaty", &["A"], true).await;

    let verifier = StaticVerifier::with_users(&[(W1, Role::Medic)]);
    let gateway = Arc::new(RealtimeGateway::new(db.clone(), verifier));
    let dispatcher =
        Dispatcher::new(db.clone(), StuckNotifier, gateway.clone()).with_notify_timeout(Duration::from_millis(50));

    let (tx1, mut rx1) = mpsc::channel(EVENT_BUFFER_SIZE);
    let conn1 = gateway.register(tx1);
    gateway.authenticate(conn1, &format!("token-{W1}")).unwrap();
    recv_event(&mut rx1).await;
    recv_event(&mut rx1).await;

    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.create_order(CLIENT, order_request("A")).await.unwrap();
    let started = std::time::Instant::now();
    dispatcher.dispatch_new_order(&order).await;
    assert!(started.elapsed() < Duration::from_secs(2), "dispatch must not wait on the channel");

    // the live push still went through
    assert!(matches!(recv_event(&mut rx1).await, GatewayEvent::NewOrderAvailable { .. }));
}
