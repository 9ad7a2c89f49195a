//! Lifecycle rules: transition totality, caller ownership, the cancellation boundary, and the
//! full create-to-paid scenario including ledger accrual.
use vdp_common::Tenge;
use visit_dispatch_engine::{
    db_types::{LedgerEntryKind, LedgerEntryStatus, OrderStatusType, OrderStatusType::*},
    events::EventProducers,
    order_objects::NewOrderRequest,
    test_utils::{prepare_env::prepare_test_env, prepare_env::random_db_path, seed},
    traits::{LedgerManagement, OrderFlowError},
    OrderFlowApi,
    SqliteDatabase,
};

const CLIENT: i64 = 1;
const MEDIC: i64 = 100;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn order_request(price: Option<i64>) -> NewOrderRequest {
    NewOrderRequest {
        service_type: "iv-drip".to_string(),
        city: "Almaty".to_string(),
        district: "Medeu".to_string(),
        address: "Dostyk 120".to_string(),
        scheduled_at: chrono::Utc::now(),
        price: price.map(Tenge::from),
        comment: Some("door code 33".to_string()),
    }
}

async fn setup(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    seed::seed_client(db, CLIENT).await;
    seed::seed_worker(db, MEDIC, "Almaty", &["Medeu"], true).await;
    OrderFlowApi::new(db.clone(), EventProducers::default())
}

/// Drives the caller rules: the client confirms, the medic does everything else.
async fn advance(
    api: &OrderFlowApi<SqliteDatabase>,
    order_id: &visit_dispatch_engine::db_types::OrderId,
    target: OrderStatusType,
) -> Result<visit_dispatch_engine::db_types::Order, OrderFlowError> {
    let caller = if target == Confirmed { CLIENT } else { MEDIC };
    api.advance_order(order_id, caller, target).await
}

#[tokio::test]
async fn every_disallowed_transition_is_rejected_and_harmless() {
    let db = new_db().await;
    let api = setup(&db).await;
    let order = api.create_order(CLIENT, order_request(Some(4000))).await.unwrap();
    let oid = order.order_id.clone();

    let all = [New, Accepted, Confirmed, OnTheWay, Started, Completed, Paid, Cancelled];
    // walk the happy path; before each legal step, try everything else and expect rejection
    let happy_path = [Confirmed, OnTheWay, Started, Completed, Paid];
    api.accept_order(&oid, MEDIC).await.unwrap();
    for legal in happy_path {
        let before = api.fetch_order(&oid).await.unwrap().unwrap();
        for target in all {
            if target == legal {
                continue;
            }
            let result = advance(&api, &oid, target).await;
            assert!(result.is_err(), "advance to {target} from {} must fail", before.status);
            let after = api.fetch_order(&oid).await.unwrap().unwrap();
            assert_eq!(after.status, before.status, "a rejected transition must leave the order unchanged");
            assert_eq!(after.medic_id, before.medic_id);
        }
        advance(&api, &oid, legal).await.unwrap_or_else(|e| panic!("legal advance to {legal} failed: {e}"));
    }

    // terminal: nothing moves a paid order
    for target in all {
        assert!(advance(&api, &oid, target).await.is_err());
    }
    let terminal = api.fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(terminal.status, Paid);
}

#[tokio::test]
async fn only_the_rightful_caller_may_drive_a_step() {
    let db = new_db().await;
    let api = setup(&db).await;
    let order = api.create_order(CLIENT, order_request(Some(4000))).await.unwrap();
    let oid = order.order_id.clone();
    api.accept_order(&oid, MEDIC).await.unwrap();

    // confirmation belongs to the client
    let result = api.advance_order(&oid, MEDIC, Confirmed).await;
    assert!(matches!(result, Err(OrderFlowError::Forbidden(_))), "got: {result:?}");
    api.advance_order(&oid, CLIENT, Confirmed).await.unwrap();

    // the rest belongs to the bound medic, not the client, not another medic
    for (target, wrong_caller) in [(OnTheWay, CLIENT), (Started, CLIENT), (Completed, 999), (Paid, CLIENT)] {
        let result = api.advance_order(&oid, wrong_caller, target).await;
        assert!(matches!(result, Err(OrderFlowError::Forbidden(_))), "target {target}: got {result:?}");
        api.advance_order(&oid, MEDIC, target).await.unwrap();
    }
}

#[tokio::test]
async fn cancellation_boundary() {
    let db = new_db().await;
    let api = setup(&db).await;
    let order = api.create_order(CLIENT, order_request(None)).await.unwrap();
    let oid = order.order_id.clone();

    // only the placing client may cancel
    let result = api.cancel_order(&oid, MEDIC).await;
    assert!(matches!(result, Err(OrderFlowError::Forbidden(_))));

    let cancelled = api.cancel_order(&oid, CLIENT).await.unwrap();
    assert_eq!(cancelled.status, Cancelled);
    assert_eq!(cancelled.medic_id, None);

    // once accepted, the window has closed
    let order = api.create_order(CLIENT, order_request(None)).await.unwrap();
    api.accept_order(&order.order_id, MEDIC).await.unwrap();
    let result = api.cancel_order(&order.order_id, CLIENT).await;
    assert!(matches!(
        result,
        Err(OrderFlowError::InvalidTransition { from: Accepted, to: Cancelled, .. })
    ));
}

#[tokio::test]
async fn full_visit_accrues_earning_and_commission() {
    let db = new_db().await;
    let api = setup(&db).await;
    seed::seed_worker(&db, 101, "Almaty", &["Medeu"], true).await;

    let order = api.create_order(CLIENT, order_request(Some(5000))).await.unwrap();
    let oid = order.order_id.clone();
    assert_eq!(order.status, New);
    assert_eq!(order.medic_id, None);

    // two medics race; exactly one of them ends up bound
    let (r1, r2) = tokio::join!(api.accept_order(&oid, MEDIC), api.accept_order(&oid, 101));
    let winner = match (&r1, &r2) {
        (Ok(o), Err(OrderFlowError::AlreadyAssigned(_))) => o.medic_id.unwrap(),
        (Err(OrderFlowError::AlreadyAssigned(_)), Ok(o)) => o.medic_id.unwrap(),
        other => panic!("expected one winner and one AlreadyAssigned, got {other:?}"),
    };

    api.advance_order(&oid, CLIENT, Confirmed).await.unwrap();
    for target in [OnTheWay, Started, Completed] {
        api.advance_order(&oid, winner, target).await.unwrap();
    }
    let completed = api.fetch_order(&oid).await.unwrap().unwrap();
    assert!(completed.completed_at.is_some());
    assert!(completed.confirmed_by_client);

    let entries = db.entries_for_worker(winner).await.unwrap();
    assert_eq!(entries.len(), 2);
    let earning = entries.iter().find(|e| e.kind == LedgerEntryKind::Earning).unwrap();
    let commission = entries.iter().find(|e| e.kind == LedgerEntryKind::Commission).unwrap();
    assert_eq!(earning.amount, Tenge::from(5000));
    assert_eq!(earning.status, LedgerEntryStatus::Approved);
    assert_eq!(commission.amount, Tenge::from(500));
    assert_eq!(commission.status, LedgerEntryStatus::Pending);
    assert_eq!(earning.order_id.as_ref(), Some(&oid));

    let paid = api.advance_order(&oid, winner, Paid).await.unwrap();
    assert_eq!(paid.status, Paid);

    // completing is accrued exactly once: no double bookkeeping after the terminal step
    assert_eq!(db.entries_for_worker(winner).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unpriced_visits_accrue_nothing() {
    let db = new_db().await;
    let api = setup(&db).await;
    let order = api.create_order(CLIENT, order_request(None)).await.unwrap();
    let oid = order.order_id.clone();
    api.accept_order(&oid, MEDIC).await.unwrap();
    api.advance_order(&oid, CLIENT, Confirmed).await.unwrap();
    for target in [OnTheWay, Started, Completed] {
        api.advance_order(&oid, MEDIC, target).await.unwrap();
    }
    assert!(db.entries_for_worker(MEDIC).await.unwrap().is_empty());
}

#[tokio::test]
async fn validation_rejects_blank_fields_and_negative_prices() {
    let db = new_db().await;
    let api = setup(&db).await;
    let mut request = order_request(Some(1000));
    request.city = "  ".to_string();
    assert!(matches!(
        api.create_order(CLIENT, request).await,
        Err(OrderFlowError::ValidationError(_))
    ));
    let request = order_request(Some(-50));
    assert!(matches!(
        api.create_order(CLIENT, request).await,
        Err(OrderFlowError::ValidationError(_))
    ));
}
