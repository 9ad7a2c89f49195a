//! Ledger bookkeeping: the conservation identity holds after any call sequence, balances never
//! go negative through core operations, and deposits are finalised exactly once.
use vdp_common::Tenge;
use visit_dispatch_engine::{
    db_types::{LedgerEntryStatus, OrderStatusType::*},
    events::EventProducers,
    ledger_objects::BalanceSummary,
    order_objects::NewOrderRequest,
    test_utils::{prepare_env::prepare_test_env, prepare_env::random_db_path, seed},
    traits::LedgerApiError,
    LedgerApi,
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

/// Runs one full visit for `MEDIC` at the given price, accruing its ledger entries.
async fn run_visit(api: &OrderFlowApi<SqliteDatabase>, price: i64) {
    let request = NewOrderRequest {
        service_type: "checkup".to_string(),
        city: "Almaty".to_string(),
        district: "Medeu".to_string(),
        address: "Dostyk 120".to_string(),
        scheduled_at: chrono::Utc::now(),
        price: Some(Tenge::from(price)),
        comment: None,
    };
    let order = api.create_order(CLIENT, request).await.unwrap();
    let oid = order.order_id.clone();
    api.accept_order(&oid, MEDIC).await.unwrap();
    api.advance_order(&oid, CLIENT, Confirmed).await.unwrap();
    for target in [OnTheWay, Started, Completed] {
        api.advance_order(&oid, MEDIC, target).await.unwrap();
    }
}

fn assert_conserved(balance: &BalanceSummary) {
    assert_eq!(
        balance.current_balance,
        balance.deposits_approved + balance.total_earned - balance.commission_paid,
        "conservation identity violated: {balance:?}"
    );
    assert!(balance.current_balance.value() >= 0, "balance went negative: {balance:?}");
    assert!(balance.commission_pending.value() >= 0, "pending commission went negative: {balance:?}");
}

#[tokio::test]
async fn accruals_and_deposits_conserve_the_balance() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, MEDIC, "Almaty", &["Medeu"], true).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let ledger = LedgerApi::new(db.clone());

    run_visit(&orders, 5000).await;
    run_visit(&orders, 2550).await;

    let balance = ledger.balance(MEDIC).await.unwrap();
    assert_eq!(balance.total_earned, Tenge::from(7550));
    // 500 + 255, both still pending
    assert_eq!(balance.commission_pending, Tenge::from(755));
    assert_eq!(balance.commission_paid, Tenge::from(0));
    assert_conserved(&balance);

    // the worker pays part of the debt; an admin approves it
    let deposit = ledger.request_deposit(MEDIC, Tenge::from(600)).await.unwrap();
    assert_eq!(deposit.status, LedgerEntryStatus::Pending);
    // a pending deposit changes nothing yet
    assert_eq!(ledger.pending_commission(MEDIC).await.unwrap(), Tenge::from(755));

    ledger.resolve_deposit(deposit.id, true).await.unwrap();
    // 600 of credit covers the 500 entry in full; 255 stays pending with 100 of credit left
    let balance = ledger.balance(MEDIC).await.unwrap();
    assert_eq!(balance.commission_paid, Tenge::from(500));
    assert_eq!(balance.commission_pending, Tenge::from(155));
    assert_eq!(balance.deposits_approved, Tenge::from(600));
    assert_conserved(&balance);

    // a second deposit clears the rest and the floor holds at zero
    let deposit = ledger.request_deposit(MEDIC, Tenge::from(1000)).await.unwrap();
    ledger.resolve_deposit(deposit.id, true).await.unwrap();
    let balance = ledger.balance(MEDIC).await.unwrap();
    assert_eq!(balance.commission_paid, Tenge::from(755));
    assert_eq!(balance.commission_pending, Tenge::from(0));
    assert_conserved(&balance);
}

#[tokio::test]
async fn rejected_deposits_have_no_balance_effect() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, MEDIC, "Almaty", &["Medeu"], true).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let ledger = LedgerApi::new(db.clone());
    run_visit(&orders, 5000).await;

    let before = ledger.balance(MEDIC).await.unwrap();
    let deposit = ledger.request_deposit(MEDIC, Tenge::from(500)).await.unwrap();
    let rejected = ledger.resolve_deposit(deposit.id, false).await.unwrap();
    assert_eq!(rejected.status, LedgerEntryStatus::Rejected);

    let after = ledger.balance(MEDIC).await.unwrap();
    assert_eq!(after.commission_pending, before.commission_pending);
    assert_eq!(after.current_balance, before.current_balance);
    assert_conserved(&after);
}

#[tokio::test]
async fn deposits_resolve_exactly_once() {
    let db = new_db().await;
    seed::seed_worker(&db, MEDIC, "Almaty", &["Medeu"], true).await;
    let ledger = LedgerApi::new(db.clone());
    let deposit = ledger.request_deposit(MEDIC, Tenge::from(300)).await.unwrap();
    ledger.resolve_deposit(deposit.id, true).await.unwrap();

    let again = ledger.resolve_deposit(deposit.id, false).await;
    assert!(matches!(again, Err(LedgerApiError::NotAPendingDeposit(_))), "got: {again:?}");
    let missing = ledger.resolve_deposit(99999, true).await;
    assert!(matches!(missing, Err(LedgerApiError::EntryNotFound(_))));
}

#[tokio::test]
async fn deposit_claims_must_be_positive() {
    let db = new_db().await;
    let ledger = LedgerApi::new(db.clone());
    for amount in [0, -100] {
        let result = ledger.request_deposit(MEDIC, Tenge::from(amount)).await;
        assert!(matches!(result, Err(LedgerApiError::InvalidAmount(_))));
    }
}

#[tokio::test]
async fn overpayment_floors_pending_commission_at_zero() {
    let db = new_db().await;
    seed::seed_client(&db, CLIENT).await;
    seed::seed_worker(&db, MEDIC, "Almaty", &["Medeu"], true).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let ledger = LedgerApi::new(db.clone());
    run_visit(&orders, 1000).await; // commission 100

    let deposit = ledger.request_deposit(MEDIC, Tenge::from(10_000)).await.unwrap();
    ledger.resolve_deposit(deposit.id, true).await.unwrap();
    let balance = ledger.balance(MEDIC).await.unwrap();
    assert_eq!(balance.commission_pending, Tenge::from(0));
    assert_eq!(balance.commission_paid, Tenge::from(100));
    assert_conserved(&balance);

    // new debt first eats into the leftover credit
    run_visit(&orders, 2000).await; // commission 200, fully covered by remaining 9900
    assert_eq!(ledger.pending_commission(MEDIC).await.unwrap(), Tenge::from(0));
}
