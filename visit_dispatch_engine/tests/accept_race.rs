//! The core concurrency contract: for any number of concurrent accept calls on the same new
//! order, exactly one wins and every loser gets the routine "already assigned" outcome.
use std::sync::Arc;

use tokio::sync::Barrier;
use vdp_common::Tenge;
use visit_dispatch_engine::{
    db_types::OrderStatusType,
    events::EventProducers,
    order_objects::NewOrderRequest,
    test_utils::{prepare_env::prepare_test_env, prepare_env::random_db_path, seed},
    traits::OrderFlowError,
    OrderFlowApi,
    SqliteDatabase,
};

const NUM_RACERS: i64 = 8;

async fn new_db(max_connections: u32) -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, max_connections).await.expect("Error creating database")
}

fn order_request(district: &str, price: i64) -> NewOrderRequest {
    NewOrderRequest {
        service_type: "injection".to_string(),
        city: "Almaty".to_string(),
        district: district.to_string(),
        address: "Abay ave 10, apt 4".to_string(),
        scheduled_at: chrono::Utc::now(),
        price: Some(Tenge::from(price)),
        comment: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn exactly_one_winner_under_concurrency() {
    let db = new_db(16).await;
    seed::seed_client(&db, 1).await;
    for w in 0..NUM_RACERS {
        seed::seed_worker(&db, 100 + w, "Almaty", &["Bostandyk"], true).await;
    }
    let api = Arc::new(OrderFlowApi::new(db.clone(), EventProducers::default()));
    let order = api.create_order(1, order_request("Bostandyk", 5000)).await.expect("Error creating order");

    let barrier = Arc::new(Barrier::new(NUM_RACERS as usize));
    let mut handles = Vec::new();
    for w in 0..NUM_RACERS {
        let api = Arc::clone(&api);
        let barrier = Arc::clone(&barrier);
        let order_id = order.order_id.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            (100 + w, api.accept_order(&order_id, 100 + w).await)
        }));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for handle in handles {
        let (worker, result) = handle.await.expect("accept task panicked");
        match result {
            Ok(order) => winners.push((worker, order)),
            Err(e) => losers.push((worker, e)),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one accept call must win");
    assert_eq!(losers.len(), (NUM_RACERS - 1) as usize);
    let (winner_id, won_order) = &winners[0];
    assert_eq!(won_order.status, OrderStatusType::Accepted);
    assert_eq!(won_order.medic_id, Some(*winner_id));
    assert!(won_order.accepted_at.is_some());
    for (_, e) in &losers {
        assert!(
            matches!(e, OrderFlowError::AlreadyAssigned(oid) if *oid == order.order_id),
            "losers must see AlreadyAssigned, got: {e}"
        );
    }

    // the stored row agrees with the winner and is not re-assignable
    let stored = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.medic_id, Some(*winner_id));
    let retry = api.accept_order(&order.order_id, 100 + NUM_RACERS).await;
    assert!(matches!(retry, Err(OrderFlowError::AlreadyAssigned(_))));
}

#[tokio::test]
async fn accepting_a_cancelled_order_is_not_a_lost_race() {
    let db = new_db(5).await;
    seed::seed_client(&db, 1).await;
    seed::seed_worker(&db, 100, "Almaty", &["Bostandyk"], true).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.create_order(1, order_request("Bostandyk", 3000)).await.unwrap();
    api.cancel_order(&order.order_id, 1).await.unwrap();

    // nobody holds a cancelled order, so this is an invalid transition rather than a lost race
    let result = api.accept_order(&order.order_id, 100).await;
    assert!(matches!(
        result,
        Err(OrderFlowError::InvalidTransition { from: OrderStatusType::Cancelled, to: OrderStatusType::Accepted, .. })
    ));
}

#[tokio::test]
async fn accepting_an_unknown_order_is_not_found() {
    let db = new_db(5).await;
    seed::seed_worker(&db, 100, "Almaty", &["Bostandyk"], true).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let result = api.accept_order(&"VD-missing".to_string().into(), 100).await;
    assert!(matches!(result, Err(OrderFlowError::OrderNotFound(_))));
}
