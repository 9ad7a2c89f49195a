use actix_web::{http::StatusCode, test, test::TestRequest, App};
use serde_json::json;
use vdp_common::Tenge;
use visit_dispatch_engine::{
    db_types::{Order, OrderStatusType, Role},
    test_utils::seed,
};

use super::helpers::{access_token, app_config, bearer, test_config, test_db};
use crate::data_objects::JsonResponse;

fn order_body() -> serde_json::Value {
    json!({
        "service_type": "injection",
        "city": "Almaty",
        "district": "Bostandyk",
        "address": "Abay ave 10, apt 4",
        "scheduled_at": chrono::Utc::now(),
        "price": 5000,
        "comment": "intercom broken, call on arrival"
    })
}

#[actix_web::test]
async fn api_routes_reject_missing_and_forged_tokens() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;

    let res = test::call_service(&app, TestRequest::get().uri("/api/orders/my").to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/api/orders/my")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn the_order_flow_over_rest() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_client(&db, 1).await;
    seed::seed_worker(&db, 100, "Almaty", &["Bostandyk"], true).await;
    seed::seed_worker(&db, 101, "Almaty", &["Bostandyk"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let client = access_token(&config, 1, &[Role::Client]);
    let medic = access_token(&config, 100, &[Role::Medic]);
    let rival = access_token(&config, 101, &[Role::Medic]);

    // the client places an order
    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(bearer(&client))
        .set_json(order_body())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: Order = test::read_body_json(res).await;
    assert_eq!(order.status, OrderStatusType::New);
    let oid = order.order_id.as_str().to_string();

    // both medics see it in the available list
    for token in [&medic, &rival] {
        let req = TestRequest::get().uri("/api/orders/available").insert_header(bearer(token)).to_request();
        let available: Vec<Order> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(available.len(), 1);
    }

    // the first medic takes it; the rival's accept is a routine conflict, not an error dialog
    let req = TestRequest::post().uri(&format!("/api/orders/{oid}/accept")).insert_header(bearer(&medic)).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let req = TestRequest::post().uri(&format!("/api/orders/{oid}/accept")).insert_header(bearer(&rival)).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // cancellation window has closed
    let req = TestRequest::post().uri(&format!("/api/orders/{oid}/cancel")).insert_header(bearer(&client)).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // the client confirms, the medic drives the visit to completion
    let advance = |token: &str, target: &str| {
        TestRequest::post()
            .uri(&format!("/api/orders/{oid}/advance"))
            .insert_header(bearer(token))
            .set_json(json!({ "target": target }))
            .to_request()
    };
    let res = test::call_service(&app, advance(&client, "Confirmed")).await;
    assert_eq!(res.status(), StatusCode::OK);
    // a client trying to drive the medic's steps is forbidden
    let res = test::call_service(&app, advance(&client, "OnTheWay")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    for target in ["OnTheWay", "Started", "Completed", "Paid"] {
        let res = test::call_service(&app, advance(&medic, target)).await;
        assert_eq!(res.status(), StatusCode::OK, "advance to {target}");
    }

    // the ledger reflects the completed visit
    let req = TestRequest::get().uri("/api/balance").insert_header(bearer(&medic)).to_request();
    let balance: visit_dispatch_engine::ledger_objects::BalanceSummary =
        test::call_and_read_body_json(&app, req).await;
    assert_eq!(balance.total_earned, Tenge::from(5000));
    assert_eq!(balance.commission_pending, Tenge::from(500));
}

#[actix_web::test]
async fn role_gates_hold() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_client(&db, 1).await;
    seed::seed_worker(&db, 100, "Almaty", &["Bostandyk"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let client = access_token(&config, 1, &[Role::Client]);
    let medic = access_token(&config, 100, &[Role::Medic]);

    // a medic cannot place orders
    let req =
        TestRequest::post().uri("/api/orders").insert_header(bearer(&medic)).set_json(order_body()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // a client has no balance and cannot resolve deposits
    let req = TestRequest::get().uri("/api/balance").insert_header(bearer(&client)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    let req = TestRequest::post()
        .uri("/api/deposits/1/resolve")
        .insert_header(bearer(&medic))
        .set_json(json!({ "approve": true }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn chat_over_rest_respects_membership() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_client(&db, 1).await;
    seed::seed_worker(&db, 100, "Almaty", &["Bostandyk"], true).await;
    seed::seed_worker(&db, 101, "Almaty", &["Bostandyk"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let client = access_token(&config, 1, &[Role::Client]);
    let medic = access_token(&config, 100, &[Role::Medic]);
    let stranger = access_token(&config, 101, &[Role::Medic]);

    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(bearer(&client))
        .set_json(order_body())
        .to_request();
    let order: Order = test::call_and_read_body_json(&app, req).await;
    let oid = order.order_id.as_str().to_string();
    let req = TestRequest::post().uri(&format!("/api/orders/{oid}/accept")).insert_header(bearer(&medic)).to_request();
    test::call_service(&app, req).await;

    // empty messages are rejected, real ones land
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{oid}/messages"))
        .insert_header(bearer(&client))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{oid}/messages"))
        .insert_header(bearer(&client))
        .set_json(json!({ "text": "when will you arrive?" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    // a non-participant cannot read or write
    let req =
        TestRequest::get().uri(&format!("/api/orders/{oid}/messages")).insert_header(bearer(&stranger)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // the medic reads, then marks read
    let req =
        TestRequest::get().uri(&format!("/api/orders/{oid}/messages")).insert_header(bearer(&medic)).to_request();
    let history: Vec<visit_dispatch_engine::db_types::ChatMessage> =
        test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.len(), 1);
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{oid}/messages/read"))
        .insert_header(bearer(&medic))
        .to_request();
    let response: JsonResponse = test::call_and_read_body_json(&app, req).await;
    assert!(response.success);
}
