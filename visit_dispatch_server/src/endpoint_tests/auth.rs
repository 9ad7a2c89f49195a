use actix_web::{http::StatusCode, test, test::TestRequest, App};
use log::*;
use visit_dispatch_engine::{db_types::Role, test_utils::seed};

use super::helpers::{app_config, login_token, test_config, test_db};
use crate::{auth::JwtVerifier, data_objects::AccessTokenResponse};

#[actix_web::test]
async fn health_needs_no_token() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let res = test::call_service(&app, TestRequest::get().uri("/health").to_request()).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn login_without_headers() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let res = test::call_service(&app, TestRequest::post().uri("/auth").to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn login_with_garbage_token() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;
    let req = TestRequest::post().uri("/auth").insert_header(("vdp_auth_token", "made up nonsense")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn login_with_valid_token_issues_a_verifiable_jwt() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_worker(&db, 100, "Almaty", &["Medeu"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;

    let token = login_token(&config, 100, 1, &[Role::Medic]);
    let req = TestRequest::post().uri("/auth").insert_header(("vdp_auth_token", token)).to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success(), "auth failed: {}", res.status());
    let body: AccessTokenResponse = test::read_body_json(res).await;
    let claims = JwtVerifier::new(&config.auth).verify_claims(&body.access_token).unwrap();
    debug!("Issued claims: {claims:?}");
    assert_eq!(claims.user_id, 100);
    assert_eq!(claims.roles, vec![Role::Medic]);
}

#[actix_web::test]
async fn login_with_stale_nonce_is_rejected() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_worker(&db, 100, "Almaty", &["Medeu"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;

    let req = TestRequest::post()
        .uri("/auth")
        .insert_header(("vdp_auth_token", login_token(&config, 100, 5, &[Role::Medic])))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    // replaying the same nonce must fail
    let req = TestRequest::post()
        .uri("/auth")
        .insert_header(("vdp_auth_token", login_token(&config, 100, 5, &[Role::Medic])))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_with_ungranted_roles_is_forbidden() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_worker(&db, 100, "Almaty", &["Medeu"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;

    let req = TestRequest::post()
        .uri("/auth")
        .insert_header(("vdp_auth_token", login_token(&config, 100, 1, &[Role::Medic, Role::Admin])))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn login_signed_with_the_wrong_secret_is_rejected() {
    let _ = env_logger::try_init();
    let config = test_config();
    let db = test_db().await;
    seed::seed_worker(&db, 100, "Almaty", &["Medeu"], true).await;
    let app = test::init_service(App::new().configure(app_config(&db, &config))).await;

    let mut forged_config = test_config();
    forged_config.auth.login_shared_secret = vdp_common::Secret::new("attacker".to_string());
    let req = TestRequest::post()
        .uri("/auth")
        .insert_header(("vdp_auth_token", login_token(&forged_config, 100, 1, &[Role::Medic])))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
