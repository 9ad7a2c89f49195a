//! The per-order chat log: membership, content validation, total ordering, restartable history
//! and idempotent read tracking.
use visit_dispatch_engine::{
    db_types::{Attachment, Role},
    events::EventProducers,
    order_objects::NewOrderRequest,
    test_utils::{prepare_env::prepare_test_env, prepare_env::random_db_path, seed},
    traits::{AccessClaims, ChatApiError, ChatManagement},
    ChatApi,
    OrderFlowApi,
    SqliteDatabase,
};

const CLIENT: i64 = 1;
const MEDIC: i64 = 100;
const ADMIN: i64 = 500;
const STRANGER: i64 = 666;

fn client() -> AccessClaims {
    AccessClaims::new(CLIENT, vec![Role::Client])
}

fn medic() -> AccessClaims {
    AccessClaims::new(MEDIC, vec![Role::Medic])
}

fn admin() -> AccessClaims {
    AccessClaims::new(ADMIN, vec![Role::Admin])
}

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn accepted_order(db: &SqliteDatabase) -> visit_dispatch_engine::db_types::OrderId {
    seed::seed_client(db, CLIENT).await;
    seed::seed_worker(db, MEDIC, "Almaty", &["Medeu"], true).await;
    seed::seed_admin(db, ADMIN).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let request = NewOrderRequest {
        service_type: "checkup".to_string(),
        city: "Almaty".to_string(),
        district: "Medeu".to_string(),
        address: "Dostyk 120".to_string(),
        scheduled_at: chrono::Utc::now(),
        price: None,
        comment: None,
    };
    let order = api.create_order(CLIENT, request).await.unwrap();
    api.accept_order(&order.order_id, MEDIC).await.unwrap();
    order.order_id
}

#[tokio::test]
async fn messages_are_totally_ordered_and_history_is_restartable() {
    let db = new_db().await;
    let oid = accepted_order(&db).await;
    let chat = ChatApi::new(db.clone());

    let m1 = chat.send_message(&oid, &client(), Some("when will you arrive?".into()), None).await.unwrap();
    let m2 = chat.send_message(&oid, &medic(), Some("about 20 minutes".into()), None).await.unwrap();
    let m3 = chat
        .send_message(
            &oid,
            &client(),
            None,
            Some(Attachment { url: "files/door-photo.jpg".into(), kind: "image/jpeg".into() }),
        )
        .await
        .unwrap();
    assert!(m1.id < m2.id && m2.id < m3.id, "ids must follow persistence order");

    let first = chat.history(&oid, &client()).await.unwrap();
    assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![m1.id, m2.id, m3.id]);

    // calling again returns the same prefix plus any new suffix
    let m4 = chat.send_message(&oid, &medic(), Some("here, parking".into()), None).await.unwrap();
    let second = chat.history(&oid, &client()).await.unwrap();
    assert_eq!(&second[..3], &first[..]);
    assert_eq!(second[3].id, m4.id);
}

#[tokio::test]
async fn membership_rule_is_enforced_on_every_operation() {
    let db = new_db().await;
    let oid = accepted_order(&db).await;
    let chat = ChatApi::new(db.clone());
    chat.send_message(&oid, &client(), Some("hello".into()), None).await.unwrap();

    let stranger = AccessClaims::new(STRANGER, vec![Role::Medic]);
    for result in [
        chat.send_message(&oid, &stranger, Some("let me in".into()), None).await.err(),
        chat.history(&oid, &stranger).await.err(),
        chat.mark_read(&oid, &stranger).await.err(),
    ] {
        assert!(matches!(result, Some(ChatApiError::NotAParticipant(STRANGER, _))), "got: {result:?}");
    }

    // admins see every chat
    let history = chat.history(&oid, &admin()).await.unwrap();
    assert_eq!(history.len(), 1);
    chat.send_message(&oid, &admin(), Some("moderator here".into()), None).await.unwrap();
}

#[tokio::test]
async fn chat_does_not_exist_without_an_order() {
    let db = new_db().await;
    let chat = ChatApi::new(db.clone());
    let missing = "VD-missing".to_string().into();
    let result = chat.send_message(&missing, &client(), Some("anyone?".into()), None).await;
    assert!(matches!(result, Err(ChatApiError::OrderNotFound(_))));
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let db = new_db().await;
    let oid = accepted_order(&db).await;
    let chat = ChatApi::new(db.clone());
    for body in [None, Some("".to_string()), Some("   ".to_string())] {
        let result = chat.send_message(&oid, &client(), body, None).await;
        assert!(matches!(result, Err(ChatApiError::EmptyMessage)), "got: {result:?}");
    }
}

#[tokio::test]
async fn mark_read_is_idempotent_and_skips_own_messages() {
    let db = new_db().await;
    let oid = accepted_order(&db).await;
    let chat = ChatApi::new(db.clone());
    chat.send_message(&oid, &client(), Some("first".into()), None).await.unwrap();
    chat.send_message(&oid, &client(), Some("second".into()), None).await.unwrap();
    let own = chat.send_message(&oid, &medic(), Some("on my way".into()), None).await.unwrap();

    // the medic reads the client's two messages; their own stays untouched
    assert_eq!(chat.mark_read(&oid, &medic()).await.unwrap(), 2);
    assert_eq!(chat.mark_read(&oid, &medic()).await.unwrap(), 0);

    let history = chat.history(&oid, &medic()).await.unwrap();
    for message in &history {
        if message.id == own.id {
            assert!(!message.is_read, "a reader must not mark their own message");
        } else {
            assert!(message.is_read);
        }
    }

    // messages are immutable apart from the read flag
    assert_eq!(
        history.iter().map(|m| m.body.clone()).collect::<Vec<_>>(),
        vec![Some("first".into()), Some("second".into()), Some("on my way".into())]
    );

    // read state is per direction: the client reading flips the medic's message only
    assert_eq!(chat.mark_read(&oid, &client()).await.unwrap(), 1);
    let _ = db.fetch_history(&oid).await.unwrap();
}
