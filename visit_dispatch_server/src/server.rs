use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::info;
use visit_dispatch_engine::{
    dispatch::Dispatcher,
    events::{EventHandlers, EventHooks, EventProducers},
    gateway::RealtimeGateway,
    traits::NullNotifier,
    AuthApi,
    ChatApi,
    LedgerApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    auth::{JwtVerifier, TokenIssuer},
    config::ServerConfig,
    errors::ServerError,
    middleware::JwtMiddlewareFactory,
    routes::{
        health,
        AcceptOrderRoute,
        AdvanceOrderRoute,
        AuthRoute,
        AvailableOrdersRoute,
        BalanceForWorkerRoute,
        CancelOrderRoute,
        ChatHistoryRoute,
        CreateOrderRoute,
        EventStreamRoute,
        JoinRoomRoute,
        LeaveRoomRoute,
        MarkMessagesReadRoute,
        MyBalanceRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        OrdersSearchRoute,
        RequestDepositRoute,
        ResolveDepositRoute,
        SendChatMessageRoute,
        StreamMessageRoute,
        UpdateRolesRoute,
    },
};

pub type LiveGateway = RealtimeGateway<SqliteDatabase, JwtVerifier>;
pub type LiveDispatcher = Dispatcher<SqliteDatabase, NullNotifier>;

const EVENT_BUFFER: usize = 32;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db).await?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Builds the gateway, subscribes the dispatcher to the order events, and assembles the HTTP
/// server instance.
pub async fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let verifier = JwtVerifier::new(&config.auth);
    let gateway = Arc::new(RealtimeGateway::new(db.clone(), verifier.clone()));
    let dispatcher = Dispatcher::new(db.clone(), NullNotifier, gateway.clone())
        .with_notify_timeout(config.notify_timeout);
    let handlers = EventHandlers::new(EVENT_BUFFER, dispatch_hooks(dispatcher));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    info!("🚀️ Dispatch hooks attached; starting HTTP server on {}:{}", config.host, config.port);

    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let chat_api = ChatApi::new(db.clone());
        let ledger_api = LedgerApi::new(db.clone());
        let auth_api = AuthApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vds::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(chat_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(jwt_signer))
            .app_data(web::Data::new(config.auth.clone()))
            .app_data(web::Data::from(gateway.clone()));
        // Routes that require authentication. Literal paths go before the `{id}` catch-alls.
        let api_scope = web::scope("/api")
            .wrap(JwtMiddlewareFactory::new(verifier.clone()))
            .service(MyOrdersRoute::new())
            .service(AvailableOrdersRoute::new())
            .service(CreateOrderRoute::new())
            .service(AcceptOrderRoute::new())
            .service(AdvanceOrderRoute::new())
            .service(CancelOrderRoute::new())
            .service(ChatHistoryRoute::new())
            .service(SendChatMessageRoute::new())
            .service(MarkMessagesReadRoute::new())
            .service(OrdersSearchRoute::new())
            .service(OrderByIdRoute::new())
            .service(MyBalanceRoute::new())
            .service(BalanceForWorkerRoute::new())
            .service(RequestDepositRoute::new())
            .service(ResolveDepositRoute::new())
            .service(UpdateRolesRoute::new())
            .service(EventStreamRoute::new())
            .service(JoinRoomRoute::new())
            .service(LeaveRoomRoute::new())
            .service(StreamMessageRoute::new());
        app.service(health).service(AuthRoute::new()).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Wires the dispatcher into the engine's event hooks: order creation fans out, acceptance
/// retracts the order from the losers, lifecycle steps and cancellations push to the parties.
fn dispatch_hooks(dispatcher: LiveDispatcher) -> EventHooks {
    let mut hooks = EventHooks::default();
    let d = dispatcher.clone();
    hooks.on_order_created(move |ev| {
        let d = d.clone();
        Box::pin(async move { d.dispatch_new_order(&ev.order).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let d = dispatcher.clone();
    hooks.on_order_accepted(move |ev| {
        let d = d.clone();
        Box::pin(async move { d.announce_accepted(&ev.order).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let d = dispatcher.clone();
    hooks.on_status_changed(move |ev| {
        let d = d.clone();
        Box::pin(async move { d.announce_status_change(&ev.order).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let d = dispatcher;
    hooks.on_order_cancelled(move |ev| {
        let d = d.clone();
        Box::pin(async move { d.announce_cancelled(&ev.order).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

/// Reusable app configuration for the endpoint tests: the same data and routes as the real
/// server, minus the HTTP listener.
pub fn test_app_config(
    db: SqliteDatabase,
    config: ServerConfig,
    producers: EventProducers,
    gateway: Arc<LiveGateway>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let verifier = JwtVerifier::new(&config.auth);
        cfg.app_data(web::Data::new(OrderFlowApi::new(db.clone(), producers)))
            .app_data(web::Data::new(ChatApi::new(db.clone())))
            .app_data(web::Data::new(LedgerApi::new(db.clone())))
            .app_data(web::Data::new(AuthApi::new(db.clone())))
            .app_data(web::Data::new(TokenIssuer::new(&config.auth)))
            .app_data(web::Data::new(config.auth.clone()))
            .app_data(web::Data::from(gateway))
            .service(health)
            .service(AuthRoute::new())
            .service(
                web::scope("/api")
                    .wrap(JwtMiddlewareFactory::new(verifier))
                    .service(MyOrdersRoute::new())
                    .service(AvailableOrdersRoute::new())
                    .service(CreateOrderRoute::new())
                    .service(AcceptOrderRoute::new())
                    .service(AdvanceOrderRoute::new())
                    .service(CancelOrderRoute::new())
                    .service(ChatHistoryRoute::new())
                    .service(SendChatMessageRoute::new())
                    .service(MarkMessagesReadRoute::new())
                    .service(OrdersSearchRoute::new())
                    .service(OrderByIdRoute::new())
                    .service(MyBalanceRoute::new())
                    .service(BalanceForWorkerRoute::new())
                    .service(RequestDepositRoute::new())
                    .service(ResolveDepositRoute::new())
                    .service(UpdateRolesRoute::new())
                    .service(EventStreamRoute::new())
                    .service(JoinRoomRoute::new())
                    .service(LeaveRoomRoute::new())
                    .service(StreamMessageRoute::new()),
            );
    }
}
