//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module
//! neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the
//! current thread will stop that worker from processing new requests. Any long, non-cpu-bound
//! operation (I/O, database access, the chat fanout) must therefore be expressed as a future
//! and awaited, so worker threads keep serving other requests meanwhile.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use visit_dispatch_engine::{
    db_types::{OrderId, Role},
    AuthApi,
    ChatApi,
    LedgerApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    auth::{check_login_token_signature, JwtClaims, TokenIssuer},
    config::AuthConfig,
    data_objects::{
        AccessTokenResponse,
        AdvanceOrderParams,
        DepositParams,
        JsonResponse,
        ResolveDepositParams,
        RoleUpdateRequest,
        SendMessageParams,
    },
    errors::ServerError,
    server::LiveGateway,
    stream,
};

// Actix cannot handle generics in handler registration, so routes are declared via this macro,
// which builds a zero-sized `...Route` struct per handler and optionally wraps it in the ACL
// middleware.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>]; }
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]; }
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------    Auth   ----------------------------------------------------------
route!(auth => Post "/auth");
/// Route handler for the auth endpoint.
///
/// Users supply a login token in the `vdp_auth_token` header. The token is minted by the
/// external identity service and carries the user id, a strictly increasing nonce (replay
/// protection — a unix epoch works) and the roles the user wants. If the signature checks out,
/// the nonce advances and the roles are granted, the server answers with a short-lived access
/// JWT for use on every other route. The JWT will NOT refresh.
pub async fn auth(
    req: HttpRequest,
    api: web::Data<AuthApi<SqliteDatabase>>,
    signer: web::Data<TokenIssuer>,
    config: web::Data<AuthConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received auth request");
    let payload = req.headers().get("vdp_auth_token").ok_or(ServerError::CouldNotDeserializeAuthToken)?;
    let login_token = payload.to_str().map_err(|e| {
        debug!("💻️ Could not read auth token. {e}");
        ServerError::CouldNotDeserializeAuthToken
    })?;
    let token = check_login_token_signature(login_token, config.as_ref())?;
    debug!("💻️ Login token was validated for user {}", token.user_id);
    api.upsert_nonce_for_user(token.user_id, token.nonce).await?;
    trace!("💻️ Confirming auth request is valid for roles for user {}", token.user_id);
    api.check_user_has_roles(token.user_id, &token.desired_roles).await.map_err(|e| {
        debug!("💻️ User cannot be authenticated for requested roles. {e}");
        ServerError::InsufficientPermissions(e.to_string())
    })?;
    let access_token = signer.issue_token(token, None)?;
    trace!("💻️ Issued access token");
    Ok(HttpResponse::Ok().json(AccessTokenResponse { access_token }))
}

// ----------------------------------------------   Orders  ----------------------------------------------------------
route!(create_order => Post "/orders" requires [Role::Client]);
pub async fn create_order(
    claims: JwtClaims,
    body: web::Json<visit_dispatch_engine::order_objects::NewOrderRequest>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST create_order for client {}", claims.user_id);
    let order = api.create_order(claims.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(order))
}

route!(accept_order => Post "/orders/{id}/accept" requires [Role::Medic]);
pub async fn accept_order(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST accept_order [{order_id}] by medic {}", claims.user_id);
    let order = api.accept_order(&order_id, claims.user_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(advance_order => Post "/orders/{id}/advance");
pub async fn advance_order(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<AdvanceOrderParams>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let target = body.target;
    debug!("💻️ POST advance_order [{order_id}] to {target} by user {}", claims.user_id);
    let order = api.advance_order(&order_id, claims.user_id, target).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Post "/orders/{id}/cancel" requires [Role::Client]);
pub async fn cancel_order(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST cancel_order [{order_id}] by client {}", claims.user_id);
    let order = api.cancel_order(&order_id, claims.user_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(my_orders => Get "/orders/my");
pub async fn my_orders(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_orders for user {}", claims.user_id);
    let mut orders = Vec::new();
    if claims.has_role(Role::Client) {
        orders.extend(api.orders_for_client(claims.user_id).await?);
    }
    if claims.has_role(Role::Medic) {
        orders.extend(api.orders_for_medic(claims.user_id).await?);
    }
    Ok(HttpResponse::Ok().json(orders))
}

route!(available_orders => Get "/orders/available" requires [Role::Medic]);
pub async fn available_orders(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET available_orders for medic {}", claims.user_id);
    let orders = api.available_orders(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(orders_search => Get "/orders" requires [Role::Admin]);
pub async fn orders_search(
    query: web::Query<visit_dispatch_engine::order_objects::OrderQueryFilter>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders_search: {:?}", query.0);
    let orders = api.search_orders(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{id}");
pub async fn order_by_id(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("order {order_id}")))?;
    let is_party = order.client_id == claims.user_id || order.medic_id == Some(claims.user_id);
    if !is_party && !claims.has_role(Role::Admin) {
        return Err(ServerError::InsufficientPermissions(format!("user {} is not a party to this order", claims.user_id)));
    }
    Ok(HttpResponse::Ok().json(order))
}

// ----------------------------------------------    Chat   ----------------------------------------------------------
route!(chat_history => Get "/orders/{id}/messages");
pub async fn chat_history(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<ChatApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let history = api.history(&order_id, &claims.access_claims()).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(send_chat_message => Post "/orders/{id}/messages");
/// Persists the message, then relays it through the gateway so room members and off-room
/// participants learn about it exactly as if it had been sent over a live connection.
pub async fn send_chat_message(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<SendMessageParams>,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let params = body.into_inner();
    let message = gateway
        .send_message_as_user(&claims.access_claims(), &order_id, params.text, params.attachment)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

route!(mark_messages_read => Post "/orders/{id}/messages/read");
pub async fn mark_messages_read(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<ChatApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let marked = api.mark_read(&order_id, &claims.access_claims()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{marked} messages marked as read"))))
}

// ----------------------------------------------   Ledger  ----------------------------------------------------------
route!(my_balance => Get "/balance" requires [Role::Medic]);
pub async fn my_balance(
    claims: JwtClaims,
    api: web::Data<LedgerApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_balance for medic {}", claims.user_id);
    let balance = api.balance(claims.user_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

route!(balance_for_worker => Get "/workers/{id}/balance" requires [Role::Admin]);
pub async fn balance_for_worker(
    path: web::Path<i64>,
    api: web::Data<LedgerApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let worker_id = path.into_inner();
    debug!("💻️ GET balance for worker {worker_id}");
    let balance = api.balance(worker_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

route!(request_deposit => Post "/deposits" requires [Role::Medic]);
pub async fn request_deposit(
    claims: JwtClaims,
    body: web::Json<DepositParams>,
    api: web::Data<LedgerApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let entry = api.request_deposit(claims.user_id, body.amount).await?;
    Ok(HttpResponse::Created().json(entry))
}

route!(resolve_deposit => Post "/deposits/{id}/resolve" requires [Role::Admin]);
pub async fn resolve_deposit(
    path: web::Path<i64>,
    body: web::Json<ResolveDepositParams>,
    api: web::Data<LedgerApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let entry = api.resolve_deposit(path.into_inner(), body.approve).await?;
    Ok(HttpResponse::Ok().json(entry))
}

// ----------------------------------------------    Roles  ----------------------------------------------------------
route!(update_roles => Post "/roles" requires [Role::Admin]);
pub async fn update_roles(
    body: web::Json<RoleUpdateRequest>,
    api: web::Data<AuthApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    api.assign_roles(request.user_id, &request.apply).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("roles updated for user {}", request.user_id))))
}

// ----------------------------------------------   Stream  ----------------------------------------------------------
route!(event_stream => Get "/stream");
pub async fn event_stream(
    claims: JwtClaims,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    stream::open_event_stream(claims, gateway).await
}

route!(join_room => Post "/stream/{conn}/join/{order_id}");
pub async fn join_room(
    claims: JwtClaims,
    path: web::Path<(u64, String)>,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    let (conn, order_id) = path.into_inner();
    let conn = stream::own_connection(&gateway, conn, &claims)?;
    let replayed = gateway.join_order(conn, &OrderId::from(order_id)).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("joined, {replayed} messages replayed"))))
}

route!(leave_room => Post "/stream/{conn}/leave/{order_id}");
pub async fn leave_room(
    claims: JwtClaims,
    path: web::Path<(u64, String)>,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    let (conn, order_id) = path.into_inner();
    let conn = stream::own_connection(&gateway, conn, &claims)?;
    gateway.leave_order(conn, &OrderId::from(order_id));
    Ok(HttpResponse::Ok().json(JsonResponse::success("left")))
}

route!(stream_message => Post "/stream/{conn}/message/{order_id}");
/// Chat relay bound to a live connection: the sending connection is excluded from the fanout,
/// so the author does not hear their own message echoed back.
pub async fn stream_message(
    claims: JwtClaims,
    path: web::Path<(u64, String)>,
    body: web::Json<SendMessageParams>,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    let (conn, order_id) = path.into_inner();
    let conn = stream::own_connection(&gateway, conn, &claims)?;
    let params = body.into_inner();
    let message = gateway.send_message(conn, &OrderId::from(order_id), params.text, params.attachment).await?;
    Ok(HttpResponse::Created().json(message))
}
