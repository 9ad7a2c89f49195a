//! The SSE transport for the realtime gateway.
//!
//! `GET /api/stream` registers a gateway connection bound to the authenticated user and streams
//! its events as `data:` frames. The first frame carries the connection id, which the client
//! quotes in the join/leave/message routes. Dropping the HTTP response (client disconnect,
//! proxy timeout) drops the stream, which disconnects the gateway connection and empties its
//! room memberships; the client reconnects and re-joins, deduplicating the replayed history by
//! message id.
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use actix_web::{web, HttpResponse};
use bytes::Bytes;
use futures::Stream;
use log::*;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use visit_dispatch_engine::gateway::{ConnectionId, GatewayEvent, EVENT_BUFFER_SIZE};

use crate::{
    auth::JwtClaims,
    errors::ServerError,
    server::LiveGateway,
};

pub async fn open_event_stream(
    claims: JwtClaims,
    gateway: web::Data<LiveGateway>,
) -> Result<HttpResponse, ServerError> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let conn = gateway.register(tx);
    gateway.bind(conn, claims.access_claims())?;
    info!("💻️ Event stream opened: {conn} for user {}", claims.user_id);
    let stream = SseStream { rx: ReceiverStream::new(rx), gateway: gateway.clone().into_inner(), conn };
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

/// Checks that the caller owns the connection they are trying to drive.
pub fn own_connection(
    gateway: &LiveGateway,
    conn: u64,
    claims: &JwtClaims,
) -> Result<ConnectionId, ServerError> {
    let conn = ConnectionId(conn);
    match gateway.connection_user(conn) {
        Some(user_id) if user_id == claims.user_id => Ok(conn),
        Some(_) => Err(ServerError::InsufficientPermissions(format!("{conn} belongs to another user"))),
        None => Err(ServerError::NoRecordFound(format!("{conn}"))),
    }
}

struct SseStream {
    rx: ReceiverStream<GatewayEvent>,
    gateway: Arc<LiveGateway>,
    conn: ConnectionId,
}

impl Stream for SseStream {
    type Item = Result<Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let frame = match serde_json::to_string(&event) {
                    Ok(json) => Bytes::from(format!("data: {json}\n\n")),
                    Err(e) => {
                        error!("💻️ Could not serialize a gateway event: {e}");
                        return Poll::Ready(None);
                    },
                };
                Poll::Ready(Some(Ok(frame)))
            },
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        debug!("💻️ Event stream closed: {}", self.conn);
        self.gateway.disconnect(self.conn);
    }
}
