use crate::metrics;
use crate::middleware::auth::{bearer_token, verify_token};
use crate::state::AppState;
use crate::websocket::{ConnectionRegistry, SubscriberId};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::StreamExt;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Delivered to the actor for every event published to its user.
struct Outbound(String);

// WebSocket Actor
struct WsSession {
    user_id: Uuid,
    subscriber_id: SubscriberId,
    registry: ConnectionRegistry,
    events: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(user_id = %act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session started");
        metrics::ws_connected();
        self.hb(ctx);

        if let Some(rx) = self.events.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx).map(Outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session stopped");
        self.registry.unsubscribe(self.user_id, self.subscriber_id);
        metrics::ws_disconnected();
    }
}

impl StreamHandler<Outbound> for WsSession {
    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }

    // The registry dropped this subscriber; keep the socket for heartbeats
    fn finished(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!(user_id = %self.user_id, "delivery stream closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                // Push-only channel; writes go through the HTTP API
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user_id, ?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws?token=...
///
/// Subscribes the connection to every event addressed to the authenticated user.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&req))
        .ok_or(crate::error::AppError::Unauthorized)?;
    let user_id = verify_token(token, &state.config.jwt_secret)?;

    let (subscriber_id, rx) = state.registry.subscribe(user_id);
    let session = WsSession {
        user_id,
        subscriber_id,
        registry: state.registry.clone(),
        events: Some(rx),
        hb: Instant::now(),
        heartbeat_interval: Duration::from_secs(state.config.ws.heartbeat_interval_secs),
        client_timeout: Duration::from_secs(state.config.ws.client_timeout_secs),
    };

    ws::start(session, &req, stream).map_err(|e| {
        state.registry.unsubscribe(user_id, subscriber_id);
        e
    })
}
