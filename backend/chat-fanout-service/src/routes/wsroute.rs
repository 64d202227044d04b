use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

use crate::error::{AuthFailure, ErrorBody};
use crate::metrics;
use crate::middleware::auth::bearer_token;
use crate::models::Session;
use crate::router::Router;
use crate::state::AppState;
use crate::websocket::ConnectionRegistry;

/// Room for the envelope around a maximum-size message body.
const FRAME_OVERHEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Frame produced by the registry for this connection.
struct Outbound(String);

struct WsSession {
    session: Session,
    registry: ConnectionRegistry,
    outbound: Option<UnboundedReceiver<String>>,
    inbound: UnboundedSender<String>,
    hb: Instant,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.idle_timeout {
                tracing::warn!(
                    session_id = %act.session.session_id(),
                    user_id = %act.session.user_id(),
                    "websocket idle timeout, disconnecting"
                );
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
        tracing::info!(
            session_id = %self.session.session_id(),
            user_id = %self.session.user_id(),
            "websocket session started"
        );
        self.hb(ctx);

        // Ends when the registry drops this session, which stops the actor.
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx).map(Outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            session_id = %self.session.session_id(),
            user_id = %self.session.user_id(),
            "websocket session stopped"
        );

        let registry = self.registry.clone();
        let session_id = self.session.session_id();
        actix::spawn(async move {
            registry.unregister(session_id).await;
        });
    }
}

impl StreamHandler<Outbound> for WsSession {
    fn handle(&mut self, frame: Outbound, ctx: &mut Self::Context) {
        ctx.text(frame.0);
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
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                if self.inbound.send(text.to_string()).is_err() {
                    ctx.stop();
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(
                    session_id = %self.session.session_id(),
                    "binary websocket frames are not supported"
                );
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(session_id = %self.session.session_id(), ?reason, "close frame received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(session_id = %self.session.session_id(), error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Frames from one connection are handled strictly in arrival order.
fn spawn_inbound_worker(router: Router, session: Session) -> UnboundedSender<String> {
    let (tx, mut rx) = unbounded_channel::<String>();
    actix::spawn(async move {
        while let Some(text) = rx.recv().await {
            router.handle_text(&session, &text).await;
        }
    });
    tx
}

fn reject(failure: AuthFailure) -> HttpResponse {
    metrics::handshake_rejected(failure.reason.as_str());
    tracing::warn!(reason = failure.reason.as_str(), "websocket handshake rejected");
    HttpResponse::Unauthorized().json(ErrorBody {
        status: "error",
        code: failure.reason.as_str(),
        reason: failure.to_string(),
    })
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query.into_inner().token.or_else(|| bearer_token(&req));
    let ws_config = &state.config.websocket;

    let session = match tokio::time::timeout(
        ws_config.handshake_timeout,
        state.binder.bind(token.as_deref()),
    )
    .await
    {
        Ok(Ok(session)) => session,
        Ok(Err(failure)) => return Ok(reject(failure)),
        Err(_) => {
            metrics::handshake_rejected("TIMEOUT");
            tracing::warn!("websocket handshake timed out");
            return Ok(HttpResponse::RequestTimeout().finish());
        }
    };

    let session_id = session.session_id();
    let user_id = session.user_id();
    let outbound = state.registry.register(session.clone()).await;
    let inbound = spawn_inbound_worker(state.router.clone(), session.clone());

    let actor = WsSession {
        session,
        registry: state.registry.clone(),
        outbound: Some(outbound),
        inbound,
        hb: Instant::now(),
        heartbeat_interval: ws_config.heartbeat_interval,
        idle_timeout: ws_config.idle_timeout,
    };

    let response = ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(state.config.max_message_bytes + FRAME_OVERHEAD_BYTES)
        .start();

    match response {
        Ok(response) => {
            tracing::info!(session_id = %session_id, user_id = %user_id, "websocket handshake accepted");
            Ok(response)
        }
        Err(e) => {
            state.registry.unregister(session_id).await;
            Err(e)
        }
    }
}
