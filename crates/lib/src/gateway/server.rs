//! Gateway HTTP server (single port): inbound webhook, message listing, reply and compose.

use crate::config::{self, Config};
use crate::gateway::protocol::{
    ComposeBody, ErrorBody, InboundAck, InboundBody, ListQuery, MessageBody, MessageList,
    QueuedAck, ReplyBody, WARNING_AI_UNAVAILABLE,
};
use crate::llm::{self, Classifier};
use crate::notify::{self, Notifier};
use crate::pipeline::{IngestError, IngestStatus, IngestionPipeline, InboundRequest, PipelineOptions};
use crate::relay::{Relay, RelayError, RelayPolicy};
use crate::store::{self, MessageStore, StoreError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

type Reply<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorBody>)>;

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody::new(message)))
}

/// Shared state for the gateway: the ingestion pipeline and the outbound relay.
/// Both hold the same store.
#[derive(Clone)]
pub struct GatewayState {
    pub port: u16,
    pub pipeline: Arc<IngestionPipeline>,
    pub relay: Arc<Relay>,
}

impl GatewayState {
    pub fn new(
        port: u16,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
        policy: RelayPolicy,
        options: PipelineOptions,
    ) -> Self {
        let pipeline = IngestionPipeline::new(classifier, store.clone(), options);
        let relay = Relay::new(policy, store, notifier);
        Self {
            port,
            pipeline: Arc::new(pipeline),
            relay: Arc::new(relay),
        }
    }

    /// Open the store and build the classifier and notifier named in config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = store::open_store(config).context("opening message store")?;
        let classifier = llm::build_classifier(config);
        let notifier = notify::build_notifier(config).context("configuring mail")?;
        Ok(Self::new(
            config.gateway.port,
            classifier,
            store,
            notifier,
            RelayPolicy::from_config(config),
            PipelineOptions::from_config(config),
        ))
    }

    fn store(&self) -> &Arc<dyn MessageStore> {
        self.pipeline.store()
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/inbound", post(inbound))
        .route("/messages", get(list_messages))
        .route("/messages/:id", get(get_message))
        .route("/reply", post(reply))
        .route("/compose", post(compose))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Non-loopback binds are refused unless `gateway.allowPublicBind` is set.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "refusing to bind gateway to {}: the gateway has no authentication (set gateway.allowPublicBind to override)",
            bind
        );
    }
    let state = GatewayState::from_config(&config)?;
    log::info!(
        "classifier: {}, store: {}, mail: {}",
        state.pipeline.classifier().name(),
        state.store().name(),
        state.relay.notifier().name()
    );

    let listener = bind_listener(bind, config.gateway.port).await?;
    match listener.local_addr() {
        Ok(addr) => log::info!("gateway listening on {}", addr),
        Err(_) => log::info!("gateway listening on {} port {}", bind, config.gateway.port),
    }
    serve(listener, state).await
}

/// Bind `host` and `port` as a pair so IPv6 literals (`::1`, `[::1]`) work unbracketed.
async fn bind_listener(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding to {} port {}", host, port))
}

/// Serve the router on an already-bound listener until a shutdown signal arrives.
pub async fn serve(listener: tokio::net::TcpListener, state: GatewayState) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight requests finish; detached sends still running are dropped with the runtime.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Malformed JSON gets the same `{ok:false}` envelope as any other client error.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, (StatusCode, Json<ErrorBody>)> {
    serde_json::from_slice(body)
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)))
}

fn store_failure(e: StoreError) -> (StatusCode, Json<ErrorBody>) {
    log::error!("message store failure: {}", e);
    error(StatusCode::INTERNAL_SERVER_ERROR, "message store unavailable")
}

fn relay_failure(e: RelayError) -> (StatusCode, Json<ErrorBody>) {
    match e {
        RelayError::MissingField(_) => error(StatusCode::BAD_REQUEST, e.to_string()),
        RelayError::NotFound(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        RelayError::NotAllowed(_) => error(StatusCode::FORBIDDEN, e.to_string()),
        RelayError::Store(e) => store_failure(e),
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "classifier": state.pipeline.classifier().name(),
        "store": state.store().name(),
        "notifier": state.relay.notifier().name(),
    }))
}

/// POST /inbound: classify and persist one email. 202 when stored without classification.
async fn inbound(State(state): State<GatewayState>, body: Bytes) -> Reply<InboundAck> {
    let body: InboundBody = parse_body(&body)?;
    let req = InboundRequest {
        from: body.from,
        subject: body.subject,
        text: body.text,
    };
    match state.pipeline.ingest(req).await {
        Ok(outcome) => {
            let (status, warning) = match outcome.status {
                IngestStatus::Classified => (StatusCode::OK, None),
                IngestStatus::Degraded { .. } => {
                    (StatusCode::ACCEPTED, Some(WARNING_AI_UNAVAILABLE))
                }
            };
            Ok((
                status,
                Json(InboundAck {
                    ok: true,
                    id: outcome.id,
                    warning,
                }),
            ))
        }
        Err(IngestError::EmptyText) => Err(error(StatusCode::BAD_REQUEST, "missing text")),
        Err(IngestError::Store(e)) => Err(store_failure(e)),
    }
}

/// GET /messages?limit=N, most recent first.
async fn list_messages(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Reply<MessageList> {
    let limit = state.relay.policy().list_limit(query.limit);
    let messages = state
        .store()
        .list_recent(limit)
        .await
        .map_err(store_failure)?;
    Ok((StatusCode::OK, Json(MessageList { ok: true, messages })))
}

async fn get_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Reply<MessageBody> {
    match state.store().get(&id).await.map_err(store_failure)? {
        Some(message) => Ok((StatusCode::OK, Json(MessageBody { ok: true, message }))),
        None => Err(error(
            StatusCode::NOT_FOUND,
            format!("message not found: {}", id),
        )),
    }
}

/// POST /reply: answer a stored message's sender. 202 once the send is queued.
async fn reply(State(state): State<GatewayState>, body: Bytes) -> Reply<QueuedAck> {
    let body: ReplyBody = parse_body(&body)?;
    let queued = state
        .relay
        .reply(&body.message_id, &body.body)
        .await
        .map_err(relay_failure)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedAck {
            ok: true,
            queued: true,
            to: queued.to,
        }),
    ))
}

async fn compose(State(state): State<GatewayState>, body: Bytes) -> Reply<QueuedAck> {
    let body: ComposeBody = parse_body(&body)?;
    let queued = state
        .relay
        .compose(&body.to, &body.subject, &body.body)
        .map_err(relay_failure)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedAck {
            ok: true,
            queued: true,
            to: queued.to,
        }),
    ))
}
