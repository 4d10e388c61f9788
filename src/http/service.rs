//! HTTP routes exposing the rate limiter and broadcaster.

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client_key::{client_key, scoped_key};
use crate::broadcast::{Broadcaster, EventFrame};
use crate::config::HubgateConfig;
use crate::ratelimit::{PolicyTable, RateLimitDecision, RateLimiter};

/// Policy applied to `GET /events`.
pub const SUBSCRIBE_POLICY: &str = "subscribe";
/// Policy applied to `POST /publish`.
pub const PUBLISH_POLICY: &str = "publish";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Comment frame sent as soon as a stream opens.
const STREAM_PREAMBLE: &str = ": connected\n\n";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Per-client request limiter
    pub limiter: Arc<RateLimiter>,
    /// Subscriber registry
    pub broadcaster: Broadcaster,
    /// Named limits per endpoint
    pub policies: Arc<PolicyTable>,
    /// Frames buffered per streaming client
    pub channel_capacity: usize,
    /// Whether to key clients by `X-Forwarded-For`
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Build handler state from loaded configuration.
    pub fn new(limiter: Arc<RateLimiter>, broadcaster: Broadcaster, config: &HubgateConfig) -> Self {
        Self {
            limiter,
            broadcaster,
            policies: Arc::new(config.rate_limiting.policy_table()),
            channel_capacity: config.broadcast.channel_capacity,
            trust_forwarded_for: config.server.trust_forwarded_for,
        }
    }
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/publish", post(publish))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Count the request against `policy` for the calling client.
///
/// Returns the ready-made 429 response when the client is over its limit.
fn enforce(
    state: &AppState,
    policy: &str,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<RateLimitDecision, Response> {
    let client = client_key(headers, Some(peer), state.trust_forwarded_for);
    let limit = state.policies.resolve(policy);
    let decision = state
        .limiter
        .check_policy(&scoped_key(policy, &client), &limit);

    if decision.limited {
        info!(client = %client, policy = policy, "Request throttled");
        return Err(throttled(&decision));
    }

    Ok(decision)
}

fn rate_limit_headers(decision: &RateLimitDecision) -> [(HeaderName, String); 2] {
    [
        (X_RATELIMIT_LIMIT, decision.limit.to_string()),
        (X_RATELIMIT_REMAINING, decision.remaining.to_string()),
    ]
}

fn throttled(decision: &RateLimitDecision) -> Response {
    // Whole seconds, rounded up so clients never retry early
    let retry_after = (decision.reset_after.as_millis() + 999) / 1000;

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        rate_limit_headers(decision),
        Json(json!({ "error": "rate limit exceeded" })),
    )
        .into_response()
}

/// Open a server-sent events stream for the caller.
async fn events(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let decision = match enforce(&state, SUBSCRIBE_POLICY, &headers, peer) {
        Ok(decision) => decision,
        Err(response) => return response,
    };

    let (subscription, receiver) = state.broadcaster.subscribe(state.channel_capacity);
    info!(channel = %subscription.id(), peer = %peer, "Subscriber connected");

    // The guard travels with the body; the channel is unregistered when
    // the client goes away and the body is dropped.
    let preamble = stream::once(async { Ok::<_, Infallible>(STREAM_PREAMBLE.to_string()) });
    let frames = stream::unfold(
        (receiver, subscription),
        |(mut receiver, subscription)| async move {
            let frame = receiver.recv().await?;
            Some((Ok(frame.encode()), (receiver, subscription)))
        },
    );

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        rate_limit_headers(&decision),
        Body::from_stream(preamble.chain(frames)),
    )
        .into_response()
}

/// Optional publish parameters.
#[derive(Debug, Default, Deserialize)]
struct PublishParams {
    /// Event name attached to the frame
    event: Option<String>,
}

/// Push a JSON body to every subscriber.
async fn publish(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<PublishParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce(&state, PUBLISH_POLICY, &headers, peer) {
        Ok(decision) => decision,
        Err(response) => return response,
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected publish with invalid JSON body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid JSON body: {}", e) })),
            )
                .into_response();
        }
    };

    let mut frame = match EventFrame::json(&payload) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to frame publish payload");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if let Some(event) = params.event {
        frame = frame.with_event(event);
    }

    let subscribers = state.broadcaster.subscriber_count();
    state.broadcaster.publish_frame(frame).await;
    debug!(peer = %peer, subscribers = subscribers, "Published event");

    (
        StatusCode::ACCEPTED,
        rate_limit_headers(&decision),
        Json(json!({ "subscribers": subscribers })),
    )
        .into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "broadcast": state.broadcaster.stats(),
        "rate_limit_entries": state.limiter.entry_count(),
    }))
}
