use std::future::IntoFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::adapter::{LinkError, PortalSubmission};

#[derive(Clone)]
struct PortalState {
    ssid: String,
    submission: Arc<Mutex<Option<oneshot::Sender<PortalSubmission>>>>,
}

async fn status(State(state): State<PortalState>) -> Json<Value> {
    Json(json!({
        "ssid": state.ssid,
        "fields": ["ssid", "password", "apikey"],
    }))
}

async fn submit(
    State(state): State<PortalState>,
    Json(submission): Json<PortalSubmission>,
) -> StatusCode {
    if submission.network.ssid.is_empty() {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }

    let tx = state
        .submission
        .lock()
        .ok()
        .and_then(|mut submission| submission.take());

    match tx.map(|tx| tx.send(submission)) {
        Some(Ok(())) => StatusCode::ACCEPTED,
        // credentials were already submitted
        _ => StatusCode::CONFLICT,
    }
}

/// Serve the provisioning endpoint on `listener` until an operator submits
/// credentials or `timeout` expires
///
/// `GET /` describes the expected fields, `POST /` takes a JSON object with
/// `ssid`, `password` and an optional `apikey`. Only the first submission is
/// accepted.
#[instrument(name = "portal", skip_all, fields(ssid = %ssid))]
pub async fn serve_portal(
    listener: TcpListener,
    ssid: &str,
    timeout: Duration,
) -> Result<Option<PortalSubmission>, LinkError> {
    let (tx, rx) = oneshot::channel();
    let state = PortalState {
        ssid: ssid.to_owned(),
        submission: Arc::new(Mutex::new(Some(tx))),
    };

    let app = Router::new()
        .route("/", get(status).post(submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Ok(addr) = listener.local_addr() {
        info!("waiting for credentials on {addr}");
    }

    tokio::select! {
        submission = rx => Ok(submission.ok()),
        _ = tokio::time::sleep(timeout) => {
            info!("no credentials submitted");
            Ok(None)
        }
        res = axum::serve(listener, app).into_future() => {
            res.map_err(LinkError::Portal)?;
            Ok(None)
        }
    }
}
