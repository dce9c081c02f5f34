//! HTTP surface for an [`Engine`].
//!
//! | route          | method | response                                      |
//! |----------------|--------|-----------------------------------------------|
//! | `/healthz`     | GET    | `200 ok`                                      |
//! | `/winner`      | GET    | [`WinnerResponse`]                            |
//! | `/metrics`     | GET    | [`Stats`]                                     |
//! | `/submit`      | POST   | `202` + [`Receipt`](crate::Receipt), or a [`RaceError`] status |

use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use race_core::Engine;
use race_core::Stats;
use race_core::Submission;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;

use crate::RaceError;
use crate::Receipt;
use crate::managed_submit_service;

#[derive(Clone)]
struct AppState {
    engine: Engine,
    submit: BoxCloneSyncService<Submission, Receipt, BoxError>,
}

/// Body of `GET /winner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// Build the router. `max_wait` bounds how long a submit request waits for room
/// in the ingress queue.
pub fn router(engine: Engine, max_wait: Duration) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/winner", get(winner))
        .route("/metrics", get(metrics))
        .route("/submit", post(submit))
        .with_state(AppState {
            submit: managed_submit_service(&engine, max_wait),
            engine,
        })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn winner(State(state): State<AppState>) -> Json<WinnerResponse> {
    let user_id = state.engine.winner();
    Json(WinnerResponse {
        found: user_id.is_some(),
        user_id,
    })
}

async fn metrics(State(state): State<AppState>) -> Json<Stats> {
    Json(state.engine.snapshot())
}

async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Response {
    let Ok(Json(submission)) = payload else {
        return (StatusCode::BAD_REQUEST, "bad json").into_response();
    };

    match state.submit.oneshot(submission).await {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(err) => RaceError::from_box_error(err).into_response(),
    }
}
