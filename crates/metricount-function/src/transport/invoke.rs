//! `POST /invoke`: the function runtime contract over HTTP.
//!
//! The request body is the invocation event; the reply is the response
//! envelope. The HTTP status is always 200: the function's own status lives
//! in `statusCode`, the way a function runtime reports results.

use axum::{body::Bytes, extract::State, Json};

use metricount_core::error::MetricError;
use metricount_core::protocol::event::{Event, Response};

use crate::app_state::AppState;

pub async fn invoke(State(state): State<AppState>, body: Bytes) -> Json<Response> {
    let event: Event = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::debug!(error = %e, "undecodable invocation event");
            let err = MetricError::BadRequest(format!("invalid event: {e}"));
            return Json(Response::from_error(&err));
        }
    };
    Json(state.service().handle(event).await)
}
