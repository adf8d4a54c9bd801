//! Remote control of the lock for the migration orchestrator.
//!
//! Every request under the control route ends here, whether or not it is
//! authenticated and whether or not the action is known. Unauthenticated
//! callers get the host's "no route" body so the endpoint can't be told
//! apart from a missing one.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use warp::{
    filters::path::FullPath,
    http::{HeaderMap, StatusCode},
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::error::MigrationLockResult;
use crate::lock::{BypassSignals, Coordinator};
use crate::with_coordinator;

/// Body of `get`, `enable` and `disable` responses.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub lock_active: bool,
    /// Persisted unlock instant, zero when none is stored.
    pub lock_timeout: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_result: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_result: Option<bool>,
}

#[derive(Serialize)]
struct NoRoute {
    code: &'static str,
    data: NoRouteData,
    message: &'static str,
}

#[derive(Serialize)]
struct NoRouteData {
    status: u16,
}

/// The body the host returns for an unknown REST route.
pub fn no_route() -> Response {
    warp::reply::json(&NoRoute {
        code: "rest_no_route",
        data: NoRouteData { status: 404 },
        message: "No route was found matching the URL and request method",
    })
    .into_response()
}

pub(crate) fn control(
    coordinator: Coordinator,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path::full()
        .and(with_coordinator(coordinator))
        .and_then(claim)
        .and(warp::header::headers_cloned())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .map(|c: Coordinator, headers: HeaderMap, query: String| handle(&c, &headers, &query))
}

async fn claim(path: FullPath, c: Coordinator) -> Result<Coordinator, Rejection> {
    let config = c.config();
    if !config.enforce_lock || !path.as_str().starts_with(config.control_route.as_str()) {
        return Err(warp::reject::not_found());
    }
    Ok(c)
}

#[tracing::instrument(skip_all, fields(action = tracing::field::Empty))]
fn handle(c: &Coordinator, headers: &HeaderMap, query: &str) -> Response {
    let signals = c.signals(headers);
    if !signals.lock_secret {
        tracing::debug!("control request without a valid secret");
        return no_route();
    }

    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let action = params.get("action").map(String::as_str).unwrap_or_default();
    tracing::Span::current().record("action", action);

    match action {
        "get" => lock_response(c, signals, None, None),
        "enable" => {
            let unlock_at = match params.get("timeout") {
                None => Some(Utc::now().timestamp() + c.config().default_lock_duration_secs),
                Some(raw) => raw.trim().parse::<i64>().ok(),
            };
            let result = match unlock_at {
                Some(unlock_at) => {
                    let result = persisted(c.lock_store().arm(unlock_at));
                    tracing::info!(unlock_at, result, "lock armed");
                    result
                }
                None => {
                    tracing::warn!("ignoring enable with a malformed timeout");
                    false
                }
            };
            lock_response(c, signals, Some(result), None)
        }
        "disable" => {
            let result = persisted(c.lock_store().disarm());
            tracing::info!(result, "lock disarmed");
            lock_response(c, signals, None, Some(result))
        }
        _ => {
            tracing::debug!("ignoring unrecognized control action");
            StatusCode::OK.into_response()
        }
    }
}

fn persisted(result: MigrationLockResult<bool>) -> bool {
    result.unwrap_or_else(|err| {
        tracing::warn!(?err, "lock state was not persisted");
        false
    })
}

/// State as persisted after the action, read back from the store.
fn lock_response(
    c: &Coordinator,
    signals: BypassSignals,
    enable_result: Option<bool>,
    disable_result: Option<bool>,
) -> Response {
    let lock = c.request(signals);
    warp::reply::json(&LockResponse {
        lock_active: lock.is_lock_active(),
        lock_timeout: lock.reading().lock_timeout(),
        enable_result,
        disable_result,
    })
    .into_response()
}
