//! Consistency checksum over the site's mutable content.
//!
//! The orchestrator fetches this on the source and on the destination and
//! compares the two values to detect drift between snapshot and cutover.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use warp::{
    filters::path::FullPath,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::config::LockConfig;
use crate::error::MigrationLockResult;
use crate::lock::Coordinator;
use crate::{with_coordinator, CHECKSUM_HEADER};

/// How the checksum endpoint authenticates its caller.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAuth {
    /// Any non-empty checksum header is accepted.
    #[default]
    Presence,
    /// The checksum header must carry the shared secret.
    Exact,
}

impl ChecksumAuth {
    pub fn authorizes(&self, headers: &HeaderMap, config: &LockConfig) -> bool {
        let Some(value) = headers.get(CHECKSUM_HEADER) else {
            return false;
        };
        match self {
            ChecksumAuth::Presence => !value.as_bytes().is_empty(),
            ChecksumAuth::Exact => config.secret.matches(value.as_bytes()),
        }
    }
}

/// The mutable fields of one content row that take part in the checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRow {
    pub id: i64,
    pub title: String,
    pub guid: String,
    pub content: String,
}

impl ContentRow {
    /// Hex digest of `id,title,guid,content`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.to_string().as_bytes());
        for field in [&self.title, &self.guid, &self.content] {
            hasher.update(b",");
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// The data store the checksum is computed over.
pub trait ContentSource: Send + Sync {
    /// Every content row. Order does not matter.
    fn content_rows(&self) -> MigrationLockResult<Vec<ContentRow>>;
}

/// Shared handle to a [`ContentSource`].
pub type ContentSourceRef = Arc<dyn ContentSource>;

/// In-memory [`ContentSource`].
#[derive(Clone, Debug, Default)]
pub struct MemContentSource(Arc<RwLock<BTreeMap<i64, ContentRow>>>);

impl MemContentSource {
    pub fn put(&self, row: ContentRow) {
        self.0.write().insert(row.id, row);
    }

    pub fn remove(&self, id: i64) -> Option<ContentRow> {
        self.0.write().remove(&id)
    }
}

impl ContentSource for MemContentSource {
    fn content_rows(&self) -> MigrationLockResult<Vec<ContentRow>> {
        Ok(self.0.read().values().cloned().collect())
    }
}

/// Hex digest over the row fingerprints, highest id first, joined by `,`.
pub fn content_checksum(mut rows: Vec<ContentRow>) -> String {
    rows.sort_unstable_by(|a, b| b.id.cmp(&a.id));
    let mut hasher = Sha256::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(row.fingerprint().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Claims the checksum route when the checksum header authorizes the
/// caller. Anything else is left to normal routing.
pub(crate) fn checksum(
    coordinator: Coordinator,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path::full()
        .and(warp::header::headers_cloned())
        .and(with_coordinator(coordinator))
        .and_then(claim)
        .map(|c: Coordinator| respond(&c))
}

async fn claim(
    path: FullPath,
    headers: HeaderMap,
    c: Coordinator,
) -> Result<Coordinator, Rejection> {
    let config = c.config();
    if path.as_str() != config.checksum_route || !config.checksum_auth.authorizes(&headers, config)
    {
        return Err(warp::reject::not_found());
    }
    Ok(c)
}

#[tracing::instrument(skip_all)]
fn respond(c: &Coordinator) -> Response {
    let mut response = match c.content().content_rows() {
        Ok(rows) => {
            let count = rows.len();
            let sum = content_checksum(rows);
            tracing::info!(rows = count, checksum = %sum, "served content checksum");
            sum.into_response()
        }
        Err(err) => {
            tracing::error!(?err, "could not read content for checksum");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, must-revalidate, max-age=0, no-store, private"),
    );
    headers.insert(
        header::EXPIRES,
        HeaderValue::from_static("Wed, 11 Jan 1984 05:00:00 GMT"),
    );
    response
}
