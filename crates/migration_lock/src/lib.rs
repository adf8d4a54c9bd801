//! Write lock for a site that is being live-migrated between environments.
//!
//! While the lock is active every data-mutation statement that is not
//! allow-listed is swapped for an inert one, visitors can be shown a
//! maintenance page and administrators a banner. The migration orchestrator
//! arms and disarms the lock through a secret-protected control endpoint and
//! compares a content checksum between source and destination.
//!
//! The lock state lives in the host's config store only; the coordinator is
//! stateless across requests.

use std::{convert::Infallible, net::SocketAddr};

use warp::{filters::BoxedFilter, reply::Response, Filter, Rejection};

mod checksum;
mod classifier;
mod config;
mod control;
mod error;
mod gate;
mod lock;
mod presentation;
mod store;

pub use checksum::{
    content_checksum, ChecksumAuth, ContentRow, ContentSource, ContentSourceRef, MemContentSource,
};
pub use classifier::{is_read_only, StatementClassifier, READ_ONLY_VERBS};
pub use config::*;
pub use control::{no_route, LockResponse};
pub use error::*;
pub use gate::{Dialect, Intercepted, StatementGate};
pub use lock::{BypassSignals, Coordinator, LockReading, RequestLock};
pub use presentation::{
    escape_html, handle_rejection, maintenance, maintenance_page, page_view, upcoming_notice,
    Maintenance, PageView, Role,
};
pub use store::{ConfigStore, ConfigStoreRef, LockStateStore, MemConfigStore};

/// Carries the shared secret. Authenticates the control API and lets the
/// caller's writes through an active lock.
pub const LOCK_HEADER: &str = "x-migration-lock";
/// Any non-empty value makes the lock look inactive for this request.
pub const VALIDATION_HEADER: &str = "x-migration-validation";
/// Requests the content checksum.
pub const CHECKSUM_HEADER: &str = "x-migration-checksum";

pub type MigrationLockDriver = futures::future::BoxFuture<'static, ()>;

/// The control and checksum endpoints in front of `host`.
///
/// Requests neither endpoint claims go to `host`, which is expected to use
/// [`maintenance`] or [`page_view`] for its pages and
/// [`RequestLock::intercept`] for its writes.
pub fn routes(
    coordinator: Coordinator,
    host: BoxedFilter<(Response,)>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Rejection> + Clone {
    control::control(coordinator.clone())
        .or(checksum::checksum(coordinator))
        .or(host)
        .recover(presentation::handle_rejection)
}

/// Serve [`routes`] on `addr`.
pub async fn run(
    addr: impl Into<SocketAddr> + 'static,
    coordinator: Coordinator,
    host: BoxedFilter<(Response,)>,
) -> Result<(MigrationLockDriver, SocketAddr), String> {
    let site = routes(coordinator, host).with(warp::trace::request());
    match warp::serve(site).try_bind_ephemeral(addr) {
        Ok((addr, server)) => {
            let driver = futures::future::FutureExt::boxed(server);
            Ok((driver, addr))
        }
        Err(e) => Err(format!("Failed to bind socket: {:?}", e)),
    }
}

pub(crate) fn with_coordinator(
    coordinator: Coordinator,
) -> impl Filter<Extract = (Coordinator,), Error = Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}
