//! Lock state evaluation.
//!
//! A [`RequestLock`] is built once per inbound request. It reads the config
//! store exactly once and every later decision in that request (statement
//! gate, presentation gate, control responses) consults the cached result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use warp::http::HeaderMap;

use crate::checksum::ContentSourceRef;
use crate::config::{LockConfig, MigrationOptions, SharedSecret, SiteSettings};
use crate::error::{MigrationLockError, MigrationLockResult};
use crate::gate::{Intercepted, StatementGate};
use crate::store::{ConfigStoreRef, LockStateStore};
use crate::{LOCK_HEADER, VALIDATION_HEADER};

/// Request-scoped markers that suppress lock enforcement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BypassSignals {
    /// The write bypass header carried the exact shared secret.
    pub lock_secret: bool,
    /// The validation probe header was present with a non-empty value.
    pub validation_probe: bool,
}

impl BypassSignals {
    pub fn from_headers(headers: &HeaderMap, secret: &SharedSecret) -> Self {
        let lock_secret = headers
            .get(LOCK_HEADER)
            .is_some_and(|v| secret.matches(v.as_bytes()));
        let validation_probe = headers
            .get(VALIDATION_HEADER)
            .is_some_and(|v| !v.as_bytes().is_empty());
        Self {
            lock_secret,
            validation_probe,
        }
    }
}

/// What the config store said about the lock at the start of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockReading {
    /// No persisted lock and the options don't mark a migration as active.
    Unlocked,
    /// Persisted lock: writes are blocked until this unix timestamp.
    Until(i64),
    /// No persisted lock but the options mark a migration as active.
    OptionsActive,
    /// The store could not be read. Treated as locked.
    Unavailable,
}

impl LockReading {
    /// Whether this reading blocks writes at `now` (unix seconds).
    pub fn blocks_at(&self, now: i64) -> bool {
        match self {
            LockReading::Unlocked => false,
            LockReading::Until(unlock_at) => now < *unlock_at,
            LockReading::OptionsActive => true,
            LockReading::Unavailable => true,
        }
    }

    /// The persisted timestamp, or zero.
    pub fn lock_timeout(&self) -> i64 {
        match self {
            LockReading::Until(unlock_at) => *unlock_at,
            _ => 0,
        }
    }
}

/// The lock as seen by one request.
#[derive(Clone, Debug)]
pub struct RequestLock {
    reading: LockReading,
    options: MigrationOptions,
    signals: BypassSignals,
    active: bool,
    gate: StatementGate,
}

impl RequestLock {
    /// Whether non-allow-listed writes are blocked for this request.
    pub fn is_lock_active(&self) -> bool {
        self.active
    }

    pub fn reading(&self) -> LockReading {
        self.reading
    }

    /// The persisted unlock instant, if a timestamp lock is stored.
    pub fn unlock_at(&self) -> Option<i64> {
        match self.reading {
            LockReading::Until(unlock_at) => Some(unlock_at),
            _ => None,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    pub fn signals(&self) -> BypassSignals {
        self.signals
    }

    /// Pass a data-mutation statement through the request gate.
    pub fn intercept<'a>(&self, statement: &'a str) -> Intercepted<'a> {
        self.gate.intercept(self, statement)
    }
}

struct CoordinatorInner {
    config: LockConfig,
    site: SiteSettings,
    store: ConfigStoreRef,
    lock_store: LockStateStore,
    content: ContentSourceRef,
    gate: StatementGate,
}

/// Entry point of the migration lock, shared by every request handler.
///
/// Holds no lock state of its own: the config store is the single source
/// of truth.
#[derive(Clone)]
pub struct Coordinator(Arc<CoordinatorInner>);

impl Coordinator {
    pub fn new(
        config: LockConfig,
        site: SiteSettings,
        store: ConfigStoreRef,
        content: ContentSourceRef,
    ) -> MigrationLockResult<Self> {
        config.validate()?;
        let lock_store = LockStateStore::new(store.clone(), config.lock_key.clone());
        let gate = StatementGate::new(&config);
        Ok(Self(Arc::new(CoordinatorInner {
            config,
            site,
            store,
            lock_store,
            content,
            gate,
        })))
    }

    pub fn config(&self) -> &LockConfig {
        &self.0.config
    }

    pub fn site(&self) -> &SiteSettings {
        &self.0.site
    }

    pub fn lock_store(&self) -> &LockStateStore {
        &self.0.lock_store
    }

    pub fn content(&self) -> &ContentSourceRef {
        &self.0.content
    }

    /// Bypass markers carried by these request headers.
    pub fn signals(&self, headers: &HeaderMap) -> BypassSignals {
        BypassSignals::from_headers(headers, &self.0.config.secret)
    }

    /// Evaluate the lock for a request arriving now.
    pub fn request(&self, signals: BypassSignals) -> RequestLock {
        self.request_at(signals, Utc::now())
    }

    /// Evaluate the lock for a request arriving at `now`.
    pub fn request_at(&self, signals: BypassSignals, now: DateTime<Utc>) -> RequestLock {
        let options = match self.0.store.get_option(&self.0.config.options_key) {
            Ok(stored) => MigrationOptions::decode_or_default(stored.as_deref(), now),
            Err(err) => {
                tracing::error!(?err, "could not read migration options");
                MigrationOptions::defaults(now)
            }
        };
        let reading = if self.0.config.enforce_lock {
            self.read_lock(&options)
        } else {
            LockReading::Unlocked
        };
        let active = !signals.validation_probe && reading.blocks_at(now.timestamp());
        RequestLock {
            reading,
            options,
            signals,
            active,
            gate: self.0.gate.clone(),
        }
    }

    fn read_lock(&self, options: &MigrationOptions) -> LockReading {
        let fallback = if options.migration_active {
            LockReading::OptionsActive
        } else {
            LockReading::Unlocked
        };
        match self.0.lock_store.unlock_at() {
            Ok(Some(unlock_at)) => LockReading::Until(unlock_at),
            Ok(None) => fallback,
            Err(err @ MigrationLockError::InvalidTimestamp { .. }) => {
                tracing::error!(?err, "ignoring unreadable lock timestamp");
                fallback
            }
            Err(err) => {
                tracing::error!(?err, "lock state unavailable, treating the site as locked");
                LockReading::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::MemContentSource;
    use crate::store::{ConfigStore, MemConfigStore};
    use chrono::Duration;
    use warp::http::HeaderValue;

    struct BrokenStore;

    impl ConfigStore for BrokenStore {
        fn get_option(&self, _: &str) -> MigrationLockResult<Option<String>> {
            Err(MigrationLockError::store(std::io::Error::other("down")))
        }
        fn update_option(&self, _: &str, _: &str) -> MigrationLockResult<bool> {
            Err(MigrationLockError::store(std::io::Error::other("down")))
        }
        fn delete_option(&self, _: &str) -> MigrationLockResult<bool> {
            Err(MigrationLockError::store(std::io::Error::other("down")))
        }
    }

    fn coordinator(store: ConfigStoreRef) -> Coordinator {
        Coordinator::new(
            LockConfig::new("s3cret"),
            SiteSettings::default(),
            store,
            Arc::new(MemContentSource::default()),
        )
        .unwrap()
    }

    #[test]
    fn lock_expires_on_its_own() {
        let mem = MemConfigStore::new();
        let c = coordinator(Arc::new(mem.clone()));
        let now = Utc::now();
        let unlock_at = now + Duration::hours(1);
        c.lock_store().arm(unlock_at.timestamp()).unwrap();

        assert!(c.request_at(BypassSignals::default(), now).is_lock_active());
        assert!(c
            .request_at(BypassSignals::default(), unlock_at - Duration::seconds(1))
            .is_lock_active());
        assert!(!c
            .request_at(BypassSignals::default(), unlock_at)
            .is_lock_active());
        // nothing was cleaned up, the value just stopped mattering
        assert_eq!(c.lock_store().unlock_at().unwrap(), Some(unlock_at.timestamp()));
        assert_eq!(
            c.request_at(BypassSignals::default(), unlock_at).unlock_at(),
            Some(unlock_at.timestamp())
        );
    }

    #[test]
    fn options_flag_locks_without_timestamp() {
        let mem = MemConfigStore::new();
        let c = coordinator(Arc::new(mem.clone()));
        mem.update_option("migration_options", r#"{"migration_active":true}"#)
            .unwrap();
        let lock = c.request(BypassSignals::default());
        assert_eq!(lock.reading(), LockReading::OptionsActive);
        assert!(lock.is_lock_active());

        // an expired timestamp wins over the flag
        c.lock_store().arm(1).unwrap();
        assert!(!c.request(BypassSignals::default()).is_lock_active());
    }

    #[test]
    fn validation_probe_sees_the_site_unlocked() {
        let mem = MemConfigStore::new();
        let c = coordinator(Arc::new(mem));
        c.lock_store()
            .arm((Utc::now() + Duration::hours(1)).timestamp())
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(VALIDATION_HEADER, HeaderValue::from_static("1"));
        let signals = c.signals(&headers);
        assert!(signals.validation_probe);
        assert!(!c.request(signals).is_lock_active());

        headers.insert(VALIDATION_HEADER, HeaderValue::from_static(""));
        assert!(c.request(c.signals(&headers)).is_lock_active());
    }

    #[test]
    fn lock_secret_must_match_exactly() {
        let c = coordinator(Arc::new(MemConfigStore::new()));
        let mut headers = HeaderMap::new();
        headers.insert(LOCK_HEADER, HeaderValue::from_static("s3cret"));
        assert!(c.signals(&headers).lock_secret);
        headers.insert(LOCK_HEADER, HeaderValue::from_static("s3cret "));
        assert!(!c.signals(&headers).lock_secret);
        assert!(!c.signals(&HeaderMap::new()).lock_secret);
    }

    #[test]
    fn unreadable_store_fails_closed() {
        let c = coordinator(Arc::new(BrokenStore));
        let lock = c.request(BypassSignals::default());
        assert_eq!(lock.reading(), LockReading::Unavailable);
        assert!(lock.is_lock_active());
    }

    #[test]
    fn garbage_timestamp_falls_back_to_options() {
        let mem = MemConfigStore::new();
        let c = coordinator(Arc::new(mem.clone()));
        mem.update_option("migration_lock_timeout", "tomorrow").unwrap();
        assert!(!c.request(BypassSignals::default()).is_lock_active());
    }

    #[test]
    fn disabled_enforcement_never_locks() {
        let mem = MemConfigStore::new();
        let mut config = LockConfig::new("s3cret");
        config.enforce_lock = false;
        let c = Coordinator::new(
            config,
            SiteSettings::default(),
            Arc::new(mem),
            Arc::new(MemContentSource::default()),
        )
        .unwrap();
        c.lock_store()
            .arm((Utc::now() + Duration::hours(1)).timestamp())
            .unwrap();
        assert!(!c.request(BypassSignals::default()).is_lock_active());
    }

    #[test]
    fn decision_is_cached_for_the_request() {
        let mem = MemConfigStore::new();
        let c = coordinator(Arc::new(mem));
        c.lock_store()
            .arm((Utc::now() + Duration::hours(1)).timestamp())
            .unwrap();
        let lock = c.request(BypassSignals::default());
        c.lock_store().disarm().unwrap();
        assert!(lock.is_lock_active());
        assert!(!c.request(BypassSignals::default()).is_lock_active());
    }
}
