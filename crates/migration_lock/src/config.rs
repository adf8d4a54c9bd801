//! Coordinator configuration and the migration options record.
//!
//! [`LockConfig`] is loaded once at process start. [`MigrationOptions`] is
//! owned by the migration orchestrator and re-read from the config store on
//! every request.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumAuth;
use crate::error::{MigrationLockError, MigrationLockResult};
use crate::gate::Dialect;

/// Fixed prefix the control API answers on.
pub const DEFAULT_CONTROL_ROUTE: &str = "/wp-json/wp/v2/av1-migration-lock";
/// Exact path of the checksum endpoint.
pub const DEFAULT_CHECKSUM_ROUTE: &str = "/wp-json/wp/v2/posts-checksum";
/// Config store key holding the "unlock at" unix timestamp.
pub const DEFAULT_LOCK_KEY: &str = "migration_lock_timeout";
/// Config store key holding the [`MigrationOptions`] record.
pub const DEFAULT_OPTIONS_KEY: &str = "migration_options";
/// Lock duration used by `enable` when no timeout is given.
pub const DEFAULT_LOCK_DURATION_SECS: i64 = 2 * 60 * 60;

/// Format of the migration window timestamps, always GMT.
pub const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A static shared secret presented in a request header.
///
/// Comparison is constant time and the value never shows up in `Debug`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// An empty secret matches nothing.
    pub fn matches(&self, presented: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        if self.0.is_empty() {
            return false;
        }
        self.0.as_bytes().ct_eq(presented).into()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(**HIDDEN**)")
    }
}

/// Static configuration of the coordinator.
#[derive(Deserialize, Clone, Debug)]
pub struct LockConfig {
    /// Shared secret of the control API and of the write bypass header.
    pub secret: SharedSecret,
    /// Bearer token that identifies a caller as a site administrator.
    /// Without it nobody is an administrator.
    #[serde(default)]
    pub admin_token: Option<SharedSecret>,
    /// Install the lock hooks. Only the environment being migrated away
    /// from enforces the lock, the checksum endpoint is served on both.
    #[serde(default = "default_true")]
    pub enforce_lock: bool,
    #[serde(default = "default_control_route")]
    pub control_route: String,
    #[serde(default = "default_checksum_route")]
    pub checksum_route: String,
    #[serde(default = "default_lock_key")]
    pub lock_key: String,
    /// Statements mentioning this key are always allowed through the lock.
    #[serde(default = "default_options_key")]
    pub options_key: String,
    #[serde(default)]
    pub checksum_auth: ChecksumAuth,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_lock_duration_secs")]
    pub default_lock_duration_secs: i64,
}

fn default_true() -> bool {
    true
}

fn default_control_route() -> String {
    DEFAULT_CONTROL_ROUTE.to_string()
}

fn default_checksum_route() -> String {
    DEFAULT_CHECKSUM_ROUTE.to_string()
}

fn default_lock_key() -> String {
    DEFAULT_LOCK_KEY.to_string()
}

fn default_options_key() -> String {
    DEFAULT_OPTIONS_KEY.to_string()
}

fn default_lock_duration_secs() -> i64 {
    DEFAULT_LOCK_DURATION_SECS
}

impl LockConfig {
    /// All defaults, with the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SharedSecret::new(secret),
            admin_token: None,
            enforce_lock: true,
            control_route: default_control_route(),
            checksum_route: default_checksum_route(),
            lock_key: default_lock_key(),
            options_key: default_options_key(),
            checksum_auth: ChecksumAuth::default(),
            dialect: Dialect::default(),
            default_lock_duration_secs: DEFAULT_LOCK_DURATION_SECS,
        }
    }

    /// Reject configurations that would make the lock unrecoverable or
    /// expose the control routes in odd places.
    pub fn validate(&self) -> MigrationLockResult<()> {
        if self.options_key.is_empty() {
            return Err(MigrationLockError::Config(
                "options_key must not be empty".into(),
            ));
        }
        if self.lock_key.is_empty() {
            return Err(MigrationLockError::Config("lock_key must not be empty".into()));
        }
        for route in [&self.control_route, &self.checksum_route] {
            if !route.starts_with('/') || route.len() < 2 {
                return Err(MigrationLockError::Config(format!(
                    "route {:?} must be an absolute path",
                    route
                )));
            }
        }
        if self.default_lock_duration_secs <= 0 {
            return Err(MigrationLockError::Config(
                "default_lock_duration_secs must be positive".into(),
            ));
        }
        if self.secret.is_empty() {
            tracing::warn!("lock secret is empty, the control API will reject every request");
        }
        Ok(())
    }
}

/// How the site presents dates to its administrators.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SiteSettings {
    /// Offset of the site's timezone from GMT.
    pub utc_offset_minutes: i32,
    /// strftime pattern for days.
    pub date_format: String,
    /// strftime pattern for times of day.
    pub time_format: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            date_format: "%B %-d, %Y".to_string(),
            time_format: "%-I:%M %P".to_string(),
        }
    }
}

impl SiteSettings {
    /// Falls back to GMT when the offset is out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(
                utc_offset_minutes = self.utc_offset_minutes,
                "site timezone offset out of range, using GMT"
            );
            Utc.fix()
        })
    }
}

/// Options the orchestrator sets for the migration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationOptions {
    pub migration_active: bool,
    pub maintenance_mode: bool,
    pub media_backfill_active: bool,
    pub show_maintenance_notice: bool,
    pub migration_window_start: DateTime<Utc>,
    pub migration_window_end: DateTime<Utc>,
    pub show_migration_window: bool,
    pub migration_time_est: String,
}

/// Wire form of [`MigrationOptions`]: every field optional.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
struct RawMigrationOptions {
    migration_active: Option<bool>,
    maintenance_mode: Option<bool>,
    media_backfill_active: Option<bool>,
    show_maintenance_notice: Option<bool>,
    migration_window_start: Option<String>,
    migration_window_end: Option<String>,
    show_migration_window: Option<bool>,
    migration_time_est: Option<String>,
}

impl MigrationOptions {
    /// Defaults used for every field the orchestrator did not set.
    pub fn defaults(now: DateTime<Utc>) -> Self {
        Self::from_raw(RawMigrationOptions::default(), now)
    }

    /// Parse the stored record. An absent record yields the defaults.
    pub fn decode(stored: Option<&str>, now: DateTime<Utc>) -> MigrationLockResult<Self> {
        let raw = match stored {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(s)?,
            _ => RawMigrationOptions::default(),
        };
        Ok(Self::from_raw(raw, now))
    }

    /// Like [`MigrationOptions::decode`] but an undecodable record falls back
    /// to the defaults.
    pub fn decode_or_default(stored: Option<&str>, now: DateTime<Utc>) -> Self {
        Self::decode(stored, now).unwrap_or_else(|err| {
            tracing::warn!(?err, "migration options are not decodable, using defaults");
            Self::defaults(now)
        })
    }

    fn from_raw(raw: RawMigrationOptions, now: DateTime<Utc>) -> Self {
        let start = raw
            .migration_window_start
            .as_deref()
            .and_then(parse_window)
            .unwrap_or(now);
        let end = raw
            .migration_window_end
            .as_deref()
            .and_then(parse_window)
            .unwrap_or(start);
        Self {
            migration_active: raw.migration_active.unwrap_or(false),
            maintenance_mode: raw.maintenance_mode.unwrap_or(false),
            media_backfill_active: raw.media_backfill_active.unwrap_or(true),
            show_maintenance_notice: raw.show_maintenance_notice.unwrap_or(false),
            migration_window_start: start,
            migration_window_end: end,
            show_migration_window: raw.show_migration_window.unwrap_or(false),
            migration_time_est: raw
                .migration_time_est
                .unwrap_or_else(|| "only a few moments".to_string()),
        }
    }
}

fn parse_window(s: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(s.trim(), WINDOW_FORMAT) {
        Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
        Err(err) => {
            tracing::warn!(value = s, ?err, "ignoring malformed migration window timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(s: &str) -> DateTime<Utc> {
        parse_window(s).unwrap()
    }

    #[test]
    fn absent_options_use_defaults() {
        let now = at("2024-05-01 10:00:00");
        let options = MigrationOptions::decode(None, now).unwrap();
        assert!(!options.migration_active);
        assert!(!options.maintenance_mode);
        assert!(options.media_backfill_active);
        assert!(!options.show_maintenance_notice);
        assert_eq!(options.migration_window_start, now);
        assert_eq!(options.migration_window_end, now);
        assert_eq!(options.migration_time_est, "only a few moments");
    }

    #[test]
    fn window_end_defaults_to_start() {
        let now = at("2024-05-01 10:00:00");
        let options = MigrationOptions::decode(
            Some(r#"{"migration_window_start":"2024-06-01 21:00:00"}"#),
            now,
        )
        .unwrap();
        assert_eq!(options.migration_window_start, at("2024-06-01 21:00:00"));
        assert_eq!(options.migration_window_end, at("2024-06-01 21:00:00"));
    }

    #[test]
    fn garbage_options_fall_back() {
        let now = at("2024-05-01 10:00:00");
        assert!(MigrationOptions::decode(Some("not json"), now).is_err());
        assert_eq!(
            MigrationOptions::decode_or_default(Some("not json"), now),
            MigrationOptions::defaults(now)
        );
    }

    #[test]
    fn secret_never_matches_when_empty() {
        assert!(!SharedSecret::new("").matches(b""));
        assert!(SharedSecret::new("s3cret").matches(b"s3cret"));
        assert!(!SharedSecret::new("s3cret").matches(b"s3cre"));
        assert_eq!(
            format!("{:?}", SharedSecret::new("s3cret")),
            "SharedSecret(**HIDDEN**)"
        );
    }

    #[test]
    fn empty_options_key_is_rejected() {
        let mut config = LockConfig::new("s3cret");
        assert!(config.validate().is_ok());
        config.options_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn lock_config_from_yaml_fills_defaults() {
        let config: LockConfig =
            serde_yaml::from_str("secret: abc\nchecksum_auth: exact\n").unwrap();
        assert!(config.enforce_lock);
        assert_eq!(config.control_route, DEFAULT_CONTROL_ROUTE);
        assert_eq!(config.checksum_auth, ChecksumAuth::Exact);
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.default_lock_duration_secs, 7200);
    }
}
