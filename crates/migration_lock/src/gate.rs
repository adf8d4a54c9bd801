//! The request gate: sits in front of the host's SQL execution path.

use serde::Deserialize;

use crate::classifier::StatementClassifier;
use crate::config::LockConfig;
use crate::lock::RequestLock;

/// SQL dialect of the host database, picks the inert replacement statement.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    #[default]
    Sqlite,
}

impl Dialect {
    /// A statement that is valid, has no effect and returns no rows.
    pub fn noop_statement(&self) -> &'static str {
        match self {
            Dialect::Mysql => "DO 0;",
            Dialect::Sqlite => "SELECT 0 WHERE 0",
        }
    }
}

/// What the gate did with a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intercepted<'a> {
    /// Run the original statement.
    Pass(&'a str),
    /// Run this inert statement instead. The original must not run.
    Neutralized(&'static str),
}

impl<'a> Intercepted<'a> {
    /// The statement to hand to the database.
    pub fn statement(&self) -> &'a str {
        match *self {
            Intercepted::Pass(s) => s,
            Intercepted::Neutralized(s) => s,
        }
    }

    pub fn is_neutralized(&self) -> bool {
        matches!(self, Intercepted::Neutralized(_))
    }
}

#[derive(Clone, Debug)]
pub struct StatementGate {
    classifier: StatementClassifier,
    dialect: Dialect,
}

impl StatementGate {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            classifier: StatementClassifier::new(&config.options_key),
            dialect: config.dialect,
        }
    }

    /// Blocked statements are swapped for an inert one without telling the
    /// caller.
    pub fn intercept<'a>(&self, lock: &RequestLock, statement: &'a str) -> Intercepted<'a> {
        if !lock.is_lock_active() || self.classifier.is_mutation_allowed(statement, lock.signals())
        {
            return Intercepted::Pass(statement);
        }
        tracing::debug!(
            statement = %truncate(statement, 80),
            "neutralized statement while migration lock is active"
        );
        Intercepted::Neutralized(self.dialect.noop_statement())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
