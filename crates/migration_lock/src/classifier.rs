//! Decides whether a data-mutation statement may run while the lock is
//! active.
//!
//! Purely textual on purpose. A read that doesn't look like one gets
//! blocked, which is fine. A write that looks like a read must never get
//! through, so only a short list of read-only verbs is recognised.

use std::sync::Arc;

use crate::lock::BypassSignals;

/// Statements starting with one of these verbs, followed by whitespace,
/// are read-only.
pub const READ_ONLY_VERBS: [&str; 5] = ["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Leading characters ignored before looking for the verb.
const LEADING: &[char] = &['\r', '\n', '\t', ' ', '('];

#[derive(Clone, Debug)]
pub struct StatementClassifier {
    options_key: Arc<str>,
}

impl StatementClassifier {
    pub fn new(options_key: &str) -> Self {
        Self {
            options_key: options_key.into(),
        }
    }

    /// Only meaningful while the lock is active; when it isn't, every
    /// statement runs and this is never consulted.
    pub fn is_mutation_allowed(&self, statement: &str, signals: BypassSignals) -> bool {
        if signals.lock_secret {
            return true;
        }

        // The migration options must stay writable or an armed lock could
        // never be turned off from inside the site.
        if statement.contains(&*self.options_key) {
            return true;
        }

        is_read_only(statement)
    }
}

/// Whether `statement` starts with a read-only verb.
pub fn is_read_only(statement: &str) -> bool {
    let q = statement.trim_start_matches(LEADING);
    READ_ONLY_VERBS.iter().any(|verb| {
        let Some(head) = q.get(..verb.len()) else {
            return false;
        };
        head.eq_ignore_ascii_case(verb)
            && q[verb.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_whitespace() || c == '\x0B')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn classifier() -> StatementClassifier {
        StatementClassifier::new("migration_options")
    }

    #[test_case("SELECT * FROM posts" ; "plain select")]
    #[test_case("select id from posts" ; "lowercase")]
    #[test_case("  \n\t(SELECT 1) UNION (SELECT 2)" ; "parens and whitespace")]
    #[test_case("SHOW TABLES" ; "show")]
    #[test_case("DESCRIBE posts" ; "describe")]
    #[test_case("desc posts" ; "desc")]
    #[test_case("EXPLAIN SELECT 1" ; "explain")]
    #[test_case("SeLeCt\n1" ; "newline after verb")]
    fn reads_are_allowed(statement: &str) {
        assert!(is_read_only(statement));
        assert!(classifier().is_mutation_allowed(statement, BypassSignals::default()));
    }

    #[test_case("INSERT INTO posts (title) VALUES ('x')" ; "insert")]
    #[test_case("UPDATE posts SET title = 'x'" ; "update")]
    #[test_case("DELETE FROM posts" ; "delete")]
    #[test_case("ALTER TABLE posts ADD COLUMN x" ; "alter")]
    #[test_case("REPLACE INTO options VALUES ('a', 'b')" ; "replace")]
    #[test_case("SELECT" ; "bare verb")]
    #[test_case("SELECT*FROM posts" ; "no whitespace after verb")]
    #[test_case("SELECTED" ; "longer word")]
    #[test_case("-- SELECT\nDELETE FROM posts" ; "comment first")]
    #[test_case("" ; "empty")]
    #[test_case("é" ; "multibyte")]
    fn writes_are_blocked(statement: &str) {
        assert!(!is_read_only(statement));
        assert!(!classifier().is_mutation_allowed(statement, BypassSignals::default()));
    }

    #[test]
    fn options_key_overrides_read_only_rule() {
        let statement =
            "UPDATE options SET value = '{}' WHERE name = 'migration_options'";
        assert!(!is_read_only(statement));
        assert!(classifier().is_mutation_allowed(statement, BypassSignals::default()));
        // substring match is case sensitive
        assert!(!classifier().is_mutation_allowed(
            "UPDATE options SET value = '{}' WHERE name = 'MIGRATION_OPTIONS'",
            BypassSignals::default()
        ));
    }

    #[test]
    fn lock_secret_allows_anything() {
        let signals = BypassSignals {
            lock_secret: true,
            validation_probe: false,
        };
        assert!(classifier().is_mutation_allowed("DROP TABLE posts", signals));
    }
}
