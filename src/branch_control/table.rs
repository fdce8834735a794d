use std::fmt;

use serde::{Deserialize, Serialize};

use super::expression::{Collation, MAX_EXPRESSION_LEN, MatchExpression, fold};
use crate::error::{Error, Result};

const DATABASE: Collation = Collation::CaseInsensitive;
const BRANCH: Collation = Collation::CaseInsensitive;
const USER: Collation = Collation::Binary;
const HOST: Collation = Collation::CaseInsensitive;

/// The folded `(database, branch, user, host)` patterns identifying a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternKey {
    pub database: String,
    pub branch: String,
    pub user: String,
    pub host: String,
}

impl PatternKey {
    /// Folds raw patterns into a key, rejecting any field that is too long
    /// once folded.
    pub fn fold(database: &str, branch: &str, user: &str, host: &str) -> Result<Self> {
        let key = Self {
            database: fold(database, DATABASE),
            branch: fold(branch, BRANCH),
            user: fold(user, USER),
            host: fold(host, HOST),
        };
        let too_long = [&key.database, &key.branch, &key.user, &key.host]
            .iter()
            .any(|field| field.len() > MAX_EXPRESSION_LEN);
        if too_long {
            return Err(Error::ExpressionTooLong {
                database: database.to_string(),
                branch: branch.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            });
        }
        Ok(key)
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}, {:?}, {:?}, {:?}]",
            self.database, self.branch, self.user, self.host
        )
    }
}

/// The four parsed expressions of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSet {
    pub database: MatchExpression,
    pub branch: MatchExpression,
    pub user: MatchExpression,
    pub host: MatchExpression,
}

impl MatchSet {
    pub fn new(key: &PatternKey) -> Self {
        Self {
            database: MatchExpression::parse(&key.database),
            branch: MatchExpression::parse(&key.branch),
            user: MatchExpression::parse(&key.user),
            host: MatchExpression::parse(&key.host),
        }
    }

    pub fn matches(&self, database: &str, branch: &str, user: &str, host: &str) -> bool {
        self.matches_target(database, branch) && self.matches_caller(user, host)
    }

    pub fn matches_target(&self, database: &str, branch: &str) -> bool {
        self.database.matches(database, DATABASE) && self.branch.matches(branch, BRANCH)
    }

    pub fn matches_caller(&self, user: &str, host: &str) -> bool {
        self.user.matches(user, USER) && self.host.matches(host, HOST)
    }

    /// True when every concrete tuple `other` matches is also matched here.
    pub fn covers(&self, other: &MatchSet) -> bool {
        self.database.covers(&other.database)
            && self.branch.covers(&other.branch)
            && self.user.covers(&other.user)
            && self.host.covers(&other.host)
    }

    /// True when this row's database and branch patterns cover `other`'s.
    pub fn covers_target(&self, other: &MatchSet) -> bool {
        self.database.covers(&other.database) && self.branch.covers(&other.branch)
    }

    /// Combined database and branch specificity.
    pub fn target_specificity(&self) -> usize {
        self.database.specificity() + self.branch.specificity()
    }
}

#[derive(Debug, Clone)]
pub struct PatternRow<V> {
    pub key: PatternKey,
    pub pattern: MatchSet,
    pub value: V,
}

/// Rows keyed by their folded patterns. Row order is not stable across
/// removals.
#[derive(Debug, Clone)]
pub struct PatternTable<V> {
    rows: Vec<PatternRow<V>>,
}

impl<V> Default for PatternTable<V> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<V> PatternTable<V> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatternRow<V>> {
        self.rows.iter()
    }

    pub fn get(&self, key: &PatternKey) -> Option<&PatternRow<V>> {
        self.rows.iter().find(|row| &row.key == key)
    }

    pub fn contains(&self, key: &PatternKey) -> bool {
        self.get(key).is_some()
    }

    /// Appends a row. Callers check for duplicates first.
    pub fn push(&mut self, key: PatternKey, value: V) {
        let pattern = MatchSet::new(&key);
        self.rows.push(PatternRow {
            key,
            pattern,
            value,
        });
    }

    pub fn remove(&mut self, key: &PatternKey) -> Option<PatternRow<V>> {
        let idx = self.rows.iter().position(|row| &row.key == key)?;
        Some(self.rows.swap_remove(idx))
    }

    /// Rows whose patterns match the concrete tuple.
    pub fn matching<'a>(
        &'a self,
        database: &'a str,
        branch: &'a str,
        user: &'a str,
        host: &'a str,
    ) -> impl Iterator<Item = &'a PatternRow<V>> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.pattern.matches(database, branch, user, host))
    }

    /// Rows whose patterns cover `pattern`, skipping `ignore`.
    pub fn covering<'a>(
        &'a self,
        pattern: &'a MatchSet,
        ignore: Option<&'a PatternKey>,
    ) -> impl Iterator<Item = &'a PatternRow<V>> + 'a {
        self.rows
            .iter()
            .filter(move |row| Some(&row.key) != ignore && row.pattern.covers(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(db: &str, branch: &str, user: &str, host: &str) -> PatternKey {
        PatternKey::fold(db, branch, user, host).unwrap()
    }

    #[test]
    fn test_fold_key_respects_user_collation() {
        let k = key("MyDB", "Main", "Alice", "LocalHost");
        assert_eq!(k.database, "mydb");
        assert_eq!(k.branch, "main");
        assert_eq!(k.user, "Alice");
        assert_eq!(k.host, "localhost");
    }

    #[test]
    fn test_fold_key_rejects_long_fields() {
        let long = "a".repeat(MAX_EXPRESSION_LEN + 1);
        let err = PatternKey::fold("%", &long, "%", "%").unwrap_err();
        assert!(matches!(err, Error::ExpressionTooLong { .. }));
        assert!(PatternKey::fold("%", &"a".repeat(MAX_EXPRESSION_LEN), "%", "%").is_ok());
    }

    #[test]
    fn test_remove_swaps_last_row_in() {
        let mut table = PatternTable::default();
        table.push(key("a", "%", "%", "%"), 1);
        table.push(key("b", "%", "%", "%"), 2);
        table.push(key("c", "%", "%", "%"), 3);

        let removed = table.remove(&key("a", "%", "%", "%")).unwrap();
        assert_eq!(removed.value, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.iter().next().unwrap().key.database, "c");
        assert!(table.remove(&key("a", "%", "%", "%")).is_none());
    }

    #[test]
    fn test_matching_and_covering() {
        let mut table = PatternTable::default();
        table.push(key("%", "main", "alice", "%"), "main");
        table.push(key("%", "%", "alice", "%"), "all");

        let hits: Vec<_> = table
            .matching("foo", "main", "alice", "x")
            .map(|row| row.value)
            .collect();
        assert_eq!(hits.len(), 2);

        let target = MatchSet::new(&key("%", "feature", "alice", "%"));
        let covering: Vec<_> = table.covering(&target, None).map(|row| row.value).collect();
        assert_eq!(covering, vec!["all"]);

        let ignored = key("%", "%", "alice", "%");
        assert_eq!(table.covering(&target, Some(&ignored)).count(), 0);
    }
}
