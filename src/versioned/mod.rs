//! The read-only view of a versioned database that system tables are built on.
//!
//! A [`VersionedStore`] resolves commits and branches and hands out immutable
//! [`RootValue`]s. Two reference stores are provided: [`MemoryStore`] for
//! building commit graphs in code and [`GitStore`] for reading them from a git
//! repository.

mod delta;
mod git;
mod memory;
mod row_diff;
mod walk;

pub use delta::{DeltaKind, TableDelta, table_deltas};
pub use git::GitStore;
pub use memory::MemoryStore;
pub use row_diff::{RowChange, RowDiff, RowDiffIter, diff_rows};
pub use walk::CommitWalk;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::{ColumnType, Row, Value};

/// Label used for the uncommitted working tables.
pub const WORKING: &str = "WORKING";
/// Label used for the staged tables.
pub const STAGED: &str = "STAGED";

/// A 20-byte content address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; 20]);

impl Hash {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The first 20 bytes of the SHA-256 digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(data).as_slice())
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::InvalidHash(hex::encode(bytes)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 40 {
            return Err(Error::InvalidHash(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHash(s.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hashing over the canonical encoding of schemas and rows.
pub(crate) struct Hasher(Sha256);

impl Hasher {
    pub(crate) fn new() -> Self {
        Self(Sha256::new())
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.0.update((data.len() as u64).to_be_bytes());
        self.0.update(data);
        self
    }

    pub(crate) fn str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub(crate) fn value(&mut self, value: &Value) -> &mut Self {
        match value {
            Value::Null => self.bytes(&[0]),
            Value::Bool(b) => self.bytes(&[1, u8::from(*b)]),
            Value::Int(v) => self.bytes(&[2]).bytes(&v.to_be_bytes()),
            Value::UInt(v) => self.bytes(&[3]).bytes(&v.to_be_bytes()),
            Value::Text(s) => self.bytes(&[4]).str(s),
            Value::Timestamp(ts) => self.bytes(&[5]).bytes(&ts.timestamp_micros().to_be_bytes()),
        }
    }

    pub(crate) fn finish(self) -> Hash {
        Hash::from_digest(self.0.finalize().as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl CommitMeta {
    pub fn new(name: &str, email: &str, timestamp: DateTime<Utc>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            timestamp,
            description: description.to_string(),
        }
    }
}

/// A resolved commit. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct Commit {
    pub hash: Hash,
    pub parents: Vec<Hash>,
    pub meta: CommitMeta,
    pub root: Arc<RootValue>,
}

/// A commit lookup that may land on a shallow-clone placeholder.
#[derive(Debug, Clone)]
pub enum OptionalCommit {
    Resolved(Commit),
    Ghost(Hash),
}

impl OptionalCommit {
    pub fn hash(&self) -> Hash {
        match self {
            OptionalCommit::Resolved(commit) => commit.hash,
            OptionalCommit::Ghost(hash) => *hash,
        }
    }

    pub fn into_commit(self) -> Result<Commit> {
        match self {
            OptionalCommit::Resolved(commit) => Ok(commit),
            OptionalCommit::Ghost(hash) => Err(Error::GhostCommit(hash.to_hex())),
        }
    }
}

/// What history iteration does when it reaches a ghost commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostPolicy {
    /// Treat the ghost as an error.
    Fail,
    /// Treat the ghost as the end of history.
    EndOfHistory,
}

impl GhostPolicy {
    /// Shallow stores end history at ghosts; complete stores never should
    /// contain one.
    pub fn for_store(store: &dyn VersionedStore) -> Self {
        if store.is_shallow() {
            GhostPolicy::EndOfHistory
        } else {
            GhostPolicy::Fail
        }
    }

    /// Maps a ghost to `Ok(None)` or an error.
    pub fn resolve(self, commit: OptionalCommit) -> Result<Option<Commit>> {
        match (commit, self) {
            (OptionalCommit::Resolved(commit), _) => Ok(Some(commit)),
            (OptionalCommit::Ghost(_), GhostPolicy::EndOfHistory) => Ok(None),
            (OptionalCommit::Ghost(hash), GhostPolicy::Fail) => Err(Error::GhostCommit(hash.to_hex())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub tag: u64,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
}

impl TableColumn {
    pub fn new(name: &str, tag: u64, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            tag,
            column_type,
            primary_key: false,
        }
    }

    pub fn pk(name: &str, tag: u64, column_type: ColumnType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, tag, column_type)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    pub columns: Vec<TableColumn>,
}

impl TableSchema {
    pub fn new(columns: Vec<TableColumn>) -> Self {
        Self { columns }
    }

    pub fn hash(&self) -> Hash {
        let mut hasher = Hasher::new();
        for column in &self.columns {
            hasher
                .str(&column.name)
                .bytes(&column.tag.to_be_bytes())
                .str(&column.column_type.to_string())
                .bytes(&[u8::from(column.primary_key)]);
        }
        hasher.finish()
    }

    pub fn index_of_tag(&self, tag: u64) -> Option<usize> {
        self.columns.iter().position(|c| c.tag == tag)
    }

    pub fn pk_tags(&self) -> Vec<u64> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.tag)
            .collect()
    }

    fn pk_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect()
    }
}

/// One table as of one root.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub name: String,
    pub schema: TableSchema,
    pub rows: BTreeMap<Vec<Value>, Row>,
    pub content_hash: Hash,
    pub schema_hash: Hash,
}

impl TableSnapshot {
    /// Builds a snapshot whose content hash covers its schema and rows.
    pub fn new(name: &str, schema: TableSchema, rows: Vec<Row>) -> Result<Self> {
        let rows = Self::key_rows(&schema, rows)?;
        let mut hasher = Hasher::new();
        hasher.bytes(schema.hash().as_bytes());
        for row in rows.values() {
            for value in row {
                hasher.value(value);
            }
        }
        let content_hash = hasher.finish();
        Ok(Self::with_content_hash(name, schema, rows, content_hash))
    }

    /// Builds a snapshot from already-keyed rows and an externally computed
    /// content hash.
    pub fn with_content_hash(
        name: &str,
        schema: TableSchema,
        rows: BTreeMap<Vec<Value>, Row>,
        content_hash: Hash,
    ) -> Self {
        let schema_hash = schema.hash();
        Self {
            name: name.to_string(),
            schema,
            rows,
            content_hash,
            schema_hash,
        }
    }

    /// Keys rows by their primary key columns. Keyless tables are keyed by
    /// the whole row.
    pub fn key_rows(schema: &TableSchema, rows: Vec<Row>) -> Result<BTreeMap<Vec<Value>, Row>> {
        let pk = schema.pk_indices();
        let mut keyed = BTreeMap::new();
        for row in rows {
            if row.len() != schema.columns.len() {
                return Err(Error::InvalidRow(format!(
                    "expected {} values, got {}",
                    schema.columns.len(),
                    row.len()
                )));
            }
            let key = if pk.is_empty() {
                row.clone()
            } else {
                pk.iter().map(|&i| row[i].clone()).collect()
            };
            keyed.insert(key, row);
        }
        Ok(keyed)
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Immutable map of table name to table snapshot.
#[derive(Debug, Clone, Default)]
pub struct RootValue {
    tables: BTreeMap<String, Arc<TableSnapshot>>,
}

impl RootValue {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, table: TableSnapshot) -> Self {
        self.tables.insert(table.name.clone(), Arc::new(table));
        self
    }

    /// Looks a table up by name, ignoring case.
    pub fn table(&self, name: &str) -> Option<&Arc<TableSnapshot>> {
        self.tables.get(name).or_else(|| {
            self.tables
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, t)| t)
        })
    }

    /// Content hash of the named table, or the zero hash if it is absent.
    pub fn table_hash(&self, name: &str) -> Hash {
        self.table(name).map(|t| t.content_hash).unwrap_or_default()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSnapshot>> {
        self.tables.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub head: Hash,
}

/// The roots a working set is made of.
#[derive(Debug, Clone)]
pub struct WorkingRoots {
    pub head: Arc<RootValue>,
    pub staged: Arc<RootValue>,
    pub working: Arc<RootValue>,
}

/// VersionedStore defines read access to a commit graph.
pub trait VersionedStore: Send + Sync {
    /// Resolves a branch name, `HEAD`, or a full commit hash.
    fn resolve_ref(&self, name: &str) -> Result<Commit>;

    /// Looks a commit up by hash. Unknown hashes are `Error::NotFound`.
    fn resolve_hash(&self, hash: &Hash) -> Result<OptionalCommit>;

    fn head(&self) -> Result<Commit>;

    /// Every commit reachable from `head`, newest first.
    fn walk_commits(&self, head: &Commit) -> CommitWalk<'_>;

    fn branches(&self) -> Result<Vec<Branch>>;

    fn working_roots(&self) -> Result<WorkingRoots>;

    /// True for shallow clones, whose history ends in ghost commits.
    fn is_shallow(&self) -> bool;

    /// Resolves the `idx`th parent of `commit`.
    fn resolve_parent(&self, commit: &Commit, idx: usize) -> Result<OptionalCommit> {
        let parent = commit.parents.get(idx).ok_or_else(|| {
            Error::NotFound(format!("parent {idx} of commit {}", commit.hash))
        })?;
        self.resolve_hash(parent)
    }

    /// Resolves a commit spec: a ref optionally followed by `~n` or `^`
    /// first-parent steps. Ghost ancestors are errors here.
    fn resolve_commit(&self, spec: &str) -> Result<Commit> {
        let (base, steps) = parse_ancestry(spec)?;
        let mut commit = self.resolve_ref(base)?;
        for _ in 0..steps {
            commit = self.resolve_parent(&commit, 0)?.into_commit()?;
        }
        Ok(commit)
    }

    fn table_deltas(&self, from: &RootValue, to: &RootValue) -> Vec<TableDelta> {
        table_deltas(from, to)
    }

    /// The delta touching `table` between two roots, if any.
    fn diff(&self, from: &RootValue, to: &RootValue, table: &str) -> Option<TableDelta> {
        self.table_deltas(from, to).into_iter().find(|delta| {
            [delta.from_name.as_deref(), delta.to_name.as_deref()]
                .into_iter()
                .flatten()
                .any(|name| name.eq_ignore_ascii_case(table))
        })
    }
}

/// Splits `main~2^` into `("main", 3)`.
fn parse_ancestry(spec: &str) -> Result<(&str, usize)> {
    let end = spec.find(['~', '^']).unwrap_or(spec.len());
    let (base, mut rest) = spec.split_at(end);
    if base.is_empty() {
        return Err(Error::NotFound(spec.to_string()));
    }

    let mut steps = 0usize;
    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let count = match (c, &rest[..digits]) {
            ('~', "") => 1,
            ('~', n) => n
                .parse::<usize>()
                .map_err(|_| Error::NotFound(spec.to_string()))?,
            ('^', "") | ('^', "1") => 1,
            _ => return Err(Error::NotFound(spec.to_string())),
        };
        steps += count;
        rest = &rest[digits..];
    }
    Ok((base, steps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_round_trip() {
        let hash = Hash::of(b"abc");
        let parsed: Hash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(hash.to_string().len(), 40);
        assert!("zz".parse::<Hash>().is_err());
        assert!("g".repeat(40).parse::<Hash>().is_err());
    }

    #[test]
    fn test_parse_ancestry() {
        assert_eq!(parse_ancestry("main").unwrap(), ("main", 0));
        assert_eq!(parse_ancestry("HEAD~2").unwrap(), ("HEAD", 2));
        assert_eq!(parse_ancestry("main^~3^").unwrap(), ("main", 5));
        assert!(parse_ancestry("~1").is_err());
        assert!(parse_ancestry("main^2").is_err());
    }

    #[test]
    fn test_schema_hash_tracks_tags() {
        let a = TableSchema::new(vec![TableColumn::pk("id", 1, ColumnType::Int)]);
        let b = TableSchema::new(vec![TableColumn::pk("id", 2, ColumnType::Int)]);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_snapshot_keys_rows_by_primary_key() {
        let schema = TableSchema::new(vec![
            TableColumn::pk("id", 1, ColumnType::Int),
            TableColumn::new("name", 2, ColumnType::Text),
        ]);
        let table = TableSnapshot::new(
            "people",
            schema.clone(),
            vec![vec![2i64.into(), "b".into()], vec![1i64.into(), "a".into()]],
        )
        .unwrap();
        let keys: Vec<_> = table.rows.keys().cloned().collect();
        assert_eq!(keys, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);

        let err = TableSnapshot::new("people", schema, vec![vec![1i64.into()]]).unwrap_err();
        assert!(matches!(err, Error::InvalidRow(_)));
    }

    #[test]
    fn test_ghost_policy() {
        let ghost = OptionalCommit::Ghost(Hash::of(b"gone"));
        assert!(GhostPolicy::EndOfHistory.resolve(ghost.clone()).unwrap().is_none());
        assert!(matches!(
            GhostPolicy::Fail.resolve(ghost),
            Err(Error::GhostCommit(_))
        ));
    }
}
