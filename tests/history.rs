//! History and diff tables over in-memory and git-backed stores.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use git2::{Oid, Repository, Signature};
use systables::branch_control::Controller;
use systables::error::{Error, Result};
use systables::tables::{Database, Filter, scan};
use systables::types::{ColumnType, Row, Value};
use systables::versioned::{
    Branch, Commit, CommitMeta, CommitWalk, GitStore, Hash, MemoryStore, OptionalCommit, RootValue,
    TableColumn, TableSchema, TableSnapshot, VersionedStore, WorkingRoots,
};
use tempfile::TempDir;

fn meta(secs: i64, message: &str) -> CommitMeta {
    CommitMeta::new("Ann", "ann@example.com", Utc.timestamp_opt(secs, 0).unwrap(), message)
}

fn x_table(rows: Vec<Row>) -> TableSnapshot {
    let schema = TableSchema::new(vec![
        TableColumn::pk("id", 1, ColumnType::Int),
        TableColumn::new("label", 2, ColumnType::Text),
    ]);
    TableSnapshot::new("x", schema, rows).unwrap()
}

/// root -> A (adds x) -> B (no change) -> C (drops x)
fn add_then_drop() -> (MemoryStore, [Hash; 4]) {
    let mut store = MemoryStore::new();
    let root = store.commit("main", RootValue::new(), meta(1, "init"));
    let with_x = RootValue::new().with_table(x_table(vec![vec![Value::Int(1), Value::text("one")]]));
    let a = store.commit("main", with_x.clone(), meta(2, "add x"));
    let b = store.commit("main", with_x, meta(3, "empty"));
    let c = store.commit("main", RootValue::new(), meta(4, "drop x"));
    (store, [root, a, b, c])
}

fn database(store: impl VersionedStore + 'static) -> Database {
    Database::new("db", Arc::new(store), Arc::new(Controller::with_default_row()))
}

#[test]
fn test_add_then_drop_yields_two_diff_rows() {
    let (store, [_, a, _, c]) = add_then_drop();
    let db = database(store);

    let diff = db.require_table("dolt_diff").unwrap();
    let rows = scan(diff.as_ref(), &[]).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::text(c.to_hex()));
    assert_eq!(rows[0][1], Value::text("x"));
    assert_eq!(rows[0][5], Value::text("drop x"));
    assert_eq!(rows[0][6..], [Value::Bool(true), Value::Bool(true)]);
    assert_eq!(rows[1][0], Value::text(a.to_hex()));
    assert_eq!(rows[1][6..], [Value::Bool(true), Value::Bool(true)]);

    let columns = db.require_table("dolt_column_diff").unwrap();
    let rows = scan(columns.as_ref(), &[Filter::eq("commit_hash", c.to_hex())]).unwrap();
    let names: Vec<_> = rows.iter().map(|r| (r[2].clone(), r[7].clone())).collect();
    assert_eq!(
        names,
        vec![
            (Value::text("id"), Value::text("removed")),
            (Value::text("label"), Value::text("removed")),
        ]
    );
}

#[test]
fn test_dropped_table_has_no_per_table_views() {
    let (store, _) = add_then_drop();
    let db = database(store);
    assert!(db.table("dolt_diff_x").unwrap().is_none());
    assert!(db.table("dolt_history_x").unwrap().is_none());
    assert!(matches!(db.require_table("dolt_history_x"), Err(Error::NotFound(_))));
}

#[test]
fn test_working_set_changes_come_first() {
    let (mut store, [.., c]) = add_then_drop();
    let staged = RootValue::new().with_table(x_table(vec![]));
    store.stage(staged.clone());
    store.set_working(staged.with_table(x_table(vec![vec![Value::Int(7), Value::text("seven")]])));
    let db = database(store);

    let diff = db.require_table("dolt_diff").unwrap();
    let rows = scan(diff.as_ref(), &[]).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][..2], [Value::text("STAGED"), Value::text("x")]);
    assert_eq!(rows[0][6..], [Value::Bool(false), Value::Bool(true)]);
    assert_eq!(rows[1][..2], [Value::text("WORKING"), Value::text("x")]);
    assert_eq!(rows[1][2..6], [Value::Null, Value::Null, Value::Null, Value::Null]);
    assert_eq!(rows[2][0], Value::text(c.to_hex()));

    let rows = scan(diff.as_ref(), &[Filter::eq("commit_hash", "working")]).unwrap();
    assert_eq!(rows.len(), 1);

    let per_table = db.require_table("dolt_diff_x").unwrap();
    let rows = scan(per_table.as_ref(), &[Filter::eq("to_commit", "WORKING")]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Int(7));
    assert_eq!(rows.last().unwrap().last(), Some(&Value::text("added")));
}

/// Delegates to a [`MemoryStore`] and counts full history walks.
struct CountingStore {
    inner: MemoryStore,
    walks: AtomicUsize,
}

impl VersionedStore for CountingStore {
    fn resolve_ref(&self, name: &str) -> Result<Commit> {
        self.inner.resolve_ref(name)
    }

    fn resolve_hash(&self, hash: &Hash) -> Result<OptionalCommit> {
        self.inner.resolve_hash(hash)
    }

    fn head(&self) -> Result<Commit> {
        self.inner.head()
    }

    fn walk_commits(&self, head: &Commit) -> CommitWalk<'_> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        CommitWalk::new(self, head)
    }

    fn branches(&self) -> Result<Vec<Branch>> {
        self.inner.branches()
    }

    fn working_roots(&self) -> Result<WorkingRoots> {
        self.inner.working_roots()
    }

    fn is_shallow(&self) -> bool {
        self.inner.is_shallow()
    }
}

#[test]
fn test_commit_hash_filters_skip_the_history_walk() {
    let (inner, [_, a, _, c]) = add_then_drop();
    let store = Arc::new(CountingStore {
        inner,
        walks: AtomicUsize::new(0),
    });
    let db = Database::new("db", store.clone(), Arc::new(Controller::new()));

    for name in ["dolt_log", "dolt_diff", "dolt_column_diff"] {
        let table = db.require_table(name).unwrap();
        let rows = scan(table.as_ref(), &[Filter::any_of("commit_hash", [a.to_hex(), c.to_hex()])]).unwrap();
        assert!(!rows.is_empty(), "{name} returned no rows");
    }
    assert_eq!(store.walks.load(Ordering::SeqCst), 0);

    let log = db.require_table("dolt_log").unwrap();
    assert_eq!(scan(log.as_ref(), &[]).unwrap().len(), 4);
    assert_eq!(store.walks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ghost_parent_policy() {
    let mut store = MemoryStore::new();
    let ghost = Hash::of(b"pruned");
    store.add_ghost(ghost);
    let with_x = RootValue::new().with_table(x_table(vec![vec![Value::Int(1), Value::text("one")]]));
    let tip = store.commit_with_parents(vec![ghost], with_x, meta(5, "tip"));
    store.set_branch("main", tip);

    let db = database(store.clone());
    let diff = db.require_table("dolt_diff").unwrap();
    assert!(matches!(scan(diff.as_ref(), &[]), Err(Error::GhostCommit(_))));

    store.set_shallow(true);
    let db = database(store);
    let diff = db.require_table("dolt_diff").unwrap();
    assert!(scan(diff.as_ref(), &[]).unwrap().is_empty());
    let log = db.require_table("dolt_log").unwrap();
    assert_eq!(scan(log.as_ref(), &[]).unwrap().len(), 1);
}

const PEOPLE_V1: &str = r#"{"columns":[{"name":"id","tag":1,"type":"int","primary_key":true},{"name":"name","tag":2,"type":"text"}],"rows":[[1,"ada"]]}"#;
const PEOPLE_V2: &str = r#"{"columns":[{"name":"id","tag":1,"type":"int","primary_key":true},{"name":"name","tag":2,"type":"text"}],"rows":[[1,"ada"],[2,"grace"]]}"#;

fn commit_file(repo: &Repository, file: &str, contents: &str, message: &str, secs: i64) -> Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(file), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Test User", "test@example.com", &git2::Time::new(secs, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

#[test]
fn test_git_store_tables() {
    let temp = TempDir::new().unwrap();
    let repo = Repository::init(temp.path()).unwrap();
    let init = commit_file(&repo, "README.md", "not a table", "init", 50);
    let first = commit_file(&repo, "people.json", PEOPLE_V1, "add people", 100);
    let second = commit_file(&repo, "people.json", PEOPLE_V2, "add grace", 200);
    let db = database(GitStore::open(temp.path()).unwrap());

    let names = db.table_names().unwrap();
    assert!(names.contains(&"dolt_diff_people".to_string()));
    assert!(names.contains(&"dolt_history_people".to_string()));

    let log = db.require_table("dolt_log").unwrap();
    let hashes: Vec<_> = scan(log.as_ref(), &[]).unwrap().into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(
        hashes,
        vec![
            Value::text(second.to_string()),
            Value::text(first.to_string()),
            Value::text(init.to_string()),
        ]
    );

    let per_table = db.require_table("dolt_diff_people").unwrap();
    let rows = scan(per_table.as_ref(), &[]).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][..3], [Value::Int(2), Value::text("grace"), Value::text(second.to_string())]);
    assert_eq!(rows[0][8], Value::text("added"));
    assert_eq!(rows[1][2], Value::text(first.to_string()));
    assert_eq!(rows[1][4..7], [Value::Null, Value::Null, Value::text(init.to_string())]);

    let history = db.require_table("dolt_history_people").unwrap();
    let rows = scan(history.as_ref(), &[Filter::eq("commit_hash", second.to_string())]).unwrap();
    assert_eq!(rows.len(), 2);

    let branches = db.require_table("dolt_branches").unwrap();
    let rows = scan(branches.as_ref(), &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], Value::text(second.to_string()));
}
