use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use git2::{BranchType, ErrorCode, ObjectType, Oid, Repository, Signature, Tree};
use serde::Deserialize;

use super::{
    Branch, Commit, CommitMeta, CommitWalk, Hash, OptionalCommit, RootValue, TableColumn, TableSchema,
    TableSnapshot, VersionedStore, WorkingRoots,
};
use crate::error::{Error, Result};
use crate::types::Row;

const TABLE_SUFFIX: &str = ".json";

/// On-disk form of one table: a top-level `<name>.json` file.
#[derive(Deserialize)]
struct TableFile {
    columns: Vec<TableColumn>,
    #[serde(default)]
    rows: Vec<Row>,
}

fn table_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(TABLE_SUFFIX)
        .filter(|name| !name.is_empty() && !name.starts_with('.'))
}

fn parse_table(name: &str, bytes: &[u8], content_hash: Hash) -> Result<TableSnapshot> {
    let file: TableFile = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidRow(format!("table {name}: {e}")))?;
    let schema = TableSchema::new(file.columns);
    let rows = file
        .rows
        .into_iter()
        .map(|row| {
            // Arity is checked when the rows are keyed.
            if row.len() != schema.columns.len() {
                return Ok(row);
            }
            row.into_iter()
                .zip(&schema.columns)
                .map(|(value, column)| value.coerce(column.column_type))
                .collect::<Result<Row>>()
        })
        .collect::<Result<Vec<_>>>()
        .map_err(|e| match e {
            Error::InvalidRow(msg) => Error::InvalidRow(format!("table {name}: {msg}")),
            other => other,
        })?;
    let rows = TableSnapshot::key_rows(&schema, rows)?;
    Ok(TableSnapshot::with_content_hash(name, schema, rows, content_hash))
}

fn oid_hash(oid: Oid) -> Result<Hash> {
    Hash::from_slice(oid.as_bytes())
}

fn is_not_found(e: &git2::Error) -> bool {
    e.code() == ErrorCode::NotFound
}

fn signature_meta(sig: &Signature<'_>, message: Option<&str>, secs: i64) -> CommitMeta {
    CommitMeta {
        name: sig.name().unwrap_or("").to_string(),
        email: sig.email().unwrap_or("").to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
        description: message.unwrap_or("").trim_end().to_string(),
    }
}

/// Reads commit history out of a git repository. Every top-level
/// `<name>.json` blob in a commit's tree is a table.
pub struct GitStore {
    repo: Mutex<Repository>,
    roots: Mutex<HashMap<Oid, Arc<RootValue>>>,
}

impl GitStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open(path.as_ref())?;
        Ok(Self {
            repo: Mutex::new(repo),
            roots: Mutex::new(HashMap::new()),
        })
    }

    fn repo(&self) -> MutexGuard<'_, Repository> {
        self.repo.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tree_root(&self, repo: &Repository, tree: &Tree<'_>) -> Result<Arc<RootValue>> {
        if let Some(root) = self
            .roots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tree.id())
        {
            return Ok(Arc::clone(root));
        }

        let mut root = RootValue::new();
        for entry in tree.iter() {
            if entry.kind() != Some(ObjectType::Blob) {
                continue;
            }
            let Some(name) = entry.name().and_then(table_name) else {
                continue;
            };
            let blob = repo.find_blob(entry.id())?;
            root = root.with_table(parse_table(name, blob.content(), oid_hash(entry.id())?)?);
        }

        let root = Arc::new(root);
        self.roots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tree.id(), Arc::clone(&root));
        Ok(root)
    }

    fn to_commit(&self, repo: &Repository, commit: &git2::Commit<'_>) -> Result<Commit> {
        let root = self.tree_root(repo, &commit.tree()?)?;
        let parents = commit.parent_ids().map(oid_hash).collect::<Result<Vec<_>>>()?;
        Ok(Commit {
            hash: oid_hash(commit.id())?,
            parents,
            meta: signature_meta(&commit.committer(), commit.message(), commit.time().seconds()),
            root,
        })
    }

    fn find(&self, repo: &Repository, oid: Oid) -> Result<Option<Commit>> {
        match repo.find_commit(oid) {
            Ok(commit) => Ok(Some(self.to_commit(repo, &commit)?)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn staged_root(&self, repo: &Repository) -> Result<RootValue> {
        let index = repo.index()?;
        let mut root = RootValue::new();
        for entry in index.iter() {
            let path = String::from_utf8_lossy(&entry.path);
            let conflicted = (entry.flags >> 12) & 0x3 != 0;
            if conflicted || path.contains('/') {
                continue;
            }
            let Some(name) = table_name(&path) else {
                continue;
            };
            let blob = repo.find_blob(entry.id)?;
            root = root.with_table(parse_table(name, blob.content(), oid_hash(entry.id)?)?);
        }
        Ok(root)
    }

    fn working_root(workdir: &Path) -> Result<RootValue> {
        let mut root = RootValue::new();
        for entry in fs::read_dir(workdir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(table_name) else {
                continue;
            };
            let bytes = fs::read(entry.path())?;
            let oid = Oid::hash_object(ObjectType::Blob, &bytes)?;
            root = root.with_table(parse_table(name, &bytes, oid_hash(oid)?)?);
        }
        Ok(root)
    }
}

impl VersionedStore for GitStore {
    fn resolve_ref(&self, name: &str) -> Result<Commit> {
        if name.eq_ignore_ascii_case("HEAD") {
            return self.head();
        }
        let repo = self.repo();
        let oid = match repo.find_branch(name, BranchType::Local) {
            Ok(branch) => branch.get().target(),
            Err(e) if is_not_found(&e) => None,
            Err(e) => return Err(e.into()),
        };
        let oid = match oid {
            Some(oid) => oid,
            None => {
                let hash: Hash = name
                    .parse()
                    .map_err(|_| Error::NotFound(format!("ref {name}")))?;
                Oid::from_bytes(hash.as_bytes())?
            }
        };
        self.find(&repo, oid)?
            .ok_or_else(|| Error::NotFound(format!("ref {name}")))
    }

    fn resolve_hash(&self, hash: &Hash) -> Result<OptionalCommit> {
        let repo = self.repo();
        self.find(&repo, Oid::from_bytes(hash.as_bytes())?)?
            .map(OptionalCommit::Resolved)
            .ok_or_else(|| Error::NotFound(format!("commit {hash}")))
    }

    /// Parents missing from the object database are ghosts.
    fn resolve_parent(&self, commit: &Commit, idx: usize) -> Result<OptionalCommit> {
        let parent = commit.parents.get(idx).ok_or_else(|| {
            Error::NotFound(format!("parent {idx} of commit {}", commit.hash))
        })?;
        let repo = self.repo();
        Ok(self
            .find(&repo, Oid::from_bytes(parent.as_bytes())?)?
            .map_or(OptionalCommit::Ghost(*parent), OptionalCommit::Resolved))
    }

    fn head(&self) -> Result<Commit> {
        let repo = self.repo();
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || is_not_found(&e) => {
                return Err(Error::NotFound("HEAD".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let commit = head.peel_to_commit()?;
        self.to_commit(&repo, &commit)
    }

    fn walk_commits(&self, head: &Commit) -> CommitWalk<'_> {
        CommitWalk::new(self, head)
    }

    fn branches(&self) -> Result<Vec<Branch>> {
        let repo = self.repo();
        let mut branches = Vec::new();
        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let (Some(name), Some(target)) = (branch.name()?, branch.get().target()) else {
                continue;
            };
            branches.push(Branch {
                name: name.to_string(),
                head: oid_hash(target)?,
            });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    fn working_roots(&self) -> Result<WorkingRoots> {
        let head = match self.head() {
            Ok(commit) => commit.root,
            Err(Error::NotFound(_)) => Arc::new(RootValue::new()),
            Err(e) => return Err(e),
        };

        let repo = self.repo();
        let Some(workdir) = repo.workdir().map(Path::to_path_buf) else {
            return Ok(WorkingRoots {
                staged: Arc::clone(&head),
                working: Arc::clone(&head),
                head,
            });
        };
        let staged = Arc::new(self.staged_root(&repo)?);
        drop(repo);
        let working = Arc::new(Self::working_root(&workdir)?);
        Ok(WorkingRoots {
            head,
            staged,
            working,
        })
    }

    fn is_shallow(&self) -> bool {
        self.repo().is_shallow()
    }
}
