//! Commit history as a stream of table changes.
//!
//! `dolt_diff` and `dolt_column_diff` share this layer: a partition expands
//! into change sets, each pairing one commit (or a working set stage) with
//! the table deltas it introduced.

use std::collections::HashSet;

use super::{Filter, Partition, RowIter, filter_values};
use crate::error::{Error, Result};
use crate::types::{Row, Value};
use crate::versioned::{
    Commit, CommitMeta, CommitWalk, GhostPolicy, Hash, OptionalCommit, STAGED, TableDelta,
    VersionedStore, WORKING,
};

/// The deltas introduced by one commit, or by one stage of the working set.
#[derive(Debug, Clone)]
pub(crate) struct ChangeSet {
    /// Commit hash, or `STAGED` / `WORKING`.
    pub label: String,
    /// Absent for the working set.
    pub meta: Option<CommitMeta>,
    pub deltas: Vec<TableDelta>,
}

impl ChangeSet {
    /// The label plus the commit metadata columns shared by the diff tables:
    /// commit_hash, committer, email, date, message.
    pub fn commit_cells(&self) -> [Value; 5] {
        match &self.meta {
            Some(meta) => [
                Value::text(&self.label),
                Value::text(&meta.name),
                Value::text(&meta.email),
                Value::Timestamp(meta.timestamp),
                Value::text(&meta.description),
            ],
            None => [
                Value::text(&self.label),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        }
    }
}

/// Commits reachable from HEAD in walk order, with ghosts handled by the
/// store's [`GhostPolicy`].
pub(crate) struct History<'a> {
    walk: Option<CommitWalk<'a>>,
    policy: GhostPolicy,
}

impl<'a> History<'a> {
    /// Starts at HEAD. A store without a HEAD commit has no history.
    pub fn from_head(store: &'a dyn VersionedStore) -> Result<Self> {
        let policy = GhostPolicy::for_store(store);
        let walk = match store.head() {
            Ok(head) => Some(store.walk_commits(&head)),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Self { walk, policy })
    }
}

impl Iterator for History<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.walk.as_mut()?.next()?;
        match item.and_then(|commit| self.policy.resolve(commit)) {
            Ok(Some(commit)) => Some(Ok(commit)),
            Ok(None) => {
                self.walk = None;
                None
            }
            Err(e) => {
                self.walk = None;
                Some(Err(e))
            }
        }
    }
}

/// The commits a `commit_hash` filter selects.
#[derive(Debug, Default)]
pub(crate) struct CommitSelection {
    /// True when the filter names `WORKING` or `STAGED`.
    pub working_set: bool,
    pub commits: Vec<Commit>,
}

/// Resolves the values of filters on `column` straight to commits, without
/// walking the graph. Unknown hashes, malformed hashes and ghosts select
/// nothing. Returns `None` when no filter names the column.
pub(crate) fn select_commits(
    store: &dyn VersionedStore,
    filters: &[Filter],
    column: &str,
) -> Result<Option<CommitSelection>> {
    let Some(values) = filter_values(filters, column) else {
        return Ok(None);
    };

    let mut selection = CommitSelection::default();
    let mut seen = HashSet::new();
    for value in values {
        if value.eq_ignore_ascii_case(WORKING) || value.eq_ignore_ascii_case(STAGED) {
            selection.working_set = true;
            continue;
        }
        let Ok(hash) = value.parse::<Hash>() else {
            continue;
        };
        if !seen.insert(hash) {
            continue;
        }
        match store.resolve_hash(&hash) {
            Ok(OptionalCommit::Resolved(commit)) => selection.commits.push(commit),
            Ok(OptionalCommit::Ghost(_)) | Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(selection))
}

enum Source<'a> {
    Ready(std::vec::IntoIter<ChangeSet>),
    History(History<'a>),
    Commits(std::vec::IntoIter<Commit>),
}

/// Lazily expands a partition into change sets.
pub(crate) struct ChangeSets<'a> {
    store: &'a dyn VersionedStore,
    policy: GhostPolicy,
    source: Source<'a>,
}

impl<'a> ChangeSets<'a> {
    pub fn new(store: &'a dyn VersionedStore, partition: Partition) -> Result<Self> {
        let source = match partition {
            Partition::WorkingSet => {
                let roots = store.working_roots()?;
                Source::Ready(
                    vec![
                        ChangeSet {
                            label: STAGED.to_string(),
                            meta: None,
                            deltas: store.table_deltas(&roots.head, &roots.staged),
                        },
                        ChangeSet {
                            label: WORKING.to_string(),
                            meta: None,
                            deltas: store.table_deltas(&roots.staged, &roots.working),
                        },
                    ]
                    .into_iter(),
                )
            }
            Partition::CommitHistory => Source::History(History::from_head(store)?),
            Partition::Commits(commits) => Source::Commits(commits.into_iter()),
            Partition::Rows | Partition::Diff(_) => return Err(Error::UnknownPartition),
        };
        Ok(Self {
            store,
            policy: GhostPolicy::for_store(store),
            source,
        })
    }

    /// Diffs a commit against its first parent. Root commits, and commits
    /// whose first parent is a ghost under [`GhostPolicy::EndOfHistory`],
    /// have no change set.
    fn commit_changes(&self, commit: Commit) -> Result<Option<ChangeSet>> {
        if commit.parents.is_empty() {
            return Ok(None);
        }
        let parent = self.store.resolve_parent(&commit, 0)?;
        let Some(parent) = self.policy.resolve(parent)? else {
            return Ok(None);
        };
        Ok(Some(ChangeSet {
            label: commit.hash.to_hex(),
            deltas: self.store.table_deltas(&parent.root, &commit.root),
            meta: Some(commit.meta),
        }))
    }
}

impl Iterator for ChangeSets<'_> {
    type Item = Result<ChangeSet>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let commit = match &mut self.source {
                Source::Ready(sets) => return sets.next().map(Ok),
                Source::History(history) => match history.next()? {
                    Ok(commit) => commit,
                    Err(e) => return Some(Err(e)),
                },
                Source::Commits(commits) => commits.next()?,
            };
            match self.commit_changes(commit) {
                Ok(Some(set)) => return Some(Ok(set)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Flattens change sets into table rows, one batch per change set.
pub(crate) fn change_rows<'a, F>(sets: ChangeSets<'a>, mut render: F) -> RowIter<'a>
where
    F: FnMut(&ChangeSet) -> Vec<Row> + 'a,
{
    RowIter::new(sets.flat_map(move |set| match set {
        Ok(set) => render(&set).into_iter().map(Ok).collect::<Vec<_>>(),
        Err(e) => vec![Err(e)],
    }))
}

/// Partitions for the unscoped diff tables: the working set and the commit
/// history, or exactly what a `commit_hash` filter selects.
pub(crate) fn diff_partitions(store: &dyn VersionedStore, filters: &[Filter]) -> Result<Vec<Partition>> {
    let Some(selection) = select_commits(store, filters, "commit_hash")? else {
        return Ok(vec![Partition::WorkingSet, Partition::CommitHistory]);
    };
    let mut partitions = Vec::new();
    if selection.working_set {
        partitions.push(Partition::WorkingSet);
    }
    if !selection.commits.is_empty() {
        partitions.push(Partition::Commits(selection.commits));
    }
    Ok(partitions)
}

/// Partitions for tables that only list commits.
pub(crate) fn commit_partitions(store: &dyn VersionedStore, filters: &[Filter]) -> Result<Vec<Partition>> {
    match select_commits(store, filters, "commit_hash")? {
        None => Ok(vec![Partition::CommitHistory]),
        Some(selection) if selection.commits.is_empty() => Ok(Vec::new()),
        Some(selection) => Ok(vec![Partition::Commits(selection.commits)]),
    }
}

/// The commits a commit-listing partition covers.
pub(crate) fn partition_commits<'a>(
    store: &'a dyn VersionedStore,
    partition: Partition,
) -> Result<Box<dyn Iterator<Item = Result<Commit>> + 'a>> {
    match partition {
        Partition::CommitHistory => Ok(Box::new(History::from_head(store)?)),
        Partition::Commits(commits) => Ok(Box::new(commits.into_iter().map(Ok))),
        _ => Err(Error::UnknownPartition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;
    use crate::versioned::{MemoryStore, RootValue, TableColumn, TableSchema, TableSnapshot};
    use chrono::{TimeZone, Utc};

    fn meta(secs: i64) -> CommitMeta {
        CommitMeta::new("T", "t@example.com", Utc.timestamp_opt(secs, 0).unwrap(), "m")
    }

    fn root(rows: &[i64]) -> RootValue {
        let schema = TableSchema::new(vec![TableColumn::pk("id", 1, ColumnType::Int)]);
        let rows = rows.iter().map(|id| vec![Value::Int(*id)]).collect();
        RootValue::new().with_table(TableSnapshot::new("t", schema, rows).unwrap())
    }

    #[test]
    fn test_commit_history_skips_root_commit() {
        let mut store = MemoryStore::new();
        store.commit("main", RootValue::new(), meta(1));
        let b = store.commit("main", root(&[1]), meta(2));

        let sets: Vec<_> = ChangeSets::new(&store, Partition::CommitHistory)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].label, b.to_hex());
        assert_eq!(sets[0].deltas.len(), 1);
    }

    #[test]
    fn test_working_set_is_staged_then_working() {
        let mut store = MemoryStore::new();
        store.commit("main", root(&[1]), meta(1));
        store.stage(root(&[1, 2]));
        store.set_working(root(&[1, 2, 3]));

        let sets: Vec<_> = ChangeSets::new(&store, Partition::WorkingSet)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let labels: Vec<_> = sets.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec![STAGED, WORKING]);
        assert!(sets.iter().all(|s| s.deltas[0].has_data_change()));
        assert_eq!(sets[0].commit_cells()[1], Value::Null);
    }

    #[test]
    fn test_select_commits_drops_unknown_hashes() {
        let mut store = MemoryStore::new();
        let a = store.commit("main", RootValue::new(), meta(1));
        let ghost = Hash::of(b"ghost");
        store.add_ghost(ghost);

        let filters = vec![Filter::any_of(
            "commit_hash",
            [a.to_hex(), a.to_hex(), ghost.to_hex(), Hash::of(b"x").to_hex(), "nope".to_string(), "working".to_string()],
        )];
        let selection = select_commits(&store, &filters, "commit_hash").unwrap().unwrap();
        assert!(selection.working_set);
        assert_eq!(selection.commits.len(), 1);
        assert_eq!(selection.commits[0].hash, a);

        assert!(select_commits(&store, &[], "commit_hash").unwrap().is_none());
    }

    #[test]
    fn test_ghost_parent_under_each_policy() {
        let mut store = MemoryStore::new();
        let ghost = Hash::of(b"pruned");
        store.add_ghost(ghost);
        let tip = store.commit_with_parents(vec![ghost], root(&[1]), meta(2));
        store.set_branch("main", tip);

        let result: Result<Vec<_>> = ChangeSets::new(&store, Partition::CommitHistory).unwrap().collect();
        assert!(matches!(result, Err(Error::GhostCommit(_))));

        store.set_shallow(true);
        let sets: Vec<_> = ChangeSets::new(&store, Partition::CommitHistory)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn test_rows_partition_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            ChangeSets::new(&store, Partition::Rows),
            Err(Error::UnknownPartition)
        ));
    }
}
