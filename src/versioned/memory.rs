use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::{
    Branch, Commit, CommitMeta, CommitWalk, Hash, Hasher, OptionalCommit, RootValue, VersionedStore,
    WorkingRoots,
};
use crate::error::{Error, Result};

/// An in-memory commit graph, assembled in code.
///
/// ```rust,ignore
/// let mut store = MemoryStore::new();
/// let a = store.commit("main", root_a, meta("add people"));
/// let b = store.commit("main", root_b, meta("update people"));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    commits: HashMap<Hash, Commit>,
    ghosts: HashSet<Hash>,
    branches: BTreeMap<String, Hash>,
    current: String,
    staged: Option<Arc<RootValue>>,
    working: Option<Arc<RootValue>>,
    shallow: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store whose HEAD is the (not yet created) `main` branch.
    pub fn new() -> Self {
        Self {
            commits: HashMap::new(),
            ghosts: HashSet::new(),
            branches: BTreeMap::new(),
            current: "main".to_string(),
            staged: None,
            working: None,
            shallow: false,
        }
    }

    /// Commits `root` on top of `branch`, creating the branch if needed.
    pub fn commit(&mut self, branch: &str, root: RootValue, meta: CommitMeta) -> Hash {
        let parents = self.branches.get(branch).copied().into_iter().collect();
        let hash = self.commit_with_parents(parents, root, meta);
        self.branches.insert(branch.to_string(), hash);
        hash
    }

    /// Adds a commit with explicit parents without moving any branch.
    pub fn commit_with_parents(&mut self, parents: Vec<Hash>, root: RootValue, meta: CommitMeta) -> Hash {
        let mut hasher = Hasher::new();
        for parent in &parents {
            hasher.bytes(parent.as_bytes());
        }
        hasher
            .str(&meta.name)
            .str(&meta.email)
            .bytes(&meta.timestamp.timestamp_micros().to_be_bytes())
            .str(&meta.description);
        for table in root.tables() {
            hasher.str(&table.name).bytes(table.content_hash.as_bytes());
        }
        let hash = hasher.finish();

        self.commits.insert(
            hash,
            Commit {
                hash,
                parents,
                meta,
                root: Arc::new(root),
            },
        );
        hash
    }

    /// Points `branch` at `hash`.
    pub fn set_branch(&mut self, branch: &str, hash: Hash) {
        self.branches.insert(branch.to_string(), hash);
    }

    /// Registers a hash that resolves to a ghost.
    pub fn add_ghost(&mut self, hash: Hash) {
        self.ghosts.insert(hash);
    }

    pub fn set_shallow(&mut self, shallow: bool) {
        self.shallow = shallow;
    }

    /// Sets the staged root. Until set, it equals HEAD's root.
    pub fn stage(&mut self, root: RootValue) {
        self.staged = Some(Arc::new(root));
    }

    /// Sets the working root. Until set, it equals the staged root.
    pub fn set_working(&mut self, root: RootValue) {
        self.working = Some(Arc::new(root));
    }

    fn branch_commit(&self, branch: &str) -> Result<Commit> {
        let hash = self
            .branches
            .get(branch)
            .ok_or_else(|| Error::NotFound(format!("branch {branch}")))?;
        self.resolve_hash(hash)?.into_commit()
    }
}

impl VersionedStore for MemoryStore {
    fn resolve_ref(&self, name: &str) -> Result<Commit> {
        if name.eq_ignore_ascii_case("HEAD") {
            return self.head();
        }
        if self.branches.contains_key(name) {
            return self.branch_commit(name);
        }
        let hash: Hash = name
            .parse()
            .map_err(|_| Error::NotFound(format!("ref {name}")))?;
        self.resolve_hash(&hash)?.into_commit()
    }

    fn resolve_hash(&self, hash: &Hash) -> Result<OptionalCommit> {
        if let Some(commit) = self.commits.get(hash) {
            return Ok(OptionalCommit::Resolved(commit.clone()));
        }
        if self.ghosts.contains(hash) {
            return Ok(OptionalCommit::Ghost(*hash));
        }
        Err(Error::NotFound(format!("commit {hash}")))
    }

    fn head(&self) -> Result<Commit> {
        self.branch_commit(&self.current)
    }

    fn walk_commits(&self, head: &Commit) -> CommitWalk<'_> {
        CommitWalk::new(self, head)
    }

    fn branches(&self) -> Result<Vec<Branch>> {
        Ok(self
            .branches
            .iter()
            .map(|(name, head)| Branch {
                name: name.clone(),
                head: *head,
            })
            .collect())
    }

    fn working_roots(&self) -> Result<WorkingRoots> {
        let head = match self.head() {
            Ok(commit) => commit.root,
            Err(Error::NotFound(_)) => Arc::new(RootValue::new()),
            Err(e) => return Err(e),
        };
        let staged = self.staged.clone().unwrap_or_else(|| Arc::clone(&head));
        let working = self.working.clone().unwrap_or_else(|| Arc::clone(&staged));
        Ok(WorkingRoots {
            head,
            staged,
            working,
        })
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioned::GhostPolicy;
    use chrono::{TimeZone, Utc};

    fn meta(secs: i64, description: &str) -> CommitMeta {
        CommitMeta::new(
            "Tester",
            "tester@example.com",
            Utc.timestamp_opt(secs, 0).unwrap(),
            description,
        )
    }

    #[test]
    fn test_commits_chain_on_branch() {
        let mut store = MemoryStore::new();
        let a = store.commit("main", RootValue::new(), meta(1, "a"));
        let b = store.commit("main", RootValue::new(), meta(2, "b"));

        let head = store.head().unwrap();
        assert_eq!(head.hash, b);
        assert_eq!(head.parents, vec![a]);
        assert_eq!(store.resolve_commit("main~1").unwrap().hash, a);
        assert_eq!(store.resolve_commit(&a.to_hex()).unwrap().hash, a);
        assert!(matches!(store.resolve_commit("main~2"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_walk_is_newest_first_across_merges() {
        let mut store = MemoryStore::new();
        let base = store.commit("main", RootValue::new(), meta(1, "base"));
        let side = store.commit_with_parents(vec![base], RootValue::new(), meta(3, "side"));
        let main = store.commit("main", RootValue::new(), meta(2, "main"));
        let merge = store.commit_with_parents(vec![main, side], RootValue::new(), meta(4, "merge"));
        store.set_branch("main", merge);

        let head = store.head().unwrap();
        let order: Vec<Hash> = store
            .walk_commits(&head)
            .map(|c| c.unwrap().hash())
            .collect();
        assert_eq!(order, vec![merge, side, main, base]);
    }

    #[test]
    fn test_ghost_parent_ends_walk_or_fails() {
        let mut store = MemoryStore::new();
        let ghost = Hash::of(b"pruned");
        store.add_ghost(ghost);
        let tip = store.commit_with_parents(vec![ghost], RootValue::new(), meta(5, "tip"));
        store.set_branch("main", tip);

        let head = store.head().unwrap();
        let walked: Vec<_> = store.walk_commits(&head).map(|c| c.unwrap()).collect();
        assert_eq!(walked.len(), 2);
        assert!(matches!(walked[1], OptionalCommit::Ghost(h) if h == ghost));

        assert!(matches!(store.resolve_commit("main~1"), Err(Error::GhostCommit(_))));
        assert_eq!(GhostPolicy::for_store(&store), GhostPolicy::Fail);
        store.set_shallow(true);
        assert_eq!(GhostPolicy::for_store(&store), GhostPolicy::EndOfHistory);
    }

    #[test]
    fn test_working_roots_default_to_head() {
        let mut store = MemoryStore::new();
        let roots = store.working_roots().unwrap();
        assert_eq!(roots.head.table_names().count(), 0);

        store.commit("main", RootValue::new(), meta(1, "a"));
        store.set_working(RootValue::new());
        let roots = store.working_roots().unwrap();
        assert!(Arc::ptr_eq(&roots.head, &roots.staged));
        assert!(!Arc::ptr_eq(&roots.staged, &roots.working));
    }
}
