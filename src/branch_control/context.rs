use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Database-level privileges a caller may hold outside of branch control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Super,
    GrantOption,
    Create,
    Alter,
    Drop,
    Insert,
    Update,
    Delete,
    Execute,
    Select,
}

impl Privilege {
    pub fn parse(s: &str) -> Option<Privilege> {
        match s.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "super" => Some(Privilege::Super),
            "grant_option" => Some(Privilege::GrantOption),
            "create" => Some(Privilege::Create),
            "alter" => Some(Privilege::Alter),
            "drop" => Some(Privilege::Drop),
            "insert" => Some(Privilege::Insert),
            "update" => Some(Privilege::Update),
            "delete" => Some(Privilege::Delete),
            "execute" => Some(Privilege::Execute),
            "select" => Some(Privilege::Select),
            _ => None,
        }
    }
}

/// Privileges that, held together on a database, grant full control over its
/// branch control rows.
const DATABASE_OWNER: [Privilege; 8] = [
    Privilege::Create,
    Privilege::Alter,
    Privilege::Drop,
    Privilege::Insert,
    Privilege::Update,
    Privilege::Delete,
    Privilege::Execute,
    Privilege::GrantOption,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSet {
    global: BTreeSet<Privilege>,
    databases: HashMap<String, BTreeSet<Privilege>>,
}

impl PrivilegeSet {
    #[must_use]
    pub fn with_global(mut self, privileges: impl IntoIterator<Item = Privilege>) -> Self {
        self.global.extend(privileges);
        self
    }

    #[must_use]
    pub fn with_database(
        mut self,
        database: &str,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        self.databases
            .entry(database.to_lowercase())
            .or_default()
            .extend(privileges);
        self
    }

    /// Every privilege that makes up database ownership.
    pub fn owner() -> Vec<Privilege> {
        DATABASE_OWNER.to_vec()
    }

    /// True when these privileges bypass branch control on `database`.
    pub fn controls_database(&self, database: &str) -> bool {
        if self.global.contains(&Privilege::Super) && self.global.contains(&Privilege::GrantOption) {
            return true;
        }
        if DATABASE_OWNER.iter().all(|p| self.global.contains(p)) {
            return true;
        }
        self.databases
            .get(&database.to_lowercase())
            .is_some_and(|set| DATABASE_OWNER.iter().all(|p| set.contains(p)))
    }
}

/// The caller identity that branch control checks are made against.
pub trait AuthContext: Send + Sync {
    fn user(&self) -> &str;
    fn host(&self) -> &str;
    fn current_database(&self) -> &str;
    fn current_branch(&self) -> &str;
    fn has_database_privileges(&self, database: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: String,
    pub host: String,
    pub database: String,
    pub branch: String,
    pub privileges: PrivilegeSet,
}

impl Session {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on(mut self, database: impl Into<String>, branch: impl Into<String>) -> Self {
        self.database = database.into();
        self.branch = branch.into();
        self
    }

    #[must_use]
    pub fn with_privileges(mut self, privileges: PrivilegeSet) -> Self {
        self.privileges = privileges;
        self
    }
}

impl AuthContext for Session {
    fn user(&self) -> &str {
        &self.user
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn current_database(&self) -> &str {
        &self.database
    }

    fn current_branch(&self) -> &str {
        &self.branch
    }

    fn has_database_privileges(&self, database: &str) -> bool {
        self.privileges.controls_database(database)
    }
}

/// Strips a revision qualifier, so `mydb/feature` becomes `mydb`.
pub fn database_name_only(database: &str) -> &str {
    database.split_once('/').map_or(database, |(db, _)| db)
}
