use thiserror::Error;

use crate::branch_control::PatternKey;
use crate::types::Permissions;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("expressions are too long [{database:?}, {branch:?}, {user:?}, {host:?}]")]
    ExpressionTooLong {
        database: String,
        branch: String,
        user: String,
        host: String,
    },

    #[error("duplicate key {key} ({permissions})")]
    Conflict {
        key: PatternKey,
        permissions: Permissions,
    },

    #[error("`{user}`@`{host}` cannot {action} the row {target}")]
    Unauthorized {
        user: String,
        host: String,
        action: &'static str,
        target: PatternKey,
    },

    #[error("`{user}`@`{host}` does not have the correct permissions on branch `{branch}`")]
    IncorrectPermissions {
        user: String,
        host: String,
        branch: String,
    },

    #[error("`{user}`@`{host}` cannot create a branch named `{branch}`")]
    CannotCreateBranch {
        user: String,
        host: String,
        branch: String,
    },

    #[error("`{user}`@`{host}` cannot delete the branch `{branch}`")]
    CannotDeleteBranch {
        user: String,
        host: String,
        branch: String,
    },

    #[error("commit {0} is a ghost commit from a shallow clone")]
    GhostCommit(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("partition does not belong to this table")]
    UnknownPartition,

    #[error("corrupt branch control data: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
