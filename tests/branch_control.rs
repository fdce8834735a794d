//! Branch control scenarios through the public API: matching, subsumption,
//! authorization and persistence through both control stores.

use std::sync::Arc;

use systables::branch_control::{
    AccessRow, BinlogOperation, Controller, NamespaceRow, Privilege, PrivilegeSet, Session,
};
use systables::config::ControlBackend;
use systables::error::Error;
use systables::store;
use systables::tables::{Database, Filter, scan};
use systables::types::{Permissions, Value};
use systables::versioned::MemoryStore;
use tempfile::TempDir;

fn admin_and_write() -> Permissions {
    Permissions::ADMIN.union(Permissions::WRITE)
}

#[test]
fn test_overlapping_rows_union_their_permissions() {
    let controller = Controller::new();
    let access = controller.access();
    access
        .insert(None, &AccessRow::new("%", "main", "alice", "%", Permissions::WRITE))
        .unwrap();
    access
        .insert(None, &AccessRow::new("shop", "%", "alice", "%", Permissions::ADMIN))
        .unwrap();

    assert_eq!(
        access.match_permissions("shop", "main", "alice", "10.0.0.1"),
        (true, admin_and_write())
    );
    assert_eq!(
        access.match_permissions("blog", "main", "ALICE", "10.0.0.1"),
        (true, Permissions::WRITE)
    );
    assert_eq!(
        access.match_permissions("blog", "dev", "alice", "10.0.0.1"),
        (false, Permissions::empty())
    );
}

#[test]
fn test_patterns_match_like_sql() {
    let controller = Controller::new();
    let access = controller.access();
    access
        .insert(None, &AccessRow::new("%", "release/v_", "ci", "%", Permissions::WRITE))
        .unwrap();
    access
        .insert(None, &AccessRow::new("%", "100\\%", "ci", "%", Permissions::READ))
        .unwrap();

    assert!(access.match_permissions("db", "release/v1", "ci", "h").0);
    assert!(!access.match_permissions("db", "release/v10", "ci", "h").0);
    assert!(access.match_permissions("db", "100%", "ci", "h").0);
    assert!(!access.match_permissions("db", "1000", "ci", "h").0);
}

#[test]
fn test_rows_inside_an_admin_space_are_redundant() {
    let controller = Controller::with_default_row();
    let access = controller.access();
    // Every pattern lies inside the default row, which only grants write.
    access
        .insert(None, &AccessRow::new("shop", "feature%", "alice", "%", Permissions::ADMIN))
        .unwrap();

    let err = access
        .insert(None, &AccessRow::new("shop", "feature1", "alice", "%", Permissions::READ))
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    access
        .insert(None, &AccessRow::new("blog", "feature1", "alice", "%", Permissions::READ))
        .unwrap();
    assert_eq!(access.len(), 3);
}

#[test]
fn test_sessions_need_admin_to_change_rows() {
    let controller = Controller::with_default_row();
    let access = controller.access();
    let session = Session::new("bob", "localhost").on("shop", "main");
    let row = AccessRow::new("shop", "feature", "bob", "%", admin_and_write());

    let err = access.insert(Some(&session), &row).unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    access
        .insert(None, &AccessRow::new("shop", "%", "bob", "%", Permissions::ADMIN))
        .unwrap();
    // Already granted by the admin row.
    let err = access.insert(Some(&session), &row).unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    access
        .insert(Some(&session), &AccessRow::new("shop", "feature", "carol", "%", Permissions::READ))
        .unwrap();
    let err = access
        .insert(Some(&session), &AccessRow::new("blog", "feature", "carol", "%", Permissions::READ))
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let owner = Session::new("dana", "localhost")
        .on("blog", "main")
        .with_privileges(PrivilegeSet::default().with_database("blog", PrivilegeSet::owner()));
    access
        .insert(Some(&owner), &AccessRow::new("blog", "feature", "carol", "%", Permissions::READ))
        .unwrap();

    let global = Session::new("root", "localhost")
        .with_privileges(PrivilegeSet::default().with_global([Privilege::Super, Privilege::GrantOption]));
    access
        .insert(Some(&global), &AccessRow::new("wiki", "%", "carol", "%", Permissions::READ))
        .unwrap();
}

#[test]
fn test_namespace_claims_restrict_branch_creation() {
    let controller = Controller::with_default_row();
    let namespace = controller.namespace();
    namespace
        .insert(None, &NamespaceRow::new("%", "release%", "releaser", "%"))
        .unwrap();

    let alice = Session::new("alice", "localhost").on("shop/main", "main");
    let releaser = Session::new("releaser", "ci").on("shop", "main");

    controller.can_create_branch(Some(&alice), "feature").unwrap();
    assert!(matches!(
        controller.can_create_branch(Some(&alice), "release-1"),
        Err(Error::CannotCreateBranch { .. })
    ));
    controller.can_create_branch(Some(&releaser), "release-1").unwrap();

    controller.add_admin_for_context(Some(&alice), "feature").unwrap();
    let (_, perms) = controller
        .access()
        .match_permissions("shop", "feature", "alice", "localhost");
    assert!(perms.has(Permissions::ADMIN));
    controller.can_delete_branch(Some(&alice), "feature").unwrap();
}

#[test]
fn test_binlogs_record_every_change() {
    let controller = Controller::new();
    let access = controller.access();
    let first = AccessRow::new("%", "main", "alice", "%", Permissions::WRITE);
    let second = AccessRow::new("%", "main", "alice", "%", Permissions::READ);
    access.insert(None, &first).unwrap();
    access.update(None, &first, &second).unwrap();
    assert!(access.delete(None, "%", "main", "alice", "%").unwrap());
    assert!(!access.delete(None, "%", "main", "alice", "%").unwrap());

    let operations: Vec<_> = access.binlog().iter().map(|e| e.operation).collect();
    assert_eq!(
        operations,
        vec![
            BinlogOperation::Insert,
            BinlogOperation::Delete,
            BinlogOperation::Insert,
            BinlogOperation::Delete,
        ]
    );
    assert_eq!(access.binlog()[2].permissions, Permissions::READ);
}

#[test]
fn test_control_tables_read_through_database() {
    let controller = Arc::new(Controller::with_default_row());
    controller
        .access()
        .insert(None, &AccessRow::new("shop", "main", "alice", "%", Permissions::ADMIN))
        .unwrap();
    let database = Database::new("shop", Arc::new(MemoryStore::new()), Arc::clone(&controller));

    let table = database.require_table("DOLT_BRANCH_CONTROL").unwrap();
    let rows = scan(table.as_ref(), &[Filter::eq("user", "alice")]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::text("shop"));

    let binlog = database.require_table("dolt_branch_control_binlog").unwrap();
    assert_eq!(scan(binlog.as_ref(), &[]).unwrap().len(), 2);
}

fn persist_round_trip(backend: ControlBackend, file: &str) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(file);

    let controller = Controller::load(store::open(backend, &path).unwrap()).unwrap();
    assert_eq!(controller.access().len(), 1, "empty store yields the default row");
    controller
        .access()
        .insert(None, &AccessRow::new("shop", "%", "alice", "%", Permissions::ADMIN))
        .unwrap();
    controller
        .namespace()
        .insert(None, &NamespaceRow::new("shop", "release%", "alice", "%"))
        .unwrap();
    controller.save().unwrap();

    let reloaded = Controller::load(store::open(backend, &path).unwrap()).unwrap();
    assert_eq!(reloaded.access().rows(), controller.access().rows());
    assert_eq!(reloaded.namespace().rows(), controller.namespace().rows());
    assert_eq!(reloaded.access().binlog(), controller.access().binlog());
    assert!(!reloaded.namespace().can_create("shop", "release-2", "bob", "h"));
}

#[test]
fn test_file_store_persists_both_tables() {
    persist_round_trip(ControlBackend::File, "control.json");
}

#[test]
fn test_sqlite_store_persists_both_tables() {
    persist_round_trip(ControlBackend::Sqlite, "control.db");
}
