pub const SCHEMA: &str = r#"
-- Serialized branch control state; at most one row
CREATE TABLE IF NOT EXISTS branch_control (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data BLOB NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);
"#;
