use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::types::{Column, Row, Value};

pub type JsonRow = Map<String, Json>;

#[derive(Debug, Default, Deserialize)]
pub struct RowsQuery {
    /// Comma-separated commit hashes, `WORKING` or `STAGED`.
    #[serde(default)]
    pub commit_hash: Option<String>,
}

impl RowsQuery {
    pub fn commit_hashes(&self) -> Option<Vec<String>> {
        self.commit_hash.as_ref().map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TableRowsResponse {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<JsonRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRowRequest {
    pub old: JsonRow,
    pub new: JsonRow,
}

/// Renders a row as an object keyed by column name.
pub fn row_to_json(columns: &[Column], row: Row) -> Result<JsonRow> {
    let mut object = Map::new();
    for (column, value) in columns.iter().zip(row) {
        object.insert(column.name.clone(), serde_json::to_value(value)?);
    }
    Ok(object)
}

/// Reads a row in column order from an object keyed by column name.
pub fn row_from_json(columns: &[Column], object: &JsonRow) -> Result<Row> {
    columns
        .iter()
        .map(|column| {
            let cell = object
                .get(&column.name)
                .ok_or_else(|| Error::InvalidRow(format!("missing column {}", column.name)))?;
            json_to_value(cell).ok_or_else(|| Error::InvalidRow(format!("unsupported value for {}", column.name)))
        })
        .collect()
}

fn json_to_value(json: &Json) -> Option<Value> {
    match json {
        Json::Null => Some(Value::Null),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::String(s) => Some(Value::text(s)),
        Json::Number(n) => n
            .as_u64()
            .map(Value::UInt)
            .or_else(|| n.as_i64().map(Value::Int)),
        Json::Array(_) | Json::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;
    use serde_json::json;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("user", ColumnType::Text),
            Column::new("permissions", ColumnType::Set),
        ]
    }

    #[test]
    fn test_row_from_json_follows_column_order() {
        let object = json!({"permissions": 1, "user": "alice", "extra": true});
        let row = row_from_json(&columns(), object.as_object().unwrap()).unwrap();
        assert_eq!(row, vec![Value::text("alice"), Value::UInt(1)]);

        let object = json!({"user": "alice"});
        assert!(matches!(
            row_from_json(&columns(), object.as_object().unwrap()),
            Err(Error::InvalidRow(_))
        ));
    }

    #[test]
    fn test_commit_hashes_split_on_commas() {
        let query = RowsQuery {
            commit_hash: Some("abc, WORKING,,".to_string()),
        };
        assert_eq!(query.commit_hashes(), Some(vec!["abc".to_string(), "WORKING".to_string()]));
        assert_eq!(RowsQuery::default().commit_hashes(), None);
    }
}
