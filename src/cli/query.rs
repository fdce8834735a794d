use serde_json::Value as Json;

use super::http_client::ApiClient;
use super::open_database;
use crate::config::Config;
use crate::server::dto::{JsonRow, TableRowsResponse, row_to_json};
use crate::tables::{Filter, scan};

/// Reads a system table, locally or through a running server.
pub fn run_query(
    config: &Config,
    table: &str,
    commits: Vec<String>,
    json: bool,
    server: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let result = match server {
        Some(url) => {
            let client = ApiClient::new(&url, user)?;
            let mut path = format!("/tables/{table}");
            if !commits.is_empty() {
                path.push_str(&format!("?commit_hash={}", commits.join(",")));
            }
            client.get::<TableRowsResponse>(&path)?
        }
        None => {
            let database = open_database(config)?;
            let source = database.require_table(table)?;
            let filters: Vec<Filter> = if commits.is_empty() {
                Vec::new()
            } else {
                vec![Filter::any_of("commit_hash", commits)]
            };
            let columns = source.columns();
            let rows = scan(source.as_ref(), &filters)?
                .into_iter()
                .map(|row| row_to_json(&columns, row))
                .collect::<crate::error::Result<Vec<_>>>()?;
            TableRowsResponse {
                name: source.name().to_string(),
                columns,
                rows,
            }
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result.rows)?);
    } else {
        print_rows(&result);
    }
    Ok(())
}

/// Lists the system tables, locally or through a running server.
pub fn run_tables(config: &Config, server: Option<String>) -> anyhow::Result<()> {
    let names: Vec<String> = match server {
        Some(url) => ApiClient::new(&url, None)?.get("/tables")?,
        None => open_database(config)?.table_names()?,
    };
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn cell(row: &JsonRow, column: &str) -> String {
    match row.get(column) {
        None | Some(Json::Null) => "NULL".to_string(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn print_rows(result: &TableRowsResponse) {
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for row in &result.rows {
        let cells: Vec<String> = header.iter().map(|c| cell(row, c)).collect();
        println!("{}", cells.join("\t"));
    }
    println!();
    println!("{} row(s) in {}", result.rows.len(), result.name);
}
