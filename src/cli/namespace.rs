use super::commands::{NamespaceCommands, PatternArgs};
use super::pickers::confirm_action;
use super::{open_controller, print_binlog};
use crate::branch_control::NamespaceRow;
use crate::config::Config;

fn row(pattern: &PatternArgs) -> NamespaceRow {
    NamespaceRow::new(&pattern.database, &pattern.branch, &pattern.user, &pattern.host)
}

pub fn run_namespace(config: &Config, command: NamespaceCommands) -> anyhow::Result<()> {
    let controller = open_controller(config)?;
    let namespace = controller.namespace();

    match command {
        NamespaceCommands::List { json } => {
            let rows = namespace.rows();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No namespace rows; any user may create any branch");
            } else {
                println!("{:<16} {:<24} {:<16} HOST", "DATABASE", "BRANCH", "USER");
                for row in rows {
                    println!("{:<16} {:<24} {:<16} {}", row.database, row.branch, row.user, row.host);
                }
            }
        }
        NamespaceCommands::Add { pattern } => {
            namespace.insert(None, &row(&pattern))?;
            controller.save()?;
            println!(
                "Branches matching '{}' are now reserved for {}@{}",
                pattern.branch, pattern.user, pattern.host
            );
        }
        NamespaceCommands::Remove { pattern, yes } => {
            let message = format!(
                "Remove namespace row '{}' for {}@{}?",
                pattern.branch, pattern.user, pattern.host
            );
            if !confirm_action(&message, yes)? {
                println!("Cancelled");
                return Ok(());
            }
            if namespace.delete(None, &row(&pattern))? {
                controller.save()?;
                println!("Removed namespace row '{}'", pattern.branch);
            } else {
                println!("No namespace row '{}'", pattern.branch);
            }
        }
        NamespaceCommands::CanCreate {
            database,
            branch,
            user,
            host,
        } => {
            if namespace.can_create(&database, &branch, &user, &host) {
                println!("yes");
            } else {
                println!("no");
            }
        }
        NamespaceCommands::Binlog { json } => print_binlog(&namespace.binlog(), false, json)?,
    }

    Ok(())
}
