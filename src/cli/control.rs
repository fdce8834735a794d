use super::commands::{ControlCommands, PatternArgs};
use super::pickers::confirm_action;
use super::{open_controller, print_binlog};
use crate::branch_control::AccessRow;
use crate::config::Config;
use crate::types::Permissions;

fn describe(pattern: &PatternArgs) -> String {
    format!(
        "{}@{} on {}/{}",
        pattern.user, pattern.host, pattern.database, pattern.branch
    )
}

pub fn run_control(config: &Config, command: ControlCommands) -> anyhow::Result<()> {
    let controller = open_controller(config)?;
    let access = controller.access();

    match command {
        ControlCommands::List { json } => {
            let rows = access.rows();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No branch control rows");
            } else {
                println!("{:<16} {:<24} {:<16} {:<16} PERMISSIONS", "DATABASE", "BRANCH", "USER", "HOST");
                for row in rows {
                    println!(
                        "{:<16} {:<24} {:<16} {:<16} {}",
                        row.database, row.branch, row.user, row.host, row.permissions
                    );
                }
            }
        }
        ControlCommands::Add { pattern, permissions } => {
            let permissions = Permissions::parse_set(&permissions)
                .ok_or_else(|| anyhow::anyhow!("Invalid permissions: {permissions}"))?;
            let row = AccessRow::new(
                &pattern.database,
                &pattern.branch,
                &pattern.user,
                &pattern.host,
                permissions,
            );
            access.insert(None, &row)?;
            controller.save()?;
            println!("Granted [{permissions}] to {}", describe(&pattern));
        }
        ControlCommands::Remove { pattern, yes } => {
            let message = format!("Remove branch control row for {}?", describe(&pattern));
            if !confirm_action(&message, yes)? {
                println!("Cancelled");
                return Ok(());
            }
            let removed = access.delete(
                None,
                &pattern.database,
                &pattern.branch,
                &pattern.user,
                &pattern.host,
            )?;
            if removed {
                controller.save()?;
                println!("Removed branch control row for {}", describe(&pattern));
            } else {
                println!("No branch control row for {}", describe(&pattern));
            }
        }
        ControlCommands::Match {
            database,
            branch,
            user,
            host,
        } => {
            let (matched, permissions) = access.match_permissions(&database, &branch, &user, &host);
            if matched {
                println!("{permissions}");
            } else {
                println!("No matching rows");
            }
        }
        ControlCommands::Binlog { json } => print_binlog(&access.binlog(), true, json)?,
    }

    Ok(())
}
