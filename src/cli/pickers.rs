/// Asks before a destructive change unless `yes` was given.
pub fn confirm_action(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        Ok(true)
    } else {
        Ok(inquire::Confirm::new(message)
            .with_default(false)
            .prompt()?)
    }
}
