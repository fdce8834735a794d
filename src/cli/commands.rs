use clap::Subcommand;

#[derive(Subcommand)]
pub enum ControlCommands {
    /// List branch control rows
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a branch control row
    Add {
        #[command(flatten)]
        pattern: PatternArgs,

        /// Comma-separated permissions: admin, write, read
        #[arg(long)]
        permissions: String,
    },

    /// Remove a branch control row
    Remove {
        #[command(flatten)]
        pattern: PatternArgs,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Show the permissions a user has on a branch
    Match {
        /// Database name
        #[arg(long)]
        database: String,

        /// Branch name
        #[arg(long)]
        branch: String,

        /// User name
        #[arg(long)]
        user: String,

        /// Host the user connects from
        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Show the branch control binlog
    Binlog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum NamespaceCommands {
    /// List namespace rows
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restrict a branch name pattern to matching users
    Add {
        #[command(flatten)]
        pattern: PatternArgs,
    },

    /// Remove a namespace row
    Remove {
        #[command(flatten)]
        pattern: PatternArgs,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Check whether a user may create a branch
    CanCreate {
        /// Database name
        #[arg(long)]
        database: String,

        /// Branch name
        #[arg(long)]
        branch: String,

        /// User name
        #[arg(long)]
        user: String,

        /// Host the user connects from
        #[arg(long, default_value = "localhost")]
        host: String,
    },

    /// Show the namespace binlog
    Binlog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// The four patterns that key a branch control row.
#[derive(Debug, Clone, clap::Args)]
pub struct PatternArgs {
    /// Database pattern
    #[arg(long, default_value = "%")]
    pub database: String,

    /// Branch pattern
    #[arg(long)]
    pub branch: String,

    /// User pattern
    #[arg(long)]
    pub user: String,

    /// Host pattern
    #[arg(long, default_value = "%")]
    pub host: String,
}
