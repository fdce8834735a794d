use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use systables::cli::{
    ControlCommands, NamespaceCommands, open_database, run_control, run_namespace, run_query,
    run_tables,
};
use systables::config::{Config, ControlBackend};
use systables::server::{AppState, create_router};

#[derive(Parser)]
#[command(name = "systables")]
#[command(about = "Branch control and history tables for a versioned database", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Git repository holding the versioned data
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Database name the tables are served under
    #[arg(long, global = true)]
    database: Option<String>,

    /// Branch control storage backend: file or sqlite
    #[arg(long, global = true)]
    control_backend: Option<ControlBackend>,

    /// Branch control storage path
    #[arg(long, global = true)]
    control_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Manage branch access rows
    Control {
        #[command(subcommand)]
        command: ControlCommands,
    },

    /// Manage branch namespace rows
    Namespace {
        #[command(subcommand)]
        command: NamespaceCommands,
    },

    /// Print the rows of a system table
    Query {
        /// Table name, e.g. dolt_log or dolt_diff_items
        table: String,

        /// Restrict to these commit hashes (or WORKING / STAGED)
        #[arg(long = "commit")]
        commits: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Query a running server instead of the local repository
        #[arg(long)]
        server: Option<String>,

        /// User to identify as when querying a server
        #[arg(long)]
        user: Option<String>,
    },

    /// List the system tables
    Tables {
        /// List the tables of a running server
        #[arg(long)]
        server: Option<String>,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(repo) = &self.repo {
            config.repo = repo.clone();
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
        if let Some(backend) = self.control_backend {
            config.control.backend = backend;
        }
        if let Some(path) = &self.control_path {
            config.control.path = path.clone();
        }
        Ok(config)
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let database = open_database(&config)?;
    info!(
        "Serving database {} from {}",
        database.name(),
        config.repo.display()
    );

    let state = Arc::new(AppState::new(database));
    let app = create_router(state);
    let addr = config.server.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// The remote query commands use a blocking HTTP client, so only `serve`
// runs inside a runtime.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("systables=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = cli.load_config()?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            tokio::runtime::Runtime::new()?.block_on(serve(config))?;
        }
        Commands::Control { command } => run_control(&config, command)?,
        Commands::Namespace { command } => run_namespace(&config, command)?,
        Commands::Query {
            table,
            commits,
            json,
            server,
            user,
        } => run_query(&config, &table, commits, json, server, user)?,
        Commands::Tables { server } => run_tables(&config, server)?,
    }

    Ok(())
}
