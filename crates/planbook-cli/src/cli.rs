use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "planbook")]
#[command(about = "Inspect and edit the local Planbook store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show schema version, device, outbox size and cached identity
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an entity
    #[command(alias = "new")]
    Add {
        /// Target table (goal_lists, goals, task_categories, daily_tasks, long_term_todos, routines)
        table: String,
        /// Owning user (falls back to `default_user` from the config file)
        #[arg(long, value_name = "USER_ID")]
        user: Option<String>,
        /// Entity fields as a JSON object
        #[arg(long, value_name = "JSON", default_value = "{}")]
        fields: String,
        /// Owning entity id (goal list of a goal, category of a task)
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
    },
    /// List live entities of a table
    List {
        /// Target table
        table: String,
        /// Owning user (falls back to `default_user` from the config file)
        #[arg(long, value_name = "USER_ID")]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete an entity
    Delete {
        /// Target table
        table: String,
        /// Entity ID
        id: String,
    },
    /// Show pending outbox entries
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the offline credential cache
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum CredentialsCommands {
    /// Show who can sign in offline on this device
    Status,
    /// Check an offline sign-in attempt
    Verify {
        /// Account email
        #[arg(long, value_name = "EMAIL")]
        email: String,
        /// Account password
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        /// Expected user id (last known account)
        #[arg(long, value_name = "USER_ID")]
        user: Option<String>,
    },
    /// Remove the cached offline verifier
    Clear,
}
