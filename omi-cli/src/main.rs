//! omi — single-file version control with remote sync.
//!
//! # Usage
//!
//! ```bash
//! omi init [db-name]          # create repo.omi (or db-name) and .omi
//! omi clone <url-or-path>     # copy a local store or download from REPOS
//! omi add [path|--all]        # stage one file, or every file
//! omi commit -m "message"     # record staged files
//! omi push | pull | list      # remote sync (settings.txt)
//! omi log [limit]             # newest commits first
//! omi status                  # staged files, recent commits, counts
//! ```

mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omi_core::auth::CREDENTIAL_REGISTRY_FILE;
use omi_core::{
    DEFAULT_DB_NAME, Repository, RepositoryLocation, SETTINGS_FILE, Settings, SyncClient,
    default_author,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "omi")]
#[command(author = "Omi Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Single-file version control with remote sync")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new repository in the current directory
    Init {
        /// Store file name
        db_name: Option<String>,
    },

    /// Clone a repository from a local store file or the remote
    Clone {
        /// Path to a store file, or a repository name/URL on the remote
        source: String,
    },

    /// Stage files for the next commit
    Add {
        /// File to stage; all files when omitted
        path: Option<String>,
        /// Stage every file in the current directory
        #[arg(long, conflicts_with = "path")]
        all: bool,
    },

    /// Record staged files as a new commit
    Commit {
        #[arg(short, long, default_value = "No message")]
        message: String,
    },

    /// Upload the repository to the remote
    Push,

    /// Replace the local repository with the remote copy
    Pull,

    /// List repositories on the remote
    List,

    /// Show commit history
    Log {
        #[arg(default_value_t = 10)]
        limit: usize,
        /// Also list the files of each commit
        #[arg(long)]
        files: bool,
    },

    /// Show staged files, recent commits and statistics
    Status,
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let root = std::env::current_dir().context("cannot determine working directory")?;
    execute(cli, &root)
}

/// Load the settings file, then run the command. A missing file is fatal.
fn execute(cli: Cli, root: &Path) -> Result<()> {
    let settings = Settings::load(&cli.settings)?;
    run(cli.command, settings, root)
}

fn sync_client(settings: Settings, root: &Path) -> Result<SyncClient> {
    Ok(SyncClient::from_settings(settings)?.with_credential_registry(root.join(CREDENTIAL_REGISTRY_FILE)))
}

fn run(command: Commands, settings: Settings, root: &Path) -> Result<()> {
    match command {
        Commands::Init { db_name } => {
            let db_name = db_name.unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
            println!("Initializing omi repository...");
            Repository::init(root, &db_name)?;
            println!("Repository initialized: {}", db_name);
        }

        Commands::Clone { source } => {
            println!("Cloning from {}...", source);
            let repo = if Path::new(&source).is_file() {
                Repository::clone_local(root, Path::new(&source))?
            } else {
                let location = sync_client(settings, root)?.clone_remote(root, &source)?;
                Repository::open_at(location)?
            };
            println!("Cloned to {}", repo.location().db_name());
        }

        Commands::Add { path, all } => {
            let repo = Repository::open(root)?;
            println!("Adding files to staging...");
            match path {
                Some(path) if !all => {
                    let entry = repo.add(&path)?;
                    println!("{}", report::staged_line(&entry));
                }
                _ => {
                    for entry in repo.add_all()? {
                        println!("{}", report::staged_line(&entry));
                    }
                }
            }
        }

        Commands::Commit { message } => {
            let mut repo = Repository::open(root)?;
            println!("Committing changes...");
            let commit = repo.commit(&message, &default_author())?;
            for file in &commit.files {
                println!("{}", report::blob_line(file));
            }
            println!("Committed successfully (commit #{})", commit.commit_id);
        }

        Commands::Push => {
            let location = RepositoryLocation::resolve(root)?;
            println!("Pushing {} to remote...", location.db_name());
            let client = sync_client(settings, root)?;
            client.push(&location)?;
            println!("Successfully pushed to {}", client.settings().repos_url()?);
        }

        Commands::Pull => {
            let location = RepositoryLocation::resolve(root)?;
            println!("Pulling {} from remote...", location.db_name());
            let client = sync_client(settings, root)?;
            client.pull(&location)?;
            println!("Successfully pulled from {}", client.settings().repos_url()?);
        }

        Commands::List => {
            let client = sync_client(settings, root)?;
            println!("=== Available Repositories on {} ===", client.settings().repos_url()?);
            for name in client.list()? {
                println!("{}", name);
            }
        }

        Commands::Log { limit, files } => {
            let repo = Repository::open(root)?;
            println!("=== Commit History ===");
            for commit in repo.log(limit)? {
                println!("{}", report::log_line(&commit));
                if files {
                    for version in repo.files_in_commit(commit.id)? {
                        println!("    {}  {}", version.hash, version.path);
                    }
                }
            }
        }

        Commands::Status => {
            let repo = Repository::open(root)?;
            print!("{}", report::status_text(&repo.status()?));
        }
    }

    Ok(())
}
