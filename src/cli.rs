// Command-line surface over the project library
//
// One thin subcommand per library operation; all real work happens in the
// state/registry modules.
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::logtail::LogTail;
use crate::pages::{default_pages, PageContext, PageRegistry};
use crate::registry::ExperimentRegistry;
use crate::scaffold::{init_project, LOGS_DIR};
use crate::settings::ProjectSettings;
use crate::state::db::{init_db, reset_db, DbConnection};
use crate::state::models::{RunId, RunStatus};
use crate::state::users;

#[derive(Parser, Debug)]
#[command(name = "trainyard", version, about = "Manage ML training experiment projects")]
pub struct Cli {
    /// Project root directory
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new project in the project directory
    Init {
        /// Project name
        name: String,
        /// Admin account username
        #[arg(long, default_value = "admin")]
        username: String,
        /// Admin account password
        #[arg(long)]
        password: String,
    },

    /// Manage dashboard accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// List experiments
    Experiments,

    /// List runs of an experiment
    Runs { experiment: String },

    /// Print the config snapshot of a run
    Config { experiment: String, run: u32 },

    /// Scaffold a new run from a config file
    NewRun {
        experiment: String,
        /// Path to the config.json to snapshot
        #[arg(long)]
        config: PathBuf,
    },

    /// Set the status of a run (pending, running, succeeded, failed)
    Status {
        experiment: String,
        run: u32,
        status: String,
    },

    /// Check a run's config snapshot against its recorded digest
    VerifyRun { experiment: String, run: u32 },

    /// Delete a run and its artifacts
    DeleteRun { experiment: String, run: u32 },

    /// Print a run's training log, optionally following it
    Logs {
        experiment: String,
        run: u32,
        /// Keep watching the log for new lines
        #[arg(long)]
        follow: bool,
    },

    /// Render the dashboard pages as text
    Overview,

    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// Create an account
    Create { username: String, password: String },
    /// Check a username/password pair
    Verify { username: String, password: String },
    /// Change an account's password
    Passwd { username: String, password: String },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    /// Drop and recreate the schema. Destroys all accounts.
    Reset,
}

struct App {
    root: PathBuf,
    settings: ProjectSettings,
    db: DbConnection,
    experiments: ExperimentRegistry,
}

impl App {
    fn open(root: PathBuf) -> anyhow::Result<Self> {
        let settings = ProjectSettings::load(&root)?;
        let db = init_db(&settings.db_file(&root))?;
        let experiments = ExperimentRegistry::new(settings.experiments_root(&root));
        Ok(Self {
            root,
            settings,
            db,
            experiments,
        })
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Init {
                name,
                username,
                password,
            } => {
                std::fs::create_dir_all(&self.project)?;
                init_project(&self.project, &name, &username, &password)?;
                println!("Initialized project '{}' at {}", name, self.project.display());
                Ok(())
            }

            Commands::User { command } => {
                let app = App::open(self.project)?;
                match command {
                    UserCommands::Create { username, password } => {
                        users::validate_password(&password)
                            .map_err(|msg| anyhow::anyhow!("invalid password: {msg}"))?;
                        let user = users::create_user(&app.db, &username, &password)?;
                        println!("Created user '{}' (id {})", user.username, user.id);
                        Ok(())
                    }
                    UserCommands::Verify { username, password } => {
                        if users::verify_credentials(&app.db, &username, &password)? {
                            println!("OK");
                            Ok(())
                        } else {
                            bail!("invalid credentials");
                        }
                    }
                    UserCommands::Passwd { username, password } => {
                        users::validate_password(&password)
                            .map_err(|msg| anyhow::anyhow!("invalid password: {msg}"))?;
                        if !users::change_password(&app.db, &username, &password)? {
                            bail!("no such user: {username}");
                        }
                        println!("Password changed for '{username}'");
                        Ok(())
                    }
                }
            }

            Commands::Experiments => {
                let app = App::open(self.project)?;
                for name in app.experiments.list_experiments()? {
                    println!("{name}");
                }
                Ok(())
            }

            Commands::Runs { experiment } => {
                let app = App::open(self.project)?;
                for run in app.experiments.list_runs(&experiment)? {
                    let created = run
                        .created_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}  {:<9}  {}", run.id, run.status, created);
                }
                Ok(())
            }

            Commands::Config { experiment, run } => {
                let app = App::open(self.project)?;
                let config = app.experiments.get_config(&experiment, RunId::new(run))?;
                println!("{:#}", config);
                Ok(())
            }

            Commands::NewRun { experiment, config } => {
                let app = App::open(self.project)?;
                let raw = std::fs::read_to_string(&config)
                    .with_context(|| format!("reading {}", config.display()))?;
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", config.display()))?;
                let run = app.experiments.create_run(&experiment, &value)?;
                println!("Created {}/{}", run.experiment, run.id);
                Ok(())
            }

            Commands::Status {
                experiment,
                run,
                status,
            } => {
                let app = App::open(self.project)?;
                let status = match status.as_str() {
                    "pending" => RunStatus::Pending,
                    "running" => RunStatus::Running,
                    "succeeded" => RunStatus::Succeeded,
                    "failed" => RunStatus::Failed,
                    other => bail!("unknown status '{other}' (expected pending, running, succeeded, or failed)"),
                };
                app.experiments
                    .set_run_status(&experiment, RunId::new(run), status)?;
                Ok(())
            }

            Commands::VerifyRun { experiment, run } => {
                let app = App::open(self.project)?;
                if app.experiments.verify_run(&experiment, RunId::new(run))? {
                    println!("OK: config snapshot matches its recorded digest");
                    Ok(())
                } else {
                    bail!("config snapshot for {experiment}/run {run} was modified after creation");
                }
            }

            Commands::DeleteRun { experiment, run } => {
                let app = App::open(self.project)?;
                app.experiments.delete_run(&experiment, RunId::new(run))?;
                println!("Deleted {}/{}", experiment, RunId::new(run));
                Ok(())
            }

            Commands::Logs {
                experiment,
                run,
                follow,
            } => {
                let app = App::open(self.project)?;
                // Log path is conventional; the run itself must exist
                app.experiments.read_meta(&experiment, RunId::new(run))?;
                let log_path = app
                    .root
                    .join(LOGS_DIR)
                    .join(&experiment)
                    .join(RunId::new(run).dir_name())
                    .join("train.log");

                let mut tail = LogTail::new(log_path);
                loop {
                    for line in tail.read_new_lines()? {
                        println!("{line}");
                    }
                    if !follow {
                        break;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                Ok(())
            }

            Commands::Overview => {
                let app = App::open(self.project)?;
                let pages = PageRegistry::with_pages(&default_pages())?;
                let ctx = PageContext {
                    settings: &app.settings,
                    db: &app.db,
                    experiments: &app.experiments,
                };
                for page in pages.iter() {
                    println!("== {} ==", page.title());
                    println!("{}", page.render(&ctx)?);
                }
                Ok(())
            }

            Commands::Db { command } => {
                let app = App::open(self.project)?;
                match command {
                    DbCommands::Reset => {
                        reset_db(&app.db)?;
                        println!("Database schema reset");
                        Ok(())
                    }
                }
            }
        }
    }
}
