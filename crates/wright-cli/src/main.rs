mod config;
mod log_cmd;
mod run_cmd;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use wright_core::prompts::Stage;
use wright_store::RunStatus;

use config::{ConfigFile, Overrides, WrightConfig};
use run_cmd::ExecuteOptions;

#[derive(Parser)]
#[command(name = "wright", about = "Plan, architect, and code a project with an LLM backend")]
struct Cli {
    /// Output directory for generated files (overrides WRIGHT_OUTPUT_DIR)
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Model command to run (overrides WRIGHT_MODEL_COMMAND)
    #[arg(long, global = true)]
    model_command: Option<String>,

    /// Retries per task after the first attempt
    #[arg(long, global = true)]
    retry_max: Option<u32>,

    /// Maximum executor attempts running at once
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Wall-clock limit per task attempt, in seconds
    #[arg(long, global = true)]
    task_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a wright config file with the defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Plan, design, and implement a request
    Run {
        /// What to build
        request: String,
        /// Generate in memory only; write no files or run log
        #[arg(long)]
        dry_run: bool,
        /// One task per planned file instead of asking the architect
        #[arg(long)]
        per_file: bool,
    },
    /// Run only the planner and print the plan as TOML
    Plan {
        /// What to build
        request: String,
        /// Write the plan here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build and print the task graph for a plan file
    Graph {
        /// Path to the plan TOML file
        plan: PathBuf,
        /// One task per planned file instead of asking the architect
        #[arg(long)]
        per_file: bool,
    },
    /// Design and implement an existing plan file
    Execute {
        /// Path to the plan TOML file
        plan: PathBuf,
        /// Generate in memory only; write no files or run log
        #[arg(long)]
        dry_run: bool,
        /// One task per planned file instead of asking the architect
        #[arg(long)]
        per_file: bool,
    },
    /// Show the audit log of a run
    Log {
        /// Run id, or path to a run log file
        run: String,
        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print a stage's system prompt (planner, architect, or coder)
    Prompt {
        stage: Stage,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            output_dir: self.out.clone(),
            model_command: self.model_command.clone(),
            retry_max: self.retry_max,
            max_concurrency: self.max_concurrency,
            task_timeout_secs: self.task_timeout,
        }
    }
}

/// Execute the `wright init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = ConfigFile::with_defaults();
    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(command) = &cfg.model.command {
        println!("  model.command = {command}");
    }
    if let Some(dir) = &cfg.output.dir {
        println!("  output.dir = {}", dir.display());
    }
    Ok(())
}

fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Cancelled => 130,
        RunStatus::Failure | RunStatus::Running => 1,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    let status = match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
            None
        }
        Commands::Run {
            request,
            dry_run,
            per_file,
        } => {
            let resolved = WrightConfig::resolve(&overrides)?;
            let options = ExecuteOptions { dry_run, per_file };
            Some(run_cmd::run_request(&resolved, &request, options).await?)
        }
        Commands::Plan { request, output } => {
            let resolved = WrightConfig::resolve(&overrides)?;
            run_cmd::run_plan(&resolved, &request, output.as_deref()).await?;
            None
        }
        Commands::Graph { plan, per_file } => {
            let resolved = WrightConfig::resolve(&overrides)?;
            run_cmd::run_graph(&resolved, &plan, per_file).await?;
            None
        }
        Commands::Execute {
            plan,
            dry_run,
            per_file,
        } => {
            let resolved = WrightConfig::resolve(&overrides)?;
            let options = ExecuteOptions { dry_run, per_file };
            Some(run_cmd::run_execute(&resolved, &plan, options).await?)
        }
        Commands::Log { run, json } => {
            let resolved = WrightConfig::resolve(&overrides)?;
            log_cmd::run_log(&resolved.store, &run, json).await?;
            None
        }
        Commands::Prompt { stage } => {
            print!("{}", stage.system_prompt());
            None
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wright", &mut std::io::stdout());
            None
        }
    };

    if let Some(status) = status {
        let code = exit_code(status);
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}
