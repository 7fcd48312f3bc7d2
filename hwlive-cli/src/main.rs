use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod config;
mod display;

#[derive(Parser, Debug)]
#[command(name = "hwlive")]
#[command(about = "Declarative management of Huawei Cloud Live channels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy every channel recorded in state
    Destroy {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing channel into state
    Import {
        /// Resource address (e.g., live_channel.main)
        address: String,

        /// Remote channel ID
        id: String,

        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Re-read every channel recorded in state
    Refresh {
        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Evaluate a data source and print its result as JSON
    Read {
        /// Data source address (e.g., live_channels.all)
        address: String,

        /// Path to the configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// State inspection commands
    State {
        #[command(subcommand)]
        command: StateCommands,

        /// Configuration file naming the state backend
        #[arg(long, global = true, default_value = "main.json")]
        file: PathBuf,
    },
    /// Remove a lock left behind by an interrupted run
    ForceUnlock {
        /// Lock ID reported by the failed command
        lock_id: String,

        /// Configuration file naming the state backend
        #[arg(long, default_value = "main.json")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// List resources recorded in state
    List,
    /// Show one recorded resource as JSON
    Show {
        /// Resource address (e.g., live_channel.main)
        address: String,
    },
    /// Keep a resource from being deleted by apply or destroy
    Protect {
        address: String,
    },
    /// Allow deleting a protected resource again
    Unprotect {
        address: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => commands::run_validate(&file),
        Commands::Plan { file } => commands::run_plan(&file).await,
        Commands::Apply { file, auto_approve } => commands::run_apply(&file, auto_approve).await,
        Commands::Destroy { file, auto_approve } => {
            commands::run_destroy(&file, auto_approve).await
        }
        Commands::Import { address, id, file } => commands::run_import(&file, &address, &id).await,
        Commands::Refresh { file } => commands::run_refresh(&file).await,
        Commands::Read { address, file } => commands::run_read(&file, &address).await,
        Commands::State { command, file } => match command {
            StateCommands::List => commands::run_state_list(&file).await,
            StateCommands::Show { address } => commands::run_state_show(&file, &address).await,
            StateCommands::Protect { address } => {
                commands::run_state_protect(&file, &address, true).await
            }
            StateCommands::Unprotect { address } => {
                commands::run_state_protect(&file, &address, false).await
            }
        },
        Commands::ForceUnlock { lock_id, file } => {
            commands::run_force_unlock(&file, &lock_id).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
