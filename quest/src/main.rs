//! Command-line entry point for the synthesis loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use quest::context::miner::mine_context;
use quest::engine::{Engine, RunRequest};
use quest::io::config::{QuestConfig, load_config};
use quest::llm::Completer;
use quest::logging;
use quest::runner::Runner;

#[derive(Parser)]
#[command(
    name = "quest",
    version,
    about = "Closed-loop, metric-driven unit-test synthesizer"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "quest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive one full synthesis run for a target file.
    Run {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        code_file: String,
        /// Local checkout for context mining; falls back to the runner's
        /// code endpoint when the file is not found here.
        #[arg(long)]
        repo_root: Option<PathBuf>,
        /// Override the configured refinement cap.
        #[arg(long)]
        max_iters: Option<u32>,
        /// Directory that receives `<run_id>/` run directories.
        #[arg(long, default_value = "runs")]
        runs_dir: PathBuf,
    },
    /// Mine and print the context pack for a local target file.
    Context {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        code_file: String,
        #[arg(long, default_value = ".")]
        repo_root: PathBuf,
    },
    /// Load, validate, and print the resolved configuration.
    CheckConfig,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            repo,
            version,
            code_file,
            repo_root,
            max_iters,
            runs_dir,
        } => cmd_run(&cli.config, RunRequest {
            repo,
            version,
            code_file,
            repo_root,
            runs_root: runs_dir,
            max_iterations: max_iters,
        }),
        Command::Context {
            repo,
            code_file,
            repo_root,
        } => cmd_context(&cli.config, &repo, &code_file, &repo_root),
        Command::CheckConfig => cmd_check_config(&cli.config),
    }
}

fn cmd_run(config_path: &PathBuf, request: RunRequest) -> Result<()> {
    let config = load_config(config_path)?;
    let completer = Completer::from_settings(&config.llm.provider, config.llm.dry);
    let runner = Runner::from_settings(
        &config.runner_url,
        &config.runner_code_url,
        Duration::from_secs(config.runner_timeout_seconds),
        config.targets.coverage,
        config.targets.mutation,
    )?;

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request)?;

    println!(
        "[{}] finish={} iterations={} coverage={:.2} mutation={:.2} cost=${:.6}",
        report.run_id,
        report.finish_reason.as_str(),
        report.iterations,
        report.final_coverage,
        report.final_mutation,
        report.total_llm_cost,
    );
    println!("artifacts: {}", report.run_dir.display());
    Ok(())
}

fn cmd_context(
    config_path: &PathBuf,
    repo: &str,
    code_file: &str,
    repo_root: &PathBuf,
) -> Result<()> {
    let config = load_config(config_path)?;
    let path = repo_root.join(code_file);
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("read target source {}", path.display()))?;
    let pack = mine_context(repo, &source, config.context_max_code_chars);
    println!("{}", serde_json::to_string_pretty(&pack)?);
    Ok(())
}

fn cmd_check_config(config_path: &PathBuf) -> Result<()> {
    let config: QuestConfig = load_config(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_command() {
        let cli = Cli::parse_from([
            "quest",
            "run",
            "--repo",
            "django/django",
            "--version",
            "5.0",
            "--code-file",
            "django/views/static.py",
            "--max-iters",
            "4",
        ]);
        match cli.command {
            Command::Run {
                repo, max_iters, ..
            } => {
                assert_eq!(repo, "django/django");
                assert_eq!(max_iters, Some(4));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_check_config() {
        let cli = Cli::parse_from(["quest", "--config", "custom.toml", "check-config"]);
        assert!(matches!(cli.command, Command::CheckConfig));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
    }
}
