mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pyscript_engine::config::loader::load_config;
use pyscript_engine::{ScriptEngine, ScriptException};

use cli::{Cli, Commands, OutputFormat};
use output::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    if let Err(e) = run(cli, format).await {
        match e.downcast_ref::<ScriptException>() {
            Some(err) => output::print_script_error(err, format),
            None => print_error(&format!("{e:#}")),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, format: OutputFormat) -> Result<()> {
    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.log_level.is_none() {
        observability::apply_logging_level(&config.logging.level);
    }
    let engine = ScriptEngine::new(config)?;

    match &cli.command {
        Commands::Check(args) => commands::check::check(&engine, args, format)?,
        Commands::Run(args) => commands::run::run(&engine, args, format).await?,
        Commands::Contexts => match format {
            OutputFormat::Json => output::print_value(
                &serde_json::json!({
                    "engine": ScriptEngine::NAME,
                    "contexts": engine.supported_contexts(),
                }),
                format,
            )?,
            OutputFormat::Text => {
                println!("{}: {}", "Engine".cyan(), ScriptEngine::NAME);
                for context in engine.supported_contexts() {
                    println!("  {context}");
                }
            }
        },
    }
    Ok(())
}
