use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pyscript")]
#[command(about = "PyScript: check and run sandboxed Python-subset scripts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (defaults to ./pyscript.toml when present)
    #[arg(short, long, global = true, env = "PYSCRIPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (overrides the configured level; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the semantic analyzer only
    Check(ScriptArgs),
    /// Compile and execute a script for an extension point
    Run(RunArgs),
    /// List the extension points scripts can be compiled for
    Contexts,
}

#[derive(Args)]
pub struct ScriptArgs {
    /// Inline script source
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub code: Option<String>,

    /// Read the script from a file
    #[arg(short = 'F', long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub script: ScriptArgs,

    /// Extension point: field, score, template, ingest or search
    #[arg(short = 'x', long, default_value = "field")]
    pub context: String,

    /// `params` binding as a JSON object
    #[arg(long)]
    pub params: Option<String>,

    /// Document fields as a JSON object (field and score contexts)
    #[arg(long)]
    pub doc: Option<String>,

    /// `ctx` map as a JSON object (ingest and search contexts)
    #[arg(long)]
    pub ctx: Option<String>,

    /// Running relevance score (score context)
    #[arg(long, default_value_t = 0.0)]
    pub score: f64,

    /// Time budget in milliseconds (overrides the configured budget)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "pyscript",
            "run",
            "_score * 2",
            "--context",
            "score",
            "--score",
            "3",
            "--format",
            "json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.context, "score");
        assert_eq!(args.score, 3.0);
        assert_eq!(args.script.code.as_deref(), Some("_score * 2"));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }

    #[test]
    fn test_check_requires_a_script() {
        assert!(Cli::try_parse_from(["pyscript", "check"]).is_err());
        assert!(Cli::try_parse_from(["pyscript", "check", "x", "--file", "a.py"]).is_err());
        assert!(Cli::try_parse_from(["pyscript", "check", "--file", "a.py"]).is_ok());
    }
}
