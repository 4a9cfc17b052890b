use crate::cli::OutputFormat;
use colored::Colorize;
use pyscript_engine::{Diagnostic, ScriptException};
use serde_json::{Value, json};

pub fn print_value(value: &Value, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => match value {
            Value::String(s) => println!("{s}"),
            Value::Null => println!("{}", "None".dimmed()),
            other => println!("{}", serde_json::to_string_pretty(other)?),
        },
    }
    Ok(())
}

pub fn print_diagnostics(diagnostics: &[Diagnostic], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(diagnostics)?),
        OutputFormat::Text => {
            for d in diagnostics {
                println!(
                    "{} {}",
                    format!("{}:{}", d.line, d.column).yellow(),
                    d.message
                );
            }
        }
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Render a classified script failure on stderr
pub fn print_script_error(err: &ScriptException, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = json!({
                "error": err.message,
                "kind": format!("{:?}", err.kind),
                "lang": err.lang,
                "context": err.context,
                "stack": err.stack,
            });
            eprintln!("{body:#}");
        }
        OutputFormat::Text => {
            print_error(&err.message);
            if let Some(context) = &err.context {
                eprintln!("  {} {}", "context:".cyan(), context);
            }
            for frame in &err.stack {
                eprintln!("  {frame}");
            }
        }
    }
}
