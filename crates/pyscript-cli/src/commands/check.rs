use crate::cli::{OutputFormat, ScriptArgs};
use crate::output::{print_diagnostics, print_success};
use anyhow::{Result, bail};
use pyscript_engine::ScriptEngine;

use super::read_source;

pub fn check(engine: &ScriptEngine, args: &ScriptArgs, format: OutputFormat) -> Result<()> {
    let source = read_source(args)?;
    let diagnostics = engine.validate(&source);
    if diagnostics.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Text => print_success("no issues found"),
        }
        return Ok(());
    }
    print_diagnostics(&diagnostics, format)?;
    bail!("{} issue(s) found", diagnostics.len())
}
