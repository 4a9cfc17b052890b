pub mod check;
pub mod run;

use crate::cli::ScriptArgs;
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::fs;

/// Inline code, or the contents of `--file`
pub fn read_source(args: &ScriptArgs) -> Result<String> {
    match (&args.code, &args.file) {
        (Some(code), _) => Ok(code.clone()),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        (None, None) => bail!("no script given: pass inline code or --file"),
    }
}

/// Parse an optional JSON object argument; absent means empty
pub fn parse_object(raw: Option<&str>, name: &str) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).with_context(|| format!("--{name} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        other => bail!("--{name} must be a JSON object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_object() {
        assert!(parse_object(None, "params").unwrap().is_empty());
        let map = parse_object(Some(r#"{"name": "world"}"#), "params").unwrap();
        assert_eq!(map.get("name"), Some(&Value::from("world")));

        let err = parse_object(Some("[1]"), "doc").unwrap_err();
        assert!(err.to_string().contains("--doc must be a JSON object"));
        assert!(parse_object(Some("{"), "ctx").is_err());
    }

    #[test]
    fn test_read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.py");
        fs::write(&path, "x = 1\nx").unwrap();

        let args = ScriptArgs {
            code: None,
            file: Some(path),
        };
        assert_eq!(read_source(&args).unwrap(), "x = 1\nx");

        let args = ScriptArgs {
            code: None,
            file: Some(PathBuf::from("/nonexistent/script.py")),
        };
        assert!(read_source(&args).is_err());
    }
}
