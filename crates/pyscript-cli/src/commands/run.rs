use crate::cli::{OutputFormat, RunArgs};
use crate::output::print_value;
use anyhow::Result;
use pyscript_engine::contexts::{
    ExplanationHolder, FieldContext, IngestContext, ScoreContext, SearchContext, TemplateContext,
};
use pyscript_engine::{ScriptContext, ScriptEngine, ScriptException};
use serde_json::{Value, json};
use std::time::Duration;

use super::{parse_object, read_source};

pub async fn run(engine: &ScriptEngine, args: &RunArgs, format: OutputFormat) -> Result<()> {
    let source = read_source(&args.script)?;
    if let Some(ms) = args.timeout_ms {
        engine.set_time_budget(Duration::from_millis(ms));
    }
    let params = parse_object(args.params.as_deref(), "params")?;
    let doc = parse_object(args.doc.as_deref(), "doc")?;

    let result = match args.context.as_str() {
        name if name == FieldContext::NAME => engine
            .compile::<FieldContext>(&source)?
            .new_instance(params, &doc)
            .execute()
            .await?
            .to_json(),
        name if name == ScoreContext::NAME => {
            let mut explanation = ExplanationHolder::default();
            let score = engine
                .compile::<ScoreContext>(&source)?
                .new_instance(params, &doc)
                .execute(args.score, Some(&mut explanation))
                .await?;
            json!({ "score": score, "explanation": explanation.get() })
        }
        name if name == TemplateContext::NAME => Value::String(
            engine
                .compile::<TemplateContext>(&source)?
                .new_instance(params)
                .execute()
                .await?,
        ),
        name if name == IngestContext::NAME => {
            let mut ctx = parse_object(args.ctx.as_deref(), "ctx")?;
            engine
                .compile::<IngestContext>(&source)?
                .new_instance(params)
                .execute(&mut ctx)
                .await?;
            Value::Object(ctx)
        }
        name if name == SearchContext::NAME => {
            let mut ctx = parse_object(args.ctx.as_deref(), "ctx")?;
            engine
                .compile::<SearchContext>(&source)?
                .new_instance(params)
                .execute(&mut ctx)
                .await?;
            Value::Object(ctx)
        }
        other => return Err(ScriptException::unsupported_context(other, source).into()),
    };

    print_value(&result, format)
}
