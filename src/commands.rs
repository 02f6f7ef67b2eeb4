//! Command execution.

use crate::Commands;
use colored::Colorize;
use parking_lot::Mutex;
use placeflow_core::{
    Definition, InMemoryMarkingStore, Marking, TransitionBlockerList,
    TransitionOptions, WorkflowConfig, WorkflowKind,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl { .. } => unreachable!(),

        Commands::Validate {
            file,
            kind,
            single_place,
        } => validate(&file, kind.map(Into::into), single_place),

        Commands::Inspect { file } => inspect(&file),

        Commands::Run {
            file,
            context,
            trace,
            subject,
            transitions,
        } => run(&file, context.as_deref(), trace, subject, &transitions),
    }
}

fn validate(
    file: &Path,
    kind: Option<WorkflowKind>,
    single_place: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut config = WorkflowConfig::from_file(file)?;
    if let Some(kind) = kind {
        config.kind = kind;
    }
    config.single_place |= single_place;

    let definition = config.validate()?;

    Ok(format!(
        "{} {} {}\n  Places: {}\n  Transitions: {}\n  Initial: {}\n  Checksum: {}",
        "Valid".green(),
        config.kind,
        config.name.cyan(),
        definition.places().len(),
        definition.transitions().len(),
        format_places(definition.initial_places().iter().map(String::as_str)),
        definition.checksum()
    ))
}

fn inspect(file: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let config = WorkflowConfig::from_file(file)?;
    let definition = config.definition()?;
    let metadata = definition.metadata_store();
    tracing::debug!("inspecting {} ({})", config.name, definition.checksum());

    let mut output = format!(
        "{}\n",
        format!("{} {}", config.kind, config.name.cyan()).bold()
    );

    output.push_str(&format!("{}\n", "Places:".bold()));
    for place in definition.places() {
        let marker = if definition.initial_places().contains(place) {
            "*".yellow().to_string()
        } else {
            " ".to_string()
        };
        output.push_str(&format!("  {} {}", marker, place));
        let bag = metadata.place_metadata(place);
        if !bag.is_empty() {
            output.push_str(&format!(" {}", Value::Object(bag.clone()).to_string().dimmed()));
        }
        output.push('\n');
    }

    output.push_str(&format!("{}\n", "Transitions:".bold()));
    for t in definition.transitions() {
        output.push_str(&format!(
            "  {}: {} → {}",
            t.name().cyan(),
            t.froms().join(", "),
            t.tos().join(", ")
        ));
        let bag = metadata.transition_metadata(t);
        if !bag.is_empty() {
            output.push_str(&format!(" {}", Value::Object(bag.clone()).to_string().dimmed()));
        }
        output.push('\n');
    }

    let workflow_metadata = metadata.workflow_metadata();
    if !workflow_metadata.is_empty() {
        output.push_str(&format!(
            "{}\n{}\n",
            "Metadata:".bold(),
            format_json(&Value::Object(workflow_metadata.clone()))
        ));
    }

    Ok(output.trim_end().to_string())
}

fn run(
    file: &Path,
    context: Option<&str>,
    trace: bool,
    mut subject: String,
    transitions: &[String],
) -> Result<String, Box<dyn std::error::Error>> {
    let config = WorkflowConfig::from_file(file)?;
    let workflow = config.into_workflow::<String>(Arc::new(InMemoryMarkingStore::new()))?;

    let mut options = TransitionOptions::new();
    if let Some(context) = context {
        options = options.with_context(parse_json_arg(context)?);
    }

    let fired = Arc::new(Mutex::new(Vec::new()));
    if trace {
        let log = Arc::clone(&fired);
        workflow
            .dispatcher()
            .tap(move |channel| log.lock().push(channel.to_string()));
    }

    let mut output = String::new();
    let marking = workflow.get_marking_with(&mut subject, &options)?;
    output.push_str(&format!("{} {}\n", "Initial".bold(), format_marking(&marking)));
    drain_trace(&fired, &mut output);

    for name in transitions {
        let marking = workflow.apply_with(&mut subject, name, &options)?;
        output.push_str(&format!("{} → {}\n", name.cyan(), format_marking(&marking)));
        drain_trace(&fired, &mut output);
    }

    if let Some(context) = workflow.get_marking(&mut subject)?.context() {
        output.push_str(&format!("{} {}", "Context".bold(), context));
    }

    Ok(output.trim_end().to_string())
}

fn drain_trace(fired: &Mutex<Vec<String>>, output: &mut String) {
    for channel in fired.lock().drain(..) {
        output.push_str(&format!("    {}\n", channel.dimmed()));
    }
}

/// Formats active places as `[a, b]`.
pub(crate) fn format_marking(marking: &Marking) -> String {
    format_places(marking.places())
}

fn format_places<'a>(places: impl Iterator<Item = &'a str>) -> String {
    format!("[{}]", places.collect::<Vec<_>>().join(", ").yellow())
}

/// Formats a blocker list, one blocker per line.
pub(crate) fn format_blockers(blockers: &TransitionBlockerList) -> String {
    if blockers.is_empty() {
        return "enabled".green().to_string();
    }
    blockers
        .iter()
        .map(|b| format!("  {} [{}]", b.message(), b.code().to_string().dimmed()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats the initial places of a definition.
pub(crate) fn describe_initial(definition: &Definition) -> String {
    format_places(definition.initial_places().iter().map(String::as_str))
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub(crate) fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats JSON for display.
pub(crate) fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
