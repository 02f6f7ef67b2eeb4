//! Interactive REPL.

use crate::commands::{describe_initial, format_blockers, format_json, format_marking, parse_json_arg};
use crate::config::Config;
use colored::Colorize;
use parking_lot::RwLock;
use placeflow_core::{
    CoreError, InMemoryMarkingStore, Scope, TransitionOptions, Workflow, WorkflowConfig,
};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as EditorConfig, Editor};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help

  marking                       Show the active places
  enabled                       List enabled transitions
  can <transition>              Check whether a transition is enabled
  why <transition>              Show what blocks a transition
  apply <transition> [context]  Fire a transition (context is JSON or @file.json)

  block <transition> [message]  Block a transition with a guard
  unblock <transition>          Remove the guard on a transition
  reset                         Put the subject back in the initial places

  quit, exit                    Exit the REPL
"#;

/// One subject moving through one workflow.
pub struct Session {
    workflow: Workflow<String>,
    store: Arc<InMemoryMarkingStore>,
    subject: String,
    blocked: Arc<RwLock<BTreeMap<String, String>>>,
}

impl Session {
    pub fn new(config: WorkflowConfig, subject: impl Into<String>) -> Result<Self, CoreError> {
        let store = Arc::new(InMemoryMarkingStore::new());
        let workflow = config.into_workflow::<String>(store.clone())?;

        let blocked: Arc<RwLock<BTreeMap<String, String>>> = Arc::new(RwLock::new(BTreeMap::new()));
        let guard_blocked = Arc::clone(&blocked);
        workflow
            .dispatcher()
            .on_guard(Scope::workflow(workflow.name()), move |e| {
                if let Some(message) = guard_blocked.read().get(e.transition().name()) {
                    e.set_blocked(true, Some(message.as_str()));
                }
            });

        Ok(Self {
            workflow,
            store,
            subject: subject.into(),
            blocked,
        })
    }

    pub fn workflow(&self) -> &Workflow<String> {
        &self.workflow
    }

    /// Executes one command line. Returns `None` when the session should end.
    pub fn execute(&mut self, line: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(Some(String::new()));
        }

        let cmd = parts[0].to_lowercase();
        let args = &parts[1..];

        match cmd.as_str() {
            "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

            "quit" | "exit" | "q" => Ok(None),

            "marking" | "m" => {
                let marking = self.workflow.get_marking(&mut self.subject)?;
                let mut output = format!("{} {}", self.subject.cyan(), format_marking(&marking));
                if let Some(context) = marking.context() {
                    output.push_str(&format!("\n  Context: {}", format_json(context)));
                }
                Ok(Some(output))
            }

            "enabled" | "e" => {
                let enabled = self.workflow.enabled_transitions(&mut self.subject)?;
                if enabled.is_empty() {
                    return Ok(Some("No enabled transitions".yellow().to_string()));
                }
                let mut output = String::new();
                for t in enabled {
                    output.push_str(&format!(
                        "  {}: {} → {}\n",
                        t.name().cyan(),
                        t.froms().join(", "),
                        t.tos().join(", ")
                    ));
                }
                Ok(Some(output.trim_end().to_string()))
            }

            "can" => {
                let Some(name) = args.first() else {
                    return Ok(Some("Usage: can <transition>".to_string()));
                };
                let can = self.workflow.can(&mut self.subject, name)?;
                Ok(Some(if can {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                }))
            }

            "why" | "w" => {
                let Some(name) = args.first() else {
                    return Ok(Some("Usage: why <transition>".to_string()));
                };
                let blockers = self
                    .workflow
                    .build_transition_blocker_list(&mut self.subject, name)?;
                Ok(Some(format_blockers(&blockers)))
            }

            "apply" | "a" => {
                let Some(name) = args.first() else {
                    return Ok(Some("Usage: apply <transition> [context_json]".to_string()));
                };
                let mut options = TransitionOptions::new();
                if args.len() > 1 {
                    options = options.with_context(parse_json_arg(&args[1..].join(" "))?);
                }

                let before = self.workflow.get_marking(&mut self.subject)?;
                match self.workflow.apply_with(&mut self.subject, name, &options) {
                    Ok(after) => Ok(Some(format!(
                        "{} {} → {}",
                        name.cyan(),
                        format_marking(&before),
                        format_marking(&after)
                    ))),
                    Err(CoreError::NotEnabledTransition { blockers, .. }) => Ok(Some(format!(
                        "{} {} is not enabled\n{}",
                        "Blocked".red(),
                        name.cyan(),
                        format_blockers(&blockers)
                    ))),
                    Err(e) => Err(e.into()),
                }
            }

            "block" | "b" => {
                let Some(name) = args.first() else {
                    return Ok(Some("Usage: block <transition> [message]".to_string()));
                };
                if self.workflow.definition().transitions_named(name).next().is_none() {
                    return Ok(Some(format!("Unknown transition: {}", name)));
                }
                let message = if args.len() > 1 {
                    args[1..].join(" ")
                } else {
                    "blocked from the REPL".to_string()
                };
                self.blocked.write().insert(name.to_string(), message);
                Ok(Some(format!("{} {}", "Blocked".yellow(), name.cyan())))
            }

            "unblock" | "u" => {
                let Some(name) = args.first() else {
                    return Ok(Some("Usage: unblock <transition>".to_string()));
                };
                if self.blocked.write().remove(*name).is_some() {
                    Ok(Some(format!("{} {}", "Unblocked".green(), name.cyan())))
                } else {
                    Ok(Some(format!("{} is not blocked", name)))
                }
            }

            "reset" => {
                self.store.forget(&self.subject);
                let marking = self.workflow.get_marking(&mut self.subject)?;
                Ok(Some(format!(
                    "{} {}",
                    "Reset".green(),
                    format_marking(&marking)
                )))
            }

            _ => Ok(Some(format!(
                "Unknown command: {}. Type 'help' for help.",
                cmd
            ))),
        }
    }
}

pub fn run(file: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let workflow_config = WorkflowConfig::from_file(file)?;
    let mut session = Session::new(workflow_config, config.repl.subject.clone())?;

    println!("{}", "placeflow REPL".bold().cyan());
    println!(
        "Loaded {} {} (initial: {})",
        session.workflow().kind(),
        session.workflow().name().cyan(),
        describe_initial(session.workflow().definition())
    );

    // Create readline editor
    let editor_config = EditorConfig::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .max_history_size(config.repl.history_size)?
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(editor_config)?;

    let history_path = config.repl.history_path();
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", format!("{}>", session.workflow().name()).cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match session.execute(line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_path) {
        tracing::warn!("failed to save history to {}: {}", history_path.display(), e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let config = WorkflowConfig::from_yaml_str(
            r#"
name: order
places: [new, paid, shipped, cancelled]
transitions:
  - {name: pay, from: new, to: paid}
  - {name: ship, from: paid, to: shipped}
  - {name: cancel, from: new, to: cancelled}
"#,
        )
        .unwrap();
        Session::new(config, "o-1").unwrap()
    }

    fn run(session: &mut Session, line: &str) -> String {
        session.execute(line).unwrap().unwrap()
    }

    #[test]
    fn test_marking_and_apply() {
        let mut session = session();
        assert!(run(&mut session, "marking").contains("new"));

        let output = run(&mut session, "apply pay {\"by\": \"repl\"}");
        assert!(output.contains("paid"));

        let output = run(&mut session, "marking");
        assert!(output.contains("repl"));
    }

    #[test]
    fn test_block_and_unblock() {
        let mut session = session();

        run(&mut session, "block pay out of stock");
        assert!(run(&mut session, "why pay").contains("out of stock"));
        assert!(run(&mut session, "apply pay").contains("not enabled"));

        let enabled = run(&mut session, "enabled");
        assert!(enabled.contains("cancel"));
        assert!(!enabled.contains("pay"));

        run(&mut session, "unblock pay");
        assert!(run(&mut session, "why pay").contains("enabled"));
        assert!(run(&mut session, "apply pay").contains("paid"));
    }

    #[test]
    fn test_block_unknown_transition() {
        let mut session = session();
        assert!(run(&mut session, "block teleport").contains("Unknown transition"));
        assert!(run(&mut session, "unblock pay").contains("not blocked"));
    }

    #[test]
    fn test_reset_returns_to_initial_places() {
        let mut session = session();
        run(&mut session, "apply pay");
        run(&mut session, "apply ship");
        assert!(run(&mut session, "marking").contains("shipped"));

        let output = run(&mut session, "reset");
        assert!(output.contains("new"));
        assert!(!run(&mut session, "marking").contains("shipped"));
    }

    #[test]
    fn test_unknown_transition_is_an_error() {
        let mut session = session();
        assert!(session.execute("apply teleport").is_err());
        assert!(session.execute("why teleport").is_err());
    }

    #[test]
    fn test_quit_and_help() {
        let mut session = session();
        assert!(session.execute("quit").unwrap().is_none());
        assert!(run(&mut session, "help").contains("Available commands"));
        assert!(run(&mut session, "frobnicate").contains("Unknown command"));
        assert_eq!(run(&mut session, "can"), "Usage: can <transition>");
    }
}
