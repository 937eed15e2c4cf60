//! External commands (trainer, evaluator).
//!
//! Commands are templates: a program plus arguments containing
//! `{name}` placeholders that are substituted just before spawning.
//! Output is inherited so the collaborator's own progress reaches the
//! terminal; only the exit status is inspected.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StageError;

/// A program and its argument templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Executable name or path.
    pub program: String,
    /// Arguments. `{key}` is replaced by the value bound to `key`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// A template from a program and literal argument templates.
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
        }
    }

    /// Arguments with every `{key}` replaced by its value.
    #[must_use]
    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }

    /// The rendered command line, for logs and errors.
    #[must_use]
    pub fn display(&self, vars: &[(&str, &str)]) -> String {
        std::iter::once(self.program.clone())
            .chain(self.render(vars))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command in `cwd` and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Spawn`] if the program cannot be started and
    /// [`StageError::ExitStatus`] if it exits unsuccessfully.
    pub fn run(&self, vars: &[(&str, &str)], cwd: &Path) -> Result<(), StageError> {
        let command_line = self.display(vars);
        info!("running: {command_line}");
        let status = Command::new(&self.program)
            .args(self.render(vars))
            .current_dir(cwd)
            .status()
            .map_err(|source| StageError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(StageError::ExitStatus {
                command: command_line,
                status,
            })
        }
    }
}
