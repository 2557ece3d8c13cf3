use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{PiquantError, Result},
    driver::Interpreter,
    value::Node,
};

const INSPECT_PREFIX: &str = ":inspect ";

pub struct Repl {
    interpreter: Interpreter,
}

impl Repl {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(|err| {
            PiquantError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
        })?;
        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    if let Some(source) = trimmed.strip_prefix(INSPECT_PREFIX) {
                        self.inspect_source(source);
                    } else {
                        self.interpreter.eval_print(trimmed, "REPL", true);
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!("Quitting...");
                    break;
                }
                Err(err) => {
                    return Err(PiquantError::from(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        err,
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluates `source` and writes the inspection of its value, or the
    /// error, to the interpreter's output sink.
    pub fn inspect_source(&self, source: &str) {
        let text = match self.interpreter.eval_source(source, "REPL") {
            Ok(Some(value)) => inspect(&value),
            Ok(None) => return,
            Err(err) => err.to_string(),
        };
        self.interpreter
            .evaluator()
            .output()
            .write_line(&text)
            .ok();
    }
}

/// Structural detail for values that have any; only environments do so far.
pub fn inspect(value: &Node) -> String {
    match value {
        Node::Env(scope) => format!(
            "Environment\n  Name='{}'\n  Env={}",
            scope.name(),
            scope.env
        ),
        other => format!("Don't know how to inspect: {other}"),
    }
}
