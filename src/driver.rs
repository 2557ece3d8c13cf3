use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use crate::{
    diagnostics::{EvalError, Result},
    environment::EnvRef,
    output::OutputSink,
    parser,
    runtime::{panic_detail, Evaluator},
    stdlib,
    value::Node,
};

const PRELUDE: &str = include_str!("prelude.pq");

/// Parses `source` and evaluates every parsed top-level form in order.
///
/// Parse errors are reported to the output sink but do not stop the
/// successfully parsed forms from running. Evaluation stops at the first
/// error. Returns the last value, or `None` when nothing was evaluated.
///
/// A panic escaping evaluation is an interpreter bug, not a language error:
/// it is logged once here and then resumed.
pub fn parse_eval(
    evaluator: &Evaluator,
    env: &EnvRef,
    source: &str,
    label: &str,
) -> std::result::Result<Option<Node>, EvalError> {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluate_source(evaluator, env, source, label))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let detail = panic_detail(payload.as_ref());
            tracing::error!(source = label, %detail, "host environment error");
            evaluator
                .output()
                .write_line(&format!("Host environment error: {detail}"))
                .ok();
            panic::resume_unwind(payload)
        }
    }
}

fn evaluate_source(
    evaluator: &Evaluator,
    env: &EnvRef,
    source: &str,
    label: &str,
) -> std::result::Result<Option<Node>, EvalError> {
    let (nodes, errors) = parser::parse(source, label);
    tracing::debug!(source = label, forms = nodes.len(), errors = errors.len(), "parsed");
    if !errors.is_empty() {
        tracing::warn!(source = label, count = errors.len(), "syntax errors");
        evaluator.output().write_line(&errors.to_string()).ok();
    }

    let mut result = None;
    for node in &nodes {
        result = Some(evaluator.evaluate(env, node)?);
    }
    Ok(result)
}

/// Like [`parse_eval`], but writes the outcome to the output sink: the
/// error text on failure, or the result when `print_result` is set and the
/// result is not nil.
pub fn parse_eval_print(
    evaluator: &Evaluator,
    env: &EnvRef,
    source: &str,
    label: &str,
    print_result: bool,
) {
    let line = match parse_eval(evaluator, env, source, label) {
        Ok(Some(value)) if print_result && !value.is_nil() => value.to_string(),
        Ok(_) => return,
        Err(err) => err.to_string(),
    };
    evaluator.output().write_line(&line).ok();
}

pub struct Options {
    pub load_prelude: bool,
    pub output: OutputSink,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            load_prelude: true,
            output: OutputSink::stdout(),
        }
    }
}

/// A top-level scope plus the evaluator that runs code in it.
pub struct Interpreter {
    env: EnvRef,
    evaluator: Evaluator,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let interpreter = Self {
            env: stdlib::top_level(),
            evaluator: Evaluator::new(options.output),
        };
        if options.load_prelude {
            interpreter.install_prelude();
        }
        interpreter
    }

    fn install_prelude(&self) {
        if let Err(err) = parse_eval(&self.evaluator, &self.env, PRELUDE, "prelude") {
            tracing::error!(error = %err, "prelude failed to load");
        }
    }

    pub fn env(&self) -> &EnvRef {
        &self.env
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn eval_source(&self, source: &str, label: &str) -> std::result::Result<Option<Node>, EvalError> {
        parse_eval(&self.evaluator, &self.env, source, label)
    }

    pub fn eval_print(&self, source: &str, label: &str, print_result: bool) {
        parse_eval_print(&self.evaluator, &self.env, source, label, print_result);
    }

    /// Reads a file and evaluates it under its path as label, without
    /// printing results.
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)?;
        let label = path.display().to_string();
        tracing::debug!(file = %label, "loading");
        self.eval_print(&source, &label, false);
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
