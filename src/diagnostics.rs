use std::{fmt, sync::Arc};

use thiserror::Error;

/// A source position: the label the text was submitted under plus a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<Arc<str>>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A language-level failure raised while evaluating a node.
///
/// These are ordinary values: they propagate outward through nested
/// evaluation with `?` until the driver reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
    pub location: Option<Location>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<&Location>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for EvalError {}

/// A single syntax problem found by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(
                f,
                "Parsing error ({}: {}): {}",
                location.file, location.line, self.message
            ),
            None => write!(f, "Parsing error: {}", self.message),
        }
    }
}

impl std::error::Error for ParserError {}

/// Syntax errors in detection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserErrorList(Vec<ParserError>);

impl ParserErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.0.push(ParserError {
            location,
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParserError> {
        self.0.iter()
    }
}

impl fmt::Display for ParserErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParserErrorList {}

/// Unified error type for the Piquant toolchain.
#[derive(Debug, Error)]
pub enum PiquantError {
    #[error("{0}")]
    Eval(#[from] EvalError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PiquantError>;
