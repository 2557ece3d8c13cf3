use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    diagnostics::{EvalError, Location},
    value::Node,
};

pub type EnvRef = Arc<Environment>;

/// A mutable symbol table with a link to its lexically enclosing scope.
///
/// Scopes are shared by reference between closures and every thread
/// running inside them. Each read or write takes the lock only for that
/// single operation, so concurrent writers race and the last write wins.
pub struct Environment {
    name: String,
    parent: Option<EnvRef>,
    bindings: RwLock<IndexMap<String, Node>>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> EnvRef {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            bindings: RwLock::new(IndexMap::new()),
        })
    }

    pub fn with_parent(name: impl Into<String>, parent: EnvRef) -> EnvRef {
        Arc::new(Self {
            name: name.into(),
            parent: Some(parent),
            bindings: RwLock::new(IndexMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    /// Inserts or overwrites a binding in this scope only.
    pub fn define(&self, name: impl Into<String>, value: Node) {
        self.bindings.write().insert(name.into(), value);
    }

    /// Walks the parent chain outward and returns the innermost binding.
    pub fn lookup(&self, name: &str) -> Option<Node> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.bindings.read().get(name) {
                return Some(value.clone());
            }
            scope = env.parent.as_deref();
        }
        None
    }

    pub fn resolve(&self, name: &str, location: Option<&Location>) -> Result<Node, EvalError> {
        self.lookup(name).ok_or_else(|| {
            EvalError::new(format!(
                "unbound symbol `{name}` in environment `{}`",
                self.name
            ))
            .with_location(location)
        })
    }

    /// Rebinds `name` in the nearest scope that already holds it.
    pub fn update(&self, name: &str, value: Node, location: Option<&Location>) -> Result<(), EvalError> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            let mut bindings = env.bindings.write();
            if let Some(slot) = bindings.get_mut(name) {
                *slot = value;
                return Ok(());
            }
            drop(bindings);
            scope = env.parent.as_deref();
        }
        Err(EvalError::new(format!(
            "cannot update unbound symbol `{name}` in environment `{}`",
            self.name
        ))
        .with_location(location))
    }

    /// Names bound directly in this scope, in definition order.
    pub fn symbols(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (idx, name) in self.symbols().iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}")?;
        if let Some(parent) = &self.parent {
            write!(f, " -> {}", parent.name)?;
        }
        Ok(())
    }
}
