use std::{fmt, sync::Arc};

use crossbeam::channel::{self, Receiver, Sender};

use crate::{
    diagnostics::{EvalError, Location},
    environment::EnvRef,
    runtime::{EvalResult, Evaluator},
};

/// Every evaluable or printable unit of the language.
///
/// The first three variants are syntax produced by the parser. The rest are
/// live objects created during evaluation; they are never comparable.
#[derive(Clone)]
pub enum Node {
    Literal(LiteralNode),
    Symbol(SymbolNode),
    Call(CallNode),
    Env(EnvNode),
    Primitive(Arc<Primitive>),
    Function(Arc<Closure>),
    Macro(Arc<Closure>),
    Chan(Arc<Chan>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct LiteralNode {
    pub value: Literal,
    pub location: Option<Location>,
}

#[derive(Debug, Clone)]
pub struct SymbolNode {
    pub name: String,
    pub location: Option<Location>,
}

#[derive(Clone)]
pub struct CallNode {
    pub items: Arc<[Node]>,
    pub location: Option<Location>,
}

/// An environment wrapped as a first-class value.
#[derive(Clone)]
pub struct EnvNode {
    pub env: EnvRef,
}

impl EnvNode {
    pub fn name(&self) -> &str {
        self.env.name()
    }
}

/// A native procedure. It receives its arguments unevaluated and decides
/// for itself whether and how to evaluate them.
pub type Procedure = fn(&Evaluator, &EnvRef, &CallNode, &[Node]) -> EvalResult;

pub struct Primitive {
    pub name: &'static str,
    pub min_arity: usize,
    /// `None` means unbounded.
    pub max_arity: Option<usize>,
    pub procedure: Procedure,
}

impl Primitive {
    pub fn new(
        name: &'static str,
        min_arity: usize,
        max_arity: Option<usize>,
        procedure: Procedure,
    ) -> Self {
        Self {
            name,
            min_arity,
            max_arity,
            procedure,
        }
    }

    pub fn check_arity(&self, count: usize) -> Result<(), EvalError> {
        let too_few = count < self.min_arity;
        let too_many = self.max_arity.is_some_and(|max| count > max);
        if !too_few && !too_many {
            return Ok(());
        }
        let expected = match self.max_arity {
            Some(max) if max == self.min_arity => format!("{max}"),
            Some(max) => format!("between {} and {max}", self.min_arity),
            None => format!("at least {}", self.min_arity),
        };
        Err(EvalError::new(format!(
            "primitive `{}` expected {expected} arguments but received {count}",
            self.name
        )))
    }
}

/// The shared shape of functions and macros: both capture their defining
/// environment by reference. They differ only in how they are applied.
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Node>,
    pub env: EnvRef,
}

impl Closure {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    /// A copy carrying `name`, sharing the same captured environment.
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            params: self.params.clone(),
            body: self.body.clone(),
            env: Arc::clone(&self.env),
        }
    }
}

/// An unbuffered rendezvous point carrying one node per hand-off.
pub struct Chan {
    id: u64,
    sender: Sender<Node>,
    receiver: Receiver<Node>,
}

impl Chan {
    pub(crate) fn new(id: u64) -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            id,
            sender,
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until a receiver takes the value.
    pub fn send(&self, value: Node) -> Result<(), EvalError> {
        self.sender
            .send(value)
            .map_err(|_| EvalError::new(format!("{self} is disconnected")))
    }

    /// Blocks until a sender hands over a value.
    pub fn receive(&self) -> EvalResult {
        self.receiver
            .recv()
            .map_err(|_| EvalError::new(format!("{self} is disconnected")))
    }
}

impl fmt::Display for Chan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#chan<{}>", self.id)
    }
}

impl Node {
    pub fn nil() -> Self {
        Self::literal(Literal::Nil)
    }

    pub fn bool(value: bool) -> Self {
        Self::literal(Literal::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::literal(Literal::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::Str(value.into()))
    }

    pub fn literal(value: Literal) -> Self {
        Self::Literal(LiteralNode {
            value,
            location: None,
        })
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(SymbolNode {
            name: name.into(),
            location: None,
        })
    }

    pub fn list(items: Vec<Node>) -> Self {
        Self::Call(CallNode {
            items: items.into(),
            location: None,
        })
    }

    pub fn environment(env: EnvRef) -> Self {
        Self::Env(EnvNode { env })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Literal(lit) => match lit.value {
                Literal::Nil => "nil",
                Literal::Bool(_) => "bool",
                Literal::Int(_) => "int",
                Literal::Float(_) => "float",
                Literal::Str(_) => "string",
            },
            Node::Symbol(_) => "symbol",
            Node::Call(_) => "call",
            Node::Env(_) => "environment",
            Node::Primitive(_) => "primitive",
            Node::Function(_) => "function",
            Node::Macro(_) => "macro",
            Node::Chan(_) => "chan",
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Node::Literal(lit) => lit.location.as_ref(),
            Node::Symbol(sym) => sym.location.as_ref(),
            Node::Call(call) => call.location.as_ref(),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Node::Literal(LiteralNode { value: Literal::Nil, .. }))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(
            self,
            Node::Literal(LiteralNode {
                value: Literal::Nil | Literal::Bool(false),
                ..
            })
        )
    }

    /// Live objects carry identity, not value, and refuse comparison.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Node::Env(_) | Node::Primitive(_) | Node::Function(_) | Node::Macro(_) | Node::Chan(_)
        )
    }

    pub fn as_symbol(&self) -> Option<&SymbolNode> {
        match self {
            Node::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// Structural equality over syntax and literals.
    ///
    /// Comparing any live object is an error naming both operands, never
    /// `false`. Integers and floats compare numerically.
    pub fn equals(&self, other: &Node) -> Result<bool, EvalError> {
        let live = if self.is_live() {
            Some(self)
        } else if other.is_live() {
            Some(other)
        } else {
            None
        };
        if let Some(live) = live {
            let what = match live {
                Node::Env(_) => "environments",
                Node::Primitive(_) => "primitive procedures",
                Node::Function(_) => "functions",
                Node::Macro(_) => "macros",
                _ => "chans",
            };
            return Err(EvalError::new(format!(
                "Cannot compare the values of {what}: {self} and {other}"
            ))
            .with_location(other.location().or(self.location())));
        }

        match (self, other) {
            (Node::Literal(a), Node::Literal(b)) => Ok(match (&a.value, &b.value) {
                (Literal::Int(x), Literal::Float(y)) | (Literal::Float(y), Literal::Int(x)) => {
                    (*x as f64) == *y
                }
                (x, y) => x == y,
            }),
            (Node::Symbol(a), Node::Symbol(b)) => Ok(a.name == b.name),
            (Node::Call(a), Node::Call(b)) => {
                if a.items.len() != b.items.len() {
                    return Ok(false);
                }
                for (left, right) in a.items.iter().zip(b.items.iter()) {
                    if !left.equals(right)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Textual form used by `print`: strings without quotes.
    pub fn display_raw(&self) -> String {
        match self {
            Node::Literal(LiteralNode {
                value: Literal::Str(s),
                ..
            }) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nil => write!(f, "nil"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n:?}"),
            Literal::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(lit) => write!(f, "{}", lit.value),
            Node::Symbol(sym) => write!(f, "{}", sym.name),
            Node::Call(call) => {
                write!(f, "(")?;
                for (idx, item) in call.items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Node::Env(env) => write!(f, "#environment<{}>", env.name()),
            Node::Primitive(prim) => write!(f, "#primitive<{}>", prim.name),
            Node::Function(fun) => write!(f, "#function<{}>", fun.name()),
            Node::Macro(mac) => write!(f, "#macro<{}>", mac.name()),
            Node::Chan(chan) => write!(f, "{chan}"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(_) | Node::Symbol(_) | Node::Call(_) => {
                write!(f, "{}({self})", self.type_name())
            }
            _ => write!(f, "{self}"),
        }
    }
}
