use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    process,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use crate::{
    diagnostics::{EvalError, Location},
    environment::{EnvRef, Environment},
    output::OutputSink,
    value::{CallNode, Chan, Closure, Node},
};

pub type EvalResult = Result<Node, EvalError>;

/// State shared by every evaluator working on the same program.
///
/// Owned explicitly and handed to each `Evaluator` rather than kept in
/// process-wide statics.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    next_channel_id: AtomicU64,
    next_thread_id: AtomicU64,
}

impl RuntimeContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ids only label channels for display.
    pub fn new_channel(&self) -> Chan {
        Chan::new(self.next_channel_id.fetch_add(1, Ordering::Relaxed))
    }

    fn next_thread_name(&self) -> String {
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        format!("piquant-go-{id}")
    }
}

/// Evaluates nodes against environments.
///
/// Holds no per-call state, so one evaluator can be cloned into any number
/// of concurrently running threads.
#[derive(Clone)]
pub struct Evaluator {
    context: Arc<RuntimeContext>,
    output: OutputSink,
}

impl Evaluator {
    pub fn new(output: OutputSink) -> Self {
        Self::with_context(RuntimeContext::new(), output)
    }

    pub fn with_context(context: Arc<RuntimeContext>, output: OutputSink) -> Self {
        Self { context, output }
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    pub fn evaluate(&self, env: &EnvRef, node: &Node) -> EvalResult {
        match node {
            Node::Symbol(sym) => env.resolve(&sym.name, sym.location.as_ref()),
            Node::Call(call) => self.evaluate_call(env, call),
            Node::Literal(_)
            | Node::Env(_)
            | Node::Primitive(_)
            | Node::Function(_)
            | Node::Macro(_)
            | Node::Chan(_) => Ok(node.clone()),
        }
    }

    fn evaluate_call(&self, env: &EnvRef, call: &CallNode) -> EvalResult {
        let Some((head, args)) = call.items.split_first() else {
            return Err(EvalError::new("cannot evaluate an empty call form")
                .with_location(call.location.as_ref()));
        };
        let callee = self.evaluate(env, head)?;
        self.apply(env, call, &callee, args)
            .map_err(|err| err.with_location(call.location.as_ref()))
    }

    /// Applies an already evaluated head to the raw argument nodes of `call`.
    pub fn apply(&self, env: &EnvRef, call: &CallNode, callee: &Node, args: &[Node]) -> EvalResult {
        match callee {
            Node::Primitive(prim) => {
                prim.check_arity(args.len())?;
                tracing::trace!(primitive = prim.name, args = args.len(), "apply");
                (prim.procedure)(self, env, call, args)
            }
            Node::Function(fun) => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(env, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_function(fun, values, call.location.as_ref())
            }
            Node::Macro(mac) => {
                let expansion = self.expand(mac, args, call.location.as_ref())?;
                self.evaluate(env, &expansion)
            }
            other => Err(EvalError::new(format!(
                "`{other}` is not callable: expected a primitive, function or macro but found {}",
                other.type_name()
            ))),
        }
    }

    /// Calls a function with already evaluated arguments.
    #[tracing::instrument(level = "trace", skip_all, fields(function = fun.name()))]
    pub fn call_function(&self, fun: &Closure, args: Vec<Node>, location: Option<&Location>) -> EvalResult {
        let scope = bind(fun, "function", args, location)?;
        self.evaluate_body(&scope, &fun.body)
    }

    /// Runs a macro body over the unevaluated argument nodes and returns the
    /// expansion. The caller evaluates the expansion in its own scope.
    #[tracing::instrument(level = "trace", skip_all, fields(macro_name = mac.name()))]
    pub fn expand(&self, mac: &Closure, args: &[Node], location: Option<&Location>) -> EvalResult {
        let scope = bind(mac, "macro", args.to_vec(), location)?;
        self.evaluate_body(&scope, &mac.body)
    }

    /// Evaluates forms in order; the last value is the result, `nil` if empty.
    pub fn evaluate_body(&self, env: &EnvRef, body: &[Node]) -> EvalResult {
        let mut result = Node::nil();
        for form in body {
            result = self.evaluate(env, form)?;
        }
        Ok(result)
    }

    /// Evaluates `form` on a new detached thread against `env`.
    pub fn spawn(&self, env: EnvRef, form: Node) -> Result<(), EvalError> {
        let evaluator = self.clone();
        let name = self.context.next_thread_name();
        tracing::debug!(thread = %name, form = %form, "spawning evaluation");
        thread::Builder::new()
            .name(name)
            .spawn(move || evaluator.run_detached(&env, &form))
            .map(|_| ())
            .map_err(|err| EvalError::new(format!("failed to spawn evaluation thread: {err}")))
    }

    fn run_detached(&self, env: &EnvRef, form: &Node) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(env, form))) {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "spawned evaluation failed");
                self.output.write_line(&err.to_string()).ok();
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                tracing::error!(%detail, "host environment error in spawned evaluation");
                self.output
                    .write_line(&format!("Host environment error: {detail}"))
                    .ok();
                process::abort();
            }
        }
    }
}

/// Binds `args` positionally in a fresh child of the closure's defining
/// scope. The caller's scope never appears in the chain.
fn bind(
    closure: &Closure,
    kind: &str,
    args: Vec<Node>,
    location: Option<&Location>,
) -> Result<EnvRef, EvalError> {
    if args.len() != closure.params.len() {
        return Err(EvalError::new(format!(
            "{kind} `{}` expected {} arguments but received {}",
            closure.name(),
            closure.params.len(),
            args.len()
        ))
        .with_location(location));
    }
    let scope = Environment::with_parent(closure.name(), Arc::clone(&closure.env));
    for (name, value) in closure.params.iter().zip(args) {
        scope.define(name.clone(), value);
    }
    Ok(scope)
}

pub(crate) fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
