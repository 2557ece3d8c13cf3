use std::{cmp::Ordering, sync::Arc};

use crate::{
    diagnostics::EvalError,
    environment::{EnvRef, Environment},
    runtime::{EvalResult, Evaluator},
    value::{CallNode, Chan, Closure, Literal, LiteralNode, Node, Primitive, Procedure},
};

/// Creates the parentless top-level scope holding every built-in primitive.
pub fn top_level() -> EnvRef {
    let env = Environment::new("top-level");
    install(&env);
    env
}

pub fn install(env: &EnvRef) {
    // Special forms: arguments arrive unevaluated and stay that way unless
    // the form says otherwise.
    define(env, "quote", 1, Some(1), quote);
    define(env, "if", 2, Some(3), if_form);
    define(env, "def", 2, Some(2), def);
    define(env, "update!", 2, Some(2), update);
    define(env, "lambda", 2, None, lambda);
    define(env, "macro", 2, None, macro_form);
    define(env, "do", 0, None, do_form);
    define(env, "let", 1, None, let_form);
    define(env, "eval", 1, Some(2), eval);
    define(env, "go", 1, Some(1), go);

    define(env, "+", 0, None, add);
    define(env, "-", 1, None, sub);
    define(env, "*", 0, None, mul);
    define(env, "/", 1, None, div);
    define(env, "mod", 2, Some(2), modulo);
    define(env, "<", 2, Some(2), less);
    define(env, ">", 2, Some(2), greater);
    define(env, "<=", 2, Some(2), less_equal);
    define(env, ">=", 2, Some(2), greater_equal);
    define(env, "=", 2, Some(2), equal);
    define(env, "not", 1, Some(1), not);

    define(env, "list", 0, None, list);
    define(env, "cons", 2, Some(2), cons);
    define(env, "first", 1, Some(1), first);
    define(env, "rest", 1, Some(1), rest);
    define(env, "empty?", 1, Some(1), is_empty);
    define(env, "type-of", 1, Some(1), type_of);

    define(env, "print", 0, None, print);
    define(env, "println", 0, None, println);
    define(env, "current-environment", 0, Some(0), current_environment);

    define(env, "chan", 0, Some(0), chan);
    define(env, "send", 2, Some(2), send);
    define(env, "receive", 1, Some(1), receive);
}

fn define(
    env: &EnvRef,
    name: &'static str,
    min_arity: usize,
    max_arity: Option<usize>,
    procedure: Procedure,
) {
    let primitive = Primitive::new(name, min_arity, max_arity, procedure);
    env.define(name, Node::Primitive(Arc::new(primitive)));
}

fn evaluate_all(ev: &Evaluator, env: &EnvRef, args: &[Node]) -> Result<Vec<Node>, EvalError> {
    args.iter().map(|arg| ev.evaluate(env, arg)).collect()
}

fn expect_symbol<'a>(node: &'a Node, form: &str) -> Result<&'a str, EvalError> {
    node.as_symbol().map(|sym| sym.name.as_str()).ok_or_else(|| {
        EvalError::new(format!(
            "`{form}` expected a symbol but found {} `{node}`",
            node.type_name()
        ))
        .with_location(node.location())
    })
}

fn expect_list<'a>(node: &'a Node, form: &str) -> Result<&'a CallNode, EvalError> {
    match node {
        Node::Call(call) => Ok(call),
        _ => Err(EvalError::new(format!(
            "`{form}` expected a list but found {} `{node}`",
            node.type_name()
        ))
        .with_location(node.location())),
    }
}

// ----- special forms -----

fn quote(_ev: &Evaluator, _env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(args[0].clone())
}

fn if_form(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    if ev.evaluate(env, &args[0])?.is_truthy() {
        ev.evaluate(env, &args[1])
    } else if let Some(otherwise) = args.get(2) {
        ev.evaluate(env, otherwise)
    } else {
        Ok(Node::nil())
    }
}

fn def(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let name = expect_symbol(&args[0], "def")?;
    let value = name_closure(ev.evaluate(env, &args[1])?, name);
    env.define(name, value.clone());
    Ok(value)
}

fn update(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let name = expect_symbol(&args[0], "update!")?;
    let value = ev.evaluate(env, &args[1])?;
    env.update(name, value.clone(), args[0].location())?;
    Ok(value)
}

/// Anonymous closures take the name they are first bound to.
fn name_closure(value: Node, name: &str) -> Node {
    match &value {
        Node::Function(fun) if fun.name.is_none() => Node::Function(Arc::new(fun.named(name))),
        Node::Macro(mac) if mac.name.is_none() => Node::Macro(Arc::new(mac.named(name))),
        _ => value,
    }
}

fn closure(env: &EnvRef, args: &[Node], form: &str) -> Result<Closure, EvalError> {
    let params = expect_list(&args[0], form)?
        .items
        .iter()
        .map(|param| expect_symbol(param, form).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Closure {
        name: None,
        params,
        body: args[1..].to_vec(),
        env: Arc::clone(env),
    })
}

fn lambda(_ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(Node::Function(Arc::new(closure(env, args, "lambda")?)))
}

fn macro_form(_ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(Node::Macro(Arc::new(closure(env, args, "macro")?)))
}

fn do_form(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    ev.evaluate_body(env, args)
}

/// `(let ((name value) ...) body...)`, bound in order so later bindings
/// see earlier ones.
fn let_form(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let scope = Environment::with_parent("let", Arc::clone(env));
    for binding in expect_list(&args[0], "let")?.items.iter() {
        let pair = expect_list(binding, "let")?;
        let [name, value] = &pair.items[..] else {
            return Err(EvalError::new(format!(
                "`let` binding must be a (name value) pair, found `{binding}`"
            ))
            .with_location(binding.location()));
        };
        let name = expect_symbol(name, "let")?;
        let value = name_closure(ev.evaluate(&scope, value)?, name);
        scope.define(name, value);
    }
    ev.evaluate_body(&scope, &args[1..])
}

fn eval(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let form = ev.evaluate(env, &args[0])?;
    let target = match args.get(1) {
        Some(arg) => match ev.evaluate(env, arg)? {
            Node::Env(scope) => scope.env,
            other => {
                return Err(EvalError::new(format!(
                    "`eval` expected an environment but found {} `{other}`",
                    other.type_name()
                )));
            }
        },
        None => Arc::clone(env),
    };
    ev.evaluate(&target, &form)
}

fn go(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    ev.spawn(Arc::clone(env), args[0].clone())?;
    Ok(Node::nil())
}

// ----- arithmetic -----

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_node(node: &Node, op: &str) -> Result<Self, EvalError> {
        match node {
            Node::Literal(LiteralNode {
                value: Literal::Int(n),
                ..
            }) => Ok(Number::Int(*n)),
            Node::Literal(LiteralNode {
                value: Literal::Float(n),
                ..
            }) => Ok(Number::Float(*n)),
            other => Err(EvalError::new(format!(
                "`{op}` expected a number but found {} `{other}`",
                other.type_name()
            ))),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    fn into_node(self) -> Node {
        match self {
            Number::Int(n) => Node::int(n),
            Number::Float(n) => Node::float(n),
        }
    }
}

fn numbers(ev: &Evaluator, env: &EnvRef, args: &[Node], op: &str) -> Result<Vec<Number>, EvalError> {
    evaluate_all(ev, env, args)?
        .iter()
        .map(|value| Number::from_node(value, op))
        .collect()
}

fn arithmetic(
    op: &str,
    left: Number,
    right: Number,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Number, EvalError> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => checked(a, b)
            .map(Number::Int)
            .ok_or_else(|| EvalError::new(format!("integer overflow in `{op}`"))),
        (a, b) => Ok(Number::Float(float(a.as_f64(), b.as_f64()))),
    }
}

fn fold(
    values: Vec<Number>,
    op: &str,
    identity: Number,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> EvalResult {
    let mut values = values.into_iter();
    let mut acc = if values.len() > 1 {
        values.next().unwrap_or(identity)
    } else {
        identity
    };
    for value in values {
        acc = arithmetic(op, acc, value, checked, float)?;
    }
    Ok(acc.into_node())
}

fn add(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let values = numbers(ev, env, args, "+")?;
    fold(values, "+", Number::Int(0), i64::checked_add, |a, b| a + b)
}

fn sub(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let values = numbers(ev, env, args, "-")?;
    fold(values, "-", Number::Int(0), i64::checked_sub, |a, b| a - b)
}

fn mul(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let values = numbers(ev, env, args, "*")?;
    fold(values, "*", Number::Int(1), i64::checked_mul, |a, b| a * b)
}

fn div(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let values = numbers(ev, env, args, "/")?;
    let divisors = if values.len() == 1 { &values[..] } else { &values[1..] };
    if divisors.iter().any(|n| matches!(n, Number::Int(0))) {
        return Err(EvalError::new("division by zero"));
    }
    fold(values, "/", Number::Int(1), i64::checked_div, |a, b| a / b)
}

fn modulo(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let values = numbers(ev, env, args, "mod")?;
    match (values[0], values[1]) {
        (Number::Int(_), Number::Int(0)) => Err(EvalError::new("division by zero")),
        (left, right) => {
            let result = arithmetic("mod", left, right, i64::checked_rem_euclid, f64::rem_euclid)?;
            Ok(result.into_node())
        }
    }
}

fn compare(
    ev: &Evaluator,
    env: &EnvRef,
    args: &[Node],
    op: &str,
    test: fn(Ordering) -> bool,
) -> EvalResult {
    let values = numbers(ev, env, args, op)?;
    let ordering = match (values[0], values[1]) {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    };
    Ok(Node::bool(ordering.is_some_and(test)))
}

fn less(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    compare(ev, env, args, "<", Ordering::is_lt)
}

fn greater(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    compare(ev, env, args, ">", Ordering::is_gt)
}

fn less_equal(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    compare(ev, env, args, "<=", Ordering::is_le)
}

fn greater_equal(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    compare(ev, env, args, ">=", Ordering::is_ge)
}

fn equal(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let left = ev.evaluate(env, &args[0])?;
    let right = ev.evaluate(env, &args[1])?;
    Ok(Node::bool(left.equals(&right)?))
}

fn not(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(Node::bool(!ev.evaluate(env, &args[0])?.is_truthy()))
}

// ----- lists -----

fn list(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(Node::list(evaluate_all(ev, env, args)?))
}

fn list_items(node: &Node, op: &str) -> Result<Vec<Node>, EvalError> {
    match node {
        Node::Call(call) => Ok(call.items.to_vec()),
        _ if node.is_nil() => Ok(Vec::new()),
        _ => Err(EvalError::new(format!(
            "`{op}` expected a list but found {} `{node}`",
            node.type_name()
        ))),
    }
}

fn cons(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let head = ev.evaluate(env, &args[0])?;
    let mut items = list_items(&ev.evaluate(env, &args[1])?, "cons")?;
    items.insert(0, head);
    Ok(Node::list(items))
}

fn first(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let items = list_items(&ev.evaluate(env, &args[0])?, "first")?;
    Ok(items.into_iter().next().unwrap_or_else(Node::nil))
}

fn rest(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let items = list_items(&ev.evaluate(env, &args[0])?, "rest")?;
    Ok(Node::list(items.into_iter().skip(1).collect()))
}

fn is_empty(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let items = list_items(&ev.evaluate(env, &args[0])?, "empty?")?;
    Ok(Node::bool(items.is_empty()))
}

fn type_of(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    Ok(Node::string(ev.evaluate(env, &args[0])?.type_name()))
}

// ----- output and environments -----

fn render(ev: &Evaluator, env: &EnvRef, args: &[Node]) -> Result<String, EvalError> {
    let values = evaluate_all(ev, env, args)?;
    Ok(values
        .iter()
        .map(Node::display_raw)
        .collect::<Vec<_>>()
        .join(" "))
}

fn print(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let text = render(ev, env, args)?;
    ev.output()
        .write_str(&text)
        .map_err(|err| EvalError::new(format!("failed to write output: {err}")))?;
    Ok(Node::nil())
}

fn println(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let text = render(ev, env, args)?;
    ev.output()
        .write_line(&text)
        .map_err(|err| EvalError::new(format!("failed to write output: {err}")))?;
    Ok(Node::nil())
}

fn current_environment(_ev: &Evaluator, env: &EnvRef, _call: &CallNode, _args: &[Node]) -> EvalResult {
    Ok(Node::environment(Arc::clone(env)))
}

// ----- channels -----

fn expect_chan(ev: &Evaluator, env: &EnvRef, node: &Node, op: &str) -> Result<Arc<Chan>, EvalError> {
    match ev.evaluate(env, node)? {
        Node::Chan(chan) => Ok(chan),
        other => Err(EvalError::new(format!(
            "`{op}` expected a chan but found {} `{other}`",
            other.type_name()
        ))),
    }
}

fn chan(ev: &Evaluator, _env: &EnvRef, _call: &CallNode, _args: &[Node]) -> EvalResult {
    Ok(Node::Chan(Arc::new(ev.context().new_channel())))
}

fn send(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    let chan = expect_chan(ev, env, &args[0], "send")?;
    let value = ev.evaluate(env, &args[1])?;
    chan.send(value.clone())?;
    Ok(value)
}

fn receive(ev: &Evaluator, env: &EnvRef, _call: &CallNode, args: &[Node]) -> EvalResult {
    expect_chan(ev, env, &args[0], "receive")?.receive()
}
