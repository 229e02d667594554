use crate::ast::*;
use crate::error::ScriptError;
use crate::host::{Callback, Host};
use crate::value::{Closure, Native, PromiseKey, Value};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Result<T> = std::result::Result<T, ScriptError>;
type Args = SmallVec<[Value; 4]>;

/// Guards against scripts that never finish synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Statements plus calls evaluated over the interpreter's lifetime.
    pub max_steps: usize,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_call_depth: 64,
        }
    }
}

struct Binding {
    value: Value,
    mutable: bool,
}

/// A lexical scope.
pub struct Env {
    vars: RefCell<FxHashMap<Rc<str>, Binding>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    fn root() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(FxHashMap::default()),
            parent: None,
        })
    }

    fn child(parent: &Rc<Env>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(FxHashMap::default()),
            parent: Some(parent.clone()),
        })
    }

    fn declare(&self, name: Rc<str>, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name, Binding { value, mutable });
    }

    fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Replaces a binding in this scope, ignoring `const`.
    fn overwrite(&self, name: &str, value: Value) {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            binding.value = value;
        }
    }

    fn assign(&self, name: &str, value: Value, line: usize) -> Result<()> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(ScriptError::type_error(
                    line,
                    format!("assignment to constant variable `{name}`"),
                ));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value, line),
            None => Err(ScriptError::Reference {
                line,
                name: name.to_string(),
            }),
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Promise continuations waiting on a pending promise.
enum Reaction {
    Handler {
        func: Rc<Closure>,
        settles: PromiseKey,
    },
    /// Another promise adopting this one's value.
    Follow(PromiseKey),
}

enum PromiseState {
    Pending(Vec<Reaction>),
    Resolved(Value),
}

/// Tree-walking evaluator. One instance per script run; the promise store and
/// step counter live as long as it does.
///
/// Closures keep their defining scope alive and scopes hold closures, so
/// scopes form `Rc` cycles. Every scope is tracked weakly and emptied when
/// the interpreter drops.
pub struct Interpreter {
    globals: Rc<Env>,
    scopes: Vec<Weak<Env>>,
    promises: SlotMap<PromiseKey, PromiseState>,
    limits: Limits,
    steps: usize,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        let globals = Env::root();
        for (name, native) in [
            ("console", Native::Console),
            ("setTimeout", Native::SetTimeout),
            ("queueMicrotask", Native::QueueMicrotask),
            ("Promise", Native::PromiseCtor),
        ] {
            globals.declare(Rc::from(name), Value::Native(native), false);
        }
        Self {
            scopes: vec![Rc::downgrade(&globals)],
            globals,
            promises: SlotMap::with_key(),
            limits,
            steps: 0,
            depth: 0,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn scope(&mut self, parent: &Rc<Env>) -> Rc<Env> {
        if self.scopes.len() == self.scopes.capacity() {
            self.scopes.retain(|scope| scope.strong_count() > 0);
        }
        let scope = Env::child(parent);
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    /// Runs the top-level body synchronously.
    pub fn exec_program(&mut self, program: &Program, host: &mut dyn Host) -> Result<()> {
        let globals = self.globals.clone();
        self.exec_block(&program.body, &globals, host)?;
        Ok(())
    }

    /// Invokes a callback previously handed to the host.
    ///
    /// If the callback is a promise continuation, its return value resolves
    /// the promise `.then` returned, which may release further continuations.
    pub fn run_callback(&mut self, callback: Callback, host: &mut dyn Host) -> Result<()> {
        let Callback {
            func,
            arg,
            settles,
        } = callback;
        let args: Args = arg.into_iter().collect();
        let line = func.def.line;
        let result = self.invoke(&func, &args, line, host)?;

        if let Some(key) = settles {
            let mut released = Vec::new();
            self.settle(key, result, &mut released);
            if !released.is_empty() {
                tracing::debug!(count = released.len(), "promise resolved, releasing continuations");
                host.release_continuations(released);
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::Budget {
                limit: self.limits.max_steps,
            });
        }
        Ok(())
    }

    // Statements

    /// Function declarations are visible throughout their block.
    fn hoist(&self, stmts: &[Stmt], env: &Rc<Env>) {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Closure {
                        def: def.clone(),
                        env: env.clone(),
                    };
                    env.declare(name.clone(), Value::Function(Rc::new(closure)), true);
                }
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Rc<Env>, host: &mut dyn Host) -> Result<Flow> {
        self.hoist(stmts, env);
        for stmt in stmts {
            match self.exec(stmt, env, host)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Rc<Env>, host: &mut dyn Host) -> Result<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Declare {
                kind, name, init, ..
            } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env, host)?,
                    None => Value::Undefined,
                };
                env.declare(name.clone(), value, *kind != DeclKind::Const);
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env, host)?.truthy() {
                    self.exec(then_branch, env, host)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch, env, host)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, env, host)?.truthy() {
                    match self.exec(body, env, host)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                let scope = self.scope(env);
                let mut per_iteration = None;
                if let Some(init) = init {
                    if let Stmt::Declare {
                        kind: DeclKind::Let,
                        name,
                        ..
                    } = init.as_ref()
                    {
                        per_iteration = Some(name.clone());
                    }
                    self.exec(init, &scope, host)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, &scope, host)?.truthy() {
                            break;
                        }
                    }
                    // A `let` loop variable is copied into each iteration so
                    // closures created in the body see that iteration's value.
                    let iteration = self.scope(&scope);
                    if let Some(name) = &per_iteration {
                        let current = scope.get(name).unwrap_or(Value::Undefined);
                        iteration.declare(name.clone(), current, true);
                    }
                    let flow = self.exec(body, &iteration, host)?;
                    if let Some(name) = &per_iteration {
                        let current = iteration.get(name).unwrap_or(Value::Undefined);
                        scope.overwrite(name, current);
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope, host)?;
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env, host)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Block(stmts) => {
                let scope = self.scope(env);
                self.exec_block(stmts, &scope, host)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env, host)?;
                Ok(Flow::Normal)
            }
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr, env: &Rc<Env>, host: &mut dyn Host) -> Result<Value> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(s) => text.push_str(s),
                        TemplatePart::Expr(e) => {
                            let value = self.eval(e, env, host)?;
                            text.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Value::Str(Rc::from(text)))
            }
            ExprKind::Ident(name) => env.get(name).ok_or_else(|| ScriptError::Reference {
                line,
                name: name.to_string(),
            }),
            ExprKind::Assign { target, op, value } => {
                let rhs = self.eval(value, env, host)?;
                let new_value = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Add => add(&self.lookup(target, env, line)?, &rhs),
                    AssignOp::Sub => {
                        Value::Number(self.lookup(target, env, line)?.to_number() - rhs.to_number())
                    }
                };
                env.assign(target, new_value.clone(), line)?;
                Ok(new_value)
            }
            ExprKind::Update {
                target,
                increment,
                prefix,
            } => {
                let old = self.lookup(target, env, line)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                env.assign(target, Value::Number(new), line)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left, env, host)?;
                let r = self.eval(right, env, host)?;
                Ok(binary(*op, &l, &r))
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.eval(left, env, host)?;
                match (op, l.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                    _ => self.eval(right, env, host),
                }
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, env, host)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::Str(Rc::from(value.type_of())),
                })
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval(cond, env, host)?.truthy() {
                    self.eval(then_expr, env, host)
                } else {
                    self.eval(else_expr, env, host)
                }
            }
            ExprKind::Member { object, property } => {
                let object_value = self.eval(object, env, host)?;
                self.property(&object_value, property, object, line)
            }
            ExprKind::Call { callee, args } => {
                let func = self.eval(callee, env, host)?;
                let mut values = Args::new();
                for arg in args {
                    values.push(self.eval(arg, env, host)?);
                }
                self.call(&func, &values, callee, line, host)
            }
            ExprKind::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: def.clone(),
                env: env.clone(),
            }))),
        }
    }

    fn lookup(&self, name: &str, env: &Rc<Env>, line: usize) -> Result<Value> {
        env.get(name).ok_or_else(|| ScriptError::Reference {
            line,
            name: name.to_string(),
        })
    }

    fn property(&self, object: &Value, property: &str, source: &Expr, line: usize) -> Result<Value> {
        let value = match (object, property) {
            (Value::Undefined | Value::Null, _) => {
                return Err(ScriptError::type_error(
                    line,
                    format!(
                        "cannot read properties of {object} (reading '{property}') on `{}`",
                        source.describe()
                    ),
                ));
            }
            (Value::Native(Native::Console), "log" | "info" | "warn" | "error" | "debug") => {
                Value::Native(Native::Log)
            }
            (Value::Native(Native::PromiseCtor), "resolve") => Value::Native(Native::Resolve),
            (Value::Promise(key), "then") => Value::Native(Native::Then(*key)),
            (Value::Str(s), "length") => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        };
        Ok(value)
    }

    fn call(
        &mut self,
        func: &Value,
        args: &[Value],
        callee: &Expr,
        line: usize,
        host: &mut dyn Host,
    ) -> Result<Value> {
        self.tick()?;
        match func {
            Value::Function(closure) => {
                let name = closure.name().unwrap_or("(anonymous)");
                host.enter_function(name, line);
                let result = self.invoke(closure, args, line, host);
                host.exit_function();
                result
            }
            Value::Native(Native::Log) => {
                let text = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                host.print(&text, line);
                Ok(Value::Undefined)
            }
            Value::Native(Native::SetTimeout) => {
                let callback = Callback::new(expect_function(args, "setTimeout", line)?);
                let delay = clamp_delay(args.get(1).map(Value::to_number).unwrap_or(0.0));
                let id = host.register_timer(callback, delay, line);
                Ok(Value::Number(id as f64))
            }
            Value::Native(Native::QueueMicrotask) => {
                let callback = Callback::new(expect_function(args, "queueMicrotask", line)?);
                host.schedule_deferred(callback, line);
                Ok(Value::Undefined)
            }
            Value::Native(Native::Resolve) => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                if let Value::Promise(_) = value {
                    return Ok(value);
                }
                let key = self.promises.insert(PromiseState::Resolved(value));
                Ok(Value::Promise(key))
            }
            Value::Native(Native::Then(receiver)) => {
                let func = expect_function(args, "Promise.then", line)?;
                let next = self.promises.insert(PromiseState::Pending(Vec::new()));
                match self.promises.get_mut(*receiver) {
                    Some(PromiseState::Resolved(value)) => {
                        let callback = Callback {
                            func,
                            arg: Some(value.clone()),
                            settles: Some(next),
                        };
                        host.chain_then(Some(callback), line);
                    }
                    Some(PromiseState::Pending(reactions)) => {
                        reactions.push(Reaction::Handler {
                            func,
                            settles: next,
                        });
                        host.chain_then(None, line);
                    }
                    None => {
                        return Err(ScriptError::type_error(line, "then called on a dropped promise"));
                    }
                }
                Ok(Value::Promise(next))
            }
            _ => Err(ScriptError::type_error(
                line,
                format!("{} is not a function", callee.describe()),
            )),
        }
    }

    /// Runs a closure's body without touching the host's call stack.
    fn invoke(
        &mut self,
        closure: &Rc<Closure>,
        args: &[Value],
        line: usize,
        host: &mut dyn Host,
    ) -> Result<Value> {
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::CallDepth {
                line,
                limit: self.limits.max_call_depth,
            });
        }
        self.depth += 1;
        let result = self.invoke_body(closure, args, host);
        self.depth -= 1;
        result
    }

    fn invoke_body(&mut self, closure: &Rc<Closure>, args: &[Value], host: &mut dyn Host) -> Result<Value> {
        let scope = self.scope(&closure.env);
        for (i, param) in closure.def.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
            scope.declare(param.clone(), value, true);
        }
        match &closure.def.body {
            FunctionBody::Block(stmts) => match self.exec_block(stmts, &scope, host)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(expr) => self.eval(expr, &scope, host),
        }
    }

    /// Resolves `key` with `value`, collecting continuations that become runnable.
    fn settle(&mut self, key: PromiseKey, value: Value, released: &mut Vec<Callback>) {
        let value = match value {
            Value::Promise(inner) if inner != key => match self.promises.get_mut(inner) {
                Some(PromiseState::Pending(reactions)) => {
                    reactions.push(Reaction::Follow(key));
                    return;
                }
                Some(PromiseState::Resolved(inner_value)) => inner_value.clone(),
                None => Value::Undefined,
            },
            other => other,
        };

        let Some(state) = self.promises.get_mut(key) else {
            return;
        };
        let reactions = match std::mem::replace(state, PromiseState::Resolved(value.clone())) {
            PromiseState::Pending(reactions) => reactions,
            already @ PromiseState::Resolved(_) => {
                *state = already;
                return;
            }
        };

        for reaction in reactions {
            match reaction {
                Reaction::Handler { func, settles } => released.push(Callback {
                    func,
                    arg: Some(value.clone()),
                    settles: Some(settles),
                }),
                Reaction::Follow(follower) => self.settle(follower, value.clone(), released),
            }
        }
    }
}

fn expect_function(args: &[Value], what: &str, line: usize) -> Result<Rc<Closure>> {
    match args.first() {
        Some(Value::Function(closure)) => Ok(closure.clone()),
        Some(other) => Err(ScriptError::type_error(
            line,
            format!("{what} expects a function, got {}", other.type_of()),
        )),
        None => Err(ScriptError::type_error(line, format!("{what} expects a function"))),
    }
}

/// Negative, NaN and missing delays become 0; fractions are truncated.
fn clamp_delay(delay: f64) -> u64 {
    if delay.is_nan() || delay <= 0.0 {
        0
    } else if delay >= u64::MAX as f64 {
        u64::MAX
    } else {
        delay.trunc() as u64
    }
}

fn add(l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Str(_), _) | (_, Value::Str(_)) => Value::Str(Rc::from(format!("{l}{r}"))),
        _ => Value::Number(l.to_number() + r.to_number()),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => add(l, r),
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Eq => Value::Bool(l.loose_equals(r)),
        BinaryOp::NotEq => Value::Bool(!l.loose_equals(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_equals(r)),
        BinaryOp::StrictNotEq => Value::Bool(!l.strict_equals(r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if let (Value::Str(a), Value::Str(b)) = (l, r) {
                let ord = a.cmp(b);
                return Value::Bool(match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                });
            }
            let (a, b) = (l.to_number(), r.to_number());
            Value::Bool(match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            })
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for scope in self.scopes.drain(..) {
            if let Some(scope) = scope.upgrade() {
                let vars = std::mem::take(&mut *scope.vars.borrow_mut());
                drop(vars);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::value::format_number;

    /// Host that keeps every callback it is handed, like a scheduler would.
    #[derive(Default)]
    struct KeepingHost {
        kept: Vec<Callback>,
    }

    impl Host for KeepingHost {
        fn print(&mut self, _text: &str, _line: usize) {}

        fn register_timer(&mut self, callback: Callback, _delay: u64, _line: usize) -> u64 {
            self.kept.push(callback);
            self.kept.len() as u64
        }

        fn schedule_deferred(&mut self, callback: Callback, _line: usize) {
            self.kept.push(callback);
        }

        fn chain_then(&mut self, callback: Option<Callback>, _line: usize) {
            self.kept.extend(callback);
        }

        fn release_continuations(&mut self, callbacks: Vec<Callback>) {
            self.kept.extend(callbacks);
        }
    }

    fn scopes_after(source: &str) -> Vec<Weak<Env>> {
        let program = parse(source).unwrap();
        let mut host = KeepingHost::default();
        let mut interp = Interpreter::new();
        interp.exec_program(&program, &mut host).unwrap();
        let scopes = interp.scopes.clone();
        assert!(scopes.iter().any(|scope| scope.strong_count() > 0));
        drop(interp);
        drop(host);
        scopes
    }

    #[test]
    fn test_scopes_are_freed_with_the_interpreter() {
        for source in [
            "function f() {}",
            "const g = () => 1;",
            "function outer() {\n  function inner() { return 1; }\n  return inner;\n}\nouter();",
            "for (let i = 0; i < 3; i++) {\n  setTimeout(() => console.log(i), 0);\n}",
            "function again() { queueMicrotask(again); }\nagain();",
        ] {
            for scope in scopes_after(source) {
                assert_eq!(scope.strong_count(), 0, "scope leaked for {source:?}");
            }
        }
    }

    #[test]
    fn test_delay_clamping() {
        assert_eq!(clamp_delay(-5.0), 0);
        assert_eq!(clamp_delay(f64::NAN), 0);
        assert_eq!(clamp_delay(12.9), 12);
    }

    #[test]
    fn test_string_concatenation_formats_numbers() {
        let joined = add(&Value::Str(Rc::from("n=")), &Value::Number(2.0));
        assert_eq!(joined.to_string(), format!("n={}", format_number(2.0)));
    }
}
