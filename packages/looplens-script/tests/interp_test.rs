use looplens_script::{Callback, Host, Interpreter, Limits, ScriptError, parse};
use std::collections::VecDeque;

#[derive(Default)]
struct RecordingHost {
    events: Vec<String>,
    output: Vec<String>,
    timers: Vec<(u64, Callback)>,
    deferred: VecDeque<Callback>,
    next_timer: u64,
}

impl Host for RecordingHost {
    fn print(&mut self, text: &str, line: usize) {
        self.events.push(format!("print@{line}"));
        self.output.push(text.to_string());
    }

    fn register_timer(&mut self, callback: Callback, delay: u64, line: usize) -> u64 {
        self.events.push(format!("timer({delay})@{line}"));
        self.next_timer += 1;
        self.timers.push((delay, callback));
        self.next_timer
    }

    fn schedule_deferred(&mut self, callback: Callback, line: usize) {
        self.events.push(format!("micro@{line}"));
        self.deferred.push_back(callback);
    }

    fn chain_then(&mut self, callback: Option<Callback>, line: usize) {
        match callback {
            Some(callback) => {
                self.events.push(format!("then@{line}"));
                self.deferred.push_back(callback);
            }
            None => self.events.push(format!("then-parked@{line}")),
        }
    }

    fn release_continuations(&mut self, callbacks: Vec<Callback>) {
        self.events.push(format!("released({})", callbacks.len()));
        self.deferred.extend(callbacks);
    }

    fn enter_function(&mut self, name: &str, _line: usize) {
        self.events.push(format!("enter {name}"));
    }

    fn exit_function(&mut self) {
        self.events.push("exit".to_string());
    }
}

/// Microtasks first, then timers by delay, stable among equals.
fn run_to_completion(interp: &mut Interpreter, host: &mut RecordingHost) -> Result<(), ScriptError> {
    loop {
        while let Some(callback) = host.deferred.pop_front() {
            interp.run_callback(callback, host)?;
        }
        if host.timers.is_empty() {
            return Ok(());
        }
        let next = host
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(i, (delay, _))| (*delay, *i))
            .map(|(i, _)| i)
            .unwrap();
        let (_, callback) = host.timers.remove(next);
        interp.run_callback(callback, host)?;
    }
}

fn run(source: &str) -> Result<RecordingHost, ScriptError> {
    let program = parse(source)?;
    let mut interp = Interpreter::new();
    let mut host = RecordingHost::default();
    interp.exec_program(&program, &mut host)?;
    run_to_completion(&mut interp, &mut host)?;
    Ok(host)
}

fn output(source: &str) -> Vec<String> {
    run(source).unwrap().output
}

#[test]
fn test_console_log_formats_and_joins_arguments() {
    assert_eq!(
        output("console.log('a', 1 + 2, true, null, undefined, 7 / 2);"),
        vec!["a 3 true null undefined 3.5"]
    );
}

#[test]
fn test_template_literals_interpolate() {
    let source = "const name = 'loop';\nconsole.log(`hello ${name}, ${1 + 1} times`);";
    assert_eq!(output(source), vec!["hello loop, 2 times"]);
}

#[test]
fn test_closures_keep_their_scope() {
    let source = r#"
        function counter() {
            let n = 0;
            return () => { n += 1; return n; };
        }
        const next = counter();
        next();
        next();
        console.log(next());
    "#;
    assert_eq!(output(source), vec!["3"]);
}

#[test]
fn test_function_declarations_are_hoisted() {
    assert_eq!(output("greet();\nfunction greet() { console.log('hi'); }"), vec!["hi"]);
}

#[test]
fn test_control_flow() {
    let source = r#"
        let total = 0;
        for (let i = 0; i < 10; i++) {
            if (i % 2 === 0) continue;
            if (i > 7) break;
            total += i;
        }
        let j = 3;
        while (j > 0) { j--; }
        console.log(total, j, total > 10 ? 'big' : 'small');
    "#;
    assert_eq!(output(source), vec!["16 0 big"]);
}

#[test]
fn test_let_loop_variable_is_captured_per_iteration() {
    let source = "for (let i = 0; i < 3; i++) {\n  setTimeout(() => console.log(i), 0);\n}";
    assert_eq!(output(source), vec!["0", "1", "2"]);
}

#[test]
fn test_primitives_report_call_site_lines() {
    let source = "console.log('a');\nsetTimeout(() => {}, 5);\nqueueMicrotask(() => {});\nPromise.resolve().then(() => {});";
    let host = run(source).unwrap();
    assert_eq!(
        &host.events[..4],
        &["print@1", "timer(5)@2", "micro@3", "then@4"]
    );
}

#[test]
fn test_set_timeout_returns_increasing_ids() {
    let source = "const a = setTimeout(() => {}, 0);\nconst b = setTimeout(() => {});\nconsole.log(b - a);";
    assert_eq!(output(source), vec!["1"]);
}

#[test]
fn test_then_receives_resolved_value_and_chains() {
    let source = "Promise.resolve(1)\n  .then(v => v + 1)\n  .then(v => console.log('got', v));";
    let host = run(source).unwrap();
    assert_eq!(host.output, vec!["got 2"]);
    assert!(host.events.contains(&"then-parked@3".to_string()));
    assert!(host.events.contains(&"released(1)".to_string()));
}

#[test]
fn test_then_adopts_returned_promise() {
    let source = "Promise.resolve().then(() => Promise.resolve(5)).then(v => console.log(v));";
    assert_eq!(output(source), vec!["5"]);
}

#[test]
fn test_user_function_calls_are_bracketed() {
    let host = run("function f() { console.log('in'); }\nf();").unwrap();
    assert_eq!(host.events, vec!["enter f", "print@1", "exit"]);
}

#[test]
fn test_undefined_variable_is_reference_error() {
    let err = run("console.log('ok');\nmissing();").err().unwrap();
    assert!(matches!(err, ScriptError::Reference { line: 2, ref name } if name == "missing"));
}

#[test]
fn test_const_reassignment_is_type_error() {
    let err = run("const x = 1;\nx = 2;").err().unwrap();
    assert!(matches!(err, ScriptError::Type { line: 2, .. }));
}

#[test]
fn test_calling_non_function_is_type_error() {
    let err = run("const n = 3;\nn();").err().unwrap();
    assert_eq!(err.to_string(), "TypeError: n is not a function (line 2)");
}

#[test]
fn test_set_timeout_requires_function() {
    let err = run("setTimeout('nope', 0);").err().unwrap();
    assert!(matches!(err, ScriptError::Type { .. }));
}

#[test]
fn test_step_budget_stops_infinite_loops() {
    let program = parse("while (true) {}").unwrap();
    let mut interp = Interpreter::with_limits(Limits {
        max_steps: 1_000,
        max_call_depth: 16,
    });
    let err = interp
        .exec_program(&program, &mut RecordingHost::default())
        .unwrap_err();
    assert_eq!(err, ScriptError::Budget { limit: 1_000 });
}

#[test]
fn test_call_depth_limit_stops_recursion() {
    let program = parse("function f() { f(); }\nf();").unwrap();
    let mut interp = Interpreter::with_limits(Limits {
        max_steps: 100_000,
        max_call_depth: 16,
    });
    let err = interp
        .exec_program(&program, &mut RecordingHost::default())
        .unwrap_err();
    assert!(matches!(err, ScriptError::CallDepth { limit: 16, .. }));
}
