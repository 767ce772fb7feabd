//! Common helpers for rcsh integration tests.

use rcsh::{build_plan_opt, parse, Env, Io, Runner, Stream};

/// Runs a script against a fresh environment, capturing stdout.
pub fn run(script: &str) -> (String, i32) {
    let env = Env::new();
    run_with_env(&env, script)
}

/// Runs a script against the given environment, capturing stdout.
pub fn run_with_env(env: &Env, script: &str) -> (String, i32) {
    let runner = Runner::new(env.clone());
    let ast = parse(script).expect("parse failed");
    let plan = build_plan_opt(ast.as_ref(), env, &runner).expect("plan failed");
    let (out, buf) = Stream::capture();
    let io = Io {
        stdin: Stream::Null,
        stdout: out,
        stderr: Stream::Null,
    };
    let result = runner.run_plan(plan.as_ref(), &io);
    let stdout = String::from_utf8_lossy(&buf.lock().unwrap()).into_owned();
    (stdout, result.status)
}

/// Whether `cmd` resolves on the test host's PATH.
#[allow(dead_code)]
pub fn have(cmd: &str) -> bool {
    let Ok(path) = std::env::var("PATH") else {
        return false;
    };
    path.split(':')
        .any(|dir| std::path::Path::new(dir).join(cmd).is_file())
}
