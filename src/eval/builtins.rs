//! Shell builtins.
//!
//! Each builtin gets the runner, the environment the command resolved
//! in (including any assignment prefixes), the command's streams, and
//! its argv, and returns an exit status.

use super::{path, Job, JobState, Runner};
use crate::env::Env;
use crate::parser::parse;
use crate::plan::build_plan_opt;
use crate::stream::Io;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::CString;
use std::io::Write;

pub(crate) type Builtin = fn(&Runner, &Env, &Io, &[String]) -> i32;

pub(crate) fn lookup(name: &str) -> Option<Builtin> {
    Some(match name {
        "cd" => builtin_cd,
        "pwd" => builtin_pwd,
        "exit" => builtin_exit,
        "return" => builtin_return,
        "." => builtin_dot,
        "eval" => builtin_eval,
        "exec" => builtin_exec,
        "which" => builtin_which,
        "shift" => builtin_shift,
        "wait" => builtin_wait,
        "jobs" => builtin_jobs,
        "fg" => builtin_fg,
        "bg" => builtin_bg,
        "apid" => builtin_apid,
        "newpgrp" => builtin_newpgrp,
        "echo" => builtin_echo,
        _ => return None,
    })
}

fn builtin_cd(_r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    let dir = match args.get(1) {
        Some(d) => d.clone(),
        None => match env.get("home").and_then(|v| v.first().cloned()) {
            Some(home) => home,
            None => match std::env::var("HOME") {
                Ok(home) => home,
                Err(_) => {
                    let _ = writeln!(io.stderr.writer(), "cd: no home directory");
                    return 1;
                }
            },
        },
    };
    if let Err(e) = std::env::set_current_dir(&dir) {
        let _ = writeln!(io.stderr.writer(), "cd: {}: {}", dir, e);
        return 1;
    }
    0
}

fn builtin_pwd(_r: &Runner, _env: &Env, io: &Io, _args: &[String]) -> i32 {
    match std::env::current_dir() {
        Ok(dir) => {
            let _ = writeln!(io.stdout.writer(), "{}", dir.display());
            0
        }
        Err(e) => {
            let _ = writeln!(io.stderr.writer(), "pwd: {}", e);
            1
        }
    }
}

fn builtin_exit(r: &Runner, _env: &Env, _io: &Io, args: &[String]) -> i32 {
    let code = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    r.request_exit(code);
    code
}

fn builtin_return(r: &Runner, env: &Env, _io: &Io, args: &[String]) -> i32 {
    let status = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| env.status());
    r.set_return(status);
    status
}

/// `. path [args…]` and `. -i path [args…]`: source a file in the
/// current environment with `$*` and `$0` temporarily rebound.
fn builtin_dot(r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    let mut i = 1;
    let mut interactive = false;
    if args.get(i).map(String::as_str) == Some("-i") {
        interactive = true;
        i += 1;
    }
    let Some(path) = args.get(i) else {
        return 0;
    };
    let rest = args.get(i + 1..).unwrap_or_default().to_vec();
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let _ = writeln!(io.stderr.writer(), ".: {}: {}", path, e);
            return 1;
        }
    };

    let old_star = env.get_local("*");
    let old_zero = env.get_local("0");
    env.set("*", rest);
    env.set1("0", path);

    let runner = if interactive && !r.interactive {
        Runner {
            interactive: true,
            ..r.clone()
        }
    } else {
        r.clone()
    };
    let status = run_source(&runner, env, io, &source);

    restore_var(env, "*", old_star);
    restore_var(env, "0", old_zero);
    status
}

/// `eval args…`: splice the arguments into one line and run it.
fn builtin_eval(r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    if args.len() < 2 {
        return 0;
    }
    run_source(r, env, io, &args[1..].join(" "))
}

fn run_source(r: &Runner, env: &Env, io: &Io, source: &str) -> i32 {
    let ast = match parse(source) {
        Ok(ast) => ast,
        Err(e) => {
            let _ = writeln!(io.stderr.writer(), "rc: {}", e);
            return 1;
        }
    };
    let plan = match build_plan_opt(ast.as_ref(), env, r) {
        Ok(plan) => plan,
        Err(e) => {
            let _ = writeln!(io.stderr.writer(), "rc: {}", e);
            return 1;
        }
    };
    r.run_chain(plan.as_ref(), env, io)
}

fn restore_var(env: &Env, name: &str, old: Option<Vec<String>>) {
    match old {
        Some(vals) => env.set(name, vals),
        None => env.unset(name),
    }
}

/// `exec argv…`: replace the shell with the resolved command. Applied
/// redirections become the new image's fds.
fn builtin_exec(r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    if args.len() < 2 {
        return 0;
    }
    let argv = &args[1..];
    let Some(path) = path::resolve_path(&argv[0], env) else {
        r.report(io, &format!("cannot find '{}'", argv[0]));
        return 127;
    };
    for fd in 0..3 {
        if let Some(stream) = io.fd(fd) {
            match stream.raw_fd() {
                Some(raw) if raw != fd => {
                    if nix::unistd::dup2(raw, fd).is_err() {
                        r.report(io, &format!("exec: cannot set up fd {}", fd));
                        return 1;
                    }
                }
                Some(_) => {}
                None => {
                    r.report(io, &format!("exec: fd {} has no file descriptor", fd));
                    return 1;
                }
            }
        }
    }
    let mut image = std::collections::HashMap::new();
    for (key, val) in std::env::vars() {
        image.insert(key, val);
    }
    for (key, vals) in env.snapshot() {
        image.insert(key, vals.join(" "));
    }
    let Ok(cpath) = CString::new(path) else {
        return 1;
    };
    let Ok(cargs) = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()
    else {
        return 1;
    };
    let Ok(cenv) = image
        .into_iter()
        .map(|(k, v)| CString::new(format!("{}={}", k, v)))
        .collect::<Result<Vec<_>, _>>()
    else {
        return 1;
    };
    match nix::unistd::execve(&cpath, &cargs, &cenv) {
        Ok(infallible) => match infallible {},
        Err(e) => {
            r.report(io, &format!("exec: {}: {}", argv[0], e));
            127
        }
    }
}

fn builtin_which(r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    let mut status = 0;
    for name in &args[1..] {
        match path::resolve_path(name, env) {
            Some(path) => {
                let _ = writeln!(io.stdout.writer(), "{}", path);
            }
            None => {
                r.report(io, &format!("cannot find '{}'", name));
                status = 1;
            }
        }
    }
    status
}

fn builtin_shift(_r: &Runner, env: &Env, io: &Io, args: &[String]) -> i32 {
    let n: usize = match args.get(1) {
        Some(s) => match s.parse() {
            Ok(n) => n,
            Err(_) => {
                let _ = writeln!(io.stderr.writer(), "shift: bad count '{}'", s);
                return 1;
            }
        },
        None => 1,
    };
    let star = env.get("*").unwrap_or_default();
    if n > star.len() {
        let _ = writeln!(io.stderr.writer(), "shift: nothing to shift");
        return 1;
    }
    env.set("*", star[n..].to_vec());
    0
}

/// `wait [pid…]`: wait for jobs; status is the last-waited exit.
fn builtin_wait(r: &Runner, _env: &Env, io: &Io, args: &[String]) -> i32 {
    if args.len() < 2 {
        let mut status = 0;
        for id in r.job_ids() {
            status = r.wait_job(id);
            r.remove_job(id);
        }
        return status;
    }
    let mut status = 0;
    for arg in &args[1..] {
        let Ok(pid) = arg.parse::<i32>() else {
            let _ = writeln!(io.stderr.writer(), "wait: bad pid '{}'", arg);
            return 1;
        };
        match r.job_by_pid(pid) {
            Some(job) => {
                status = r.wait_job(job.id);
                r.remove_job(job.id);
            }
            None => {
                let _ = writeln!(io.stderr.writer(), "wait: no such job {}", pid);
                return 1;
            }
        }
    }
    status
}

fn builtin_jobs(r: &Runner, _env: &Env, io: &Io, _args: &[String]) -> i32 {
    let jobs = r.list_jobs();
    if !jobs.is_empty() {
        let mut out = io.stdout.writer();
        for job in &jobs {
            let _ = writeln!(
                out,
                "[{}] {} {} {}",
                job.id,
                job.state.as_str(),
                job.pgid,
                job.cmd
            );
        }
    }
    r.notify_and_prune();
    0
}

fn builtin_fg(r: &Runner, _env: &Env, io: &Io, args: &[String]) -> i32 {
    let job = match resolve_job(r, args) {
        Ok(job) => job,
        Err(msg) => {
            let _ = writeln!(io.stderr.writer(), "fg: {}", msg);
            return 1;
        }
    };
    if job.state == JobState::Done {
        r.remove_job(job.id);
        return job.exit;
    }
    let _ = kill(Pid::from_raw(-job.pgid), Signal::SIGCONT);
    r.attach_foreground_pgid(job.pgid);
    let exit = r.wait_job(job.id);
    r.restore_foreground();
    r.remove_job(job.id);
    exit
}

fn builtin_bg(r: &Runner, _env: &Env, io: &Io, args: &[String]) -> i32 {
    let job = match resolve_job(r, args) {
        Ok(job) => job,
        Err(msg) => {
            let _ = writeln!(io.stderr.writer(), "bg: {}", msg);
            return 1;
        }
    };
    let _ = kill(Pid::from_raw(-job.pgid), Signal::SIGCONT);
    r.set_job_state(job.id, JobState::Running);
    0
}

fn builtin_apid(_r: &Runner, env: &Env, io: &Io, _args: &[String]) -> i32 {
    if let Some(vals) = env.get("apid") {
        if !vals.is_empty() {
            let _ = writeln!(io.stdout.writer(), "{}", vals.join(" "));
        }
    }
    0
}

/// `newpgrp`: move the shell into a fresh process group and claim the
/// terminal for it.
fn builtin_newpgrp(r: &Runner, _env: &Env, io: &Io, _args: &[String]) -> i32 {
    if let Err(e) = crate::terminal::enter_new_group() {
        let _ = writeln!(io.stderr.writer(), "newpgrp: {}", e);
        return 1;
    }
    let pgid = crate::terminal::shell_pgid();
    r.set_shell_pgid(pgid);
    if r.interactive && r.tty_fd > 0 {
        let _ = crate::terminal::set_foreground(r.tty_fd, pgid);
    }
    0
}

fn builtin_echo(_r: &Runner, _env: &Env, io: &Io, args: &[String]) -> i32 {
    let mut out = io.stdout.writer();
    let (newline, rest) = match args.get(1).map(String::as_str) {
        Some("-n") => (false, &args[2..]),
        _ => (true, &args[1..]),
    };
    let line = rest.join(" ");
    let result = if newline {
        writeln!(out, "{}", line)
    } else {
        write!(out, "{}", line).and_then(|_| out.flush())
    };
    if result.is_err() {
        return 1;
    }
    0
}

fn resolve_job(r: &Runner, args: &[String]) -> Result<Job, String> {
    let id = match args.get(1) {
        Some(arg) => {
            let arg = arg.trim_start_matches('%');
            match arg.parse::<u32>() {
                Ok(id) if id > 0 => Some(id),
                _ => return Err(format!("bad job id '{}'", args[1])),
            }
        }
        None => r.last_job_id(),
    };
    match id.and_then(|id| r.get_job(id)) {
        Some(job) => Ok(job),
        None => Err("no current job".to_string()),
    }
}
