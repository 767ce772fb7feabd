//! Command dispatch: the hot path of the runner.
//!
//! Argv expansion is deferred to this point so assignment prefixes and
//! loop variables take effect. Dispatch order: user function, builtin,
//! external via `$path`. Redirections apply in source order; the first
//! failure aborts the command with status 1 before anything runs.

use super::{builtins, path, Runner};
use crate::env::{Env, FuncDef};
use crate::expand::{expand_call, expand_value};
use crate::lexer::RedirOp;
use crate::plan::{build_plan, ExecPlan, RedirSpec};
use crate::stream::{spawn_command, Io, Stream};
use std::fs::{File, OpenOptions};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::thread;

impl Runner {
    pub(crate) fn run_command(&self, p: &ExecPlan, env: &Env, io: &Io, background: bool) -> i32 {
        let exec_env = if p.prefix.is_empty() {
            env.clone()
        } else {
            // prefix assignments live in an ephemeral child scope that
            // only this command sees
            let child = env.child();
            for pref in &p.prefix {
                match expand_value(&pref.value, &child, self) {
                    Ok(vals) => child.set(&pref.name, vals),
                    Err(e) => {
                        self.report(io, &e.to_string());
                        return 1;
                    }
                }
            }
            child
        };
        let argv = match &p.call {
            Some(call) => match expand_call(call, &exec_env, self) {
                Ok(argv) => argv,
                Err(e) => {
                    self.report(io, &e.to_string());
                    return 1;
                }
            },
            None => Vec::new(),
        };
        if argv.is_empty() {
            return 0;
        }
        self.trace_argv(io, &argv);
        if let Some(def) = exec_env.get_func(&argv[0]) {
            return self.run_func_call(&def, &argv, p, &exec_env, io, background);
        }
        if let Some(builtin) = builtins::lookup(&argv[0]) {
            if background {
                let io2 = match self.apply_redirs(&p.redirs, io) {
                    Ok(io2) => io2,
                    Err(msg) => {
                        self.report(io, &msg);
                        return 1;
                    }
                };
                let r = self.detached();
                let env2 = exec_env.clone();
                thread::spawn(move || {
                    builtin(&r, &env2, &io2, &argv);
                });
                return 0;
            }
            return self.run_builtin(builtin, &argv, p, &exec_env, io);
        }
        self.run_external(&argv, p, &exec_env, io, background, 0)
    }

    fn run_builtin(
        &self,
        builtin: builtins::Builtin,
        argv: &[String],
        p: &ExecPlan,
        env: &Env,
        io: &Io,
    ) -> i32 {
        let io2 = match self.apply_redirs(&p.redirs, io) {
            Ok(io2) => io2,
            Err(msg) => {
                self.report(io, &msg);
                return 1;
            }
        };
        builtin(self, env, &io2, argv)
    }

    pub(crate) fn run_external(
        &self,
        argv: &[String],
        p: &ExecPlan,
        env: &Env,
        io: &Io,
        background: bool,
        want_pgid: i32,
    ) -> i32 {
        let io2 = match self.apply_redirs(&p.redirs, io) {
            Ok(io2) => io2,
            Err(msg) => {
                self.report(io, &msg);
                return 1;
            }
        };
        let Some(path) = path::resolve_path(&argv[0], env) else {
            self.report(io, &format!("cannot find '{}'", argv[0]));
            return 127;
        };
        let mut cmd = Command::new(path);
        cmd.args(&argv[1..]);
        cmd.process_group(want_pgid.max(0));
        let (child, pumps) = match spawn_command(&mut cmd, &io2) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.report(io, &format!("{}: {}", argv[0], e));
                return 127;
            }
        };
        let pid = child.id() as i32;
        if background {
            let pgid = crate::terminal::pgid_of(pid).unwrap_or(pid);
            let job_id = self.add_job(pgid, vec![pid], argv.join(" "));
            self.add_apid(pid);
            self.spawn_reaper(job_id, vec![child], pumps);
            return 0;
        }
        self.attach_foreground(pid);
        let status = wait_child(child);
        for pump in pumps {
            let _ = pump.join();
        }
        self.restore_foreground();
        status
    }

    pub(crate) fn run_func_call(
        &self,
        def: &FuncDef,
        argv: &[String],
        p: &ExecPlan,
        env: &Env,
        io: &Io,
        background: bool,
    ) -> i32 {
        let io2 = match self.apply_redirs(&p.redirs, io) {
            Ok(io2) => io2,
            Err(msg) => {
                self.report(io, &msg);
                return 1;
            }
        };
        let child = env.child();
        child.set("*", argv[1..].to_vec());
        child.set("0", vec![argv[0].clone()]);
        let plan = match build_plan(&def.body, &child, self) {
            Ok(plan) => plan,
            Err(e) => {
                self.report(io, &e.to_string());
                return 1;
            }
        };
        if background {
            let r = self.detached();
            thread::spawn(move || {
                r.run_chain(Some(&plan), &child, &io2);
            });
            return 0;
        }
        // `if not` is statement-list local; the call boundary saves the
        // caller's sentinel
        let saved_if = self.last_if_status();
        let mut status = self.run_chain(Some(&plan), &child, &io2);
        if let Some(returned) = self.ret.lock().unwrap().take() {
            status = returned;
        }
        self.set_last_if_status(saved_if);
        status
    }

    /// Applies redirection descriptors, in source order, onto a copy of
    /// `io`. The first failure wins; files opened so far are released
    /// when the copy drops.
    pub(crate) fn apply_redirs(&self, redirs: &[RedirSpec], io: &Io) -> Result<Io, String> {
        let mut out = io.clone();
        for r in redirs {
            match r {
                RedirSpec::File { op, fd, target } => {
                    if matches!(op, RedirOp::Heredoc | RedirOp::HereString) {
                        return Err("here documents are not supported".to_string());
                    }
                    let fd = if *fd < 0 { op.default_fd() } else { *fd };
                    let path = target
                        .first()
                        .ok_or_else(|| "redirection needs a target".to_string())?;
                    let file = match op {
                        RedirOp::In => File::open(path),
                        RedirOp::Out => OpenOptions::new()
                            .create(true)
                            .truncate(true)
                            .write(true)
                            .open(path),
                        RedirOp::Append => {
                            OpenOptions::new().create(true).append(true).open(path)
                        }
                        RedirOp::ReadWrite => OpenOptions::new()
                            .create(true)
                            .read(true)
                            .write(true)
                            .open(path),
                        RedirOp::Heredoc | RedirOp::HereString => unreachable!(),
                    }
                    .map_err(|e| format!("{}: {}", path, e))?;
                    if !out.set_fd(fd, Stream::File(Arc::new(file))) {
                        return Err(format!("unsupported fd {}", fd));
                    }
                }
                RedirSpec::Dup { fd, src } if *src < 0 => {
                    // close: reopen on /dev/null in the matching mode
                    let file = if *fd == 0 {
                        File::open("/dev/null")
                    } else {
                        OpenOptions::new().write(true).open("/dev/null")
                    }
                    .map_err(|e| format!("/dev/null: {}", e))?;
                    if !out.set_fd(*fd, Stream::File(Arc::new(file))) {
                        return Err(format!("unsupported fd {}", fd));
                    }
                }
                RedirSpec::Dup { fd, src } => {
                    let stream = out
                        .fd(*src)
                        .cloned()
                        .ok_or_else(|| format!("unsupported fd {}", src))?;
                    if !out.set_fd(*fd, stream) {
                        return Err(format!("unsupported fd {}", fd));
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Waits out a child and translates its exit the usual way: the code,
/// or 128 plus the signal number.
pub(crate) fn wait_child(mut child: Child) -> i32 {
    match child.wait() {
        Ok(status) => exit_status(status),
        Err(_) => 1,
    }
}

pub(crate) fn exit_status(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
