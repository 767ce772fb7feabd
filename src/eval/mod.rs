//! Plan execution.
//!
//! The [`Runner`] interprets an ExecPlan graph: chain traversal over the
//! four control edges, dispatch to builtins, user functions, or external
//! processes, pipelines with per-pipeline process groups, background
//! jobs, and terminal ownership.
//!
//! Runner methods take `&self` and the current environment is threaded
//! as an explicit parameter; shared state (the job table and foreground
//! pgid) lives behind one mutex, and the exit/return sentinels are
//! atomics. That makes the runner cheap to clone into the threads that
//! carry in-process pipeline stages and background bodies.

mod builtins;
mod command;
mod control;
mod jobs;
mod path;
mod pipeline;

pub use jobs::{Job, JobState};

use crate::ast::Node;
use crate::env::Env;
use crate::expand::{Capture, Executor, ExpandError};
use crate::plan::{build_plan, ExecPlan, PlanKind};
use crate::stream::{Io, Stream};
use jobs::JobTable;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// Executes plans. Clones share the job table, exit flag, and terminal
/// bookkeeping; `detached` clones get fresh return/if-not sentinels.
#[derive(Clone)]
pub struct Runner {
    pub env: Env,
    pub trace: bool,
    pub interactive: bool,
    /// Controlling terminal fd, `<= 0` when absent.
    pub tty_fd: i32,
    shell_pgid: Arc<AtomicI32>,
    jobs: Arc<(Mutex<JobTable>, Condvar)>,
    exit_requested: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
    /// Pending `return`, cleared at the innermost function-call boundary.
    ret: Arc<Mutex<Option<i32>>>,
    /// Status of the most recent `if` condition, consulted by `if not`.
    last_if: Arc<AtomicI32>,
}

/// The final status of a plan run.
pub struct RunResult {
    pub status: i32,
}

impl Runner {
    pub fn new(env: Env) -> Runner {
        Runner {
            env,
            trace: false,
            interactive: false,
            tty_fd: 0,
            shell_pgid: Arc::new(AtomicI32::new(0)),
            jobs: Arc::new((Mutex::new(JobTable::new()), Condvar::new())),
            exit_requested: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(AtomicI32::new(0)),
            ret: Arc::new(Mutex::new(None)),
            last_if: Arc::new(AtomicI32::new(0)),
        }
    }

    /// A handle for detached work: same jobs and exit flag, fresh
    /// return/if-not sentinels so a background body cannot unwind its
    /// spawner.
    pub(crate) fn detached(&self) -> Runner {
        Runner {
            ret: Arc::new(Mutex::new(None)),
            last_if: Arc::new(AtomicI32::new(0)),
            ..self.clone()
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    pub(crate) fn request_exit(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_return(&self, status: i32) {
        *self.ret.lock().unwrap() = Some(status);
    }

    pub(crate) fn return_pending(&self) -> bool {
        self.ret.lock().unwrap().is_some()
    }

    pub fn shell_pgid(&self) -> i32 {
        self.shell_pgid.load(Ordering::SeqCst)
    }

    pub fn set_shell_pgid(&self, pgid: i32) {
        self.shell_pgid.store(pgid, Ordering::SeqCst);
    }

    /// Runs a plan tree to completion and reports the final status.
    pub fn run_plan(&self, plan: Option<&ExecPlan>, io: &Io) -> RunResult {
        let env = self.env.clone();
        RunResult {
            status: self.run_chain(plan, &env, io),
        }
    }

    pub(crate) fn run_chain(&self, plan: Option<&ExecPlan>, env: &Env, io: &Io) -> i32 {
        let mut status = 0;
        let mut cur = plan;
        while let Some(p) = cur {
            if self.exit_requested() {
                return self.exit_code();
            }
            if self.return_pending() {
                return status;
            }
            if p.background {
                status = self.start_background(p, env, io);
                env.set_status(status);
                cur = p.next.as_deref();
                continue;
            }
            status = self.run_single(p, env, io);
            env.set_status(status);
            if self.exit_requested() {
                return self.exit_code();
            }
            if self.return_pending() {
                return status;
            }
            if status == 0 {
                if let Some(ok) = &p.if_ok {
                    status = self.run_chain(Some(ok), env, io);
                    env.set_status(status);
                }
            }
            if status != 0 {
                if let Some(fail) = &p.if_fail {
                    status = self.run_chain(Some(fail), env, io);
                    env.set_status(status);
                }
            }
            cur = p.next.as_deref();
        }
        status
    }

    fn run_single(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        if p.pipe_to.is_some() {
            return self.run_pipeline(p, env, io, false);
        }
        self.run_stage(p, env, io, false)
    }

    /// Starts a chain detached. The whole chain rooted at the node,
    /// including its pipeline and short-circuit edges, runs in the
    /// background; the launch itself reports status 0.
    fn start_background(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        let compound = p.if_ok.is_some() || p.if_fail.is_some();
        if p.pipe_to.is_some() && !compound {
            let r = self.detached();
            let mut owned = p.clone();
            owned.next = None;
            let env = env.clone();
            let io = io.clone();
            thread::spawn(move || {
                r.run_pipeline(&owned, &env, &io, true);
            });
            return 0;
        }
        if p.kind == PlanKind::Cmd && p.pipe_to.is_none() && !compound {
            return self.run_stage(p, env, io, true);
        }
        // a compound chain detaches whole: run it on its own thread,
        // against a child environment, with the terminal left alone
        let mut r = self.detached();
        r.interactive = false;
        let mut owned = p.clone();
        owned.next = None;
        owned.background = false;
        let env = env.child();
        let io = io.clone();
        thread::spawn(move || {
            r.run_chain(Some(&owned), &env, &io);
        });
        0
    }

    pub(crate) fn run_stage(&self, p: &ExecPlan, env: &Env, io: &Io, background: bool) -> i32 {
        if p.kind == PlanKind::Cmd {
            return self.run_command(p, env, io, background);
        }
        // non-command stages detach by running on their own thread,
        // against a child environment, the way a forked shell would
        if background {
            let r = self.detached();
            let mut owned = p.clone();
            owned.next = None;
            owned.background = false;
            let env = env.child();
            let io = io.clone();
            thread::spawn(move || {
                r.run_stage(&owned, &env, &io, false);
            });
            return 0;
        }
        let io = match self.apply_redirs(&p.redirs, io) {
            Ok(io) => io,
            Err(msg) => {
                self.report(io, &msg);
                return 1;
            }
        };
        match p.kind {
            PlanKind::Noop => 0,
            PlanKind::Assign => {
                let vals = match &p.assign_val {
                    Some(v) => crate::expand::expand_value(v, env, self),
                    None => Ok(Vec::new()),
                };
                match vals {
                    Ok(vals) => {
                        env.set(&p.assign_name, vals);
                        0
                    }
                    Err(e) => {
                        self.report(&io, &e.to_string());
                        1
                    }
                }
            }
            PlanKind::FnDef => {
                if let Some(body) = &p.func_body {
                    env.set_func(&p.func_name, body.clone());
                }
                0
            }
            PlanKind::FnRm => {
                env.unset_func(&p.func_name);
                0
            }
            PlanKind::Group => self.run_ast(p.group_body.as_ref(), env, &io),
            PlanKind::If => self.run_if(p, env, &io),
            PlanKind::IfNot => self.run_if_not(p, env, &io),
            PlanKind::For => self.run_for(p, env, &io),
            PlanKind::While => self.run_while(p, env, &io),
            PlanKind::Switch => self.run_switch(p, env, &io),
            PlanKind::Not => {
                if self.run_ast(p.not_body.as_ref(), env, &io) == 0 {
                    1
                } else {
                    0
                }
            }
            PlanKind::Subshell => {
                let child = env.child();
                self.run_ast(p.sub_body.as_ref(), &child, &io)
            }
            PlanKind::Match => self.run_match(p, env, &io),
            PlanKind::Cmd => unreachable!("handled above"),
        }
    }

    /// Plans and runs an AST fragment (control-form bodies, sourced
    /// files). Loop bodies come back through here on every iteration so
    /// their words re-expand.
    pub(crate) fn run_ast(&self, n: Option<&Node>, env: &Env, io: &Io) -> i32 {
        let Some(n) = n else { return 0 };
        match build_plan(n, env, self) {
            Ok(plan) => self.run_chain(Some(&plan), env, io),
            Err(e) => {
                self.report(io, &e.to_string());
                1
            }
        }
    }

    pub(crate) fn report(&self, io: &Io, msg: &str) {
        let _ = writeln!(io.stderr.writer(), "rc: {}", msg);
    }

    pub(crate) fn trace_argv(&self, io: &Io, argv: &[String]) {
        if self.trace {
            let _ = writeln!(io.stderr.writer(), "+ {}", argv.join(" "));
        }
    }

    pub(crate) fn last_if_status(&self) -> i32 {
        self.last_if.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_if_status(&self, status: i32) {
        self.last_if.store(status, Ordering::SeqCst);
    }
}

impl Executor for Runner {
    fn run_capture(&self, body: &Node, env: &Env) -> Result<Capture, ExpandError> {
        // captures run under their own exit/return sentinels, so `exit`
        // in a backquote body ends the capture, not the shell
        let sub = Runner {
            exit_requested: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(AtomicI32::new(0)),
            ret: Arc::new(Mutex::new(None)),
            last_if: Arc::new(AtomicI32::new(0)),
            ..self.clone()
        };
        let plan = build_plan(body, env, &sub).map_err(|e| ExpandError::Capture(e.to_string()))?;
        let (out, buf) = Stream::capture();
        let io = Io {
            stdin: Stream::Null,
            stdout: out,
            stderr: Stream::Stderr,
        };
        let status = sub.run_chain(Some(&plan), env, &io);
        let bytes = std::mem::take(&mut *buf.lock().unwrap());
        Ok(Capture { bytes, status })
    }
}
