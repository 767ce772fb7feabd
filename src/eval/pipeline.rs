//! Pipelines.
//!
//! A pipeline whose stages are all external commands runs over real OS
//! pipes, with every child in one process group led by the first pid.
//! As soon as any stage is a builtin, user function, or group, the
//! whole pipeline falls back to in-process execution: stages run as
//! concurrent scoped threads connected by OS pipes. Either way the
//! pipeline's status is the right-most stage's status.

use super::command::wait_child;
use super::{path, Runner};
use crate::env::Env;
use crate::expand::expand_call;
use crate::plan::{ExecPlan, PlanKind};
use crate::stream::{spawn_command, Io, Stream};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};
use std::thread;

/// A stage that can run as a real child process: expanded argv plus the
/// environment its prefixes built.
struct Prep {
    argv: Vec<String>,
    env: Env,
}

enum Prepared {
    External(Prep),
    InProcess,
    Failed(String),
}

impl Runner {
    pub(crate) fn run_pipeline(&self, head: &ExecPlan, env: &Env, io: &Io, background: bool) -> i32 {
        let mut stages = vec![head];
        let mut cur = head;
        while let Some(next) = cur.pipe_to.as_deref() {
            stages.push(next);
            cur = next;
        }

        let mut preps = Vec::with_capacity(stages.len());
        for stage in &stages {
            match self.prepare_external(stage, env) {
                Prepared::External(prep) => preps.push(prep),
                Prepared::InProcess => {
                    return self.run_pipe_fallback(&stages, env, io, background);
                }
                Prepared::Failed(msg) => {
                    self.report(io, &msg);
                    return 1;
                }
            }
        }
        self.run_pipe_external(&stages, &preps, io, background)
    }

    /// Decides whether a stage can be a real child process. Builtins,
    /// functions, groups, control forms, and empty argv all force the
    /// in-process path.
    fn prepare_external(&self, p: &ExecPlan, env: &Env) -> Prepared {
        if p.kind != PlanKind::Cmd {
            return Prepared::InProcess;
        }
        let exec_env = if p.prefix.is_empty() {
            env.clone()
        } else {
            let child = env.child();
            for pref in &p.prefix {
                match crate::expand::expand_value(&pref.value, &child, self) {
                    Ok(vals) => child.set(&pref.name, vals),
                    Err(e) => return Prepared::Failed(e.to_string()),
                }
            }
            child
        };
        let argv = match &p.call {
            Some(call) => match expand_call(call, &exec_env, self) {
                Ok(argv) => argv,
                Err(e) => return Prepared::Failed(e.to_string()),
            },
            None => Vec::new(),
        };
        if argv.is_empty() {
            return Prepared::InProcess;
        }
        if exec_env.get_func(&argv[0]).is_some() || super::builtins::lookup(&argv[0]).is_some() {
            return Prepared::InProcess;
        }
        Prepared::External(Prep {
            argv,
            env: exec_env,
        })
    }

    fn run_pipe_external(
        &self,
        stages: &[&ExecPlan],
        preps: &[Prep],
        io: &Io,
        background: bool,
    ) -> i32 {
        let mut children: Vec<Child> = Vec::with_capacity(stages.len());
        let mut pumps = Vec::new();
        let mut leader = 0;
        let mut prev_read: Option<Stream> = None;
        for (i, (stage, prep)) in stages.iter().zip(preps.iter()).enumerate() {
            let last = i == stages.len() - 1;
            let mut sio = io.clone();
            if let Some(read) = prev_read.take() {
                sio.stdin = read;
            }
            if !last {
                let (read, write) = match Stream::pipe() {
                    Ok(ends) => ends,
                    Err(e) => {
                        self.report(io, &format!("pipe: {}", e));
                        kill_started(&mut children);
                        return 1;
                    }
                };
                let out_fd = if stage.pipe_out_fd >= 2 {
                    stage.pipe_out_fd
                } else {
                    1
                };
                if !sio.set_fd(out_fd, write) {
                    self.report(io, &format!("unsupported fd {}", out_fd));
                    kill_started(&mut children);
                    return 1;
                }
                prev_read = Some(read);
            }
            let sio = match self.apply_redirs(&stage.redirs, &sio) {
                Ok(sio) => sio,
                Err(msg) => {
                    self.report(io, &msg);
                    kill_started(&mut children);
                    return 1;
                }
            };
            self.trace_argv(io, &prep.argv);
            let Some(path) = path::resolve_path(&prep.argv[0], &prep.env) else {
                self.report(io, &format!("cannot find '{}'", prep.argv[0]));
                kill_started(&mut children);
                return 127;
            };
            let mut cmd = Command::new(path);
            cmd.args(&prep.argv[1..]);
            cmd.process_group(if i == 0 { 0 } else { leader });
            match spawn_command(&mut cmd, &sio) {
                Ok((child, mut child_pumps)) => {
                    if i == 0 {
                        leader = child.id() as i32;
                    }
                    children.push(child);
                    pumps.append(&mut child_pumps);
                }
                Err(e) => {
                    self.report(io, &format!("{}: {}", prep.argv[0], e));
                    kill_started(&mut children);
                    return 127;
                }
            }
        }

        if background {
            let pids: Vec<i32> = children.iter().map(|c| c.id() as i32).collect();
            let cmd_line = preps
                .iter()
                .map(|p| p.argv.join(" "))
                .collect::<Vec<_>>()
                .join(" | ");
            let job_id = self.add_job(leader, pids.clone(), cmd_line);
            for pid in pids {
                self.add_apid(pid);
            }
            self.spawn_reaper(job_id, children, pumps);
            return 0;
        }

        self.attach_foreground_pgid(leader);
        let mut status = 0;
        for child in children {
            status = wait_child(child);
        }
        for pump in pumps {
            let _ = pump.join();
        }
        self.restore_foreground();
        status
    }

    /// In-process pipeline: the left stage runs on a scoped thread, the
    /// rest of the chain runs here, joined on completion. The write end
    /// closes the moment the left stage finishes so the reader sees EOF.
    fn run_pipe_fallback(
        &self,
        stages: &[&ExecPlan],
        env: &Env,
        io: &Io,
        background: bool,
    ) -> i32 {
        let (&left, rest) = stages.split_first().expect("non-empty pipeline");
        if rest.is_empty() {
            return self.run_stage(left, env, io, background);
        }
        let (read, write) = match Stream::pipe() {
            Ok(ends) => ends,
            Err(e) => {
                self.report(io, &format!("pipe: {}", e));
                return 1;
            }
        };
        let out_fd = if left.pipe_out_fd >= 2 {
            left.pipe_out_fd
        } else {
            1
        };
        let mut left_io = io.clone();
        if !left_io.set_fd(out_fd, write.clone()) {
            self.report(io, &format!("unsupported fd {}", out_fd));
            return 1;
        }
        let right_io = io.with_stdin(read.clone());
        thread::scope(|scope| {
            let left_handle = scope.spawn(|| {
                let status = self.run_stage(left, env, &left_io, background);
                write.close_pipe();
                status
            });
            let status = self.run_pipe_fallback(rest, env, &right_io, background);
            // dropping the read end first unblocks a left stage still
            // writing into a full pipe
            read.close_pipe();
            let _ = left_handle.join();
            status
        })
    }
}

fn kill_started(children: &mut Vec<Child>) {
    for mut child in children.drain(..) {
        let _ = child.kill();
        let _ = child.wait();
    }
}
