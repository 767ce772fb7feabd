//! The job table and background reaping.
//!
//! One mutex (plus a condvar for waiters) owns the jobs, the next job
//! id, and the foreground pgid. Reaping happens on dedicated threads
//! that block on child waits and update job state on completion; `fg`
//! and `wait` sleep on the condvar rather than racing the reaper.

use super::command::wait_child;
use super::Runner;
use std::collections::BTreeMap;
use std::process::Child;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    #[allow(dead_code)]
    Stopped,
    Done,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Stopped => "stopped",
            JobState::Done => "done",
        }
    }
}

/// A background job: one process group, one or more pids.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u32,
    pub pgid: i32,
    pub pids: Vec<i32>,
    pub cmd: String,
    pub state: JobState,
    pub exit: i32,
    pub notified: bool,
}

pub(crate) struct JobTable {
    pub jobs: BTreeMap<u32, Job>,
    pub next_id: u32,
    pub fg_pgid: i32,
}

impl JobTable {
    pub fn new() -> JobTable {
        JobTable {
            jobs: BTreeMap::new(),
            next_id: 0,
            fg_pgid: 0,
        }
    }
}

impl Runner {
    pub(crate) fn add_job(&self, pgid: i32, pids: Vec<i32>, cmd: String) -> u32 {
        let (lock, _) = &*self.jobs;
        let mut table = lock.lock().unwrap();
        table.next_id += 1;
        let id = table.next_id;
        table.jobs.insert(
            id,
            Job {
                id,
                pgid,
                pids,
                cmd,
                state: JobState::Running,
                exit: 0,
                notified: false,
            },
        );
        id
    }

    pub(crate) fn mark_job_done(&self, id: u32, exit: i32) {
        let (lock, cv) = &*self.jobs;
        let mut table = lock.lock().unwrap();
        if let Some(job) = table.jobs.get_mut(&id) {
            job.state = JobState::Done;
            job.exit = exit;
            job.notified = false;
        }
        cv.notify_all();
    }

    /// Blocks until the job completes and returns its exit status. The
    /// job stays in the table; callers decide when to remove it.
    pub(crate) fn wait_job(&self, id: u32) -> i32 {
        let (lock, cv) = &*self.jobs;
        let mut table = lock.lock().unwrap();
        loop {
            match table.jobs.get(&id) {
                None => return 0,
                Some(job) if job.state == JobState::Done => return job.exit,
                Some(_) => table = cv.wait(table).unwrap(),
            }
        }
    }

    pub(crate) fn remove_job(&self, id: u32) {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().jobs.remove(&id);
    }

    pub(crate) fn get_job(&self, id: u32) -> Option<Job> {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().jobs.get(&id).cloned()
    }

    pub(crate) fn list_jobs(&self) -> Vec<Job> {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().jobs.values().cloned().collect()
    }

    pub(crate) fn job_ids(&self) -> Vec<u32> {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().jobs.keys().copied().collect()
    }

    pub(crate) fn last_job_id(&self) -> Option<u32> {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().jobs.keys().next_back().copied()
    }

    pub(crate) fn job_by_pid(&self, pid: i32) -> Option<Job> {
        let (lock, _) = &*self.jobs;
        let table = lock.lock().unwrap();
        table
            .jobs
            .values()
            .find(|j| j.pgid == pid || j.pids.contains(&pid))
            .cloned()
    }

    pub(crate) fn set_job_state(&self, id: u32, state: JobState) {
        let (lock, _) = &*self.jobs;
        if let Some(job) = lock.lock().unwrap().jobs.get_mut(&id) {
            job.state = state;
        }
    }

    /// Marks listed done jobs as notified and prunes notified ones, the
    /// bookkeeping behind the `jobs` builtin.
    pub(crate) fn notify_and_prune(&self) {
        let (lock, _) = &*self.jobs;
        let mut table = lock.lock().unwrap();
        for job in table.jobs.values_mut() {
            if job.state == JobState::Done {
                job.notified = true;
            }
        }
        table
            .jobs
            .retain(|_, job| !(job.state == JobState::Done && job.notified));
    }

    /// Appends a backgrounded pid to `$apid`.
    pub(crate) fn add_apid(&self, pid: i32) {
        let (lock, _) = &*self.jobs;
        let _guard = lock.lock().unwrap();
        let mut vals = self.env.get("apid").unwrap_or_default();
        vals.push(pid.to_string());
        self.env.set("apid", vals);
    }

    pub(crate) fn remove_apid(&self, pid: i32) {
        let (lock, _) = &*self.jobs;
        let _guard = lock.lock().unwrap();
        let pid = pid.to_string();
        let mut vals = self.env.get("apid").unwrap_or_default();
        vals.retain(|v| *v != pid);
        if vals.is_empty() {
            self.env.unset("apid");
        } else {
            self.env.set("apid", vals);
        }
    }

    /// Waits out a job's children on a dedicated thread. The job's exit
    /// is its last child's exit, matching the pipeline rule.
    pub(crate) fn spawn_reaper(
        &self,
        job_id: u32,
        children: Vec<Child>,
        pumps: Vec<JoinHandle<()>>,
    ) {
        let runner = self.clone();
        thread::spawn(move || {
            let mut exit = 0;
            for child in children {
                let pid = child.id() as i32;
                exit = wait_child(child);
                runner.remove_apid(pid);
            }
            for pump in pumps {
                let _ = pump.join();
            }
            runner.mark_job_done(job_id, exit);
        });
    }

    /// The current foreground pgid, 0 when the shell owns the terminal.
    pub fn foreground(&self) -> i32 {
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().fg_pgid
    }

    pub(crate) fn attach_foreground(&self, pid: i32) {
        if !self.interactive || self.tty_fd <= 0 {
            return;
        }
        if let Some(pgid) = crate::terminal::pgid_of(pid) {
            self.attach_foreground_pgid(pgid);
        }
    }

    pub(crate) fn attach_foreground_pgid(&self, pgid: i32) {
        if !self.interactive || self.tty_fd <= 0 {
            return;
        }
        if crate::terminal::set_foreground(self.tty_fd, pgid).is_err() {
            return;
        }
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().fg_pgid = pgid;
    }

    pub(crate) fn restore_foreground(&self) {
        if self.interactive && self.tty_fd > 0 {
            let shell = self.shell_pgid();
            if shell != 0 {
                let _ = crate::terminal::set_foreground(self.tty_fd, shell);
            }
        }
        let (lock, _) = &*self.jobs;
        lock.lock().unwrap().fg_pgid = 0;
    }
}
