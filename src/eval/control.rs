//! Control forms: if, while, for, switch, and the `~` match.
//!
//! Control plans carry their sub-ASTs and re-plan them on demand:
//! loop bodies re-expand per iteration, and subshell and function
//! bodies plan against their child environments.

use super::Runner;
use crate::env::Env;
use crate::expand::{expand_word_no_glob, expand_words_no_glob};
use crate::pattern::{match_any_pattern, switch_cases};
use crate::plan::ExecPlan;
use crate::stream::Io;

impl Runner {
    pub(crate) fn run_if(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        let cond = self.run_ast(p.if_cond.as_ref(), env, io);
        let status = if cond == 0 {
            self.run_ast(p.if_body.as_ref(), env, io)
        } else if p.if_else.is_some() {
            self.run_ast(p.if_else.as_ref(), env, io)
        } else {
            cond
        };
        // recorded after the body so an if nested inside the body cannot
        // leak into a following `if not`
        self.set_last_if_status(cond);
        status
    }

    pub(crate) fn run_if_not(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        if self.last_if_status() != 0 {
            self.run_ast(p.if_body.as_ref(), env, io)
        } else {
            0
        }
    }

    pub(crate) fn run_for(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        if p.for_name.is_empty() {
            return 1;
        }
        let list = match &p.for_list {
            Some(n) => match expand_words_no_glob(n, env, self) {
                Ok(vals) => vals,
                Err(e) => {
                    self.report(io, &e.to_string());
                    return 1;
                }
            },
            None => env.get("*").unwrap_or_default(),
        };
        let mut status = 0;
        for val in list {
            env.set(&p.for_name, vec![val]);
            status = self.run_ast(p.for_body.as_ref(), env, io);
            env.set_status(status);
            if self.exit_requested() || self.return_pending() {
                break;
            }
        }
        status
    }

    pub(crate) fn run_while(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        let mut status = 0;
        loop {
            if self.exit_requested() || self.return_pending() {
                return status;
            }
            let cond = self.run_ast(p.while_cond.as_ref(), env, io);
            if cond != 0 {
                return status;
            }
            status = self.run_ast(p.while_body.as_ref(), env, io);
            env.set_status(status);
        }
    }

    pub(crate) fn run_switch(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        let subject = match &p.switch_arg {
            Some(n) => match expand_word_no_glob(n, env, self) {
                Ok(vals) => vals.into_iter().next().unwrap_or_default(),
                Err(e) => {
                    self.report(io, &e.to_string());
                    return 1;
                }
            },
            None => String::new(),
        };
        let Some(body) = &p.switch_body else {
            return 0;
        };
        let cases = match switch_cases(body, env, self) {
            Ok(cases) => cases,
            Err(e) => {
                self.report(io, &e.to_string());
                return 1;
            }
        };
        let mut status = 0;
        let mut matched = false;
        for case in &cases {
            // once a case matches every later block runs too; a case
            // with no patterns is the default
            if !matched && (case.patterns.is_empty() || match_any_pattern(&subject, &case.patterns))
            {
                matched = true;
            }
            if matched {
                status = self.run_ast(case.body.as_ref(), env, io);
                env.set_status(status);
            }
        }
        status
    }

    pub(crate) fn run_match(&self, p: &ExecPlan, env: &Env, io: &Io) -> i32 {
        let subjects = match &p.match_subj {
            Some(n) => match expand_word_no_glob(n, env, self) {
                Ok(vals) => vals,
                Err(e) => {
                    self.report(io, &e.to_string());
                    return 1;
                }
            },
            None => return 1,
        };
        let patterns = match &p.match_pats {
            Some(n) => match expand_words_no_glob(n, env, self) {
                Ok(vals) => vals,
                Err(e) => {
                    self.report(io, &e.to_string());
                    return 1;
                }
            },
            None => return 1,
        };
        if subjects.is_empty() || patterns.is_empty() {
            return 1;
        }
        for subject in &subjects {
            if match_any_pattern(subject, &patterns) {
                return 0;
            }
        }
        1
    }
}
