//! Lowering the AST into an execution plan.
//!
//! An [`ExecPlan`] graph is a chain of stages joined by four kinds of
//! control edge: `next` (sequence), `pipe_to` (pipeline), `if_ok` and
//! `if_fail` (short-circuit). `next`/`if_ok`/`if_fail` always attach to
//! the tail of a chain; `pipe_to` always attaches to the pipe-tail of the
//! current stage, keeping pipelines linear. Argv expansion is deferred:
//! the plan carries the raw call node and the runner re-expands per
//! execution, so assignment prefixes and loop variables take effect.
//! Control forms carry their sub-ASTs and are re-planned on demand.

use crate::ast::{Node, NodeKind};
use crate::env::Env;
use crate::expand::{expand_word, Executor, ExpandError};
use crate::lexer::RedirOp;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("assignment prefixes require a simple command")]
    PrefixOnNonCommand,
    #[error("cannot lower {0:?} node")]
    Unsupported(NodeKind),
    #[error(transparent)]
    Expand(#[from] ExpandError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanKind {
    Cmd,
    #[default]
    Noop,
    Assign,
    FnDef,
    FnRm,
    Group,
    If,
    IfNot,
    For,
    While,
    Switch,
    Not,
    Subshell,
    Match,
}

/// A normalized redirection descriptor. `fd < 0` means "default for op".
#[derive(Debug, Clone, PartialEq)]
pub enum RedirSpec {
    File {
        op: RedirOp,
        fd: i32,
        target: Vec<String>,
    },
    /// `src < 0` encodes close.
    Dup { fd: i32, src: i32 },
}

/// An `x=v` pair hoisted off a command; the value node is expanded in the
/// command's ephemeral environment at execution time.
#[derive(Debug, Clone)]
pub struct AssignPrefix {
    pub name: String,
    pub value: Node,
}

/// One plan node. A node may simultaneously carry all four control edges.
#[derive(Debug, Clone, Default)]
pub struct ExecPlan {
    pub kind: PlanKind,
    pub call: Option<Node>,
    pub prefix: Vec<AssignPrefix>,
    pub redirs: Vec<RedirSpec>,
    pub next: Option<Box<ExecPlan>>,
    pub pipe_to: Option<Box<ExecPlan>>,
    pub if_ok: Option<Box<ExecPlan>>,
    pub if_fail: Option<Box<ExecPlan>>,
    pub background: bool,
    /// Which of this stage's fds feeds the pipe, and which fd of the
    /// next stage reads it. Meaningful only when `pipe_to` is set.
    pub pipe_out_fd: i32,
    pub pipe_in_fd: i32,
    pub func_name: String,
    pub func_body: Option<Node>,
    pub assign_name: String,
    pub assign_val: Option<Node>,
    pub if_cond: Option<Node>,
    pub if_body: Option<Node>,
    pub if_else: Option<Node>,
    pub for_name: String,
    pub for_list: Option<Node>,
    pub for_body: Option<Node>,
    pub while_cond: Option<Node>,
    pub while_body: Option<Node>,
    pub switch_arg: Option<Node>,
    pub switch_body: Option<Node>,
    pub not_body: Option<Node>,
    pub sub_body: Option<Node>,
    pub match_subj: Option<Node>,
    pub match_pats: Option<Node>,
    pub group_body: Option<Node>,
}

impl ExecPlan {
    pub fn new(kind: PlanKind) -> ExecPlan {
        ExecPlan {
            kind,
            ..Default::default()
        }
    }
}

/// Lowers a parsed program into a plan. `None` input (empty program)
/// lowers to `None`.
pub fn build_plan_opt(
    ast: Option<&Node>,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Option<ExecPlan>, PlanError> {
    match ast {
        Some(n) => Ok(Some(build_plan(n, env, exec)?)),
        None => Ok(None),
    }
}

pub fn build_plan(ast: &Node, env: &Env, exec: &dyn Executor) -> Result<ExecPlan, PlanError> {
    match ast.kind {
        NodeKind::Seq => {
            let left = build_plan_opt(ast.left_ref(), env, exec)?;
            let right = build_plan_opt(ast.right_ref(), env, exec)?;
            match (left, right) {
                (Some(mut l), Some(r)) => {
                    attach_next(&mut l, r);
                    Ok(l)
                }
                (Some(l), None) => Ok(l),
                (None, Some(r)) => Ok(r),
                (None, None) => Ok(ExecPlan::new(PlanKind::Noop)),
            }
        }
        NodeKind::Pipe => {
            let left_node = ast.left_ref().ok_or(PlanError::Unsupported(ast.kind))?;
            let right_node = ast.right_ref().ok_or(PlanError::Unsupported(ast.kind))?;
            let mut left = plan_pipe_stage(left_node, env, exec)?;
            let right = plan_pipe_stage(right_node, env, exec)?;
            attach_pipe(&mut left, right, ast.i1, ast.i2);
            Ok(left)
        }
        NodeKind::Bg => {
            let mut plan =
                build_plan(ast.left_ref().ok_or(PlanError::Unsupported(ast.kind))?, env, exec)?;
            plan.background = true;
            Ok(plan)
        }
        NodeKind::And | NodeKind::Or => {
            let mut left =
                build_plan(ast.left_ref().ok_or(PlanError::Unsupported(ast.kind))?, env, exec)?;
            let right =
                build_plan(ast.right_ref().ok_or(PlanError::Unsupported(ast.kind))?, env, exec)?;
            if ast.kind == NodeKind::And {
                attach_if_ok(&mut left, right);
            } else {
                attach_if_fail(&mut left, right);
            }
            Ok(left)
        }
        NodeKind::Brace => match ast.right_ref() {
            None => match ast.left_ref() {
                Some(inner) => build_plan(inner, env, exec),
                None => Ok(ExecPlan::new(PlanKind::Noop)),
            },
            Some(epilog) => {
                // the epilog scopes over the whole group: open once,
                // share across every command inside
                let mut plan = ExecPlan::new(PlanKind::Group);
                plan.group_body = ast.left_ref().cloned();
                apply_redirs_from_node(&mut plan, epilog, env, exec)?;
                Ok(plan)
            }
        },
        NodeKind::If => {
            let mut plan = ExecPlan::new(PlanKind::If);
            plan.if_cond = ast.left_ref().cloned();
            match ast.right_ref() {
                Some(arm) if arm.kind == NodeKind::Else => {
                    plan.if_body = arm.left_ref().cloned();
                    plan.if_else = arm.right_ref().cloned();
                }
                other => plan.if_body = other.cloned(),
            }
            Ok(plan)
        }
        NodeKind::IfNot => {
            let mut plan = ExecPlan::new(PlanKind::IfNot);
            plan.if_body = ast.left_ref().cloned();
            Ok(plan)
        }
        NodeKind::While => {
            let mut plan = ExecPlan::new(PlanKind::While);
            plan.while_cond = ast.left_ref().cloned();
            plan.while_body = ast.right_ref().cloned();
            Ok(plan)
        }
        NodeKind::For => {
            let mut plan = ExecPlan::new(PlanKind::For);
            plan.for_name = ast
                .left_ref()
                .map(|n| n.tok.clone())
                .unwrap_or_default();
            if ast.i1 == 1 {
                plan.for_list = Some(Node::list_of(NodeKind::Words, ast.list.clone()));
            }
            plan.for_body = ast.right_ref().cloned();
            Ok(plan)
        }
        NodeKind::Switch => {
            let mut plan = ExecPlan::new(PlanKind::Switch);
            plan.switch_arg = ast.left_ref().cloned();
            plan.switch_body = ast.right_ref().cloned();
            Ok(plan)
        }
        NodeKind::Bang => {
            let mut plan = ExecPlan::new(PlanKind::Not);
            plan.not_body = ast.left_ref().cloned();
            Ok(plan)
        }
        NodeKind::Subshell => {
            let mut plan = ExecPlan::new(PlanKind::Subshell);
            plan.sub_body = ast.left_ref().cloned();
            Ok(plan)
        }
        NodeKind::Match => {
            let mut plan = ExecPlan::new(PlanKind::Match);
            plan.match_subj = ast.left_ref().cloned();
            plan.match_pats = ast.right_ref().cloned();
            Ok(plan)
        }
        NodeKind::FnDef => {
            let mut plan = ExecPlan::new(PlanKind::FnDef);
            plan.func_name = ast
                .left_ref()
                .map(|n| n.tok.clone())
                .unwrap_or_default();
            plan.func_body = ast.right_ref().cloned();
            if plan.func_name.is_empty() {
                return Ok(ExecPlan::new(PlanKind::Noop));
            }
            Ok(plan)
        }
        NodeKind::FnRm => {
            let mut plan = ExecPlan::new(PlanKind::FnRm);
            plan.func_name = ast
                .left_ref()
                .map(|n| n.tok.clone())
                .unwrap_or_default();
            if plan.func_name.is_empty() {
                return Ok(ExecPlan::new(PlanKind::Noop));
            }
            Ok(plan)
        }
        NodeKind::Assign => {
            let mut plan = ExecPlan::new(PlanKind::Assign);
            plan.assign_name = ast
                .left_ref()
                .map(|n| n.tok.clone())
                .unwrap_or_default();
            plan.assign_val = ast.right_ref().cloned();
            Ok(plan)
        }
        NodeKind::Call => {
            let mut plan = ExecPlan::new(PlanKind::Cmd);
            plan.call = Some(ast.clone());
            if let Some(epilog) = ast.right_ref() {
                apply_redirs_from_node(&mut plan, epilog, env, exec)?;
            }
            Ok(plan)
        }
        NodeKind::Pre => build_plan_pre(ast, env, exec),
        _ => Err(PlanError::Unsupported(ast.kind)),
    }
}

fn build_plan_pre(ast: &Node, env: &Env, exec: &dyn Executor) -> Result<ExecPlan, PlanError> {
    let (prefixes, redirs, rest) = split_pre(ast);
    let mut plan = match rest {
        None => {
            // an all-prefix line: the assignments execute in order
            let mut head: Option<ExecPlan> = None;
            for pref in &prefixes {
                let mut node = ExecPlan::new(PlanKind::Assign);
                node.assign_name = pref.name.clone();
                node.assign_val = Some(pref.value.clone());
                head = Some(match head {
                    None => node,
                    Some(mut h) => {
                        attach_next(&mut h, node);
                        h
                    }
                });
            }
            head.unwrap_or_else(|| ExecPlan::new(PlanKind::Noop))
        }
        Some(rest) => {
            let mut plan = build_plan(rest, env, exec)?;
            if !prefixes.is_empty() {
                if plan.kind != PlanKind::Cmd {
                    return Err(PlanError::PrefixOnNonCommand);
                }
                let mut all = prefixes.clone();
                all.extend(plan.prefix);
                plan.prefix = all;
            }
            plan
        }
    };
    for r in redirs {
        apply_redirs_from_node(&mut plan, r, env, exec)?;
    }
    Ok(plan)
}

fn split_pre(ast: &Node) -> (Vec<AssignPrefix>, Vec<&Node>, Option<&Node>) {
    let mut prefixes = Vec::new();
    let mut redirs = Vec::new();
    let mut cur = ast;
    loop {
        if cur.kind != NodeKind::Pre {
            return (prefixes, redirs, Some(cur));
        }
        if let Some(left) = cur.left_ref() {
            match left.kind {
                NodeKind::Assign => {
                    if let Some(name) = left.left_ref().map(|n| n.tok.clone()) {
                        if let Some(value) = left.right_ref() {
                            prefixes.push(AssignPrefix {
                                name,
                                value: value.clone(),
                            });
                        }
                    }
                }
                NodeKind::Redir | NodeKind::Dup => redirs.push(left),
                _ => {}
            }
        }
        match cur.right_ref() {
            Some(rest) => cur = rest,
            None => return (prefixes, redirs, None),
        }
    }
}

/// Folds a redirection node (or an epilog list of them) onto a plan.
/// File targets are expanded, with glob, at plan time; the first match
/// is the target.
fn apply_redirs_from_node(
    plan: &mut ExecPlan,
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<(), PlanError> {
    match n.kind {
        NodeKind::Epilog => {
            for child in &n.list {
                apply_redirs_from_node(plan, child, env, exec)?;
            }
            Ok(())
        }
        NodeKind::Redir => {
            let op = RedirOp::from_token(&n.tok).ok_or(PlanError::Unsupported(n.kind))?;
            let target = match n.right_ref() {
                Some(w) => expand_word(w, env, exec)?,
                None => Vec::new(),
            };
            plan.redirs.push(RedirSpec::File {
                op,
                fd: n.i1,
                target,
            });
            Ok(())
        }
        NodeKind::Dup => {
            plan.redirs.push(RedirSpec::Dup {
                fd: n.i1,
                src: n.i2,
            });
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Plans one pipeline stage. A stage that lowered to a multi-command
/// chain is wrapped in a Group so the whole chain feeds the pipe.
fn plan_pipe_stage(n: &Node, env: &Env, exec: &dyn Executor) -> Result<ExecPlan, PlanError> {
    let plan = build_plan(n, env, exec)?;
    if plan.next.is_some() {
        let mut group = ExecPlan::new(PlanKind::Group);
        group.group_body = Some(n.clone());
        return Ok(group);
    }
    Ok(plan)
}

fn attach_next(p: &mut ExecPlan, right: ExecPlan) {
    match &mut p.next {
        Some(n) => attach_next(n, right),
        None => p.next = Some(Box::new(right)),
    }
}

fn attach_if_ok(p: &mut ExecPlan, right: ExecPlan) {
    match &mut p.next {
        Some(n) => attach_if_ok(n, right),
        None => p.if_ok = Some(Box::new(right)),
    }
}

fn attach_if_fail(p: &mut ExecPlan, right: ExecPlan) {
    match &mut p.next {
        Some(n) => attach_if_fail(n, right),
        None => p.if_fail = Some(Box::new(right)),
    }
}

fn attach_pipe(p: &mut ExecPlan, right: ExecPlan, out_fd: i32, in_fd: i32) {
    match &mut p.pipe_to {
        Some(n) => attach_pipe(n, right, out_fd, in_fd),
        None => {
            p.pipe_out_fd = out_fd;
            p.pipe_in_fd = in_fd;
            p.pipe_to = Some(Box::new(right));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::Capture;
    use crate::parser::parse;

    struct NullExec;

    impl Executor for NullExec {
        fn run_capture(&self, _body: &Node, _env: &Env) -> Result<Capture, ExpandError> {
            Ok(Capture {
                bytes: Vec::new(),
                status: 0,
            })
        }
    }

    fn plan(src: &str) -> ExecPlan {
        let ast = parse(src).unwrap().unwrap();
        build_plan(&ast, &Env::new(), &NullExec).unwrap()
    }

    #[test]
    fn plan_empty_is_none() {
        let env = Env::new();
        assert!(build_plan_opt(parse("# nothing\n").unwrap().as_ref(), &env, &NullExec)
            .unwrap()
            .is_none());
    }

    #[test]
    fn plan_seq_links_next() {
        let p = plan("a; b; c");
        assert_eq!(p.kind, PlanKind::Cmd);
        let second = p.next.as_ref().unwrap();
        let third = second.next.as_ref().unwrap();
        assert!(third.next.is_none());
    }

    #[test]
    fn plan_pipe_is_right_leaning() {
        let p = plan("a | b | c");
        assert_eq!(p.kind, PlanKind::Cmd);
        let b = p.pipe_to.as_ref().unwrap();
        let c = b.pipe_to.as_ref().unwrap();
        assert!(c.pipe_to.is_none());
        assert!(p.next.is_none());
        assert!(b.next.is_none());
    }

    #[test]
    fn plan_pipe_fds() {
        let p = plan("a |[2] b");
        assert_eq!(p.pipe_out_fd, 2);
        assert_eq!(p.pipe_in_fd, 0);
    }

    #[test]
    fn plan_andor_attaches_to_tail() {
        let p = plan("a; b && c");
        let b = p.next.as_ref().unwrap();
        assert!(b.if_ok.is_some());
        assert!(p.if_ok.is_none());
        let p = plan("a || b");
        assert!(p.if_fail.is_some());
    }

    #[test]
    fn plan_background_marks_head() {
        let p = plan("a | b &");
        assert!(p.background);
        assert!(!p.pipe_to.as_ref().unwrap().background);
    }

    #[test]
    fn plan_assignment_standalone() {
        let p = plan("x=(a b)");
        assert_eq!(p.kind, PlanKind::Assign);
        assert_eq!(p.assign_name, "x");
    }

    #[test]
    fn plan_assignment_prefix_hoisted() {
        let p = plan("x=v cmd");
        assert_eq!(p.kind, PlanKind::Cmd);
        assert_eq!(p.prefix.len(), 1);
        assert_eq!(p.prefix[0].name, "x");
    }

    #[test]
    fn plan_prefix_on_control_form_fails() {
        let ast = parse("x=v if (a) b").unwrap().unwrap();
        assert!(matches!(
            build_plan(&ast, &Env::new(), &NullExec),
            Err(PlanError::PrefixOnNonCommand)
        ));
    }

    #[test]
    fn plan_redir_default_fd() {
        let p = plan("cmd > /tmp/out");
        assert_eq!(
            p.redirs,
            vec![RedirSpec::File {
                op: RedirOp::Out,
                fd: -1,
                target: vec!["/tmp/out".to_string()],
            }]
        );
    }

    #[test]
    fn plan_dup_close() {
        let p = plan("cmd >[2=]");
        assert_eq!(p.redirs, vec![RedirSpec::Dup { fd: 2, src: -1 }]);
    }

    #[test]
    fn plan_redirs_keep_source_order() {
        let p = plan("> a cmd >> b");
        assert_eq!(p.redirs.len(), 2);
        assert!(matches!(
            p.redirs[1],
            RedirSpec::File {
                op: RedirOp::Append,
                ..
            }
        ));
    }

    #[test]
    fn plan_brace_inlines_without_epilog() {
        let p = plan("{ a; b }");
        assert_eq!(p.kind, PlanKind::Cmd);
        assert!(p.next.is_some());
    }

    #[test]
    fn plan_brace_with_epilog_is_group() {
        let p = plan("{ a; b } > /tmp/out");
        assert_eq!(p.kind, PlanKind::Group);
        assert!(p.group_body.is_some());
        assert_eq!(p.redirs.len(), 1);
    }

    #[test]
    fn plan_multi_command_pipe_stage_is_group() {
        let p = plan("{ a; b } | c");
        assert_eq!(p.kind, PlanKind::Group);
        assert!(p.pipe_to.is_some());
    }

    #[test]
    fn plan_control_forms_carry_asts() {
        let p = plan("if (a) b else c");
        assert_eq!(p.kind, PlanKind::If);
        assert!(p.if_cond.is_some() && p.if_body.is_some() && p.if_else.is_some());
        let p = plan("while (a) b");
        assert!(p.while_cond.is_some() && p.while_body.is_some());
        let p = plan("for(x in a b) c");
        assert_eq!(p.for_name, "x");
        assert!(p.for_list.is_some());
        let p = plan("for(x) c");
        assert!(p.for_list.is_none());
        let p = plan("@ cmd");
        assert_eq!(p.kind, PlanKind::Subshell);
        let p = plan("! cmd");
        assert_eq!(p.kind, PlanKind::Not);
    }

    #[test]
    fn plan_fn_def_and_rm() {
        let p = plan("fn f { echo }");
        assert_eq!(p.kind, PlanKind::FnDef);
        assert_eq!(p.func_name, "f");
        let p = plan("fn f");
        assert_eq!(p.kind, PlanKind::FnRm);
    }

    #[test]
    fn plan_prefix_redir_on_control_form_is_allowed() {
        let p = plan("> /tmp/out if (a) b");
        assert_eq!(p.kind, PlanKind::If);
        assert_eq!(p.redirs.len(), 1);
    }
}
