//! Readable rendering of execution plans, behind the `-p` flag.

use crate::ast::{preorder_words, Node};
use crate::plan::{ExecPlan, PlanKind, RedirSpec};
use std::fmt::Write;

/// Renders a plan graph, one `- KIND …` line per node with the four
/// control edges indented beneath.
pub fn dump_plan(p: &ExecPlan) -> String {
    let mut out = String::new();
    dump(&mut out, p, 0);
    out
}

fn dump(out: &mut String, p: &ExecPlan, indent: usize) {
    let pad = " ".repeat(indent);
    let _ = writeln!(out, "{}- {}", pad, plan_line(p));
    if let Some(pipe) = &p.pipe_to {
        let _ = writeln!(out, "{}  PIPE->", pad);
        dump(out, pipe, indent + 4);
    }
    if let Some(ok) = &p.if_ok {
        let _ = writeln!(out, "{}  IFOK->", pad);
        dump(out, ok, indent + 4);
    }
    if let Some(fail) = &p.if_fail {
        let _ = writeln!(out, "{}  IFFAIL->", pad);
        dump(out, fail, indent + 4);
    }
    if let Some(next) = &p.next {
        let _ = writeln!(out, "{}  NEXT->", pad);
        dump(out, next, indent + 4);
    }
}

fn plan_line(p: &ExecPlan) -> String {
    let mut parts = vec![kind_name(p.kind).to_string()];
    if let Some(call) = &p.call {
        let words = call_words(call);
        if !words.is_empty() {
            parts.push(format!("argv={}", words.join(" ")));
        }
    }
    if !p.prefix.is_empty() {
        let names: Vec<&str> = p.prefix.iter().map(|pr| pr.name.as_str()).collect();
        parts.push(format!("prefix={}", names.join(",")));
    }
    if !p.assign_name.is_empty() {
        parts.push(format!("assign={}", p.assign_name));
    }
    if !p.func_name.is_empty() {
        parts.push(format!("func={}", p.func_name));
    }
    if !p.for_name.is_empty() {
        parts.push(format!("var={}", p.for_name));
    }
    if p.background {
        parts.push("bg".to_string());
    }
    if !p.redirs.is_empty() {
        parts.push(format!("redirs={}", format_redirs(&p.redirs)));
    }
    parts.join(" ")
}

fn call_words(call: &Node) -> Vec<String> {
    match call.left_ref() {
        Some(args) => preorder_words(args),
        None => Vec::new(),
    }
}

fn kind_name(kind: PlanKind) -> &'static str {
    match kind {
        PlanKind::Cmd => "CMD",
        PlanKind::Noop => "NOOP",
        PlanKind::Assign => "ASSIGN",
        PlanKind::FnDef => "FNDEF",
        PlanKind::FnRm => "FNRM",
        PlanKind::Group => "GROUP",
        PlanKind::If => "IF",
        PlanKind::IfNot => "IFNOT",
        PlanKind::For => "FOR",
        PlanKind::While => "WHILE",
        PlanKind::Switch => "SWITCH",
        PlanKind::Not => "NOT",
        PlanKind::Subshell => "SUBSHELL",
        PlanKind::Match => "MATCH",
    }
}

fn format_redirs(redirs: &[RedirSpec]) -> String {
    let mut parts = Vec::new();
    for r in redirs {
        match r {
            RedirSpec::Dup { fd, src } if *src < 0 => parts.push(format!("dup:{}=", fd)),
            RedirSpec::Dup { fd, src } => parts.push(format!("dup:{}={}", fd, src)),
            RedirSpec::File { op, fd, target } => {
                let fd = if *fd >= 0 {
                    fd.to_string()
                } else {
                    String::new()
                };
                parts.push(format!("{}{}:{}", fd, op.as_str(), target.join(",")));
            }
        }
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::expand::{Capture, Executor, ExpandError};
    use crate::parser::parse;
    use crate::plan::build_plan;

    struct NullExec;

    impl Executor for NullExec {
        fn run_capture(
            &self,
            _body: &Node,
            _env: &Env,
        ) -> Result<Capture, ExpandError> {
            Ok(Capture {
                bytes: Vec::new(),
                status: 0,
            })
        }
    }

    fn dump_of(src: &str) -> String {
        let ast = parse(src).unwrap().unwrap();
        dump_plan(&build_plan(&ast, &Env::new(), &NullExec).unwrap())
    }

    #[test]
    fn dump_simple_command() {
        let out = dump_of("echo hi > /tmp/x");
        assert!(out.contains("CMD"));
        assert!(out.contains("argv=echo hi"));
        assert!(out.contains("redirs=>:/tmp/x"));
    }

    #[test]
    fn dump_shows_edges() {
        let out = dump_of("a | b && c; d");
        assert!(out.contains("PIPE->"));
        assert!(out.contains("IFOK->"));
        assert!(out.contains("NEXT->"));
    }

    #[test]
    fn dump_dup_forms() {
        let out = dump_of("cmd >[2=1] >[1=]");
        assert!(out.contains("dup:2=1"));
        assert!(out.contains("dup:1="));
    }

    #[test]
    fn dump_assign_and_prefix() {
        assert!(dump_of("x=(a b)").contains("ASSIGN assign=x"));
        assert!(dump_of("x=v cmd").contains("prefix=x"));
    }
}
