//! Switch case-block scanning.
//!
//! rc discriminates `case` lines at run time, not parse time: the switch
//! body is flattened into a command list, and every command whose first
//! expanded word is `case` opens a new block. Commands between cases
//! belong to the preceding block.

use crate::ast::{Node, NodeKind};
use crate::env::Env;
use crate::expand::{expand_words_no_glob, rc_match, Executor, ExpandError};

/// One contiguous case block: the patterns of its `case` line and the
/// commands up to the next `case`.
pub(crate) struct CaseBlock {
    pub patterns: Vec<String>,
    pub body: Option<Node>,
}

pub(crate) fn switch_cases(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<CaseBlock>, ExpandError> {
    let body = if n.kind == NodeKind::Brace {
        n.left_ref()
    } else {
        Some(n)
    };
    let mut cmds = Vec::new();
    flatten_seq(body, &mut cmds);
    let mut out: Vec<CaseBlock> = Vec::new();
    let mut cur: Option<CaseBlock> = None;
    for cmd in cmds {
        if let Some(patterns) = case_patterns(cmd, env, exec)? {
            if let Some(done) = cur.take() {
                out.push(done);
            }
            cur = Some(CaseBlock {
                patterns,
                body: None,
            });
            continue;
        }
        if let Some(block) = cur.as_mut() {
            block.body = Some(match block.body.take() {
                None => cmd.clone(),
                Some(prev) => Node::binary(NodeKind::Seq, prev, cmd.clone()),
            });
        }
    }
    if let Some(done) = cur.take() {
        out.push(done);
    }
    Ok(out)
}

pub(crate) fn match_any_pattern(subject: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pat| rc_match(pat, subject))
}

fn case_patterns(
    cmd: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Option<Vec<String>>, ExpandError> {
    let Some(call) = unwrap_call(cmd) else {
        return Ok(None);
    };
    let Some(args) = call.left_ref() else {
        return Ok(None);
    };
    let words = expand_words_no_glob(args, env, exec)?;
    match words.split_first() {
        Some((head, rest)) if head == "case" => Ok(Some(rest.to_vec())),
        _ => Ok(None),
    }
}

fn unwrap_call(n: &Node) -> Option<&Node> {
    match n.kind {
        NodeKind::Call => Some(n),
        NodeKind::Pre => n.right_ref().and_then(unwrap_call),
        _ => None,
    }
}

fn flatten_seq<'a>(n: Option<&'a Node>, out: &mut Vec<&'a Node>) {
    let Some(n) = n else { return };
    if n.kind == NodeKind::Seq {
        flatten_seq(n.left_ref(), out);
        flatten_seq(n.right_ref(), out);
        return;
    }
    out.push(n);
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

    fn cases_of(src: &str) -> Vec<CaseBlock> {
        let ast = parse(src).unwrap().unwrap();
        let body = ast.right_ref().unwrap();
        switch_cases(body, &Env::new(), &NullExec).unwrap()
    }

    #[test]
    fn blocks_split_on_case_lines() {
        let cases = cases_of("switch x { case a b; echo one; echo more; case c; echo two }");
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].patterns, vec!["a", "b"]);
        assert!(cases[0].body.is_some());
        assert_eq!(cases[1].patterns, vec!["c"]);
    }

    #[test]
    fn empty_case_is_patternless() {
        let cases = cases_of("switch x { case a; echo one; case; echo fallback }");
        assert_eq!(cases.len(), 2);
        assert!(cases[1].patterns.is_empty());
    }

    #[test]
    fn commands_before_first_case_are_dropped() {
        let cases = cases_of("switch x { echo stray; case a; echo one }");
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn patterns_expand_variables() {
        let env = Env::new();
        env.set("p", vec!["f*".into()]);
        let ast = parse("switch x { case $p; echo hit }").unwrap().unwrap();
        let cases = switch_cases(ast.right_ref().unwrap(), &env, &NullExec).unwrap();
        assert_eq!(cases[0].patterns, vec!["f*"]);
    }

    #[test]
    fn match_any_pattern_basics() {
        let pats = vec!["a*".to_string(), "b?".to_string()];
        assert!(match_any_pattern("abc", &pats));
        assert!(match_any_pattern("bz", &pats));
        assert!(!match_any_pattern("zzz", &pats));
    }
}
