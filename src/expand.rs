//! Word expansion: rc's list-valued semantics.
//!
//! Expansion turns word nodes into lists of strings against an
//! environment: variable lookup, 1-based subscripts, `$^` flattening,
//! `$#` counting, cartesian concatenation, backquote capture, and
//! globbing. Two entry points share the same walk: command argv expands
//! with glob, everything else without.
//!
//! Backquote capture has to run a planned sub-program, which would tie
//! this module to the runner; instead the runner hands in the narrow
//! [`Executor`] capability at call time.

use crate::ast::{Node, NodeKind};
use crate::env::Env;
use glob::{MatchOptions, Pattern};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpandError {
    #[error("concatenation mismatch: {left} elements against {right}")]
    ConcatMismatch { left: usize, right: usize },
    #[error("unsupported word node")]
    BadWordNode,
    #[error("{0}")]
    Capture(String),
}

/// Output captured from a backquote body.
pub struct Capture {
    pub bytes: Vec<u8>,
    pub status: i32,
}

/// Plan-and-run capability for backquote bodies. The Runner implements
/// this; expander tests stub it.
pub trait Executor {
    fn run_capture(&self, body: &Node, env: &Env) -> Result<Capture, ExpandError>;
}

/// One expanded element. `quoted` marks elements whose source text was
/// quoted; a quoted component protects the finished word from globbing.
#[derive(Debug, Clone)]
struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn plain(text: String) -> Field {
        Field {
            text,
            quoted: false,
        }
    }
}

/// Expands a word node into strings, globbing the result.
pub fn expand_word(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<String>, ExpandError> {
    let fields = expand_fields(n, env, exec)?;
    Ok(glob_fields(fields))
}

/// Expands a word node without globbing.
pub fn expand_word_no_glob(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<String>, ExpandError> {
    Ok(texts(expand_fields(n, env, exec)?))
}

/// Flattens a call node into its argv list (with glob).
pub fn expand_call(
    call: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<String>, ExpandError> {
    if call.kind != NodeKind::Call {
        return Err(ExpandError::BadWordNode);
    }
    match call.left_ref() {
        Some(args) => Ok(glob_fields(expand_list_fields(args, env, exec)?)),
        None => Ok(Vec::new()),
    }
}

/// Expands an assignment value. List literals and words both come back as
/// plain lists; no globbing (a stored pattern globs at use, not at
/// assignment).
pub fn expand_value(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<String>, ExpandError> {
    match n.kind {
        NodeKind::Paren => match n.left_ref() {
            Some(words) => Ok(texts(expand_list_fields(words, env, exec)?)),
            None => Ok(Vec::new()),
        },
        NodeKind::Words | NodeKind::ArgList => Ok(texts(expand_list_fields(n, env, exec)?)),
        _ => expand_word_no_glob(n, env, exec),
    }
}

/// Expands a word-list node without globbing.
pub fn expand_words_no_glob(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<String>, ExpandError> {
    Ok(texts(expand_list_fields(n, env, exec)?))
}

fn expand_list_fields(
    n: &Node,
    env: &Env,
    exec: &dyn Executor,
) -> Result<Vec<Field>, ExpandError> {
    if matches!(n.kind, NodeKind::ArgList | NodeKind::Words | NodeKind::Epilog) {
        let mut out = Vec::new();
        for child in &n.list {
            out.extend(expand_list_fields(child, env, exec)?);
        }
        return Ok(out);
    }
    expand_fields(n, env, exec)
}

fn expand_fields(n: &Node, env: &Env, exec: &dyn Executor) -> Result<Vec<Field>, ExpandError> {
    match n.kind {
        NodeKind::Word => Ok(vec![Field::plain(n.tok.clone())]),
        NodeKind::QWord => Ok(vec![Field {
            text: n.tok.clone(),
            quoted: true,
        }]),
        NodeKind::Concat => {
            let left = expand_fields(n.left_ref().ok_or(ExpandError::BadWordNode)?, env, exec)?;
            let right =
                expand_fields(n.right_ref().ok_or(ExpandError::BadWordNode)?, env, exec)?;
            concat_product(left, right)
        }
        NodeKind::Var => {
            let name = var_name(n)?;
            let vals = env.get(name).unwrap_or_default();
            let mut fields: Vec<Field> = vals.into_iter().map(Field::plain).collect();
            if let Some(sub) = n.right_ref() {
                let subs = expand_words_no_glob(sub, env, exec)?;
                fields = apply_subscript(fields, &subs);
            }
            Ok(fields)
        }
        NodeKind::Flat => {
            let name = var_name(n)?;
            let vals = env.get(name).unwrap_or_default();
            Ok(vec![Field::plain(vals.join(" "))])
        }
        NodeKind::Count => {
            let name = var_name(n)?;
            let count = env.get(name).map(|v| v.len()).unwrap_or(0);
            Ok(vec![Field::plain(count.to_string())])
        }
        NodeKind::Sub => {
            let base = expand_fields(n.left_ref().ok_or(ExpandError::BadWordNode)?, env, exec)?;
            if base.is_empty() {
                return Ok(Vec::new());
            }
            let subs = expand_words_no_glob(
                n.right_ref().ok_or(ExpandError::BadWordNode)?,
                env,
                exec,
            )?;
            Ok(apply_subscript(base, &subs))
        }
        NodeKind::Paren => match n.left_ref() {
            Some(words) => expand_list_fields(words, env, exec),
            None => Ok(Vec::new()),
        },
        NodeKind::Backquote => {
            let child = env.child();
            let capture = match n.right_ref() {
                Some(body) => exec.run_capture(body, &child)?,
                None => Capture {
                    bytes: Vec::new(),
                    status: 0,
                },
            };
            env.set_status(capture.status);
            let text = String::from_utf8_lossy(&capture.bytes).into_owned();
            let seps = match n.left_ref() {
                Some(ifs_node) => {
                    let vals = expand_words_no_glob(ifs_node, env, exec)?;
                    vals.concat().chars().collect()
                }
                None => match env.get("ifs") {
                    Some(vals) if !vals.is_empty() => vals.concat().chars().collect(),
                    _ => vec![' ', '\t', '\n'],
                },
            };
            Ok(split_fields(&text, &seps)
                .into_iter()
                .map(Field::plain)
                .collect())
        }
        _ => Err(ExpandError::BadWordNode),
    }
}

fn var_name(n: &Node) -> Result<&str, ExpandError> {
    match n.left_ref() {
        Some(w) if matches!(w.kind, NodeKind::Word | NodeKind::QWord) => Ok(&w.tok),
        _ => Err(ExpandError::BadWordNode),
    }
}

fn texts(fields: Vec<Field>) -> Vec<String> {
    fields.into_iter().map(|f| f.text).collect()
}

/// rc's concatenation law: pairwise on equal lengths, broadcast when one
/// side is a singleton, error otherwise. Either side empty yields empty.
fn concat_product(left: Vec<Field>, right: Vec<Field>) -> Result<Vec<Field>, ExpandError> {
    if left.is_empty() || right.is_empty() {
        return Ok(Vec::new());
    }
    let join = |l: &Field, r: &Field| Field {
        text: format!("{}{}", l.text, r.text),
        quoted: l.quoted || r.quoted,
    };
    if left.len() == right.len() {
        return Ok(left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| join(l, r))
            .collect());
    }
    if left.len() == 1 {
        return Ok(right.iter().map(|r| join(&left[0], r)).collect());
    }
    if right.len() == 1 {
        return Ok(left.iter().map(|l| join(l, &right[0])).collect());
    }
    Err(ExpandError::ConcatMismatch {
        left: left.len(),
        right: right.len(),
    })
}

/// Applies 1-based subscript ranges: `n`, `m-n`, `m-`. Out-of-range
/// components drop silently; multiple ranges concatenate in order.
fn apply_subscript(vals: Vec<Field>, subs: &[String]) -> Vec<Field> {
    if vals.is_empty() || subs.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for sub in subs {
        let Some((start, end)) = parse_range(sub) else {
            continue;
        };
        let end = match end {
            Some(e) => e.min(vals.len()),
            None => vals.len(),
        };
        if start < 1 || start > vals.len() {
            continue;
        }
        for v in &vals[start - 1..end] {
            out.push(v.clone());
        }
    }
    out
}

/// Parses a range expression. `None` end means "to the end of the list".
fn parse_range(s: &str) -> Option<(usize, Option<usize>)> {
    if s.is_empty() {
        return None;
    }
    if let Some((a, b)) = s.split_once('-') {
        let start = parse_positive(a)?;
        if b.is_empty() {
            return Some((start, None));
        }
        let end = parse_positive(b)?;
        if end < start {
            return None;
        }
        return Some((start, Some(end)));
    }
    let n = parse_positive(s)?;
    Some((n, Some(n)))
}

fn parse_positive(s: &str) -> Option<usize> {
    let n: usize = s.parse().ok()?;
    if n >= 1 {
        Some(n)
    } else {
        None
    }
}

/// Splits captured bytes on a separator-rune set, dropping empty runs.
fn split_fields(s: &str, seps: &[char]) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(|c| seps.contains(&c))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn glob_fields(fields: Vec<Field>) -> Vec<String> {
    let mut out = Vec::new();
    for f in fields {
        if f.quoted {
            out.push(f.text);
        } else {
            out.extend(glob_word(&f.text));
        }
    }
    out
}

/// Matches a word with glob metacharacters against the filesystem. A word
/// with no matches stays literal; matches sort lexicographically and
/// dotfiles only match a literal leading dot.
pub fn glob_word(w: &str) -> Vec<String> {
    if !w.contains(['*', '?', '[']) {
        return vec![w.to_string()];
    }
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let Ok(paths) = glob::glob_with(w, options) else {
        return vec![w.to_string()];
    };
    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if matches.is_empty() {
        return vec![w.to_string()];
    }
    matches.sort();
    matches
}

/// rc pattern match against a plain string (switch cases, `~`). The same
/// dotfile rule applies as for filesystem globbing.
pub fn rc_match(pattern: &str, subject: &str) -> bool {
    if !dot_match_allowed(pattern, subject) {
        return false;
    }
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(subject, options),
        Err(_) => false,
    }
}

fn dot_match_allowed(pattern: &str, subject: &str) -> bool {
    if subject.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    if subject.contains("/.") && !pattern.contains("/.") {
        return false;
    }
    let psegs: Vec<&str> = pattern.split('/').collect();
    let ssegs: Vec<&str> = subject.split('/').collect();
    if psegs.len() != ssegs.len() {
        return true;
    }
    for (p, s) in psegs.iter().zip(ssegs.iter()) {
        if s.starts_with('.') && !p.starts_with('.') {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    /// An executor that fakes backquote output.
    struct FakeExec {
        output: &'static str,
        status: i32,
    }

    impl Executor for FakeExec {
        fn run_capture(&self, _body: &Node, _env: &Env) -> Result<Capture, ExpandError> {
            Ok(Capture {
                bytes: self.output.as_bytes().to_vec(),
                status: self.status,
            })
        }
    }

    fn no_exec() -> FakeExec {
        FakeExec {
            output: "",
            status: 0,
        }
    }

    /// Expands the first argument word of `echo <word>`.
    fn first_word(src: &str, env: &Env, exec: &dyn Executor) -> Result<Vec<String>, ExpandError> {
        let ast = parse(&format!("echo {src}")).unwrap().unwrap();
        let args = ast.left_ref().unwrap();
        expand_word_no_glob(&args.list[1], env, exec)
    }

    #[test]
    fn expand_var_list() {
        let env = Env::new();
        env.set("x", vec!["a".into(), "b".into()]);
        assert_eq!(first_word("$x", &env, &no_exec()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn expand_unset_var_is_empty() {
        let env = Env::new();
        assert!(first_word("$nope", &env, &no_exec()).unwrap().is_empty());
    }

    #[test]
    fn expand_subscripts() {
        let env = Env::new();
        env.set("x", vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(first_word("$x(2)", &env, &no_exec()).unwrap(), vec!["b"]);
        assert_eq!(
            first_word("$x(2-3)", &env, &no_exec()).unwrap(),
            vec!["b", "c"]
        );
        assert_eq!(
            first_word("$x(3-)", &env, &no_exec()).unwrap(),
            vec!["c", "d"]
        );
        // out-of-range components drop silently
        assert_eq!(first_word("$x(9)", &env, &no_exec()).unwrap(), Vec::<String>::new());
        // multiple ranges concatenate
        assert_eq!(
            first_word("$x(3 1)", &env, &no_exec()).unwrap(),
            vec!["c", "a"]
        );
    }

    #[test]
    fn expand_flat_joins_with_space() {
        let env = Env::new();
        env.set("x", vec!["a".into(), "b".into()]);
        assert_eq!(first_word("$^x", &env, &no_exec()).unwrap(), vec!["a b"]);
        assert_eq!(first_word("$^unset", &env, &no_exec()).unwrap(), vec![""]);
    }

    #[test]
    fn expand_count() {
        let env = Env::new();
        env.set("x", vec!["a".into(), "b".into()]);
        assert_eq!(first_word("$#x", &env, &no_exec()).unwrap(), vec!["2"]);
        assert_eq!(first_word("$#unset", &env, &no_exec()).unwrap(), vec!["0"]);
    }

    #[test]
    fn concat_pairwise_equal_lengths() {
        let env = Env::new();
        env.set("a", vec!["1".into(), "2".into()]);
        env.set("b", vec!["x".into(), "y".into()]);
        assert_eq!(
            first_word("$a^$b", &env, &no_exec()).unwrap(),
            vec!["1x", "2y"]
        );
    }

    #[test]
    fn concat_broadcasts_singletons() {
        let env = Env::new();
        env.set("a", vec!["1".into(), "2".into()]);
        assert_eq!(
            first_word("-$a", &env, &no_exec()).unwrap(),
            vec!["-1", "-2"]
        );
        assert_eq!(
            first_word("$a^s", &env, &no_exec()).unwrap(),
            vec!["1s", "2s"]
        );
    }

    #[test]
    fn concat_mismatch_is_an_error() {
        let env = Env::new();
        env.set("a", vec!["1".into(), "2".into()]);
        env.set("b", vec!["x".into(), "y".into(), "z".into()]);
        assert!(matches!(
            first_word("$a^$b", &env, &no_exec()),
            Err(ExpandError::ConcatMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn concat_empty_side_is_empty() {
        let env = Env::new();
        assert!(first_word("$unset^x", &env, &no_exec()).unwrap().is_empty());
    }

    #[test]
    fn backquote_splits_on_ifs_and_sets_status() {
        let env = Env::new();
        let exec = FakeExec {
            output: "one two\nthree",
            status: 7,
        };
        assert_eq!(
            first_word("`{whatever}", &env, &exec).unwrap(),
            vec!["one", "two", "three"]
        );
        assert_eq!(env.status(), 7);
    }

    #[test]
    fn backquote_with_override_ifs() {
        let env = Env::new();
        let exec = FakeExec {
            output: "a:b c",
            status: 0,
        };
        assert_eq!(
            first_word("``':'{whatever}", &env, &exec).unwrap(),
            vec!["a", "b c"]
        );
    }

    #[test]
    fn backquote_respects_env_ifs() {
        let env = Env::new();
        env.set("ifs", vec![",".into()]);
        let exec = FakeExec {
            output: "a,b c",
            status: 0,
        };
        assert_eq!(
            first_word("`{whatever}", &env, &exec).unwrap(),
            vec!["a", "b c"]
        );
    }

    #[test]
    fn glob_no_match_keeps_literal() {
        assert_eq!(
            glob_word("/no/such/dir-at-all/*.zzz"),
            vec!["/no/such/dir-at-all/*.zzz"]
        );
    }

    #[test]
    fn glob_plain_word_passes_through() {
        assert_eq!(glob_word("plain"), vec!["plain"]);
    }

    #[test]
    fn quoted_word_never_globs() {
        let env = Env::new();
        let ast = parse("echo '*'").unwrap().unwrap();
        let argv = expand_call(&ast, &env, &no_exec()).unwrap();
        assert_eq!(argv, vec!["echo", "*"]);
    }

    #[test]
    fn rc_match_basics() {
        assert!(rc_match("f*", "foo"));
        assert!(rc_match("?oo", "foo"));
        assert!(!rc_match("f*", "bar"));
        assert!(rc_match("[fg]oo", "goo"));
    }

    #[test]
    fn rc_match_dotfile_rule() {
        assert!(!rc_match("*", ".hidden"));
        assert!(rc_match(".*", ".hidden"));
        assert!(!rc_match("a/*", "a/.hidden"));
    }

    #[test]
    fn rc_match_star_stays_within_segment() {
        assert!(!rc_match("a*", "a/b"));
    }
}
