//! End-to-end scripts: literal input, expected stdout, final status.

mod common;

use common::{have, run, run_with_env};
use rcsh::Env;

#[test]
fn list_assignment_then_expansion() {
    if !have("printf") {
        return;
    }
    let (out, status) = run("x=(a b)\nprintf %s $x");
    assert_eq!((out.as_str(), status), ("ab", 0));
}

#[test]
fn concat_with_backquote_capture() {
    if !have("printf") {
        return;
    }
    let (out, status) = run("x=pre\nprintf %s $x^`{ printf fix }");
    assert_eq!((out.as_str(), status), ("prefix", 0));
}

#[test]
fn for_loop_over_literal_list() {
    if !have("printf") {
        return;
    }
    let (out, status) = run("for(x in a b) printf %s $x");
    assert_eq!((out.as_str(), status), ("ab", 0));
}

#[test]
fn switch_fallthrough() {
    if !have("printf") {
        return;
    }
    let (out, status) =
        run("switch foo { case f*; printf one; case bar; printf two }");
    assert_eq!((out.as_str(), status), ("onetwo", 0));
}

#[test]
fn bang_turns_failure_into_success() {
    if !have("printf") {
        return;
    }
    let (out, status) = run("! cd /no-such; printf ok");
    assert_eq!((out.as_str(), status), ("ok", 0));
}

#[test]
fn function_concatenates_positionals() {
    if !have("printf") {
        return;
    }
    let (out, status) = run("fn f { printf %s $1^$2 }; f a b");
    assert_eq!((out.as_str(), status), ("ab", 0));
}

#[test]
fn subshell_discards_mutations() {
    if !have("printf") {
        return;
    }
    let env = Env::new();
    env.set1("x", "out");
    let (out, status) = run_with_env(&env, "@ { x=in; printf %s $x }; printf %s $x");
    assert_eq!((out.as_str(), status), ("inout", 0));
    assert_eq!(env.get("x"), Some(vec!["out".to_string()]));
}

#[test]
fn assignment_prefix_leaves_variable_unset() {
    if !have("printf") {
        return;
    }
    let env = Env::new();
    let (out, status) = run_with_env(&env, "x=world printf %s $x");
    assert_eq!((out.as_str(), status), ("world", 0));
    assert_eq!(env.get("x"), None);
}

#[test]
fn preorder_words_match_split_words() {
    // quoting keeps 'a b; c' one word through parse
    let ast = rcsh::parse("echo 'a b; c' d").unwrap().unwrap();
    let words = rcsh::preorder_words(&ast);
    assert_eq!(words, vec!["echo", "a b; c", "d"]);
}

#[test]
fn multi_line_script() {
    if !have("printf") {
        return;
    }
    let script = "\
fn greet {\n\
\tprintf %s hello-$1\n\
}\n\
for(who in a b) greet $who\n";
    let (out, status) = run(script);
    assert_eq!((out.as_str(), status), ("hello-ahello-b", 0));
}

#[test]
fn nonzero_script_status_is_final_status() {
    if !have("sh") {
        return;
    }
    let (_, status) = run("sh -c 'exit 4'");
    assert_eq!(status, 4);
}
