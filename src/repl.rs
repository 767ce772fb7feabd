//! The interactive loop.
//!
//! Line editing, history, and completion belong to rustyline; this
//! module owns the shell-side policy: prompts from `$prompt`, history
//! persistence at `$history`, and the continuation rule (a line is
//! complete when braces and parens balance, no quote is open, and it
//! does not end in an unquoted backslash).

use rcsh::{build_plan_opt, dump_plan, parse, Env, Io, Runner};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub(crate) fn run(runner: &Runner, noexec: bool, printplan: bool) -> i32 {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("rc: {}", e);
            return 1;
        }
    };
    let env = runner.env.clone();
    let history_path = env.get("history").and_then(|v| v.first().cloned());
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    let mut status = 0;
    let mut buffer = String::new();
    loop {
        let prompt = prompt_for(&env, !buffer.is_empty());
        match rl.readline(&prompt) {
            Ok(line) => {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
                if needs_continuation(&buffer) {
                    continue;
                }
                let input = std::mem::take(&mut buffer);
                if input.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&input);
                status = execute(runner, &env, &input, noexec, printplan);
                if runner.exit_requested() {
                    status = runner.exit_code();
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("rc: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = rl.save_history(path);
    }
    status
}

fn prompt_for(env: &Env, continuation: bool) -> String {
    let prompts = env.get("prompt").unwrap_or_default();
    let index = if continuation { 1 } else { 0 };
    match prompts.get(index) {
        Some(p) => p.clone(),
        None if continuation => String::new(),
        None => "; ".to_string(),
    }
}

fn execute(runner: &Runner, env: &Env, input: &str, noexec: bool, printplan: bool) -> i32 {
    let ast = match parse(input) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("rc: {}", e);
            return 1;
        }
    };
    let plan = match build_plan_opt(ast.as_ref(), env, runner) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("rc: {}", e);
            return 1;
        }
    };
    if printplan {
        if let Some(plan) = &plan {
            eprint!("{}", dump_plan(plan));
        }
    }
    if noexec {
        return 0;
    }
    runner.run_plan(plan.as_ref(), &Io::std()).status
}

/// Whether the accumulated input still needs another line.
pub(crate) fn needs_continuation(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut chars = input.chars().peekable();
    let mut trailing_backslash = false;
    while let Some(c) = chars.next() {
        trailing_backslash = false;
        match c {
            '\'' => in_quote = !in_quote,
            '{' | '(' if !in_quote => depth += 1,
            '}' | ')' if !in_quote => depth -= 1,
            '#' if !in_quote => {
                // comments run to end of line
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\\' if !in_quote && chars.peek().is_none() => trailing_backslash = true,
            _ => {}
        }
    }
    in_quote || depth > 0 || trailing_backslash
}

#[cfg(test)]
mod tests {
    use super::needs_continuation;

    #[test]
    fn complete_lines_do_not_continue() {
        assert!(!needs_continuation("echo hi"));
        assert!(!needs_continuation("if(a) { b }"));
        assert!(!needs_continuation("echo 'done'"));
    }

    #[test]
    fn open_brace_continues() {
        assert!(needs_continuation("fn f {"));
        assert!(needs_continuation("if (true) {\n  echo a"));
    }

    #[test]
    fn open_paren_continues() {
        assert!(needs_continuation("x=(a b"));
    }

    #[test]
    fn open_quote_continues() {
        assert!(needs_continuation("echo 'multi"));
        // a doubled quote is an escape, still inside the string
        assert!(needs_continuation("echo 'it''s"));
    }

    #[test]
    fn trailing_backslash_continues() {
        assert!(needs_continuation("echo a \\"));
        assert!(!needs_continuation("echo 'a\\'"));
    }

    #[test]
    fn braces_inside_quotes_do_not_count() {
        assert!(!needs_continuation("echo '{'"));
    }

    #[test]
    fn comment_hides_the_rest_of_the_line() {
        assert!(!needs_continuation("echo hi # { ("));
    }
}
