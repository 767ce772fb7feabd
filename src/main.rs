//! rcsh entry point: flag handling, environment import, and the
//! script/interactive dispatch.

mod cli;
mod repl;

use cli::CliArgs;
use rcsh::{build_plan_opt, dump_plan, parse, signals, terminal, Env, Io, Runner};
use std::io::{IsTerminal, Read};
use std::os::fd::AsRawFd;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match cli::parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("rc: {}", e);
            eprintln!("{}", cli::usage());
            return ExitCode::from(2);
        }
    };

    let env = bootstrap_env(&cli);
    let mut runner = Runner::new(env.clone());
    runner.trace = cli.trace;

    if let Some(command) = &cli.command {
        return run_source(&runner, &env, command, &cli);
    }

    if let Some(script) = &cli.script {
        if !cli.read_stdin {
            let source = match std::fs::read_to_string(script) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("rc: {}: {}", script, e);
                    return ExitCode::FAILURE;
                }
            };
            return run_source(&runner, &env, &source, &cli);
        }
    }

    let stdin_is_tty = std::io::stdin().is_terminal();
    let interactive = !cli.no_interactive
        && (cli.force_interactive
            || (stdin_is_tty && cli.script.is_none() && !cli.read_stdin));
    if interactive {
        runner.interactive = true;
        if let Ok(tty) = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
        {
            runner.tty_fd = tty.as_raw_fd();
            // the shell holds its controlling tty open for its lifetime
            std::mem::forget(tty);
        }
        let _ = terminal::enter_new_group();
        let pgid = terminal::shell_pgid();
        runner.set_shell_pgid(pgid);
        if runner.tty_fd > 0 {
            let _ = terminal::set_foreground(runner.tty_fd, pgid);
        }
        signals::spawn_sigint_forwarder(runner.clone());
        return code_of(repl::run(&runner, cli.noexec, cli.printplan));
    }

    let mut source = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut source) {
        eprintln!("rc: {}", e);
        return ExitCode::FAILURE;
    }
    run_source(&runner, &env, &source, &cli)
}

fn run_source(runner: &Runner, env: &Env, source: &str, cli: &CliArgs) -> ExitCode {
    let ast = match parse(source) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("rc: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let plan = match build_plan_opt(ast.as_ref(), env, runner) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("rc: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if cli.printplan {
        if let Some(plan) = &plan {
            eprint!("{}", dump_plan(plan));
        }
    }
    if cli.noexec {
        return ExitCode::SUCCESS;
    }
    let result = runner.run_plan(plan.as_ref(), &Io::std());
    if runner.exit_requested() {
        return code_of(runner.exit_code());
    }
    code_of(result.status)
}

/// Imports the OS environment (`PATH` becomes the `path` list) and
/// pre-populates the distinguished variables.
fn bootstrap_env(cli: &CliArgs) -> Env {
    let env = Env::new();
    for (key, val) in std::env::vars() {
        if key == "PATH" {
            env.set("path", val.split(':').map(str::to_string).collect());
        } else {
            env.set(&key, vec![val]);
        }
    }
    env.set("ifs", vec![" ".into(), "\t".into(), "\n".into()]);
    env.set("nl", vec!["\n".into()]);
    env.set("tab", vec!["\t".into()]);
    env.set("prompt", vec!["; ".into(), String::new()]);
    env.set1("pid", &std::process::id().to_string());
    env.set1("version", env!("CARGO_PKG_VERSION"));
    if env.get("home").is_none() {
        if let Ok(home) = std::env::var("HOME") {
            env.set1("home", &home);
        }
    }
    env.set1("0", cli.script.as_deref().unwrap_or("rcsh"));
    env.set("*", cli.args.clone());
    env
}

fn code_of(status: i32) -> ExitCode {
    if status == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from((status & 0xff) as u8)
    }
}
