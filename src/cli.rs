//! Command-line argument parsing.

/// Parsed command-line arguments.
pub(crate) struct CliArgs {
    /// `-c CMD`: run CMD and exit.
    pub(crate) command: Option<String>,
    /// `-n`: parse and plan only, no execution.
    pub(crate) noexec: bool,
    /// `-p`: print the plan to stderr.
    pub(crate) printplan: bool,
    /// `-x`: trace executed commands.
    pub(crate) trace: bool,
    /// `-s`: read commands from stdin even when arguments are present.
    pub(crate) read_stdin: bool,
    /// `-i` / `-I`: force or suppress interactive mode.
    pub(crate) force_interactive: bool,
    pub(crate) no_interactive: bool,
    /// `-l`: reserved for login-shell behavior.
    #[allow(dead_code)]
    pub(crate) login: bool,
    pub(crate) script: Option<String>,
    pub(crate) args: Vec<String>,
}

pub(crate) fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs {
        command: None,
        noexec: false,
        printplan: false,
        trace: false,
        read_stdin: false,
        force_interactive: false,
        no_interactive: false,
        login: false,
        script: None,
        args: Vec::new(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                i += 1;
                match args.get(i) {
                    Some(cmd) => cli.command = Some(cmd.clone()),
                    None => return Err("-c requires an argument".to_string()),
                }
            }
            "-n" => cli.noexec = true,
            "-p" => cli.printplan = true,
            "-x" => cli.trace = true,
            "-s" => cli.read_stdin = true,
            "-i" => cli.force_interactive = true,
            "-I" => cli.no_interactive = true,
            "-l" => cli.login = true,
            "--" => {
                i += 1;
                break;
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown flag {}", flag));
            }
            _ => break,
        }
        i += 1;
    }
    if i < args.len() {
        cli.script = Some(args[i].clone());
        cli.args = args[i + 1..].to_vec();
    }
    Ok(cli)
}

pub(crate) fn usage() -> &'static str {
    "usage: rcsh [-npxsiIl] [-c command] [--] [script [args...]]"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        std::iter::once("rcsh")
            .chain(parts.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_command_flag() {
        let cli = parse_args(&argv(&["-c", "echo hi"])).unwrap();
        assert_eq!(cli.command.as_deref(), Some("echo hi"));
        assert!(cli.script.is_none());
    }

    #[test]
    fn parse_script_with_args() {
        let cli = parse_args(&argv(&["-x", "script.rc", "a", "b"])).unwrap();
        assert!(cli.trace);
        assert_eq!(cli.script.as_deref(), Some("script.rc"));
        assert_eq!(cli.args, vec!["a", "b"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let cli = parse_args(&argv(&["--", "-n"])).unwrap();
        assert!(!cli.noexec);
        assert_eq!(cli.script.as_deref(), Some("-n"));
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse_args(&argv(&["-z"])).is_err());
    }

    #[test]
    fn missing_c_argument_is_an_error() {
        assert!(parse_args(&argv(&["-c"])).is_err());
    }
}
