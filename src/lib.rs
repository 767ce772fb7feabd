//! rcsh — a Plan 9 rc-style command interpreter.
//!
//! The core is a four-stage pipeline from source text to a running
//! process tree:
//!
//! - [`lexer`] hand-rolls a token stream, injecting the synthetic `^`
//!   that rc's juxtaposition rule implies.
//! - [`parser`] builds the AST by recursive descent.
//! - [`plan`] lowers the AST into an execution plan: chains joined by
//!   sequence, pipeline, and short-circuit edges, with prefixes and
//!   redirection descriptors made explicit.
//! - [`eval`] interprets the plan: builtins, user functions, external
//!   processes in per-pipeline process groups, background jobs, and
//!   terminal ownership.
//!
//! [`expand`] sits between planning and execution: every rc variable is
//! a list of strings, and expansion (subscripts, cartesian `^`
//! concatenation, backquote capture, globbing) re-enters the runner
//! through the [`expand::Executor`] capability when a backquote body
//! must actually run.
//!
//! # Example
//!
//! ```no_run
//! use rcsh::{build_plan_opt, parse, Env, Io, Runner};
//!
//! let env = Env::new();
//! let runner = Runner::new(env.clone());
//! let ast = parse("echo hello | wc -c").unwrap();
//! let plan = build_plan_opt(ast.as_ref(), &env, &runner).unwrap();
//! let result = runner.run_plan(plan.as_ref(), &Io::std());
//! assert_eq!(result.status, 0);
//! ```

pub mod ast;
pub mod dump;
pub mod env;
pub mod eval;
pub mod expand;
pub mod lexer;
pub mod parser;
mod pattern;
pub mod plan;
pub mod signals;
pub mod stream;
pub mod terminal;

pub use ast::{kinds_preorder, preorder_words, Node, NodeKind, Pos};
pub use dump::dump_plan;
pub use env::{Env, FuncDef};
pub use eval::{Job, JobState, RunResult, Runner};
pub use expand::{Capture, Executor, ExpandError};
pub use lexer::{lex, LexError, RedirOp, Token, TokenKind};
pub use parser::{parse, ParseError};
pub use plan::{build_plan, build_plan_opt, ExecPlan, PlanError, PlanKind, RedirSpec};
pub use stream::{Io, Stream};
