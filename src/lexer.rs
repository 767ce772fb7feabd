//! Tokenization of rc source.
//!
//! The lexer is hand-rolled and stateful. Besides splitting the byte stream
//! it injects the synthetic `^` that rc's juxtaposition rule implies
//! (`$x.c` is a concatenation, `$x y` is two arguments), recognizes keywords
//! only in command position, and folds redirection fd brackets (`>[2]`,
//! `>[2=1]`, `>[2=]`) into single tokens so the parser never reparses.

use crate::ast::Pos;
use thiserror::Error;

/// Redirection operator, shared by tokens and plan nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    In,
    Out,
    Append,
    ReadWrite,
    Heredoc,
    HereString,
}

impl RedirOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirOp::In => "<",
            RedirOp::Out => ">",
            RedirOp::Append => ">>",
            RedirOp::ReadWrite => "<>",
            RedirOp::Heredoc => "<<",
            RedirOp::HereString => "<<<",
        }
    }

    /// The fd an unbracketed operator applies to.
    pub fn default_fd(self) -> i32 {
        match self {
            RedirOp::Out | RedirOp::Append => 1,
            _ => 0,
        }
    }

    pub fn from_token(s: &str) -> Option<RedirOp> {
        match s {
            "<" => Some(RedirOp::In),
            ">" => Some(RedirOp::Out),
            ">>" => Some(RedirOp::Append),
            "<>" => Some(RedirOp::ReadWrite),
            "<<" => Some(RedirOp::Heredoc),
            "<<<" => Some(RedirOp::HereString),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    QWord,
    KwIf,
    KwWhile,
    KwFor,
    KwSwitch,
    KwFn,
    KwElse,
    Dollar,
    DollarFlat,
    DollarCount,
    Caret,
    Backquote,
    BackquoteIfs,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Newline,
    Amp,
    AndAnd,
    OrOr,
    Pipe { left_fd: i32, right_fd: i32 },
    Bang,
    Tilde,
    At,
    Eq,
    /// `fd < 0` means "default for op".
    Redir { op: RedirOp, fd: i32 },
    /// `src < 0` encodes close (`[n=]`).
    Dup { op: RedirOp, fd: i32, src: i32 },
}

/// A token with positional metadata. `sep` records whether whitespace (or
/// start of input) preceded the token; the parser uses it for the `=` and
/// subscript adjacency rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub pos: Pos,
    pub sep: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("{line}:{col}: unterminated quote")]
    UnterminatedQuote { line: u32, col: u32 },
    #[error("{line}:{col}: malformed redirection bracket")]
    BadBracket { line: u32, col: u32 },
}

/// What the next word token completes, used to suppress keyword
/// recognition inside redirection targets, assignment values, and
/// function names.
#[derive(PartialEq)]
enum Pending {
    None,
    RedirTarget,
    EqValue,
    FnName,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    sep: bool,
    prev_can_concat: bool,
    prev_was_dollar: bool,
    prev_dollar_name: bool,
    prev_rparen: bool,
    at_cmd_start: bool,
    pending: Pending,
    bq_pending: bool,
    bq_marks: Vec<usize>,
    brace_depth: usize,
}

/// Tokenize a complete input string. The first error wins.
pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lx = Lexer {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
        sep: true,
        prev_can_concat: false,
        prev_was_dollar: false,
        prev_dollar_name: false,
        prev_rparen: false,
        at_cmd_start: true,
        pending: Pending::None,
        bq_pending: false,
        bq_marks: Vec::new(),
        brace_depth: 0,
    };
    lx.run()?;
    Ok(lx.tokens)
}

impl Lexer {
    fn run(&mut self) -> Result<(), LexError> {
        while let Some(c) = self.peek() {
            let pos = self.here();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    self.sep = true;
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    self.sep = true;
                }
                '\n' => {
                    self.bump();
                    self.emit(TokenKind::Newline, "\n".into(), pos);
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\'' => self.quote(pos)?,
                ';' => {
                    self.bump();
                    self.emit(TokenKind::Semi, ";".into(), pos);
                }
                '&' => {
                    self.bump();
                    if self.peek() == Some('&') {
                        self.bump();
                        self.emit(TokenKind::AndAnd, "&&".into(), pos);
                    } else {
                        self.emit(TokenKind::Amp, "&".into(), pos);
                    }
                }
                '|' => {
                    self.bump();
                    if self.peek() == Some('|') {
                        self.bump();
                        self.emit(TokenKind::OrOr, "||".into(), pos);
                    } else if self.peek() == Some('[') {
                        let (left_fd, right_fd) = self.pipe_bracket(pos)?;
                        self.emit(TokenKind::Pipe { left_fd, right_fd }, "|".into(), pos);
                    } else {
                        self.emit(
                            TokenKind::Pipe {
                                left_fd: 1,
                                right_fd: 0,
                            },
                            "|".into(),
                            pos,
                        );
                    }
                }
                '^' => {
                    self.bump();
                    self.emit(TokenKind::Caret, "^".into(), pos);
                }
                '=' => {
                    self.bump();
                    self.emit(TokenKind::Eq, "=".into(), pos);
                }
                '$' => {
                    self.bump();
                    match self.peek() {
                        Some('#') => {
                            self.bump();
                            self.emit(TokenKind::DollarCount, "$#".into(), pos);
                        }
                        Some('^') => {
                            self.bump();
                            self.emit(TokenKind::DollarFlat, "$^".into(), pos);
                        }
                        _ => self.emit(TokenKind::Dollar, "$".into(), pos),
                    }
                }
                '`' => {
                    self.bump();
                    if self.peek() == Some('`') {
                        self.bump();
                        self.emit(TokenKind::BackquoteIfs, "``".into(), pos);
                    } else {
                        self.emit(TokenKind::Backquote, "`".into(), pos);
                    }
                    self.bq_pending = true;
                }
                '{' => {
                    self.bump();
                    if self.bq_pending {
                        self.bq_marks.push(self.brace_depth);
                        self.bq_pending = false;
                    }
                    self.brace_depth += 1;
                    self.emit(TokenKind::LBrace, "{".into(), pos);
                }
                '}' => {
                    self.bump();
                    self.brace_depth = self.brace_depth.saturating_sub(1);
                    self.emit(TokenKind::RBrace, "}".into(), pos);
                    if self.bq_marks.last() == Some(&self.brace_depth) {
                        self.bq_marks.pop();
                        // a closed backquote can concatenate: `{cmd}^suffix
                        self.prev_can_concat = true;
                    }
                }
                '(' => {
                    self.bump();
                    self.emit(TokenKind::LParen, "(".into(), pos);
                }
                ')' => {
                    self.bump();
                    self.emit(TokenKind::RParen, ")".into(), pos);
                }
                '<' | '>' => self.redir(pos)?,
                _ => self.word(pos),
            }
        }
        Ok(())
    }

    fn quote(&mut self, pos: Pos) -> Result<(), LexError> {
        self.bump();
        let mut buf = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError::UnterminatedQuote {
                        line: pos.line,
                        col: pos.col,
                    })
                }
                Some('\'') => {
                    self.bump();
                    if self.peek() == Some('\'') {
                        self.bump();
                        buf.push('\'');
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    self.bump();
                    buf.push(c);
                }
            }
        }
        self.emit(TokenKind::QWord, buf, pos);
        Ok(())
    }

    fn redir(&mut self, pos: Pos) -> Result<(), LexError> {
        let op = if self.peek() == Some('<') {
            self.bump();
            if self.peek() == Some('<') {
                self.bump();
                if self.peek() == Some('<') {
                    self.bump();
                    RedirOp::HereString
                } else {
                    RedirOp::Heredoc
                }
            } else if self.peek() == Some('>') {
                self.bump();
                RedirOp::ReadWrite
            } else {
                RedirOp::In
            }
        } else {
            self.bump();
            if self.peek() == Some('>') {
                self.bump();
                RedirOp::Append
            } else {
                RedirOp::Out
            }
        };
        if self.peek() != Some('[') {
            self.emit(TokenKind::Redir { op, fd: -1 }, op.as_str().into(), pos);
            return Ok(());
        }
        self.bump();
        let fd = self.bracket_number(pos)?;
        match self.peek() {
            Some(']') => {
                self.bump();
                self.emit(TokenKind::Redir { op, fd }, op.as_str().into(), pos);
            }
            Some('=') => {
                self.bump();
                if self.peek() == Some(']') {
                    self.bump();
                    self.emit(TokenKind::Dup { op, fd, src: -1 }, op.as_str().into(), pos);
                } else {
                    let src = self.bracket_number(pos)?;
                    if self.peek() != Some(']') {
                        return Err(LexError::BadBracket {
                            line: pos.line,
                            col: pos.col,
                        });
                    }
                    self.bump();
                    self.emit(TokenKind::Dup { op, fd, src }, op.as_str().into(), pos);
                }
            }
            _ => {
                return Err(LexError::BadBracket {
                    line: pos.line,
                    col: pos.col,
                })
            }
        }
        Ok(())
    }

    fn pipe_bracket(&mut self, pos: Pos) -> Result<(i32, i32), LexError> {
        self.bump(); // '['
        let left = self.bracket_number(pos)?;
        match self.peek() {
            Some(']') => {
                self.bump();
                Ok((left, 0))
            }
            Some('=') => {
                self.bump();
                let right = self.bracket_number(pos)?;
                if self.peek() != Some(']') {
                    return Err(LexError::BadBracket {
                        line: pos.line,
                        col: pos.col,
                    });
                }
                self.bump();
                Ok((left, right))
            }
            _ => Err(LexError::BadBracket {
                line: pos.line,
                col: pos.col,
            }),
        }
    }

    fn bracket_number(&mut self, pos: Pos) -> Result<i32, LexError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits.parse().map_err(|_| LexError::BadBracket {
            line: pos.line,
            col: pos.col,
        })
    }

    fn word(&mut self, pos: Pos) {
        let var_name = self.prev_was_dollar && !self.sep;
        let mut buf = String::new();
        while let Some(c) = self.peek() {
            let stop = if var_name {
                !is_var_char(c)
            } else {
                is_special(c)
            };
            if stop {
                break;
            }
            if c == '\\' && self.peek_at(1) == Some('\n') {
                break;
            }
            buf.push(c);
            self.bump();
        }
        if buf.is_empty() {
            // an isolated special byte we do not otherwise handle; take it
            // literally so e.g. a stray ']' becomes a word
            if let Some(c) = self.peek() {
                buf.push(c);
                self.bump();
            }
        }
        if self.pending == Pending::None && !var_name {
            // `else` must terminate a single-command if body, so unlike
            // the other keywords it is not limited to command position
            if buf == "else" {
                self.emit(TokenKind::KwElse, buf, pos);
                return;
            }
            if self.at_cmd_start {
                let kw = match buf.as_str() {
                    "if" => Some(TokenKind::KwIf),
                    "while" => Some(TokenKind::KwWhile),
                    "for" => Some(TokenKind::KwFor),
                    "switch" => Some(TokenKind::KwSwitch),
                    "fn" => Some(TokenKind::KwFn),
                    "!" => Some(TokenKind::Bang),
                    "~" => Some(TokenKind::Tilde),
                    "@" => Some(TokenKind::At),
                    _ => None,
                };
                if let Some(kind) = kw {
                    self.emit(kind, buf, pos);
                    return;
                }
            }
        }
        self.emit(TokenKind::Word, buf, pos);
    }

    fn emit(&mut self, kind: TokenKind, lexeme: String, pos: Pos) {
        let sep = self.sep;
        if !sep && self.prev_can_concat && !self.prev_was_dollar && starts_atom(&kind) {
            let subscript = kind == TokenKind::LParen && (self.prev_dollar_name || self.prev_rparen);
            if !subscript {
                self.tokens.push(Token {
                    kind: TokenKind::Caret,
                    lexeme: "^".into(),
                    pos,
                    sep: false,
                });
            }
        }
        let was_dollar = self.prev_was_dollar;
        let prev_kind = self.tokens.last().map(|t| t.kind.clone());
        self.tokens.push(Token {
            kind: kind.clone(),
            lexeme,
            pos,
            sep,
        });
        self.sep = false;
        self.prev_dollar_name = was_dollar && !sep && kind == TokenKind::Word;
        self.prev_was_dollar = matches!(
            kind,
            TokenKind::Dollar | TokenKind::DollarFlat | TokenKind::DollarCount
        );
        self.prev_rparen = kind == TokenKind::RParen;
        self.prev_can_concat = matches!(
            kind,
            TokenKind::Word | TokenKind::QWord | TokenKind::RParen
        );
        match kind {
            TokenKind::Newline
            | TokenKind::Semi
            | TokenKind::Amp
            | TokenKind::AndAnd
            | TokenKind::OrOr
            | TokenKind::Pipe { .. }
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::RParen
            | TokenKind::Bang
            | TokenKind::At
            | TokenKind::Tilde
            | TokenKind::KwElse => {
                // all of these re-enter command context, which ends any
                // assignment value or redirection target
                self.at_cmd_start = true;
                self.pending = Pending::None;
            }
            TokenKind::LParen => {
                // a paren opens command position only as a control-form
                // head; everywhere else it brackets a word list
                self.at_cmd_start = matches!(
                    prev_kind,
                    Some(
                        TokenKind::KwIf
                            | TokenKind::KwWhile
                            | TokenKind::KwFor
                            | TokenKind::KwSwitch
                    )
                );
            }
            TokenKind::Word | TokenKind::QWord => match self.pending {
                Pending::RedirTarget | Pending::EqValue => {
                    self.pending = Pending::None;
                    self.at_cmd_start = true;
                }
                Pending::FnName => {
                    self.pending = Pending::None;
                    self.at_cmd_start = false;
                }
                Pending::None => self.at_cmd_start = false,
            },
            TokenKind::Redir { .. } | TokenKind::Dup { .. } => {
                self.pending = Pending::RedirTarget;
                self.at_cmd_start = false;
            }
            TokenKind::Eq => {
                self.pending = Pending::EqValue;
                self.at_cmd_start = false;
            }
            TokenKind::KwFn => {
                self.pending = Pending::FnName;
                self.at_cmd_start = false;
            }
            _ => self.at_cmd_start = false,
        }
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }
}

fn starts_atom(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Word
            | TokenKind::QWord
            | TokenKind::Dollar
            | TokenKind::DollarFlat
            | TokenKind::DollarCount
            | TokenKind::Backquote
            | TokenKind::BackquoteIfs
            | TokenKind::LParen
    )
}

fn is_special(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | '#' | ';' | '&' | '|' | '^' | '$' | '=' | '\'' | '`' | '{'
            | '}' | '(' | ')' | '<' | '>'
    )
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '*'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn words(input: &str) -> Vec<String> {
        lex(input).unwrap().into_iter().map(|t| t.lexeme).collect()
    }

    #[test]
    fn lex_simple_words() {
        assert_eq!(words("echo hi there"), vec!["echo", "hi", "there"]);
        assert_eq!(
            kinds("echo hi"),
            vec![TokenKind::Word, TokenKind::Word]
        );
    }

    #[test]
    fn lex_quote_doubling() {
        let toks = lex("echo 'don''t'").unwrap();
        assert_eq!(toks[1].kind, TokenKind::QWord);
        assert_eq!(toks[1].lexeme, "don't");
    }

    #[test]
    fn lex_quote_preserves_newline() {
        let toks = lex("echo 'a\nb'").unwrap();
        assert_eq!(toks[1].lexeme, "a\nb");
    }

    #[test]
    fn lex_unterminated_quote() {
        assert!(matches!(
            lex("echo 'oops"),
            Err(LexError::UnterminatedQuote { .. })
        ));
    }

    #[test]
    fn lex_comment_to_eol() {
        assert_eq!(words("echo a # the rest\n"), vec!["echo", "a", "\n"]);
    }

    #[test]
    fn lex_dollar_hash_is_count() {
        let toks = lex("echo $#x").unwrap();
        assert_eq!(toks[1].kind, TokenKind::DollarCount);
        assert_eq!(toks[2].lexeme, "x");
    }

    #[test]
    fn lex_line_continuation() {
        let toks = lex("echo a\\\nb").unwrap();
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[2].lexeme, "b");
        assert!(toks[2].sep);
    }

    #[test]
    fn lex_injects_caret_for_adjacency() {
        // a'b' concatenates
        assert_eq!(
            kinds("echo a'b'"),
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Caret,
                TokenKind::QWord
            ]
        );
        // -$x concatenates
        assert_eq!(
            kinds("echo -$x"),
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Caret,
                TokenKind::Dollar,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_dollar_name_splits_at_dot() {
        // $x.c is $x ^ .c
        assert_eq!(
            kinds("echo $x.c"),
            vec![
                TokenKind::Word,
                TokenKind::Dollar,
                TokenKind::Word,
                TokenKind::Caret,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_no_caret_across_whitespace() {
        assert_eq!(
            kinds("echo $x y"),
            vec![
                TokenKind::Word,
                TokenKind::Dollar,
                TokenKind::Word,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_subscript_paren_gets_no_caret() {
        assert_eq!(
            kinds("echo $x(1)"),
            vec![
                TokenKind::Word,
                TokenKind::Dollar,
                TokenKind::Word,
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::RParen
            ]
        );
    }

    #[test]
    fn lex_redir_brackets() {
        assert_eq!(
            kinds("cmd >[2] err"),
            vec![
                TokenKind::Word,
                TokenKind::Redir {
                    op: RedirOp::Out,
                    fd: 2
                },
                TokenKind::Word
            ]
        );
        assert_eq!(
            kinds("cmd >[2=1]"),
            vec![
                TokenKind::Word,
                TokenKind::Dup {
                    op: RedirOp::Out,
                    fd: 2,
                    src: 1
                }
            ]
        );
        assert_eq!(
            kinds("cmd >[2=]"),
            vec![
                TokenKind::Word,
                TokenKind::Dup {
                    op: RedirOp::Out,
                    fd: 2,
                    src: -1
                }
            ]
        );
    }

    #[test]
    fn lex_bad_bracket() {
        assert!(matches!(lex("cmd >[x]"), Err(LexError::BadBracket { .. })));
        assert!(matches!(lex("cmd >[2"), Err(LexError::BadBracket { .. })));
    }

    #[test]
    fn lex_heredoc_ops() {
        assert_eq!(
            kinds("cmd << tag"),
            vec![
                TokenKind::Word,
                TokenKind::Redir {
                    op: RedirOp::Heredoc,
                    fd: -1
                },
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_pipe_fd() {
        assert_eq!(
            kinds("a |[2] b"),
            vec![
                TokenKind::Word,
                TokenKind::Pipe {
                    left_fd: 2,
                    right_fd: 0
                },
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_keywords_only_in_command_position() {
        assert_eq!(kinds("if"), vec![TokenKind::KwIf]);
        assert_eq!(kinds("echo if"), vec![TokenKind::Word, TokenKind::Word]);
        // quoting reverts a keyword to a plain word
        assert_eq!(kinds("'if'"), vec![TokenKind::QWord]);
    }

    #[test]
    fn lex_bang_standalone_only() {
        assert_eq!(kinds("! true")[0], TokenKind::Bang);
        assert_eq!(kinds("echo !x"), vec![TokenKind::Word, TokenKind::Word]);
    }

    #[test]
    fn lex_eq_records_adjacency() {
        let toks = lex("x=y").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Eq);
        assert!(!toks[1].sep);
        assert!(!toks[2].sep);
        let toks = lex("echo a = b").unwrap();
        assert!(toks[2].sep);
    }

    #[test]
    fn lex_backquote_forms() {
        assert_eq!(
            kinds("`{ls}"),
            vec![
                TokenKind::Backquote,
                TokenKind::LBrace,
                TokenKind::Word,
                TokenKind::RBrace
            ]
        );
        assert_eq!(
            kinds("``': '{ls}"),
            vec![
                TokenKind::BackquoteIfs,
                TokenKind::QWord,
                TokenKind::LBrace,
                TokenKind::Word,
                TokenKind::RBrace
            ]
        );
    }

    #[test]
    fn lex_backquote_close_concats() {
        // `{cmd}x concatenates the capture with x
        let ks = kinds("echo `{a}x");
        assert_eq!(
            ks,
            vec![
                TokenKind::Word,
                TokenKind::Backquote,
                TokenKind::LBrace,
                TokenKind::Word,
                TokenKind::RBrace,
                TokenKind::Caret,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_amp_forms() {
        assert_eq!(
            kinds("a & b && c"),
            vec![
                TokenKind::Word,
                TokenKind::Amp,
                TokenKind::Word,
                TokenKind::AndAnd,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn lex_tracks_positions() {
        let toks = lex("a\nbb c").unwrap();
        assert_eq!(toks[0].pos, Pos { line: 1, col: 1 });
        assert_eq!(toks[2].pos, Pos { line: 2, col: 1 });
        assert_eq!(toks[3].pos, Pos { line: 2, col: 4 });
    }
}
