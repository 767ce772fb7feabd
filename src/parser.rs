//! Recursive-descent parser for rc source.
//!
//! Consumes the token stream into the tagged [`Node`] tree. Precedence,
//! loosest first: `&`, then `;`/newline, then `&&`/`||`, then `|`, with
//! assignment and redirection prefixes binding tightest to a single command.
//! The parser does not recover: the first error discards the rest of the
//! input.

use crate::ast::{Node, NodeKind};
use crate::lexer::{lex, LexError, Token, TokenKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("{line}:{col}: unexpected '{tok}'")]
    Unexpected { tok: String, line: u32, col: u32 },
    #[error("{line}:{col}: expected {want}")]
    Expected {
        want: &'static str,
        line: u32,
        col: u32,
    },
    #[error("{line}:{col}: '$' must be followed by a name")]
    MissingVarName { line: u32, col: u32 },
}

/// Parse a complete source string. All-comment or all-whitespace input
/// yields `None`.
pub fn parse(input: &str) -> Result<Option<Node>, ParseError> {
    let tokens = lex(input)?;
    let mut p = Parser { tokens, pos: 0 };
    let node = p.parse_seq(Stop::Eof)?;
    Ok(node)
}

#[derive(Clone, Copy, PartialEq)]
enum Stop {
    Eof,
    RBrace,
    RParen,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().map(|t| &t.kind == kind).unwrap_or(false)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, want: &'static str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(t) if &t.kind == kind => Ok(self.advance().unwrap()),
            Some(t) => Err(ParseError::Expected {
                want,
                line: t.pos.line,
                col: t.pos.col,
            }),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(t) => ParseError::Unexpected {
                tok: t.lexeme.clone(),
                line: t.pos.line,
                col: t.pos.col,
            },
            None => ParseError::UnexpectedEof,
        }
    }

    fn skip_seps(&mut self) {
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Semi)
        ) {
            self.pos += 1;
        }
    }

    /// Parses a command list up to `stop`, folding into left-leaning `Seq`
    /// nodes. `&` binds loosest and also separates commands.
    fn parse_seq(&mut self, stop: Stop) -> Result<Option<Node>, ParseError> {
        let mut out: Option<Node> = None;
        loop {
            self.skip_seps();
            match self.peek().map(|t| &t.kind) {
                None => {
                    if stop == Stop::Eof {
                        break;
                    }
                    return Err(ParseError::UnexpectedEof);
                }
                Some(TokenKind::RBrace) if stop == Stop::RBrace => break,
                Some(TokenKind::RParen) if stop == Stop::RParen => break,
                Some(TokenKind::RBrace) | Some(TokenKind::RParen) => {
                    return Err(self.unexpected())
                }
                _ => {}
            }
            let mut cmd = self.parse_andor()?;
            let mut separated = false;
            if self.eat(&TokenKind::Amp) {
                cmd = Node::unary(NodeKind::Bg, cmd);
                separated = true;
            }
            out = Some(match out {
                None => cmd,
                Some(prev) => Node::binary(NodeKind::Seq, prev, cmd),
            });
            if separated {
                continue;
            }
            match self.peek().map(|t| &t.kind) {
                None | Some(TokenKind::Newline) | Some(TokenKind::Semi) => continue,
                Some(TokenKind::RBrace) if stop == Stop::RBrace => break,
                Some(TokenKind::RParen) if stop == Stop::RParen => break,
                _ => return Err(self.unexpected()),
            }
        }
        Ok(out)
    }

    fn parse_andor(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_pipe()?;
        loop {
            if self.eat(&TokenKind::AndAnd) {
                let right = self.parse_pipe()?;
                left = Node::binary(NodeKind::And, left, right);
            } else if self.eat(&TokenKind::OrOr) {
                let right = self.parse_pipe()?;
                left = Node::binary(NodeKind::Or, left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_pipe(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unit()?;
        loop {
            let fds = match self.peek().map(|t| &t.kind) {
                Some(&TokenKind::Pipe { left_fd, right_fd }) => (left_fd, right_fd),
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unit()?;
            let mut node = Node::binary(NodeKind::Pipe, left, right);
            node.i1 = fds.0;
            node.i2 = fds.1;
            left = node;
        }
    }

    fn parse_unit(&mut self) -> Result<Node, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Bang) => {
                self.pos += 1;
                Ok(Node::unary(NodeKind::Bang, self.parse_unit()?))
            }
            Some(TokenKind::At) => {
                self.pos += 1;
                Ok(Node::unary(NodeKind::Subshell, self.parse_body()?))
            }
            Some(TokenKind::Tilde) => self.parse_match(),
            Some(TokenKind::KwIf) => self.parse_if(),
            Some(TokenKind::KwWhile) => self.parse_while(),
            Some(TokenKind::KwFor) => self.parse_for(),
            Some(TokenKind::KwSwitch) => self.parse_switch(),
            Some(TokenKind::KwFn) => self.parse_fn(),
            Some(TokenKind::LBrace) => self.parse_brace(),
            Some(TokenKind::KwElse) => Err(self.unexpected()),
            _ => self.parse_simple(),
        }
    }

    /// `~ subject pattern…`
    fn parse_match(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let subj = self.parse_word()?;
        let mut pats = Vec::new();
        while self.at_word_start() {
            pats.push(self.parse_word()?);
        }
        Ok(Node::binary(
            NodeKind::Match,
            subj,
            Node::list_of(NodeKind::Words, pats),
        ))
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        // `if not body` runs iff the most recent if condition failed
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Word && t.lexeme == "not" {
                self.pos += 1;
                return Ok(Node::unary(NodeKind::IfNot, self.parse_body()?));
            }
        }
        self.expect(&TokenKind::LParen, "'(' after if")?;
        let cond = self
            .parse_seq(Stop::RParen)?
            .ok_or_else(|| self.unexpected())?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;
        if self.check(&TokenKind::KwElse) {
            self.pos += 1;
            let else_body = self.parse_body()?;
            let arm = Node::binary(NodeKind::Else, body, else_body);
            return Ok(Node::binary(NodeKind::If, cond, arm));
        }
        Ok(Node::binary(NodeKind::If, cond, body))
    }

    fn parse_while(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        self.expect(&TokenKind::LParen, "'(' after while")?;
        let cond = self
            .parse_seq(Stop::RParen)?
            .ok_or_else(|| self.unexpected())?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;
        Ok(Node::binary(NodeKind::While, cond, body))
    }

    fn parse_for(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        self.expect(&TokenKind::LParen, "'(' after for")?;
        let name = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::QWord) => {
                self.advance().unwrap()
            }
            _ => return Err(self.unexpected()),
        };
        let mut list = Vec::new();
        let mut has_in = false;
        if let Some(t) = self.peek() {
            if t.kind == TokenKind::Word && t.lexeme == "in" {
                self.pos += 1;
                has_in = true;
            }
        }
        if has_in {
            while self.at_word_start() {
                list.push(self.parse_word()?);
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;
        let mut node = Node::binary(NodeKind::For, Node::word(name.lexeme).at(name.pos), body);
        node.list = list;
        node.i1 = if has_in { 1 } else { -1 };
        Ok(node)
    }

    fn parse_switch(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let subject = if self.eat(&TokenKind::LParen) {
            let w = self.parse_word()?;
            self.expect(&TokenKind::RParen, "')'")?;
            w
        } else {
            self.parse_word()?
        };
        if !self.check(&TokenKind::LBrace) {
            return Err(self.unexpected());
        }
        let body = self.parse_brace()?;
        Ok(Node::binary(NodeKind::Switch, subject, body))
    }

    fn parse_fn(&mut self) -> Result<Node, ParseError> {
        self.pos += 1;
        let name = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::QWord) => {
                self.advance().unwrap()
            }
            _ => return Err(self.unexpected()),
        };
        let name_node = Node::word(name.lexeme).at(name.pos);
        match self.peek().map(|t| &t.kind) {
            None
            | Some(TokenKind::Newline)
            | Some(TokenKind::Semi)
            | Some(TokenKind::RBrace)
            | Some(TokenKind::Amp) => Ok(Node::unary(NodeKind::FnRm, name_node)),
            _ => {
                let body = self.parse_body()?;
                Ok(Node::binary(NodeKind::FnDef, name_node, body))
            }
        }
    }

    /// A control-form body: a block or a single command.
    fn parse_body(&mut self) -> Result<Node, ParseError> {
        if self.check(&TokenKind::LBrace) {
            self.parse_brace()
        } else {
            self.parse_andor()
        }
    }

    fn parse_brace(&mut self) -> Result<Node, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let inner = self.parse_seq(Stop::RBrace)?;
        self.expect(&TokenKind::RBrace, "'}'")?;
        let mut node = Node::new(NodeKind::Brace);
        node.left = inner.map(Box::new);
        // epilog redirections after the closing brace
        let mut redirs = Vec::new();
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Redir { .. }) | Some(TokenKind::Dup { .. })
        ) {
            redirs.push(self.parse_redir()?);
        }
        if !redirs.is_empty() {
            node.right = Some(Box::new(Node::list_of(NodeKind::Epilog, redirs)));
        }
        Ok(node)
    }

    /// A simple command: assignment/redirection prefixes, then call words
    /// with interleaved epilog redirections.
    fn parse_simple(&mut self) -> Result<Node, ParseError> {
        let mut prefixes = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Redir { .. }) | Some(TokenKind::Dup { .. }) => {
                    prefixes.push(self.parse_redir()?);
                }
                Some(TokenKind::Word) | Some(TokenKind::QWord)
                    if matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Eq)) =>
                {
                    let name = self.advance().unwrap();
                    self.pos += 1; // '='
                    let value = self.parse_assign_value()?;
                    prefixes.push(Node::binary(
                        NodeKind::Assign,
                        Node::word(name.lexeme).at(name.pos),
                        value,
                    ));
                }
                _ => break,
            }
        }
        // prefixes may precede a control form; the planner decides which
        // prefixes a non-command may carry
        if !prefixes.is_empty() && self.at_control_start() {
            let rest = self.parse_unit()?;
            let mut chain = rest;
            for p in prefixes.into_iter().rev() {
                let mut pre = Node::unary(NodeKind::Pre, p);
                pre.right = Some(Box::new(chain));
                chain = pre;
            }
            return Ok(chain);
        }
        let mut args = Vec::new();
        let mut redirs = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Redir { .. }) | Some(TokenKind::Dup { .. }) => {
                    redirs.push(self.parse_redir()?);
                }
                Some(TokenKind::Eq) => {
                    // a literal '=' in argument position glues to adjacent
                    // words: `echo a=b` prints a=b
                    let eq = self.advance().unwrap();
                    let mut node = Node::word("=").at(eq.pos);
                    if !eq.sep {
                        if let Some(prev) = args.pop() {
                            node = Node::binary(NodeKind::Concat, prev, node);
                        }
                    }
                    if self.at_word_start() && !self.peek().map(|t| t.sep).unwrap_or(true) {
                        let next = self.parse_word()?;
                        node = Node::binary(NodeKind::Concat, node, next);
                    }
                    args.push(node);
                }
                _ if self.at_word_start() => args.push(self.parse_word()?),
                _ => break,
            }
        }

        if prefixes.is_empty() && args.is_empty() && redirs.is_empty() {
            return Err(self.unexpected());
        }

        // `x=(a b)` alone is a standalone assignment node
        if args.is_empty()
            && redirs.is_empty()
            && prefixes.len() == 1
            && prefixes[0].kind == NodeKind::Assign
        {
            return Ok(prefixes.pop().unwrap());
        }

        let call = if args.is_empty() {
            None
        } else {
            let mut call = Node::unary(NodeKind::Call, Node::list_of(NodeKind::ArgList, args));
            if !redirs.is_empty() {
                call.right = Some(Box::new(Node::list_of(
                    NodeKind::Epilog,
                    std::mem::take(&mut redirs),
                )));
            }
            Some(call)
        };

        if prefixes.is_empty() && redirs.is_empty() {
            return Ok(call.expect("call with no prefixes"));
        }

        // fold prefixes (and any leftover redirs on an empty call) into a
        // Pre chain whose leaf is the command, or nothing
        let mut chain = call;
        for r in redirs.into_iter().rev() {
            let mut pre = Node::unary(NodeKind::Pre, r);
            pre.right = chain.map(Box::new);
            chain = Some(pre);
        }
        for p in prefixes.into_iter().rev() {
            let mut pre = Node::unary(NodeKind::Pre, p);
            pre.right = chain.map(Box::new);
            chain = Some(pre);
        }
        Ok(chain.expect("non-empty pre chain"))
    }

    fn parse_assign_value(&mut self) -> Result<Node, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let mut words = Vec::new();
                while self.at_word_start() {
                    words.push(self.parse_word()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Node::unary(
                    NodeKind::Paren,
                    Node::list_of(NodeKind::Words, words),
                ))
            }
            _ if self.at_word_start() => self.parse_word(),
            _ => Ok(Node::unary(
                NodeKind::Paren,
                Node::list_of(NodeKind::Words, Vec::new()),
            )),
        }
    }

    fn parse_redir(&mut self) -> Result<Node, ParseError> {
        let tok = self.advance().unwrap();
        match tok.kind {
            TokenKind::Redir { op, fd } => {
                if !self.at_word_start() {
                    return Err(ParseError::Expected {
                        want: "redirection target",
                        line: tok.pos.line,
                        col: tok.pos.col,
                    });
                }
                let target = self.parse_word()?;
                let mut node = Node::new(NodeKind::Redir);
                node.tok = op.as_str().into();
                node.pos = tok.pos;
                node.i1 = fd;
                node.right = Some(Box::new(target));
                Ok(node)
            }
            TokenKind::Dup { op, fd, src } => {
                let mut node = Node::new(NodeKind::Dup);
                node.tok = op.as_str().into();
                node.pos = tok.pos;
                node.i1 = fd;
                node.i2 = src;
                Ok(node)
            }
            _ => unreachable!("parse_redir on non-redirection token"),
        }
    }

    fn at_control_start(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::KwIf)
                | Some(TokenKind::KwWhile)
                | Some(TokenKind::KwFor)
                | Some(TokenKind::KwSwitch)
                | Some(TokenKind::KwFn)
                | Some(TokenKind::LBrace)
                | Some(TokenKind::At)
                | Some(TokenKind::Tilde)
                | Some(TokenKind::Bang)
        )
    }

    fn at_word_start(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Word)
                | Some(TokenKind::QWord)
                | Some(TokenKind::Dollar)
                | Some(TokenKind::DollarFlat)
                | Some(TokenKind::DollarCount)
                | Some(TokenKind::Backquote)
                | Some(TokenKind::BackquoteIfs)
                | Some(TokenKind::LParen)
        )
    }

    /// A word: atoms joined by (possibly synthetic) `^` into a Concat chain.
    fn parse_word(&mut self) -> Result<Node, ParseError> {
        let mut node = self.parse_atom()?;
        while self.eat(&TokenKind::Caret) {
            let rhs = self.parse_atom()?;
            node = Node::binary(NodeKind::Concat, node, rhs);
        }
        Ok(node)
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        let tok = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(ParseError::UnexpectedEof),
        };
        let node = match tok.kind {
            TokenKind::Word => {
                self.pos += 1;
                Node::word(tok.lexeme).at(tok.pos)
            }
            TokenKind::QWord => {
                self.pos += 1;
                Node::qword(tok.lexeme).at(tok.pos)
            }
            TokenKind::Dollar | TokenKind::DollarFlat | TokenKind::DollarCount => {
                self.pos += 1;
                let name = match self.peek() {
                    Some(t)
                        if matches!(t.kind, TokenKind::Word | TokenKind::QWord) && !t.sep =>
                    {
                        self.advance().unwrap()
                    }
                    _ => {
                        return Err(ParseError::MissingVarName {
                            line: tok.pos.line,
                            col: tok.pos.col,
                        })
                    }
                };
                let kind = match tok.kind {
                    TokenKind::DollarFlat => NodeKind::Flat,
                    TokenKind::DollarCount => NodeKind::Count,
                    _ => NodeKind::Var,
                };
                let mut node =
                    Node::unary(kind, Node::word(name.lexeme).at(name.pos)).at(tok.pos);
                if kind == NodeKind::Var {
                    if let Some(sub) = self.try_subscript()? {
                        node.right = Some(Box::new(sub));
                    }
                }
                node
            }
            TokenKind::Backquote | TokenKind::BackquoteIfs => {
                self.pos += 1;
                let ifs = if self.check(&TokenKind::LBrace) {
                    None
                } else {
                    Some(self.parse_atom()?)
                };
                self.expect(&TokenKind::LBrace, "'{' after backquote")?;
                let prog = self.parse_seq(Stop::RBrace)?;
                self.expect(&TokenKind::RBrace, "'}'")?;
                let mut node = Node::new(NodeKind::Backquote);
                node.pos = tok.pos;
                node.left = ifs.map(Box::new);
                node.right = prog.map(Box::new);
                node
            }
            TokenKind::LParen => {
                self.pos += 1;
                let mut words = Vec::new();
                while self.at_word_start() {
                    words.push(self.parse_word()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Node::unary(NodeKind::Paren, Node::list_of(NodeKind::Words, words)).at(tok.pos)
            }
            _ => return Err(self.unexpected()),
        };
        // postfix subscripts: `{cmd}(1), (a b c)(2), chained $x(1)(1)
        let mut node = node;
        while let Some(sub) = self.try_subscript()? {
            node = Node::binary(NodeKind::Sub, node, sub);
        }
        Ok(node)
    }

    /// An adjacent `(range…)` subscript, if present.
    fn try_subscript(&mut self) -> Result<Option<Node>, ParseError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::LParen && !t.sep => {}
            _ => return Ok(None),
        }
        self.pos += 1;
        let mut words = Vec::new();
        while self.at_word_start() {
            words.push(self.parse_word()?);
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Some(Node::list_of(NodeKind::Words, words)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{kinds_preorder, preorder_words};

    fn must(input: &str) -> Node {
        parse(input).unwrap().unwrap()
    }

    #[test]
    fn parse_empty_input_is_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("  # only a comment\n").unwrap(), None);
    }

    #[test]
    fn parse_simple_call() {
        let n = must("echo hi");
        assert_eq!(n.kind, NodeKind::Call);
        assert_eq!(preorder_words(&n), vec!["echo", "hi"]);
    }

    #[test]
    fn parse_quoted_word_is_single() {
        let n = must("echo 'a b; c'");
        assert_eq!(preorder_words(&n), vec!["echo", "a b; c"]);
    }

    #[test]
    fn parse_seq_and_pipe() {
        let n = must("a; b | c");
        assert_eq!(n.kind, NodeKind::Seq);
        let rhs = n.right_ref().unwrap();
        assert_eq!(rhs.kind, NodeKind::Pipe);
    }

    #[test]
    fn parse_pipe_fds_default() {
        let n = must("a | b");
        assert_eq!((n.i1, n.i2), (1, 0));
        let n = must("a |[2] b");
        assert_eq!((n.i1, n.i2), (2, 0));
    }

    #[test]
    fn parse_andor_left_assoc() {
        let n = must("a && b || c");
        assert_eq!(n.kind, NodeKind::Or);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::And);
    }

    #[test]
    fn parse_background_binds_loosest() {
        let n = must("a | b &");
        assert_eq!(n.kind, NodeKind::Bg);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::Pipe);
    }

    #[test]
    fn parse_amp_separates_commands() {
        let n = must("a & b");
        assert_eq!(n.kind, NodeKind::Seq);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::Bg);
    }

    #[test]
    fn parse_standalone_assignment() {
        let n = must("x=(a b)");
        assert_eq!(n.kind, NodeKind::Assign);
        assert_eq!(n.left_ref().unwrap().tok, "x");
        assert_eq!(n.right_ref().unwrap().kind, NodeKind::Paren);
    }

    #[test]
    fn parse_assignment_prefix() {
        let n = must("x=v cmd arg");
        assert_eq!(n.kind, NodeKind::Pre);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::Assign);
        assert_eq!(n.right_ref().unwrap().kind, NodeKind::Call);
    }

    #[test]
    fn parse_literal_eq_in_args() {
        let n = must("echo a=b");
        let kinds = kinds_preorder(&n);
        assert!(kinds.contains(&NodeKind::Concat));
        assert_eq!(preorder_words(&n), vec!["echo", "a", "=", "b"]);
    }

    #[test]
    fn parse_spaced_eq_stays_separate() {
        let n = must("echo a = b");
        assert!(!kinds_preorder(&n).contains(&NodeKind::Concat));
    }

    #[test]
    fn parse_redirs_collected_in_order() {
        let n = must("cmd > out >> log");
        assert_eq!(n.kind, NodeKind::Call);
        let epilog = n.right_ref().unwrap();
        assert_eq!(epilog.kind, NodeKind::Epilog);
        assert_eq!(epilog.list.len(), 2);
        assert_eq!(epilog.list[0].tok, ">");
        assert_eq!(epilog.list[1].tok, ">>");
    }

    #[test]
    fn parse_prefix_redir_applies_to_control_form() {
        let n = must("> out if (a) b");
        assert_eq!(n.kind, NodeKind::Pre);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::Redir);
        assert_eq!(n.right_ref().unwrap().kind, NodeKind::If);
    }

    #[test]
    fn parse_dup_and_close() {
        let n = must("cmd >[2=1] >[1=]");
        let epilog = n.right_ref().unwrap();
        assert_eq!(epilog.list[0].kind, NodeKind::Dup);
        assert_eq!((epilog.list[0].i1, epilog.list[0].i2), (2, 1));
        assert_eq!((epilog.list[1].i1, epilog.list[1].i2), (1, -1));
    }

    #[test]
    fn parse_if_else() {
        let n = must("if (true) a else b");
        assert_eq!(n.kind, NodeKind::If);
        assert_eq!(n.right_ref().unwrap().kind, NodeKind::Else);
    }

    #[test]
    fn parse_if_not() {
        let n = must("if not echo no");
        assert_eq!(n.kind, NodeKind::IfNot);
    }

    #[test]
    fn parse_for_with_list() {
        let n = must("for(x in a b) echo $x");
        assert_eq!(n.kind, NodeKind::For);
        assert_eq!(n.left_ref().unwrap().tok, "x");
        assert_eq!(n.list.len(), 2);
    }

    #[test]
    fn parse_for_over_star() {
        let n = must("for(x) echo $x");
        assert_eq!(n.kind, NodeKind::For);
        assert!(n.list.is_empty());
        assert_eq!(n.i1, -1);
    }

    #[test]
    fn parse_switch() {
        let n = must("switch foo { case f*; echo one }");
        assert_eq!(n.kind, NodeKind::Switch);
        assert_eq!(n.right_ref().unwrap().kind, NodeKind::Brace);
        let n = must("switch(foo){ case bar; echo two }");
        assert_eq!(n.kind, NodeKind::Switch);
    }

    #[test]
    fn parse_fn_def_and_rm() {
        let n = must("fn f { echo hi }");
        assert_eq!(n.kind, NodeKind::FnDef);
        assert_eq!(n.left_ref().unwrap().tok, "f");
        let n = must("fn f");
        assert_eq!(n.kind, NodeKind::FnRm);
    }

    #[test]
    fn parse_subshell() {
        let n = must("@ { x=1; echo $x }");
        assert_eq!(n.kind, NodeKind::Subshell);
        assert_eq!(n.left_ref().unwrap().kind, NodeKind::Brace);
    }

    #[test]
    fn parse_match_form() {
        let n = must("~ $x a* b*");
        assert_eq!(n.kind, NodeKind::Match);
        assert_eq!(n.right_ref().unwrap().list.len(), 2);
    }

    #[test]
    fn parse_bang() {
        let n = must("! cmd");
        assert_eq!(n.kind, NodeKind::Bang);
    }

    #[test]
    fn parse_var_with_subscript() {
        let n = must("echo $x(1 3-5 2-)");
        let kinds = kinds_preorder(&n);
        assert!(kinds.contains(&NodeKind::Var));
        assert!(kinds.contains(&NodeKind::Words));
    }

    #[test]
    fn parse_flat_and_count() {
        let n = must("echo $^x $#y");
        let kinds = kinds_preorder(&n);
        assert!(kinds.contains(&NodeKind::Flat));
        assert!(kinds.contains(&NodeKind::Count));
    }

    #[test]
    fn parse_backquote() {
        let n = must("echo `{ls -l}");
        let kinds = kinds_preorder(&n);
        assert!(kinds.contains(&NodeKind::Backquote));
    }

    #[test]
    fn parse_backquote_with_ifs() {
        let n = must("echo ``':'{cat /etc/passwd}");
        let kinds = kinds_preorder(&n);
        assert!(kinds.contains(&NodeKind::Backquote));
    }

    #[test]
    fn parse_concat_chain() {
        let n = must("echo a^b^c");
        assert_eq!(preorder_words(&n), vec!["echo", "a", "b", "c"]);
    }

    #[test]
    fn parse_brace_with_epilog() {
        let n = must("{ a; b } > out");
        assert_eq!(n.kind, NodeKind::Brace);
        assert!(n.right.is_some());
    }

    #[test]
    fn parse_missing_var_name() {
        assert!(matches!(
            parse("echo $ x"),
            Err(ParseError::MissingVarName { .. })
        ));
    }

    #[test]
    fn parse_error_on_unbalanced_brace() {
        assert!(parse("{ echo hi").is_err());
        assert!(parse("echo hi }").is_err());
    }

    #[test]
    fn parse_bare_redirection_line() {
        let n = must("> out");
        assert_eq!(n.kind, NodeKind::Pre);
        assert!(n.right.is_none());
    }
}
