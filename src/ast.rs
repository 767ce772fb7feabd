//! AST node types for rc source.
//!
//! The parser produces a tree of tagged [`Node`]s. A single node struct with
//! a kind tag keeps the planner's lowering switch flat and lets tooling walk
//! the tree without a visitor per variant.

/// Node kind. Four families: structure, command, leaf words, redirections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    // structure
    Seq,
    Pipe,
    Bg,
    And,
    Or,
    Brace,
    Paren,
    Subshell,
    If,
    IfNot,
    Else,
    While,
    For,
    Switch,
    Bang,
    Match,
    // command
    Call,
    ArgList,
    Words,
    Pre,
    Epilog,
    Assign,
    FnDef,
    FnRm,
    // leaf words
    Word,
    QWord,
    Var,
    Sub,
    Flat,
    Count,
    Backquote,
    Concat,
    // redirections
    Redir,
    Dup,
}

/// Source position of a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

/// A tagged AST node. Not every field is used by every kind:
///
/// - `Call`: `left` is the `ArgList` of words, `right` an optional `Epilog`.
/// - `Pipe`: `i1`/`i2` carry the left/right fds (default 1 and 0).
/// - `Redir`: `tok` is the operator, `i1` the explicit fd or -1 for the
///   op default; `Dup`: `i1` is the target fd, `i2` the source or -1 for
///   close.
/// - `Var`: `left` is the name word, `right` an optional subscript list.
/// - `Backquote`: `left` is the optional split list, `right` the program.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub tok: String,
    pub pos: Pos,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
    pub list: Vec<Node>,
    pub i1: i32,
    pub i2: i32,
}

impl Node {
    pub fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            tok: String::new(),
            pos: Pos::default(),
            left: None,
            right: None,
            list: Vec::new(),
            i1: -1,
            i2: -1,
        }
    }

    /// A word leaf.
    pub fn word(s: impl Into<String>) -> Node {
        let mut n = Node::new(NodeKind::Word);
        n.tok = s.into();
        n
    }

    /// A quoted-word leaf.
    pub fn qword(s: impl Into<String>) -> Node {
        let mut n = Node::new(NodeKind::QWord);
        n.tok = s.into();
        n
    }

    /// A binary node.
    pub fn binary(kind: NodeKind, left: Node, right: Node) -> Node {
        let mut n = Node::new(kind);
        n.left = Some(Box::new(left));
        n.right = Some(Box::new(right));
        n
    }

    /// A node with only a left child.
    pub fn unary(kind: NodeKind, left: Node) -> Node {
        let mut n = Node::new(kind);
        n.left = Some(Box::new(left));
        n
    }

    /// A list node, flattening children that already carry the same kind.
    pub fn list_of(kind: NodeKind, items: Vec<Node>) -> Node {
        let mut out = Node::new(kind);
        for item in items {
            if item.kind == kind && !item.list.is_empty() {
                out.list.extend(item.list);
            } else {
                out.list.push(item);
            }
        }
        out
    }

    pub fn at(mut self, pos: Pos) -> Node {
        self.pos = pos;
        self
    }

    pub fn left_ref(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    pub fn right_ref(&self) -> Option<&Node> {
        self.right.as_deref()
    }
}

/// Collects `tok` values of `Word`/`QWord` leaves in preorder.
pub fn preorder_words(n: &Node) -> Vec<String> {
    let mut out = Vec::new();
    collect_words(n, &mut out);
    out
}

fn collect_words(n: &Node, out: &mut Vec<String>) {
    if matches!(n.kind, NodeKind::Word | NodeKind::QWord) && !n.tok.is_empty() {
        out.push(n.tok.clone());
    }
    if let Some(left) = n.left_ref() {
        collect_words(left, out);
    }
    if let Some(right) = n.right_ref() {
        collect_words(right, out);
    }
    for child in &n.list {
        collect_words(child, out);
    }
}

/// Collects node kinds in preorder.
pub fn kinds_preorder(n: &Node) -> Vec<NodeKind> {
    let mut out = Vec::new();
    collect_kinds(n, &mut out);
    out
}

fn collect_kinds(n: &Node, out: &mut Vec<NodeKind>) {
    out.push(n.kind);
    if let Some(left) = n.left_ref() {
        collect_kinds(left, out);
    }
    if let Some(right) = n.right_ref() {
        collect_kinds(right, out);
    }
    for child in &n.list {
        collect_kinds(child, out);
    }
}

/// Returns the first word beneath `n`, used for function and variable names.
pub fn leading_name(n: &Node) -> Option<&str> {
    if matches!(n.kind, NodeKind::Word | NodeKind::QWord) && !n.tok.is_empty() {
        return Some(&n.tok);
    }
    for child in &n.list {
        if let Some(name) = leading_name(child) {
            return Some(name);
        }
    }
    if let Some(name) = n.left_ref().and_then(leading_name) {
        return Some(name);
    }
    n.right_ref().and_then(leading_name)
}
