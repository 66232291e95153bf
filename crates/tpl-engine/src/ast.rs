// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;

/// Byte offsets into the original template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Root AST structure for a parsed template.
#[derive(Debug, Clone)]
pub struct Ast {
    pub name: String,
    pub root: Block,
}

impl Ast {
    pub fn new(name: impl Into<String>, root: Block) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }
}

/// A sequential block of nodes (equivalent to Go's `parse.ListNode`).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }
}

/// Node types recognised by the parser.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    Comment(CommentNode),
    If(IfNode),
    Range(RangeNode),
    With(WithNode),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(node) => node.span,
            Node::Action(node) => node.span,
            Node::Comment(node) => node.span,
            Node::If(node) => node.span,
            Node::Range(node) => node.branch.span,
            Node::With(node) => node.branch.span,
        }
    }
}

/// Raw text literal.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

impl TextNode {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// Template action with parsed pipeline information.
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub span: Span,
    pub source: String,
    pub pipeline: Pipeline,
    pub trim_left: bool,
    pub trim_right: bool,
}

impl ActionNode {
    pub fn new(
        span: Span,
        source: impl Into<String>,
        pipeline: Pipeline,
        trim_left: bool,
        trim_right: bool,
    ) -> Self {
        Self {
            span,
            source: source.into(),
            pipeline,
            trim_left,
            trim_right,
        }
    }

    pub fn to_template_fragment(&self) -> String {
        wrap_delimiters(&self.source, self.trim_left, self.trim_right)
    }
}

/// Template comment (e.g. `{{/* comment */}}`).
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub span: Span,
    pub text: String,
    pub trim_left: bool,
    pub trim_right: bool,
}

impl CommentNode {
    pub fn new(span: Span, text: impl Into<String>, trim_left: bool, trim_right: bool) -> Self {
        Self {
            span,
            text: text.into(),
            trim_left,
            trim_right,
        }
    }

    pub fn to_template_fragment(&self) -> String {
        wrap_delimiters(
            &format!("/*{}*/", self.text),
            self.trim_left,
            self.trim_right,
        )
    }
}

fn wrap_delimiters(body: &str, trim_left: bool, trim_right: bool) -> String {
    let mut out = String::from("{{");
    if trim_left {
        out.push('-');
    }
    out.push_str(body);
    if trim_right {
        out.push('-');
    }
    out.push_str("}}");
    out
}

/// Pipeline plus the blocks it guards. Shared by `range` and `with`.
#[derive(Debug, Clone)]
pub struct Branch {
    pub span: Span,
    pub pipeline: Pipeline,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

impl Branch {
    pub fn new(span: Span, pipeline: Pipeline, then_block: Block, else_block: Option<Block>) -> Self {
        Self {
            span,
            pipeline,
            then_block,
            else_block,
        }
    }
}

/// Conditional branch node (mirrors Go's `parse.IfNode`).
#[derive(Debug, Clone)]
pub struct IfNode {
    pub span: Span,
    pub pipeline: Pipeline,
    pub then_block: Block,
    pub else_if_branches: Vec<ElseIfBranch>,
    pub else_block: Option<Block>,
}

impl IfNode {
    pub fn new(
        span: Span,
        pipeline: Pipeline,
        then_block: Block,
        else_if_branches: Vec<ElseIfBranch>,
        else_block: Option<Block>,
    ) -> Self {
        Self {
            span,
            pipeline,
            then_block,
            else_if_branches,
            else_block,
        }
    }
}

/// Captures an `{{else if ...}}` branch.
#[derive(Debug, Clone)]
pub struct ElseIfBranch {
    pub span: Span,
    pub pipeline: Pipeline,
    pub block: Block,
}

impl ElseIfBranch {
    pub fn new(span: Span, pipeline: Pipeline) -> Self {
        Self {
            span,
            pipeline,
            block: Block::default(),
        }
    }
}

/// Range iteration node.
#[derive(Debug, Clone)]
pub struct RangeNode {
    pub branch: Branch,
}

/// Scoped context node (`with`).
#[derive(Debug, Clone)]
pub struct WithNode {
    pub branch: Branch,
}

/// A complete pipeline inside an action.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub declarations: Option<PipelineDeclarations>,
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn new(declarations: Option<PipelineDeclarations>, commands: Vec<Command>) -> Self {
        Self {
            declarations,
            commands,
        }
    }
}

/// Variable declarations leading a pipeline (e.g. `{{$x := ...}}`).
#[derive(Debug, Clone)]
pub struct PipelineDeclarations {
    pub kind: BindingKind,
    pub variables: Vec<String>,
}

impl PipelineDeclarations {
    pub fn new(kind: BindingKind, variables: Vec<String>) -> Self {
        Self { kind, variables }
    }
}

/// Whether the pipeline introduces (`:=`) or assigns (`=`) variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BindingKind {
    Declare,
    Assign,
}

/// Individual command in a pipeline.
#[derive(Debug, Clone)]
pub struct Command {
    pub target: Expression,
    pub args: Vec<Expression>,
}

impl Command {
    pub fn new(target: Expression, args: Vec<Expression>) -> Self {
        Self { target, args }
    }
}

/// Expression node.
///
/// `Field` segments are plain names, numeric names (`.items.0`) or bracketed
/// indices kept verbatim (`[0]`), so `.hosts[0].name` is
/// `["hosts", "[0]", "name"]`.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Expression {
    Identifier(String),
    Field(Vec<String>),
    Variable(String),
    PipelineExpr(Pipeline),
    StringLiteral(String),
    NumberLiteral(String),
    BoolLiteral(bool),
    Nil,
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn field(path: Vec<String>) -> Self {
        Expression::Field(path)
    }
}

/// Joins field segments back into their dotted source form.
pub fn field_path(parts: &[String]) -> String {
    let mut out = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if part.starts_with('[') || (idx == 0 && part.starts_with('$')) {
            out.push_str(part);
        } else {
            out.push('.');
            out.push_str(part);
        }
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(node) => write!(f, "Text({:?})", node.text),
            Node::Action(node) => write!(f, "Action({:?})", node.source),
            Node::Comment(_) => write!(f, "Comment"),
            Node::If(_) => write!(f, "If"),
            Node::Range(_) => write!(f, "Range"),
            Node::With(_) => write!(f, "With"),
        }
    }
}
