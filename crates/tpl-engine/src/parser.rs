// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::ast::{
    ActionNode, Ast, BindingKind, Block, Branch, Command, CommentNode, ElseIfBranch, Expression,
    IfNode, Node, Pipeline, PipelineDeclarations, RangeNode, Span, TextNode, WithNode,
};
use crate::error::Error;
use crate::lexer;
use crate::lexer::{Keyword, Operator, Token, TokenKind};

/// Primary entry point for parsing template sources.
///
/// The parser walks the input once, splitting it into literal text and action
/// blocks. To mimic Go's `text/template` behaviour we keep two stacks:
///
/// - `control_stack` stores the open `if`/`range`/`with` frames so we can
///   populate their bodies when a matching `{{end}}` is seen.
/// - `target_stack` tracks where the next node should be appended (root block,
///   current `then` block, the latest `else if` block, or the `else` block).
pub fn parse_template(name: &str, source: &str) -> Result<Ast, Error> {
    let mut root = Block::default();
    let mut cursor = 0usize;
    let bytes = source.as_bytes();
    let mut control_stack: Vec<ControlFrame> = Vec::new();
    let mut target_stack: Vec<AppendTarget> = vec![AppendTarget::Root];

    while cursor < bytes.len() {
        let Some(open) = find_action_start(bytes, cursor) else {
            let node = Node::Text(TextNode::new(
                Span::new(cursor, source.len()),
                &source[cursor..],
            ));
            push_node(&mut root, &mut control_stack, &target_stack, node);
            break;
        };

        if open > cursor {
            let node = Node::Text(TextNode::new(Span::new(cursor, open), &source[cursor..open]));
            push_node(&mut root, &mut control_stack, &target_stack, node);
        }

        let Some(close) = find_action_end(bytes, open + 2) else {
            let mut remainder = source[open + 2..].trim_start();
            if let Some(rest) = remainder.strip_prefix('-') {
                remainder = rest.trim_start();
            }
            let span = Span::new(open, source.len());
            if remainder.starts_with("/*") {
                return Err(Error::parse_with_span("unclosed comment", span));
            }
            return Err(Error::parse_with_span("unclosed action", span));
        };

        let window = trim_action_delimiters(source, bytes, open, close);

        if window.trim_left {
            let block = current_block_mut(&mut root, &mut control_stack, &target_stack);
            trim_trailing_whitespace(block);
        }

        let body = window.body.trim();
        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return Err(Error::parse_with_span("unclosed comment", window.span));
            }
            let node = Node::Comment(CommentNode::new(
                window.span,
                strip_comment(body),
                window.trim_left,
                window.trim_right,
            ));
            push_node(&mut root, &mut control_stack, &target_stack, node);
        } else {
            let tokens = lexer::lex_action(window.body, window.body_start)?;
            if tokens.is_empty() {
                return Err(Error::parse_with_span("empty action", window.span));
            }

            match classify_action(&tokens)? {
                ActionKind::Open(kind) => {
                    let pipeline = parse_action_pipeline(&tokens[1..])?;
                    let frame = ControlFrame::new(kind, window.span, pipeline);
                    push_control_frame(&mut control_stack, &mut target_stack, frame);
                }
                ActionKind::Else => {
                    handle_else(&mut control_stack, &mut target_stack, window.span, &tokens)?;
                }
                ActionKind::End => {
                    close_control_frame(
                        &mut root,
                        &mut control_stack,
                        &mut target_stack,
                        window.span,
                    )?;
                }
                ActionKind::Regular => {
                    let pipeline = parse_action_pipeline(&tokens)?;
                    let node = Node::Action(ActionNode::new(
                        window.span,
                        window.body,
                        pipeline,
                        window.trim_left,
                        window.trim_right,
                    ));
                    push_node(&mut root, &mut control_stack, &target_stack, node);
                }
            }
        }

        cursor = close + 2;
        if window.trim_right {
            cursor = skip_leading_whitespace(bytes, cursor);
        }
    }

    if bytes.is_empty() {
        root.push(Node::Text(TextNode::new(Span::new(0, 0), String::new())));
    }

    if let Some(frame) = control_stack.last() {
        return Err(Error::parse(
            "unterminated control structure",
            Some(frame.start_span),
        ));
    }

    Ok(Ast::new(name, root))
}

#[derive(Debug, Clone, Copy)]
struct ActionWindow<'a> {
    span: Span,
    body_start: usize,
    body: &'a str,
    trim_left: bool,
    trim_right: bool,
}

fn trim_action_delimiters<'a>(
    source: &'a str,
    bytes: &[u8],
    open: usize,
    close: usize,
) -> ActionWindow<'a> {
    let mut body_start = open + 2;
    let mut body_end = close;
    let mut trim_left = false;
    let mut trim_right = false;

    if body_start < close && bytes[body_start] == b'-' {
        trim_left = true;
        body_start += 1;
    }
    if body_start < body_end && bytes[body_end - 1] == b'-' {
        trim_right = true;
        body_end -= 1;
    }

    let raw = &source[body_start..body_end];
    let trimmed_start = raw.trim_start();
    body_start += raw.len() - trimmed_start.len();

    ActionWindow {
        span: Span::new(open, close + 2),
        body_start,
        body: trimmed_start.trim_end(),
        trim_left,
        trim_right,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    If,
    Range,
    With,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Open(ControlKind),
    Else,
    End,
    Regular,
}

fn classify_action(tokens: &[Token]) -> Result<ActionKind, Error> {
    let first = tokens
        .first()
        .ok_or_else(|| Error::parse("empty action", None))?;
    let (kind, keyword) = match &first.kind {
        TokenKind::Keyword(Keyword::If) => (ControlKind::If, "if"),
        TokenKind::Keyword(Keyword::Range) => (ControlKind::Range, "range"),
        TokenKind::Keyword(Keyword::With) => (ControlKind::With, "with"),
        TokenKind::Keyword(Keyword::Else) => return Ok(ActionKind::Else),
        TokenKind::Keyword(Keyword::End) => {
            if tokens.len() > 1 {
                return Err(Error::parse(
                    "unexpected tokens after end",
                    Some(tokens[1].span),
                ));
            }
            return Ok(ActionKind::End);
        }
        _ => return Ok(ActionKind::Regular),
    };
    if tokens.len() < 2 {
        return Err(Error::parse_with_span(
            format!("{keyword} requires a pipeline"),
            first.span,
        ));
    }
    Ok(ActionKind::Open(kind))
}

#[derive(Debug, Clone, Copy)]
enum AppendTarget {
    Root,
    Then(usize),
    ElseIf(usize),
    Else(usize),
}

#[derive(Debug)]
struct ControlFrame {
    kind: ControlKind,
    start_span: Span,
    pipeline: Pipeline,
    then_block: Block,
    else_if_branches: Vec<ElseIfBranch>,
    else_block: Option<Block>,
}

impl ControlFrame {
    fn new(kind: ControlKind, span: Span, pipeline: Pipeline) -> Self {
        Self {
            kind,
            start_span: span,
            pipeline,
            then_block: Block::default(),
            else_if_branches: Vec::new(),
            else_block: None,
        }
    }
}

fn current_block_mut<'a>(
    root: &'a mut Block,
    controls: &'a mut [ControlFrame],
    targets: &[AppendTarget],
) -> &'a mut Block {
    match targets.last().copied().unwrap_or(AppendTarget::Root) {
        AppendTarget::Root => root,
        AppendTarget::Then(idx) => &mut controls[idx].then_block,
        AppendTarget::ElseIf(idx) => {
            let frame = &mut controls[idx];
            match frame.else_if_branches.last_mut() {
                Some(branch) => &mut branch.block,
                None => &mut frame.then_block,
            }
        }
        AppendTarget::Else(idx) => controls[idx].else_block.get_or_insert_with(Block::default),
    }
}

fn trim_trailing_whitespace(block: &mut Block) {
    if let Some(Node::Text(text)) = block.nodes.last_mut() {
        let kept = text
            .text
            .trim_end_matches([' ', '\t', '\n', '\r'])
            .len();
        text.text.truncate(kept);
    }
}

fn skip_leading_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && matches!(bytes[index], b' ' | b'\t' | b'\n' | b'\r') {
        index += 1;
    }
    index
}

fn push_node(
    root: &mut Block,
    controls: &mut [ControlFrame],
    targets: &[AppendTarget],
    node: Node,
) {
    current_block_mut(root, controls, targets).push(node);
}

fn push_control_frame(
    controls: &mut Vec<ControlFrame>,
    targets: &mut Vec<AppendTarget>,
    frame: ControlFrame,
) {
    controls.push(frame);
    targets.push(AppendTarget::Then(controls.len() - 1));
}

fn handle_else(
    controls: &mut [ControlFrame],
    targets: &mut [AppendTarget],
    span: Span,
    tokens: &[Token],
) -> Result<(), Error> {
    let current = targets
        .last_mut()
        .ok_or_else(|| Error::parse_with_span("unexpected else", span))?;

    let idx = match current {
        AppendTarget::Then(idx) | AppendTarget::ElseIf(idx) => *idx,
        AppendTarget::Else(_) => {
            return Err(Error::parse_with_span("duplicate else block", span));
        }
        AppendTarget::Root => return Err(Error::parse_with_span("unexpected else", span)),
    };

    let frame = controls
        .get_mut(idx)
        .ok_or_else(|| Error::parse_with_span("mismatched else", span))?;

    match tokens.get(1) {
        None => {
            frame.else_block = Some(Block::default());
            *current = AppendTarget::Else(idx);
        }
        Some(token) if matches!(token.kind, TokenKind::Keyword(Keyword::If)) => {
            if frame.kind != ControlKind::If {
                return Err(Error::parse_with_span(
                    "else if is only valid inside if",
                    token.span,
                ));
            }
            if tokens.len() < 3 {
                return Err(Error::parse_with_span("if requires a pipeline", token.span));
            }
            let pipeline = parse_action_pipeline(&tokens[2..])?;
            frame.else_if_branches.push(ElseIfBranch::new(span, pipeline));
            *current = AppendTarget::ElseIf(idx);
        }
        Some(token) => {
            return Err(Error::parse(
                "unexpected tokens after else",
                Some(token.span),
            ));
        }
    }
    Ok(())
}

fn close_control_frame(
    root: &mut Block,
    controls: &mut Vec<ControlFrame>,
    targets: &mut Vec<AppendTarget>,
    span: Span,
) -> Result<(), Error> {
    let top = targets
        .pop()
        .ok_or_else(|| Error::parse_with_span("unexpected end", span))?;

    let idx = match top {
        AppendTarget::Then(idx) | AppendTarget::ElseIf(idx) | AppendTarget::Else(idx) => idx,
        AppendTarget::Root => return Err(Error::parse_with_span("unexpected end", span)),
    };

    if controls.len() != idx + 1 {
        return Err(Error::parse_with_span(
            "nested block closed out of order",
            span,
        ));
    }

    let frame = controls
        .pop()
        .ok_or_else(|| Error::parse_with_span("unexpected end", span))?;
    let full_span = Span::new(frame.start_span.start, span.end);
    let ControlFrame {
        kind,
        pipeline,
        then_block,
        else_if_branches,
        else_block,
        ..
    } = frame;

    let node = match kind {
        ControlKind::If => Node::If(IfNode::new(
            full_span,
            pipeline,
            then_block,
            else_if_branches,
            else_block,
        )),
        ControlKind::Range => Node::Range(RangeNode {
            branch: Branch::new(full_span, pipeline, then_block, else_block),
        }),
        ControlKind::With => Node::With(WithNode {
            branch: Branch::new(full_span, pipeline, then_block, else_block),
        }),
    };

    push_node(root, controls, targets.as_slice(), node);
    Ok(())
}

fn strip_comment(body: &str) -> String {
    body.strip_prefix("/*")
        .and_then(|b| b.strip_suffix("*/"))
        .map(|inner| inner.trim().to_string())
        .unwrap_or_else(|| body.to_string())
}

fn parse_action_pipeline(tokens: &[Token]) -> Result<Pipeline, Error> {
    ActionParser::new(tokens).parse_pipeline()
}

struct ActionParser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> ActionParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, index: 0 }
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, Error> {
        let declarations = self.parse_declarations();
        if self.is_eof() {
            return Err(Error::parse("empty action", None));
        }

        let mut commands = vec![self.parse_command()?];
        while self.consume_if(|kind| matches!(kind, TokenKind::Pipe)) {
            commands.push(self.parse_command()?);
        }

        if let Some(token) = self.peek_token() {
            return Err(Error::parse(
                format!("unexpected token {:?}", token.kind),
                Some(token.span),
            ));
        }

        Ok(Pipeline::new(declarations, commands))
    }

    fn parse_declarations(&mut self) -> Option<PipelineDeclarations> {
        let save = self.index;
        let mut names = Vec::new();

        while let Some(TokenKind::Identifier(name)) = self.peek_token().map(|t| &t.kind) {
            if !name.starts_with('$') {
                break;
            }
            names.push(name.clone());
            self.index += 1;
            if !self.consume_if(|kind| matches!(kind, TokenKind::Comma)) {
                break;
            }
        }

        let kind = match self.peek_token().map(|t| &t.kind) {
            Some(TokenKind::Declare) if !names.is_empty() => BindingKind::Declare,
            Some(TokenKind::Assign) if !names.is_empty() => BindingKind::Assign,
            _ => {
                self.index = save;
                return None;
            }
        };
        self.index += 1;

        Some(PipelineDeclarations::new(kind, names))
    }

    fn parse_command(&mut self) -> Result<Command, Error> {
        let first_expr = self.parse_expression()?;

        if let Some(operator) = self.consume_operator() {
            let rhs = self.parse_expression()?;
            let op_name = match operator {
                Operator::Equal => "eq",
                Operator::NotEqual => "ne",
                Operator::Less => "lt",
                Operator::LessOrEqual => "le",
                Operator::Greater => "gt",
                Operator::GreaterOrEqual => "ge",
            };
            return Ok(Command::new(
                Expression::identifier(op_name),
                vec![first_expr, rhs],
            ));
        }

        let mut args = Vec::new();
        loop {
            while self.consume_if(|kind| matches!(kind, TokenKind::Comma)) {}
            match self.peek_token() {
                None => break,
                Some(token) if matches!(token.kind, TokenKind::Pipe) => break,
                Some(_) => args.push(self.parse_expression()?),
            }
        }

        Ok(Command::new(first_expr, args))
    }

    fn parse_expression(&mut self) -> Result<Expression, Error> {
        let token = self
            .next_token()
            .ok_or_else(|| Error::parse("unexpected end of action", None))?;
        let expr = match &token.kind {
            TokenKind::Identifier(name) if name.starts_with('$') => {
                let mut parts = vec![name.clone()];
                self.extend_field_segments(&mut parts, token.span)?;
                if parts.len() > 1 {
                    Expression::Field(parts)
                } else {
                    Expression::Variable(name.clone())
                }
            }
            TokenKind::Identifier(name) => Expression::Identifier(name.clone()),
            TokenKind::Dot => self.parse_field()?,
            TokenKind::StringLiteral(value) => Expression::StringLiteral(value.clone()),
            TokenKind::NumberLiteral(value) => Expression::NumberLiteral(value.clone()),
            TokenKind::Keyword(Keyword::Nil) => Expression::Nil,
            TokenKind::Keyword(Keyword::True) => Expression::BoolLiteral(true),
            TokenKind::Keyword(Keyword::False) => Expression::BoolLiteral(false),
            TokenKind::Keyword(keyword) => Expression::identifier(keyword.as_str()),
            TokenKind::LeftParen => self.parse_parenthesized_pipeline()?,
            other => {
                return Err(Error::parse(
                    format!("unexpected token in expression: {:?}", other),
                    Some(token.span),
                ));
            }
        };
        Ok(expr)
    }

    fn parse_field(&mut self) -> Result<Expression, Error> {
        let Some(token) = self.peek_token() else {
            return Ok(Expression::Field(Vec::new()));
        };

        let first = match &token.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::NumberLiteral(num) => num.clone(),
            _ => return Ok(Expression::Field(Vec::new())),
        };
        self.index += 1;

        let mut parts = vec![first];
        self.extend_field_segments(&mut parts, token.span)?;
        Ok(Expression::Field(parts))
    }

    /// Appends `.name` and `[n]` segments that directly follow the previous
    /// segment without whitespace.
    fn extend_field_segments(
        &mut self,
        parts: &mut Vec<String>,
        mut last_span: Span,
    ) -> Result<(), Error> {
        while let Some(lead) = self.tokens.get(self.index) {
            if lead.span.start != last_span.end {
                break;
            }
            match lead.kind {
                TokenKind::Dot => {
                    let Some(segment) = self.tokens.get(self.index + 1) else {
                        break;
                    };
                    match &segment.kind {
                        TokenKind::Identifier(name) | TokenKind::NumberLiteral(name) => {
                            parts.push(name.clone());
                        }
                        _ => break,
                    }
                    self.index += 2;
                    last_span = segment.span;
                }
                TokenKind::LeftBracket => {
                    let index = self.tokens.get(self.index + 1);
                    let close = self.tokens.get(self.index + 2);
                    match (index.map(|t| &t.kind), close) {
                        (Some(TokenKind::NumberLiteral(num)), Some(close))
                            if matches!(close.kind, TokenKind::RightBracket)
                                && num.bytes().all(|b| b.is_ascii_digit()) =>
                        {
                            parts.push(format!("[{num}]"));
                            self.index += 3;
                            last_span = close.span;
                        }
                        _ => {
                            return Err(Error::parse_with_span(
                                "malformed index segment",
                                lead.span,
                            ));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn consume_if(&mut self, accept: impl Fn(&TokenKind) -> bool) -> bool {
        match self.peek_token() {
            Some(token) if accept(&token.kind) => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    fn next_token(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn peek_token(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn is_eof(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn consume_operator(&mut self) -> Option<Operator> {
        if let Some(TokenKind::Operator(op)) = self.peek_token().map(|t| &t.kind) {
            self.index += 1;
            return Some(op.clone());
        }
        None
    }

    fn parse_parenthesized_pipeline(&mut self) -> Result<Expression, Error> {
        let open_span = self.tokens[self.index - 1].span;
        let mut depth = 1usize;
        let mut end = self.index;
        while end < self.tokens.len() {
            match self.tokens[end].kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end += 1;
        }

        if depth != 0 {
            return Err(Error::parse_with_span("expected ')'", open_span));
        }

        let sub_tokens = &self.tokens[self.index..end];
        if sub_tokens.is_empty() {
            return Err(Error::parse_with_span("empty pipeline", open_span));
        }

        let pipeline = ActionParser::new(sub_tokens).parse_pipeline()?;
        if pipeline.declarations.is_some() {
            return Err(Error::parse_with_span(
                "pipeline declarations not allowed in expression",
                open_span,
            ));
        }

        self.index = end + 1;
        Ok(Expression::PipelineExpr(pipeline))
    }
}

fn find_action_start(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len().saturating_sub(1)).find(|&i| bytes[i] == b'{' && bytes[i + 1] == b'{')
}

fn find_action_end(bytes: &[u8], from: usize) -> Option<usize> {
    #[derive(PartialEq)]
    enum Mode {
        Code,
        Raw,
        Quoted,
        Comment,
    }

    let mut mode = Mode::Code;
    let mut i = from;
    while i + 1 < bytes.len() {
        let current = bytes[i];
        let next = bytes[i + 1];
        match mode {
            Mode::Comment if current == b'*' && next == b'/' => {
                mode = Mode::Code;
                i += 2;
                continue;
            }
            Mode::Raw if current == b'`' => mode = Mode::Code,
            Mode::Quoted if current == b'\\' => {
                i += 2;
                continue;
            }
            Mode::Quoted if current == b'"' => mode = Mode::Code,
            Mode::Code => match (current, next) {
                (b'/', b'*') => {
                    mode = Mode::Comment;
                    i += 2;
                    continue;
                }
                (b'`', _) => mode = Mode::Raw,
                (b'"', _) => mode = Mode::Quoted,
                (b'}', b'}') => return Some(i),
                _ => {}
            },
            _ => {}
        }
        i += 1;
    }
    None
}
