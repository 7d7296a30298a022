//! Rewrites synchronous-looking script source into async source.
//!
//! Functions that (transitively) call one of the async names become
//! `async function`s and every matching call site inside an async function is
//! wrapped in `(await ...)`. The rewrite patches the original text at AST span
//! offsets, so formatting and line numbers survive and a script without any
//! matching call comes back byte-for-byte identical.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::HashSet;

use super::{ProxyError, Result};

/// A seed name: either an exact callee name or a pattern over callee names.
#[derive(Debug, Clone)]
pub enum AsyncName {
    Literal(String),
    Pattern(Regex),
}

impl AsyncName {
    fn matches(&self, name: &str) -> bool {
        match self {
            AsyncName::Literal(literal) => literal == name,
            AsyncName::Pattern(pattern) => pattern.is_match(name),
        }
    }
}

impl From<&str> for AsyncName {
    fn from(name: &str) -> Self {
        AsyncName::Literal(name.to_string())
    }
}

impl From<String> for AsyncName {
    fn from(name: String) -> Self {
        AsyncName::Literal(name)
    }
}

impl From<Regex> for AsyncName {
    fn from(pattern: Regex) -> Self {
        AsyncName::Pattern(pattern)
    }
}

struct NameSet {
    seeds: Vec<AsyncName>,
    learned: HashSet<String>,
}

impl NameSet {
    fn new(seeds: &[AsyncName]) -> Self {
        Self {
            seeds: seeds.to_vec(),
            learned: HashSet::new(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.learned.contains(name) || self.seeds.iter().any(|seed| seed.matches(name))
    }

    fn learn(&mut self, name: &str) {
        if !self.matches(name) {
            self.learned.insert(name.to_string());
        }
    }
}

/// Transforms `source`, treating calls to `names` as asynchronous.
pub fn degenerate(source: &str, names: &[AsyncName]) -> Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser panicked on malformed input".to_string());
        return Err(ProxyError::Parse(message));
    }

    let mut names = NameSet::new(names);
    let mut marked = HashSet::new();

    // Every pass can only add names and functions, so this reaches a fixed point.
    loop {
        let before = (names.learned.len(), marked.len());
        let mut walker = Walker::new(Pass::Collect, &mut names, &mut marked);
        walker.walk_statements(&ret.program.body);
        if (names.learned.len(), marked.len()) == before {
            break;
        }
    }

    let mut walker = Walker::new(Pass::Rewrite, &mut names, &mut marked);
    walker.walk_statements(&ret.program.body);
    let edits = walker.edits;

    Ok(apply_edits(source, edits))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Collect,
    Rewrite,
}

struct Frame {
    name: Option<String>,
    start: u32,
    native_async: bool,
}

struct Edit {
    offset: u32,
    closing: bool,
    width: u32,
    text: &'static str,
}

struct Walker<'w> {
    pass: Pass,
    names: &'w mut NameSet,
    marked: &'w mut HashSet<u32>,
    frames: Vec<Frame>,
    edits: Vec<Edit>,
}

impl<'w> Walker<'w> {
    fn new(pass: Pass, names: &'w mut NameSet, marked: &'w mut HashSet<u32>) -> Self {
        Self {
            pass,
            names,
            marked,
            frames: Vec::new(),
            edits: Vec::new(),
        }
    }

    fn in_async_scope(&self) -> bool {
        self.frames
            .last()
            .map(|frame| frame.native_async || self.marked.contains(&frame.start))
            .unwrap_or(false)
    }

    fn visit_call(&mut self, start: u32, end: u32, callee: &Expression<'_>) {
        let Some(name) = callee_name(callee) else {
            return;
        };
        if !self.names.matches(&name) {
            return;
        }

        match self.pass {
            Pass::Collect => {
                let mut enclosing = Vec::new();
                for frame in &self.frames {
                    if let Some(name) = &frame.name {
                        self.marked.insert(frame.start);
                        enclosing.push(name.clone());
                    }
                }
                for name in enclosing {
                    self.names.learn(&name);
                }
            }
            Pass::Rewrite => {
                // `await` is only legal in an async body; other call sites stay synchronous.
                if self.in_async_scope() {
                    let width = end - start;
                    self.edits.push(Edit {
                        offset: start,
                        closing: false,
                        width,
                        text: "(await ",
                    });
                    self.edits.push(Edit {
                        offset: end,
                        closing: true,
                        width,
                        text: ")",
                    });
                }
            }
        }
    }

    fn learn_alias(&mut self, target: &str, value: &Expression<'_>) {
        if self.pass != Pass::Collect {
            return;
        }
        if let Expression::Identifier(ident) = value {
            if self.names.matches(ident.name.as_str()) {
                self.names.learn(target);
            }
        }
    }

    fn walk_function(&mut self, func: &Function<'_>) {
        self.frames.push(Frame {
            name: func.id.as_ref().map(|id| id.name.to_string()),
            start: func.span.start,
            native_async: func.r#async,
        });
        if let Some(body) = &func.body {
            self.walk_statements(&body.statements);
        }
        self.frames.pop();

        if self.pass == Pass::Rewrite && !func.r#async && self.marked.contains(&func.span.start) {
            self.edits.push(Edit {
                offset: func.span.start,
                closing: false,
                width: func.span.end - func.span.start,
                text: "async ",
            });
        }
    }

    fn walk_arrow(&mut self, arrow: &ArrowFunctionExpression<'_>) {
        self.frames.push(Frame {
            name: None,
            start: arrow.span.start,
            native_async: arrow.r#async,
        });
        self.walk_statements(&arrow.body.statements);
        self.frames.pop();
    }

    fn walk_statements(&mut self, statements: &[Statement<'_>]) {
        for statement in statements {
            self.walk_statement(statement);
        }
    }

    fn walk_declaration(&mut self, decl: &VariableDeclaration<'_>) {
        for declarator in &decl.declarations {
            if let Some(init) = &declarator.init {
                if let Some(id) = declarator.id.get_identifier_name() {
                    self.learn_alias(id.as_str(), init);
                }
                self.walk_expression(init);
            }
        }
    }

    fn walk_statement(&mut self, stmt: &Statement<'_>) {
        match stmt {
            Statement::ExpressionStatement(es) => self.walk_expression(&es.expression),
            Statement::BlockStatement(block) => self.walk_statements(&block.body),
            Statement::IfStatement(ifs) => {
                self.walk_expression(&ifs.test);
                self.walk_statement(&ifs.consequent);
                if let Some(alt) = &ifs.alternate {
                    self.walk_statement(alt);
                }
            }
            Statement::ReturnStatement(ret) => {
                if let Some(arg) = &ret.argument {
                    self.walk_expression(arg);
                }
            }
            Statement::VariableDeclaration(decl) => self.walk_declaration(decl),
            Statement::ForStatement(fors) => {
                if let Some(init) = &fors.init {
                    match init {
                        ForStatementInit::VariableDeclaration(decl) => self.walk_declaration(decl),
                        _ => {
                            if let Some(expr) = init.as_expression() {
                                self.walk_expression(expr);
                            }
                        }
                    }
                }
                if let Some(test) = &fors.test {
                    self.walk_expression(test);
                }
                if let Some(update) = &fors.update {
                    self.walk_expression(update);
                }
                self.walk_statement(&fors.body);
            }
            Statement::ForInStatement(fis) => {
                self.walk_expression(&fis.right);
                self.walk_statement(&fis.body);
            }
            Statement::ForOfStatement(fos) => {
                self.walk_expression(&fos.right);
                self.walk_statement(&fos.body);
            }
            Statement::WhileStatement(ws) => {
                self.walk_expression(&ws.test);
                self.walk_statement(&ws.body);
            }
            Statement::DoWhileStatement(dws) => {
                self.walk_statement(&dws.body);
                self.walk_expression(&dws.test);
            }
            Statement::WithStatement(ws) => {
                self.walk_expression(&ws.object);
                self.walk_statement(&ws.body);
            }
            Statement::SwitchStatement(ss) => {
                self.walk_expression(&ss.discriminant);
                for case in &ss.cases {
                    if let Some(test) = &case.test {
                        self.walk_expression(test);
                    }
                    self.walk_statements(&case.consequent);
                }
            }
            Statement::TryStatement(ts) => {
                self.walk_statements(&ts.block.body);
                if let Some(handler) = &ts.handler {
                    self.walk_statements(&handler.body.body);
                }
                if let Some(finalizer) = &ts.finalizer {
                    self.walk_statements(&finalizer.body);
                }
            }
            Statement::ThrowStatement(ts) => self.walk_expression(&ts.argument),
            Statement::LabeledStatement(ls) => self.walk_statement(&ls.body),
            Statement::FunctionDeclaration(fd) => self.walk_function(fd),
            Statement::ClassDeclaration(cd) => self.walk_class(&cd.body),
            _ => {}
        }
    }

    fn walk_class(&mut self, body: &ClassBody<'_>) {
        for element in &body.body {
            match element {
                ClassElement::MethodDefinition(md) => self.walk_function(&md.value),
                ClassElement::PropertyDefinition(pd) => {
                    if let Some(value) = &pd.value {
                        self.walk_expression(value);
                    }
                }
                ClassElement::StaticBlock(sb) => self.walk_statements(&sb.body),
                _ => {}
            }
        }
    }

    fn walk_arguments(&mut self, arguments: &[Argument<'_>]) {
        for arg in arguments {
            match arg {
                Argument::SpreadElement(spread) => self.walk_expression(&spread.argument),
                _ => {
                    if let Some(expr) = arg.as_expression() {
                        self.walk_expression(expr);
                    }
                }
            }
        }
    }

    fn walk_expression(&mut self, expr: &Expression<'_>) {
        match expr {
            Expression::CallExpression(call) => {
                self.visit_call(call.span.start, call.span.end, &call.callee);
                self.walk_expression(&call.callee);
                self.walk_arguments(&call.arguments);
            }
            Expression::NewExpression(new_expr) => {
                self.walk_expression(&new_expr.callee);
                self.walk_arguments(&new_expr.arguments);
            }
            Expression::StaticMemberExpression(member) => self.walk_expression(&member.object),
            Expression::ComputedMemberExpression(member) => {
                self.walk_expression(&member.object);
                self.walk_expression(&member.expression);
            }
            Expression::TaggedTemplateExpression(tagged) => {
                self.walk_expression(&tagged.tag);
                for e in &tagged.quasi.expressions {
                    self.walk_expression(e);
                }
            }
            Expression::ArrowFunctionExpression(arrow) => self.walk_arrow(arrow),
            Expression::FunctionExpression(func) => self.walk_function(func),
            Expression::AssignmentExpression(assign) => {
                if let AssignmentTarget::AssignmentTargetIdentifier(target) = &assign.left {
                    self.learn_alias(target.name.as_str(), &assign.right);
                }
                if let Some(member) = assign.left.as_member_expression() {
                    match member {
                        MemberExpression::StaticMemberExpression(m) => self.walk_expression(&m.object),
                        MemberExpression::ComputedMemberExpression(m) => {
                            self.walk_expression(&m.object);
                            self.walk_expression(&m.expression);
                        }
                        MemberExpression::PrivateFieldExpression(pf) => self.walk_expression(&pf.object),
                    }
                }
                self.walk_expression(&assign.right);
            }
            Expression::BinaryExpression(bin) => {
                self.walk_expression(&bin.left);
                self.walk_expression(&bin.right);
            }
            Expression::LogicalExpression(log) => {
                self.walk_expression(&log.left);
                self.walk_expression(&log.right);
            }
            Expression::ConditionalExpression(cond) => {
                self.walk_expression(&cond.test);
                self.walk_expression(&cond.consequent);
                self.walk_expression(&cond.alternate);
            }
            Expression::UnaryExpression(unary) => self.walk_expression(&unary.argument),
            Expression::SequenceExpression(seq) => {
                for e in &seq.expressions {
                    self.walk_expression(e);
                }
            }
            Expression::ArrayExpression(arr) => {
                for elem in &arr.elements {
                    match elem {
                        ArrayExpressionElement::SpreadElement(spread) => self.walk_expression(&spread.argument),
                        ArrayExpressionElement::Elision(_) => {}
                        _ => {
                            if let Some(e) = elem.as_expression() {
                                self.walk_expression(e);
                            }
                        }
                    }
                }
            }
            Expression::ObjectExpression(obj) => {
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => self.walk_expression(&p.value),
                        ObjectPropertyKind::SpreadProperty(spread) => self.walk_expression(&spread.argument),
                    }
                }
            }
            Expression::AwaitExpression(aw) => self.walk_expression(&aw.argument),
            Expression::YieldExpression(y) => {
                if let Some(arg) = &y.argument {
                    self.walk_expression(arg);
                }
            }
            Expression::TemplateLiteral(tl) => {
                for e in &tl.expressions {
                    self.walk_expression(e);
                }
            }
            Expression::ParenthesizedExpression(paren) => self.walk_expression(&paren.expression),
            Expression::ClassExpression(class) => self.walk_class(&class.body),
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::CallExpression(call) => {
                    self.visit_call(call.span.start, call.span.end, &call.callee);
                    self.walk_expression(&call.callee);
                    self.walk_arguments(&call.arguments);
                }
                ChainElement::StaticMemberExpression(member) => self.walk_expression(&member.object),
                ChainElement::ComputedMemberExpression(member) => {
                    self.walk_expression(&member.object);
                    self.walk_expression(&member.expression);
                }
                _ => {}
            },
            _ => {}
        }
    }
}

/// Statically known callee name: `f`, `obj.prop` or a named function
/// expression. Computed members and anonymous callees have none and are
/// left synchronous.
fn callee_name(callee: &Expression<'_>) -> Option<String> {
    match callee {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::StaticMemberExpression(member) => match &member.object {
            Expression::Identifier(object) => Some(format!("{}.{}", object.name, member.property.name)),
            _ => None,
        },
        Expression::FunctionExpression(func) => func.id.as_ref().map(|id| id.name.to_string()),
        Expression::ParenthesizedExpression(paren) => callee_name(&paren.expression),
        _ => None,
    }
}

fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    // Same offset: closings before openings, inner closings first, outer openings first.
    edits.sort_by_key(|e| (e.offset, !e.closing, if e.closing { e.width } else { u32::MAX - e.width }));

    let mut out = String::with_capacity(source.len() + edits.len() * 8);
    let mut cursor = 0usize;
    for edit in edits {
        let at = edit.offset as usize;
        out.push_str(&source[cursor..at]);
        out.push_str(edit.text);
        cursor = at;
    }
    out.push_str(&source[cursor..]);
    out
}
