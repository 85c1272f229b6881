//! Lowering from the tree-sitter Python tree to the flowcc syntax model.

use std::cell::RefCell;

use flowcc_core::ast::{
    Call, ClassDef, Comprehension, ComprehensionKind, Constant, ExceptHandler, Expr, FunctionDef,
    Generator, Keyword, Program, Stmt, StmtKind, TryStmt, WithItem,
};
use flowcc_error::{Error, Result};
use tree_sitter::{Node, Parser, Tree};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Deepest parse tree accepted, in tree levels. A nested call costs two
/// (`call` and `argument_list`), so this admits about a thousand nested
/// calls and keeps every later recursion over the syntax model bounded.
const MAX_TREE_DEPTH: usize = 2000;

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

/// Parse `source` with a parser reused per thread.
pub fn parse_tree(source: &str) -> Result<Tree> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_python::LANGUAGE.into())
                .map_err(|err| Error::parse_failed(format!("cannot load the python grammar: {err}")))?;
            *slot = Some(parser);
        }
        slot.as_mut()
            .and_then(|parser| parser.parse(source, None))
            .ok_or_else(|| Error::parse_failed("parser produced no tree").with_operation("py::parse_tree"))
    })
}

/// Reject trees containing error or missing nodes, reporting the first one,
/// and trees nested deeper than the lowering accepts.
pub(crate) fn check_syntax(root: Node<'_>) -> Result<()> {
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(
            Error::syntax_error(line, format!("invalid syntax at line {line}")).with_operation("py::parse_program")
        );
    }
    if let Some(line) = first_too_deep_line(root) {
        return Err(Error::syntax_error(line, format!("too many nested expressions at line {line}"))
            .with_context("max_depth", MAX_TREE_DEPTH.to_string())
            .with_operation("py::parse_program"));
    }
    Ok(())
}

/// Line of the first node sitting deeper than `MAX_TREE_DEPTH`.
fn first_too_deep_line(root: Node<'_>) -> Option<usize> {
    let mut cursor = root.walk();
    let mut depth = 0usize;
    loop {
        if depth > MAX_TREE_DEPTH {
            return Some(cursor.node().start_position().row + 1);
        }
        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
            depth -= 1;
        }
    }
}

fn first_error_line(root: Node<'_>) -> Option<usize> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

pub fn parse_program(source: &str) -> Result<Program> {
    let tree = parse_tree(source)?;
    let root = tree.root_node();
    check_syntax(root)?;
    let lowerer = Lowerer {
        source: source.as_bytes(),
    };
    let body = lowerer.block(root);
    tracing::debug!(statements = body.len(), "lowered python module");
    Ok(Program::new(body))
}

/// Named children, comments left out.
pub(crate) fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn field_nodes<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub(crate) fn line(node: Node<'_>) -> u32 {
    u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX)
}

/// The definition inside a decorated definition, or the node itself.
pub(crate) fn definition(node: Node<'_>) -> Node<'_> {
    match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition").unwrap_or(node),
        _ => node,
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.replace("\\\n", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode the escapes Python's `repr` would show again.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn unsupported_kind(kind: &str) -> &str {
    match kind {
        "global_statement" => "Global",
        "nonlocal_statement" => "Nonlocal",
        "delete_statement" => "Delete",
        "match_statement" => "Match",
        "type_alias_statement" => "TypeAlias",
        "print_statement" => "Print",
        "exec_statement" => "Exec",
        other => other,
    }
}

pub(crate) struct Lowerer<'s> {
    pub source: &'s [u8],
}

impl<'s> Lowerer<'s> {
    pub fn text(&self, node: Node<'_>) -> &'s str {
        let bytes = self.source.get(node.byte_range()).unwrap_or_default();
        std::str::from_utf8(bytes).unwrap_or_default()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|child| self.text(child).to_string())
            .unwrap_or_default()
    }

    fn field_expr(&self, node: Node<'_>, field: &str) -> Expr {
        match node.child_by_field_name(field) {
            Some(child) => self.expr(child),
            None => Expr::opaque(""),
        }
    }

    fn block(&self, node: Node<'_>) -> Vec<Stmt> {
        named(node).into_iter().filter_map(|child| self.stmt(child)).collect()
    }

    fn body(&self, node: Node<'_>, field: &str) -> Vec<Stmt> {
        node.child_by_field_name(field)
            .map(|block| self.block(block))
            .unwrap_or_default()
    }

    fn else_body(&self, node: Node<'_>) -> Vec<Stmt> {
        node.child_by_field_name("alternative")
            .map(|clause| self.body(clause, "body"))
            .unwrap_or_default()
    }

    fn stmt(&self, node: Node<'_>) -> Option<Stmt> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            let kind = self.stmt_kind(node)?;
            Some(Stmt::new(kind, line(definition(node))))
        })
    }

    fn stmt_kind(&self, node: Node<'_>) -> Option<StmtKind> {
        let kind = match node.kind() {
            "comment" => return None,
            "expression_statement" => self.expression_statement(node),
            "if_statement" => StmtKind::If {
                test: self.field_expr(node, "condition"),
                body: self.body(node, "consequence"),
                orelse: self.alternatives(&field_nodes(node, "alternative")),
            },
            "for_statement" => StmtKind::For {
                target: self.field_expr(node, "left"),
                iter: self.field_expr(node, "right"),
                body: self.body(node, "body"),
                orelse: self.else_body(node),
            },
            "while_statement" => StmtKind::While {
                test: self.field_expr(node, "condition"),
                body: self.body(node, "body"),
                orelse: self.else_body(node),
            },
            "function_definition" => StmtKind::FunctionDef(self.function(node, Vec::new())),
            "class_definition" => StmtKind::ClassDef(self.class(node)),
            "decorated_definition" => self.decorated(node)?,
            "return_statement" => StmtKind::Return(named(node).first().map(|value| self.expr(*value))),
            "pass_statement" => StmtKind::Pass,
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "raise_statement" => {
                let cause = node.child_by_field_name("cause");
                let exc = named(node)
                    .into_iter()
                    .find(|child| Some(child.id()) != cause.map(|c| c.id()));
                StmtKind::Raise {
                    exc: exc.map(|exc| self.expr(exc)),
                    cause: cause.map(|cause| self.expr(cause)),
                }
            }
            "try_statement" => StmtKind::Try(self.try_statement(node)),
            "with_statement" => self.with_statement(node),
            "assert_statement" => {
                let mut parts = named(node).into_iter().map(|part| self.expr(part));
                let test = parts.next()?;
                StmtKind::Assert {
                    test,
                    msg: parts.next(),
                }
            }
            "import_statement" => StmtKind::Import {
                names: self.import_names(node),
            },
            "import_from_statement" => StmtKind::ImportFrom {
                module: node.child_by_field_name("module_name").map(|m| self.text(m).to_string()),
                names: self.import_names(node),
            },
            "future_import_statement" => StmtKind::ImportFrom {
                module: Some("__future__".to_string()),
                names: self.import_names(node),
            },
            other => StmtKind::Unsupported {
                kind: unsupported_kind(other).to_string(),
            },
        };
        Some(kind)
    }

    fn expression_statement(&self, node: Node<'_>) -> StmtKind {
        match named(node).as_slice() {
            [single] if single.kind() == "assignment" => self.assignment(*single),
            [single] if single.kind() == "augmented_assignment" => StmtKind::AugAssign {
                target: self.field_expr(*single, "left"),
                op: self.field_text(*single, "operator"),
                value: self.field_expr(*single, "right"),
            },
            [single] => StmtKind::Expr(self.expr(*single)),
            many => StmtKind::Expr(Expr::Tuple(many.iter().map(|n| self.expr(*n)).collect())),
        }
    }

    /// `a = b = value` collects every target. Annotated assignments are
    /// left unsupported.
    fn assignment(&self, node: Node<'_>) -> StmtKind {
        let ann_assign = || StmtKind::Unsupported {
            kind: "AnnAssign".to_string(),
        };
        let mut targets = Vec::new();
        let mut current = node;
        loop {
            if current.child_by_field_name("type").is_some() {
                return ann_assign();
            }
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(self.expr(left));
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                Some(right) => {
                    return StmtKind::Assign {
                        targets,
                        value: self.expr(right),
                    };
                }
                None => return ann_assign(),
            }
        }
    }

    /// `elif` chains become nested `If` statements in `orelse`.
    fn alternatives(&self, alternatives: &[Node<'_>]) -> Vec<Stmt> {
        let Some((first, rest)) = alternatives.split_first() else {
            return Vec::new();
        };
        match first.kind() {
            "elif_clause" => vec![Stmt::new(
                StmtKind::If {
                    test: self.field_expr(*first, "condition"),
                    body: self.body(*first, "consequence"),
                    orelse: self.alternatives(rest),
                },
                line(*first),
            )],
            _ => self.body(*first, "body"),
        }
    }

    fn function(&self, node: Node<'_>, decorators: Vec<Expr>) -> FunctionDef {
        FunctionDef {
            name: self.field_text(node, "name"),
            params: node
                .child_by_field_name("parameters")
                .map(|params| self.params(params))
                .unwrap_or_default(),
            decorators,
            body: self.body(node, "body"),
        }
    }

    /// Plain positional parameter names; splats and separators are dropped.
    fn params(&self, node: Node<'_>) -> Vec<String> {
        named(node)
            .into_iter()
            .filter_map(|param| match param.kind() {
                "identifier" => Some(self.text(param).to_string()),
                "typed_parameter" => named(param)
                    .first()
                    .filter(|name| name.kind() == "identifier")
                    .map(|name| self.text(*name).to_string()),
                "default_parameter" | "typed_default_parameter" => {
                    param.child_by_field_name("name").map(|name| self.text(name).to_string())
                }
                _ => None,
            })
            .collect()
    }

    fn class(&self, node: Node<'_>) -> ClassDef {
        let bases = node
            .child_by_field_name("superclasses")
            .map(|list| {
                named(list)
                    .into_iter()
                    .filter(|base| base.kind() != "keyword_argument")
                    .map(|base| self.expr(base))
                    .collect()
            })
            .unwrap_or_default();
        ClassDef {
            name: self.field_text(node, "name"),
            bases,
            body: self.body(node, "body"),
        }
    }

    fn decorated(&self, node: Node<'_>) -> Option<StmtKind> {
        let decorators = named(node)
            .into_iter()
            .filter(|child| child.kind() == "decorator")
            .filter_map(|decorator| named(decorator).first().map(|expr| self.expr(*expr)))
            .collect();
        let def = node.child_by_field_name("definition")?;
        match def.kind() {
            "function_definition" => Some(StmtKind::FunctionDef(self.function(def, decorators))),
            "class_definition" => Some(StmtKind::ClassDef(self.class(def))),
            _ => None,
        }
    }

    fn try_statement(&self, node: Node<'_>) -> TryStmt {
        let mut stmt = TryStmt {
            body: self.body(node, "body"),
            handlers: Vec::new(),
            orelse: Vec::new(),
            finalbody: Vec::new(),
        };
        for child in named(node) {
            match child.kind() {
                "except_clause" | "except_group_clause" => stmt.handlers.push(self.except_handler(child)),
                "else_clause" => stmt.orelse = self.body(child, "body"),
                "finally_clause" => {
                    stmt.finalbody = named(child)
                        .into_iter()
                        .find(|part| part.kind() == "block")
                        .map(|block| self.block(block))
                        .unwrap_or_default();
                }
                _ => {}
            }
        }
        stmt
    }

    fn except_handler(&self, node: Node<'_>) -> ExceptHandler {
        let mut parts = Vec::new();
        let mut body = Vec::new();
        for child in named(node) {
            match child.kind() {
                "block" => body = self.block(child),
                "as_pattern" => {
                    if let Some(kind) = named(child).first() {
                        parts.push(*kind);
                    }
                    if let Some(alias) = child.child_by_field_name("alias") {
                        parts.push(alias);
                    }
                }
                _ => parts.push(child),
            }
        }
        ExceptHandler {
            kind: parts.first().map(|kind| self.expr(*kind)),
            name: parts.get(1).map(|name| self.text(*name).to_string()),
            body,
        }
    }

    fn with_statement(&self, node: Node<'_>) -> StmtKind {
        let mut items = Vec::new();
        for clause in named(node).into_iter().filter(|c| c.kind() == "with_clause") {
            for item in named(clause).into_iter().filter(|i| i.kind() == "with_item") {
                let Some(value) = item.child_by_field_name("value") else {
                    continue;
                };
                let with_item = match value.kind() {
                    "as_pattern" => WithItem {
                        context: named(value)
                            .first()
                            .map(|context| self.expr(*context))
                            .unwrap_or_else(|| self.expr(value)),
                        target: value.child_by_field_name("alias").map(|alias| self.expr(alias)),
                    },
                    _ => WithItem {
                        context: self.expr(value),
                        target: None,
                    },
                };
                items.push(with_item);
            }
        }
        StmtKind::With {
            items,
            body: self.body(node, "body"),
        }
    }

    fn import_names(&self, node: Node<'_>) -> Vec<String> {
        if named(node).iter().any(|child| child.kind() == "wildcard_import") {
            return vec!["*".to_string()];
        }
        field_nodes(node, "name")
            .into_iter()
            .map(|name| normalize_whitespace(self.text(name)))
            .collect()
    }

    pub fn expr(&self, node: Node<'_>) -> Expr {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expr_kind(node))
    }

    fn exprs(&self, node: Node<'_>) -> Vec<Expr> {
        named(node).into_iter().map(|child| self.expr(child)).collect()
    }

    fn expr_kind(&self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" => Expr::name(self.text(node)),
            "attribute" => Expr::Attribute {
                value: Box::new(self.field_expr(node, "object")),
                attr: self.field_text(node, "attribute"),
            },
            "call" => Expr::Call(self.call(node)),
            "string" => self.string(node),
            "concatenated_string" => self.concatenated_string(node),
            "integer" => Expr::Constant(Constant::Int(self.text(node).to_string())),
            "float" => Expr::Constant(Constant::Float(self.text(node).to_string())),
            "true" => Expr::Constant(Constant::Bool(true)),
            "false" => Expr::Constant(Constant::Bool(false)),
            "none" => Expr::Constant(Constant::None),
            "ellipsis" => Expr::Constant(Constant::Ellipsis),
            "list" | "list_pattern" => Expr::List(self.exprs(node)),
            "set" => Expr::Set(self.exprs(node)),
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" => Expr::Tuple(self.exprs(node)),
            "dictionary" => Expr::Dict(
                named(node)
                    .into_iter()
                    .filter_map(|entry| match entry.kind() {
                        "pair" => Some((Some(self.field_expr(entry, "key")), self.field_expr(entry, "value"))),
                        "dictionary_splat" => named(entry).first().map(|inner| (None, self.expr(*inner))),
                        _ => None,
                    })
                    .collect(),
            ),
            "parenthesized_expression" | "as_pattern_target" => match named(node).as_slice() {
                [inner] => self.expr(*inner),
                _ => self.opaque(node),
            },
            "lambda" => Expr::Lambda {
                params: node
                    .child_by_field_name("parameters")
                    .map(|params| self.params(params))
                    .unwrap_or_default(),
                body: Box::new(self.field_expr(node, "body")),
            },
            "list_comprehension" => self.comprehension(node, ComprehensionKind::List),
            "set_comprehension" => self.comprehension(node, ComprehensionKind::Set),
            "dictionary_comprehension" => self.comprehension(node, ComprehensionKind::Dict),
            "generator_expression" => self.comprehension(node, ComprehensionKind::Generator),
            _ => self.opaque(node),
        }
    }

    /// Operators, subscripts and the rest keep their source text; operands
    /// are lowered so calls inside stay visible.
    fn opaque(&self, node: Node<'_>) -> Expr {
        Expr::Opaque {
            text: normalize_whitespace(self.text(node)),
            children: self.exprs(node),
        }
    }

    fn call(&self, node: Node<'_>) -> Call {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() == "generator_expression" {
                args.push(self.expr(arguments));
            } else {
                for arg in named(arguments) {
                    match arg.kind() {
                        "keyword_argument" => keywords.push(Keyword {
                            name: Some(self.field_text(arg, "name")),
                            value: self.field_expr(arg, "value"),
                        }),
                        "dictionary_splat" => {
                            if let Some(inner) = named(arg).first() {
                                keywords.push(Keyword {
                                    name: None,
                                    value: self.expr(*inner),
                                });
                            }
                        }
                        _ => args.push(self.expr(arg)),
                    }
                }
            }
        }
        Call {
            func: Box::new(self.field_expr(node, "function")),
            args,
            keywords,
        }
    }

    fn comprehension(&self, node: Node<'_>, kind: ComprehensionKind) -> Expr {
        let (element, value) = match node.child_by_field_name("body") {
            Some(pair) if pair.kind() == "pair" => {
                (self.field_expr(pair, "key"), Some(self.field_expr(pair, "value")))
            }
            Some(body) => (self.expr(body), None),
            None => (Expr::opaque(""), None),
        };
        let mut generators: Vec<Generator> = Vec::new();
        for clause in named(node) {
            match clause.kind() {
                "for_in_clause" => {
                    let iter = match field_nodes(clause, "right").as_slice() {
                        [single] => self.expr(*single),
                        many => Expr::Tuple(many.iter().map(|n| self.expr(*n)).collect()),
                    };
                    generators.push(Generator {
                        target: self.field_expr(clause, "left"),
                        iter,
                        ifs: Vec::new(),
                    });
                }
                "if_clause" => {
                    let cond = named(clause).first().map(|cond| self.expr(*cond));
                    if let (Some(generator), Some(cond)) = (generators.last_mut(), cond) {
                        generator.ifs.push(cond);
                    }
                }
                _ => {}
            }
        }
        Expr::Comprehension(Box::new(Comprehension {
            kind,
            element,
            value,
            generators,
        }))
    }

    fn string(&self, node: Node<'_>) -> Expr {
        let parts = named(node);
        let start = parts.first().filter(|p| p.kind() == "string_start");
        let end = parts.last().filter(|p| p.kind() == "string_end");
        let prefix = start
            .map(|p| self.text(*p).trim_end_matches(['"', '\'']).to_ascii_lowercase())
            .unwrap_or_default();

        if prefix.contains('f') || prefix.contains('t') {
            let interpolations = parts
                .iter()
                .filter(|p| p.kind() == "interpolation")
                .filter_map(|p| p.child_by_field_name("expression").or_else(|| named(*p).first().copied()))
                .map(|expr| self.expr(expr))
                .collect();
            return Expr::FString {
                text: self.text(node).to_string(),
                parts: interpolations,
            };
        }
        if prefix.contains('b') {
            return Expr::Constant(Constant::Bytes(self.text(node).to_string()));
        }

        let from = start.map_or(node.start_byte(), |p| p.end_byte());
        let to = end.map_or(node.end_byte(), |p| p.start_byte());
        let raw = self
            .source
            .get(from..to)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default();
        if prefix.contains('r') {
            Expr::str(raw)
        } else {
            Expr::str(unescape(raw))
        }
    }

    fn concatenated_string(&self, node: Node<'_>) -> Expr {
        let pieces: Vec<Expr> = named(node)
            .into_iter()
            .filter(|child| child.kind() == "string")
            .map(|child| self.string(child))
            .collect();
        if pieces.iter().any(|piece| matches!(piece, Expr::FString { .. })) {
            let parts = pieces
                .into_iter()
                .flat_map(|piece| match piece {
                    Expr::FString { parts, .. } => parts,
                    _ => Vec::new(),
                })
                .collect();
            return Expr::FString {
                text: normalize_whitespace(self.text(node)),
                parts,
            };
        }
        if pieces.iter().any(|piece| matches!(piece, Expr::Constant(Constant::Bytes(_)))) {
            return Expr::Constant(Constant::Bytes(normalize_whitespace(self.text(node))));
        }
        let value: String = pieces
            .iter()
            .filter_map(|piece| match piece {
                Expr::Constant(Constant::Str(value)) => Some(value.as_str()),
                _ => None,
            })
            .collect();
        Expr::str(value)
    }
}
