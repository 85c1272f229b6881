//! Syntax model consumed by the graph builder.
//!
//! The front end lowers a parse tree into these types; the builder never sees
//! the parser. Every statement carries its 1-based source line. Expressions
//! implement `Display`, which prints them back as source text in the same
//! normalized form the diagram shows (string literals in repr form, tuples
//! parenthesized, single spaces around operators the front end could not
//! model structurally).

use std::collections::BTreeSet;
use std::fmt::{self, Display};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Self { kind, line }
    }

    /// A bare string literal statement; a docstring when it opens a body.
    pub fn is_string_literal(&self) -> bool {
        matches!(&self.kind, StmtKind::Expr(Expr::Constant(Constant::Str(_))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    /// `op` is the full operator token, e.g. `+=`.
    AugAssign {
        target: Expr,
        op: String,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Try(TryStmt),
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Pass,
    Import {
        names: Vec<String>,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<String>,
    },
    /// Anything the front end recognizes as a statement but the builder has
    /// no dedicated handling for (`global`, `del`, `match`, ...).
    Unsupported {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    pub fn first_param(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    /// Parameters shown in a method header; `self` is implied.
    pub fn visible_params(&self) -> Vec<&str> {
        self.params
            .iter()
            .map(String::as_str)
            .filter(|p| *p != "self")
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
}

impl ClassDef {
    pub fn methods(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::FunctionDef(def) => Some(def),
            _ => None,
        })
    }

    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods().find(|def| def.name == name)
    }

    /// Names that behave like data on an instance: attributes assigned
    /// anywhere inside `__init__` plus plain names assigned at class level.
    pub fn data_attributes(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some(init) = self.method("__init__") {
            collect_attribute_targets(&init.body, &mut names);
        }
        for stmt in &self.body {
            if let StmtKind::Assign { targets, .. } = &stmt.kind {
                for target in targets {
                    if let Expr::Name(name) = target {
                        names.insert(name.clone());
                    }
                }
            }
        }
        names
    }
}

fn collect_attribute_targets(body: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    if let Expr::Attribute { attr, .. } = target {
                        out.insert(attr.clone());
                    }
                }
            }
            StmtKind::If { body, orelse, .. }
            | StmtKind::For { body, orelse, .. }
            | StmtKind::While { body, orelse, .. } => {
                collect_attribute_targets(body, out);
                collect_attribute_targets(orelse, out);
            }
            StmtKind::With { body, .. } => collect_attribute_targets(body, out),
            StmtKind::Try(t) => {
                collect_attribute_targets(&t.body, out);
                for handler in &t.handlers {
                    collect_attribute_targets(&handler.body, out);
                }
                collect_attribute_targets(&t.orelse, out);
                collect_attribute_targets(&t.finalbody, out);
            }
            StmtKind::FunctionDef(def) => collect_attribute_targets(&def.body, out),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call(Call),
    Constant(Constant),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    /// A `None` key is a `**mapping` unpack.
    Dict(Vec<(Option<Expr>, Expr)>),
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Comprehension(Box<Comprehension>),
    /// `text` is the literal as written; `parts` are the interpolated
    /// expressions in order.
    FString {
        text: String,
        parts: Vec<Expr>,
    },
    /// Operators, subscripts, comparisons and the like, kept as normalized
    /// source text. `children` holds the operands so calls inside stay
    /// discoverable.
    Opaque {
        text: String,
        children: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub keywords: Vec<Keyword>,
}

impl Call {
    /// The callee when it is a plain name, `foo` in `foo(x)`.
    pub fn func_name(&self) -> Option<&str> {
        match self.func.as_ref() {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Receiver and method for attribute calls, `(obj, m)` in `obj.m(x)`.
    pub fn method(&self) -> Option<(&Expr, &str)> {
        match self.func.as_ref() {
            Expr::Attribute { value, attr } => Some((value, attr)),
            _ => None,
        }
    }

    /// Dotted name of the callee when it is built only from names.
    pub fn dotted_name(&self) -> Option<String> {
        self.func.dotted_name()
    }
}

/// `name` is `None` for a `**kwargs` unpack.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Str(String),
    /// The literal as written, prefix and quotes included.
    Bytes(String),
    Int(String),
    Float(String),
    Bool(bool),
    None,
    Ellipsis,
}

impl Constant {
    /// Python's runtime type name for the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Str(_) => "str",
            Constant::Bytes(_) => "bytes",
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Bool(_) => "bool",
            Constant::None => "NoneType",
            Constant::Ellipsis => "ellipsis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Dict,
    Set,
    Generator,
}

impl ComprehensionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ComprehensionKind::List => "List",
            ComprehensionKind::Dict => "Dict",
            ComprehensionKind::Set => "Set",
            ComprehensionKind::Generator => "Generator",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    /// The element, or the key for a dict comprehension.
    pub element: Expr,
    /// The value for a dict comprehension.
    pub value: Option<Expr>,
    pub generators: Vec<Generator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Constant(Constant::Str(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Expr::Constant(Constant::Int(value.to_string()))
    }

    pub fn attr(value: Expr, attr: impl Into<String>) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        })
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        Expr::Opaque {
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }

    /// `self.<attr>` returns the attribute name.
    pub fn self_attribute(&self) -> Option<&str> {
        match self {
            Expr::Attribute { value, attr } if value.as_name() == Some("self") => Some(attr),
            _ => None,
        }
    }

    pub fn dotted_name(&self) -> Option<String> {
        match self {
            Expr::Name(name) => Some(name.clone()),
            Expr::Attribute { value, attr } => value.dotted_name().map(|base| format!("{base}.{attr}")),
            _ => None,
        }
    }

    /// Every call reachable from this expression, outermost first.
    pub fn calls(&self) -> Vec<&Call> {
        let mut out = Vec::new();
        self.collect_calls(&mut out);
        out
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a Call>) {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.collect_calls_inner(out));
    }

    fn collect_calls_inner<'a>(&'a self, out: &mut Vec<&'a Call>) {
        match self {
            Expr::Name(_) | Expr::Constant(_) => {}
            Expr::Attribute { value, .. } => value.collect_calls(out),
            Expr::Call(call) => {
                out.push(call);
                call.func.collect_calls(out);
                for arg in &call.args {
                    arg.collect_calls(out);
                }
                for kw in &call.keywords {
                    kw.value.collect_calls(out);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                for item in items {
                    item.collect_calls(out);
                }
            }
            Expr::Dict(pairs) => {
                for (key, value) in pairs {
                    if let Some(key) = key {
                        key.collect_calls(out);
                    }
                    value.collect_calls(out);
                }
            }
            Expr::Lambda { body, .. } => body.collect_calls(out),
            Expr::Comprehension(comp) => {
                comp.element.collect_calls(out);
                if let Some(value) = &comp.value {
                    value.collect_calls(out);
                }
                for generator in &comp.generators {
                    generator.iter.collect_calls(out);
                    for cond in &generator.ifs {
                        cond.collect_calls(out);
                    }
                }
            }
            Expr::FString { parts, .. } => {
                for part in parts {
                    part.collect_calls(out);
                }
            }
            Expr::Opaque { children, .. } => {
                for child in children {
                    child.collect_calls(out);
                }
            }
        }
    }

    /// Source text for an assignment target or a bare tuple on the left of
    /// `=`: tuples lose their parentheses there.
    pub fn target_text(&self) -> String {
        match self {
            Expr::Tuple(items) if items.len() == 1 => format!("{},", items[0]),
            Expr::Tuple(items) if !items.is_empty() => join(items, ", "),
            other => other.to_string(),
        }
    }
}

fn join<T: Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// Python `repr()` of a string: single quotes unless the value contains a
/// single quote and no double quote.
pub fn repr_str(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Str(s) => f.write_str(&repr_str(s)),
            Constant::Bytes(raw) | Constant::Int(raw) | Constant::Float(raw) => f.write_str(raw),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::None => f.write_str("None"),
            Constant::Ellipsis => f.write_str("..."),
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}={}", self.value),
            None => write!(f, "**{}", self.value),
        }
    }
}

impl Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for {} in {}", self.target.target_text(), self.iter)?;
        for cond in &self.ifs {
            write!(f, " if {cond}")?;
        }
        Ok(())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.write_source(f))
    }
}

impl Expr {
    fn write_source(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name(name) => f.write_str(name),
            Expr::Attribute { value, attr } => write!(f, "{value}.{attr}"),
            Expr::Call(call) => {
                write!(f, "{}(", call.func)?;
                let mut first = true;
                for arg in &call.args {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                for kw in &call.keywords {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{kw}")?;
                }
                f.write_str(")")
            }
            Expr::Constant(constant) => write!(f, "{constant}"),
            Expr::List(items) => write!(f, "[{}]", join(items, ", ")),
            Expr::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Expr::Tuple(items) => write!(f, "({})", join(items, ", ")),
            Expr::Set(items) if items.is_empty() => f.write_str("set()"),
            Expr::Set(items) => write!(f, "{{{}}}", join(items, ", ")),
            Expr::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match key {
                        Some(key) => write!(f, "{key}: {value}")?,
                        None => write!(f, "**{value}")?,
                    }
                }
                f.write_str("}")
            }
            Expr::Lambda { params, body } if params.is_empty() => write!(f, "lambda: {body}"),
            Expr::Lambda { params, body } => write!(f, "lambda {}: {body}", params.join(", ")),
            Expr::Comprehension(comp) => {
                let (open, close) = match comp.kind {
                    ComprehensionKind::List => ("[", "]"),
                    ComprehensionKind::Set | ComprehensionKind::Dict => ("{", "}"),
                    ComprehensionKind::Generator => ("(", ")"),
                };
                f.write_str(open)?;
                match &comp.value {
                    Some(value) => write!(f, "{}: {value}", comp.element)?,
                    None => write!(f, "{}", comp.element)?,
                }
                for generator in &comp.generators {
                    write!(f, " {generator}")?;
                }
                f.write_str(close)
            }
            Expr::FString { text, .. } => f.write_str(text),
            Expr::Opaque { text, .. } => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, 1)
    }

    #[test]
    fn test_string_repr_quotes() {
        assert_eq!(repr_str("hi"), "'hi'");
        assert_eq!(repr_str("it's"), "\"it's\"");
        assert_eq!(repr_str("a\"b'c"), "'a\"b\\'c'");
        assert_eq!(repr_str("line\nnext"), "'line\\nnext'");
    }

    #[test]
    fn test_call_display() {
        let call = Expr::Call(Call {
            func: Box::new(Expr::attr(Expr::name("obj"), "run")),
            args: vec![Expr::int(1), Expr::str("x")],
            keywords: vec![
                Keyword {
                    name: Some("fast".into()),
                    value: Expr::Constant(Constant::Bool(true)),
                },
                Keyword {
                    name: None,
                    value: Expr::name("opts"),
                },
            ],
        });
        assert_eq!(call.to_string(), "obj.run(1, 'x', fast=True, **opts)");
    }

    #[test]
    fn test_tuple_display() {
        let single = Expr::Tuple(vec![Expr::name("a")]);
        assert_eq!(single.to_string(), "(a,)");
        assert_eq!(single.target_text(), "a,");

        let pair = Expr::Tuple(vec![Expr::name("i"), Expr::name("x")]);
        assert_eq!(pair.to_string(), "(i, x)");
        assert_eq!(pair.target_text(), "i, x");
        assert_eq!(Expr::Tuple(vec![]).to_string(), "()");
    }

    #[test]
    fn test_comprehension_display() {
        let comp = Expr::Comprehension(Box::new(Comprehension {
            kind: ComprehensionKind::Dict,
            element: Expr::name("k"),
            value: Some(Expr::opaque("v * 2")),
            generators: vec![Generator {
                target: Expr::Tuple(vec![Expr::name("k"), Expr::name("v")]),
                iter: Expr::call(Expr::attr(Expr::name("d"), "items"), vec![]),
                ifs: vec![Expr::name("v")],
            }],
        }));
        assert_eq!(comp.to_string(), "{k: v * 2 for k, v in d.items() if v}");
    }

    #[test]
    fn test_calls_are_found_in_nested_expressions() {
        let inner = Expr::call(Expr::name("helper"), vec![Expr::int(2)]);
        let expr = Expr::Opaque {
            text: "helper(2) + 1".into(),
            children: vec![inner, Expr::int(1)],
        };
        let outer = Expr::call(Expr::name("print"), vec![expr]);
        let names: Vec<_> = outer.calls().into_iter().filter_map(|c| c.func_name()).collect();
        assert_eq!(names, vec!["print", "helper"]);
    }

    #[test]
    fn test_deeply_nested_calls() {
        let mut expr = Expr::int(1);
        for _ in 0..3000 {
            expr = Expr::call(Expr::name("f"), vec![expr]);
        }
        assert_eq!(expr.calls().len(), 3000);
        let text = expr.to_string();
        assert_eq!(text.len(), 3000 * 3 + 1);
        assert!(text.starts_with("f(f(") && text.ends_with("1))"));
    }

    #[test]
    fn test_data_attributes() {
        let init = FunctionDef {
            name: "__init__".into(),
            params: vec!["self".into(), "speed".into()],
            decorators: vec![],
            body: vec![
                stmt(StmtKind::Assign {
                    targets: vec![Expr::attr(Expr::name("self"), "speed")],
                    value: Expr::name("speed"),
                }),
                stmt(StmtKind::If {
                    test: Expr::name("speed"),
                    body: vec![stmt(StmtKind::Assign {
                        targets: vec![Expr::attr(Expr::name("self"), "moving")],
                        value: Expr::Constant(Constant::Bool(true)),
                    })],
                    orelse: vec![],
                }),
            ],
        };
        let class = ClassDef {
            name: "Car".into(),
            bases: vec![],
            body: vec![
                stmt(StmtKind::Assign {
                    targets: vec![Expr::name("wheels")],
                    value: Expr::int(4),
                }),
                stmt(StmtKind::FunctionDef(init)),
            ],
        };

        let attrs = class.data_attributes();
        assert!(attrs.contains("speed"));
        assert!(attrs.contains("moving"));
        assert!(attrs.contains("wheels"));
        assert_eq!(class.method("__init__").map(|m| m.visible_params()), Some(vec!["speed"]));
    }

    #[test]
    fn test_dotted_name() {
        let call = Expr::call(Expr::attr(Expr::name("sys"), "exit"), vec![Expr::int(1)]);
        assert_eq!(call.as_call().and_then(Call::dotted_name).as_deref(), Some("sys.exit"));
    }
}
