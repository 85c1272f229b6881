//! Display text for statement and expression nodes.

use std::collections::BTreeSet;

use crate::ast::{Comprehension, Expr, Stmt, StmtKind, TryStmt, WithItem};
use crate::config::FlowLimits;

/// Single quotes become double quotes unless the text already has some.
pub fn normalize_quotes(text: &str) -> String {
    if text.contains('\'') && !text.contains('"') {
        text.replace('\'', "\"")
    } else {
        text.to_string()
    }
}

/// Cut `text` to `max - 3` characters plus `...` once it reaches `max`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() < max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Like [`truncate`] but only cuts text strictly longer than `max`.
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub struct TextShaper<'a> {
    limits: &'a FlowLimits,
}

impl<'a> TextShaper<'a> {
    pub fn new(limits: &'a FlowLimits) -> Self {
        Self { limits }
    }

    pub fn expr(&self, expr: &Expr) -> String {
        self.finish(&expr.to_string())
    }

    fn finish(&self, raw: &str) -> String {
        truncate(&normalize_quotes(raw), self.limits.max_text_length)
    }

    /// Condition text for an `if`, cut harder than other text.
    pub fn condition(&self, test: &Expr) -> String {
        shorten(&self.expr(test), self.limits.condition_truncate)
    }

    /// Text of a print statement; quotes would fight Mermaid's own.
    pub fn print(&self, expr: &Expr) -> String {
        let text = normalize_quotes(&expr.to_string()).replace(['"', '\''], "`");
        truncate(&text, self.limits.max_text_length)
    }

    pub fn assign(&self, targets: &[Expr], value: &Expr) -> String {
        if let ([Expr::Name(name)], Some(kind)) = (targets, literal_kind(value)) {
            let types = element_types(value);
            let text = if types.is_empty() {
                format!("{name} = {kind}")
            } else {
                let joined: Vec<&str> = types.into_iter().collect();
                format!("{name} = {kind}[{}]", joined.join(", "))
            };
            return self.finish(&text);
        }
        let mut parts: Vec<String> = targets.iter().map(Expr::target_text).collect();
        parts.push(value.to_string());
        self.finish(&parts.join(" = "))
    }

    pub fn aug_assign(&self, target: &Expr, op: &str, value: &Expr) -> String {
        self.finish(&format!("{} {op} {value}", target.target_text()))
    }

    pub fn return_stmt(&self, value: Option<&Expr>) -> String {
        match value {
            Some(value) => self.finish(&format!("return {value}")),
            None => "return".to_string(),
        }
    }

    pub fn for_loop(&self, target: &Expr, iter: &Expr) -> String {
        self.finish(&format!("for {} in {iter}", target.target_text()))
    }

    pub fn while_loop(&self, test: &Expr) -> String {
        self.finish(&format!("while {test}"))
    }

    pub fn raise(&self, exc: Option<&Expr>, cause: Option<&Expr>) -> String {
        match (exc, cause) {
            (Some(exc), Some(cause)) => self.finish(&format!("Raise {exc} from {cause}")),
            (Some(exc), None) => self.finish(&format!("Raise {exc}")),
            (None, _) => "Re-raise Exception".to_string(),
        }
    }

    pub fn with(&self, items: &[WithItem]) -> String {
        let items: Vec<String> = items
            .iter()
            .map(|item| match &item.target {
                Some(target) => format!("{} as {}", item.context, target.target_text()),
                None => item.context.to_string(),
            })
            .collect();
        self.finish(&format!("With: {}", items.join(", ")))
    }

    pub fn assert(&self, test: &Expr, msg: Option<&Expr>) -> String {
        match msg {
            Some(msg) => self.finish(&format!("Assert: {test}, {msg}")),
            None => self.finish(&format!("Assert: {test}")),
        }
    }

    pub fn except(&self, kind: Option<&Expr>, name: Option<&str>) -> String {
        match (kind, name) {
            (Some(kind), Some(name)) => self.finish(&format!("Except {kind} as {name}")),
            (Some(kind), None) => self.finish(&format!("Except {kind}")),
            (None, Some(name)) => format!("Except as {name}"),
            (None, None) => "Except".to_string(),
        }
    }

    pub fn lambda(&self, params: &[String], body: &Expr) -> String {
        self.finish(&format!("Lambda: {} → {body}", params.join(", ")))
    }

    pub fn comprehension(&self, comp: &Comprehension) -> String {
        let element = match &comp.value {
            Some(value) => format!("{}: {value}", comp.element),
            None => comp.element.to_string(),
        };
        let generators: Vec<String> = comp
            .generators
            .iter()
            .map(|generator| {
                let mut text = format!("{} in {}", generator.target.target_text(), generator.iter);
                if !generator.ifs.is_empty() {
                    let conds: Vec<String> = generator.ifs.iter().map(ToString::to_string).collect();
                    text.push_str(&format!(" if {}", conds.join(" and ")));
                }
                text
            })
            .collect();
        self.finish(&format!(
            "{}: {element} for {}",
            comp.kind.label(),
            generators.join(" for ")
        ))
    }

    /// Source-like text of a whole statement, used for plain nodes.
    pub fn stmt(&self, stmt: &Stmt) -> String {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Assign { targets, value } => self.assign(targets, value),
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, op, value),
            StmtKind::Return(value) => self.return_stmt(value.as_ref()),
            StmtKind::Raise { exc, cause } => self.raise(exc.as_ref(), cause.as_ref()),
            StmtKind::Import { names } => format!("import {}", names.join(", ")),
            StmtKind::ImportFrom { module, names } => format!(
                "from {} import {}",
                module.as_deref().unwrap_or("."),
                names.join(", ")
            ),
            StmtKind::Try(TryStmt { .. }) => "Try".to_string(),
            StmtKind::Pass => "Pass".to_string(),
            StmtKind::Break => "break".to_string(),
            StmtKind::Continue => "continue".to_string(),
            StmtKind::Unsupported { kind } => format!("Unsupported Node: {kind}"),
            StmtKind::If { test, .. } => format!("if {}", self.condition(test)),
            StmtKind::For { target, iter, .. } => self.for_loop(target, iter),
            StmtKind::While { test, .. } => self.while_loop(test),
            StmtKind::With { items, .. } => self.with(items),
            StmtKind::Assert { test, msg } => self.assert(test, msg.as_ref()),
            StmtKind::FunctionDef(def) => format!("def {}", def.name),
            StmtKind::ClassDef(def) => format!("class {}", def.name),
        }
    }
}

fn literal_kind(expr: &Expr) -> Option<&'static str> {
    match expr {
        Expr::List(_) => Some("List"),
        Expr::Tuple(_) => Some("Tuple"),
        Expr::Set(_) => Some("Set"),
        Expr::Dict(_) => Some("Dict"),
        _ => None,
    }
}

/// Sorted type names of a literal's elements (a dict's values).
fn element_types(expr: &Expr) -> BTreeSet<&'static str> {
    let type_of = |item: &Expr| match item {
        Expr::Constant(constant) => Some(constant.type_name()),
        other => literal_kind(other),
    };
    match expr {
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
            items.iter().filter_map(type_of).collect()
        }
        Expr::Dict(pairs) => pairs.iter().filter_map(|(_, value)| type_of(value)).collect(),
        _ => BTreeSet::new(),
    }
}
