//! Branches, loops and exception blocks.

use crate::ast::{Expr, Stmt, TryStmt};
use crate::graph::{NodeId, NodeTag, ShapeKind};
use crate::scope::Scope;

use super::text::normalize_quotes;
use super::{BuilderContext, Flow, LoopFrame};

/// `if __name__ == "__main__":`, in either operand order.
fn is_main_guard(test: &Expr) -> bool {
    let text = normalize_quotes(&test.to_string());
    text.contains("__name__ == \"__main__\"") || text.contains("\"__main__\" == __name__")
}

impl<'a, 'p> BuilderContext<'a, 'p> {
    pub(super) fn visit_if(
        &mut self,
        test: &Expr,
        body: &'p [Stmt],
        orelse: &'p [Stmt],
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let text = format!("if {}", self.text().condition(test));
        let cond = self.add_node(NodeTag::IfCond, text, ShapeKind::Condition, Some(scope))?;
        self.connect(prev, cond);

        let true_end = self.process_list(body, cond, scope, Some("True"))?;

        if !orelse.is_empty() {
            let merge = self.add_merge(NodeTag::Merge)?;
            match true_end {
                Some(end) if end == cond => self.connect_labeled(cond, merge, "True"),
                Some(end) => self.connect(end, merge),
                None => {}
            }
            let false_end = self.process_list(orelse, cond, scope, Some("False"))?;
            match false_end {
                Some(end) if end == cond => self.connect_labeled(cond, merge, "False"),
                Some(end) => self.connect(end, merge),
                None => {}
            }
            return Ok(Some(merge));
        }

        if is_main_guard(test) {
            tracing::trace!("main guard");
            let guard_end = self.add_node(NodeTag::End, "End", ShapeKind::End, None)?;
            if let Some(end) = true_end {
                self.connect(end, guard_end);
            }
            let end = self.graph.end();
            self.connect_labeled(cond, end, "False");
            return Ok(None);
        }

        match true_end {
            Some(end) if end == cond => Ok(Some(cond)),
            _ => {
                let merge = self.add_merge(NodeTag::Merge)?;
                if let Some(end) = true_end {
                    self.connect(end, merge);
                }
                self.connect_labeled(cond, merge, "False");
                Ok(Some(merge))
            }
        }
    }

    pub(super) fn visit_loop(
        &mut self,
        tag: NodeTag,
        text: String,
        shape: ShapeKind,
        body: &'p [Stmt],
        prev: NodeId,
        scope: &Scope,
    ) -> Flow {
        let cond = self.add_node(tag, text, shape, Some(scope))?;
        self.connect(prev, cond);
        let exit = self.add_merge(NodeTag::LoopExit)?;

        self.loops.push(LoopFrame { start: cond, exit });
        let body_end = self.process_list(body, cond, scope, Some("Next Iteration"));
        self.loops.pop();

        match body_end? {
            Some(end) if end != cond => self.connect_labeled(end, cond, "Next Iteration"),
            Some(_) if tag == NodeTag::WhileLoop => self.connect_labeled(cond, cond, "Next Iteration"),
            _ => {}
        }
        self.connect_labeled(cond, exit, "Done");
        Ok(Some(exit))
    }

    /// `break` and `continue`. Outside any loop the branch simply ends.
    pub(super) fn visit_jump(&mut self, prev: NodeId, target: impl Fn(&LoopFrame) -> NodeId) -> Option<NodeId> {
        match self.loops.last() {
            Some(frame) => {
                let to = target(frame);
                self.connect(prev, to);
            }
            None => tracing::debug!("jump outside of a loop"),
        }
        None
    }

    pub(super) fn visit_try(&mut self, stmt: &'p TryStmt, prev: NodeId, scope: &Scope) -> Flow {
        let try_node = self.add_node(NodeTag::Try, "Try", ShapeKind::Try, Some(scope))?;
        self.connect(prev, try_node);
        let merge = self.add_merge(NodeTag::Merge)?;

        if let Some(end) = self.process_list(&stmt.body, try_node, scope, Some("Try"))? {
            self.connect(end, merge);
        }

        for handler in &stmt.handlers {
            let text = self.text().except(handler.kind.as_ref(), handler.name.as_deref());
            let except = self.add_node(NodeTag::Except, text, ShapeKind::Exception, Some(scope))?;
            self.connect_labeled(try_node, except, "Exception");
            if let Some(end) = self.process_list(&handler.body, except, scope, None)? {
                self.connect(end, merge);
            }
        }

        if !stmt.orelse.is_empty() {
            let else_node = self.add_node(NodeTag::Else, "Else", ShapeKind::Condition, Some(scope))?;
            self.connect_labeled(try_node, else_node, "No Exception");
            if let Some(end) = self.process_list(&stmt.orelse, else_node, scope, None)? {
                self.connect(end, merge);
            }
        }

        if stmt.finalbody.is_empty() {
            return Ok(Some(merge));
        }
        let finally = self.add_node(NodeTag::Finally, "Finally", ShapeKind::Finally, Some(scope))?;
        self.connect(merge, finally);
        match self.process_list(&stmt.finalbody, finally, scope, None)? {
            Some(end) if end != finally => self.connect(end, finally),
            _ => {}
        }
        Ok(Some(finally))
    }
}
