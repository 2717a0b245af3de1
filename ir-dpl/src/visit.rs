use crate::ast::Node;
use crate::ast::SwitchCase;
use crate::ast::Syntax;

/// Calls `f` on every direct child of `node`, in source order.
///
/// Traversal never memoises: the analyses walk the same subtree repeatedly from different call
/// contexts, and each walk must see every node again.
pub fn for_each_child<'a>(node: &'a Node, f: &mut impl FnMut(&'a Node)) {
  match node.stx.as_ref() {
    Syntax::LiteralIntExpr { .. }
    | Syntax::LiteralBoolExpr { .. }
    | Syntax::PathExpr { .. }
    | Syntax::TypeNameExpr { .. }
    | Syntax::ExitStmt
    | Syntax::EmptyStmt
    | Syntax::TypeDecl { .. }
    | Syntax::VarDecl { .. }
    | Syntax::ParamDecl { .. } => {}
    Syntax::MemberExpr { base, .. } => f(base),
    Syntax::IndexExpr { base, index } => {
      f(base);
      f(index);
    }
    Syntax::SliceExpr { base, .. } => f(base),
    Syntax::CondExpr { test, if_true, if_false } => {
      f(test);
      f(if_true);
      f(if_false);
    }
    Syntax::UnaryExpr { operand, .. } => f(operand),
    Syntax::BinaryExpr { left, right, .. } => {
      f(left);
      f(right);
    }
    Syntax::CallExpr { callee, args } => {
      f(callee);
      for a in args {
        f(a);
      }
    }
    Syntax::SelectExpr { exprs, cases } => {
      for e in exprs {
        f(e);
      }
      for c in cases {
        if let Some(k) = &c.keyset {
          f(k);
        }
        f(&c.target);
      }
    }
    Syntax::AssignStmt { left, right } => {
      f(left);
      f(right);
    }
    Syntax::CallStmt { call } => f(call),
    Syntax::ReturnStmt { value } => {
      if let Some(v) = value {
        f(v);
      }
    }
    Syntax::BlockStmt { body } => {
      for s in body {
        f(s);
      }
    }
    Syntax::IfStmt { test, if_true, if_false } => {
      f(test);
      f(if_true);
      if let Some(e) = if_false {
        f(e);
      }
    }
    Syntax::SwitchStmt { select, cases } => {
      f(select);
      for SwitchCase { body, .. } in cases {
        if let Some(b) = body {
          f(b);
        }
      }
    }
    Syntax::Program { decls } => {
      for d in decls {
        f(d);
      }
    }
    Syntax::ParserDecl { params, locals, states, .. } => {
      for p in params {
        f(p);
      }
      for l in locals {
        f(l);
      }
      for s in states {
        f(s);
      }
    }
    Syntax::ParserState { body, transition, .. } => {
      for s in body {
        f(s);
      }
      if let Some(t) = transition {
        f(t);
      }
    }
    Syntax::ControlDecl { params, locals, body, .. } => {
      for p in params {
        f(p);
      }
      for l in locals {
        f(l);
      }
      f(body);
    }
    Syntax::ActionDecl { params, body, .. } => {
      for p in params {
        f(p);
      }
      f(body);
    }
    Syntax::TableDecl { keys, actions, .. } => {
      for k in keys {
        f(k);
      }
      for a in actions {
        f(a);
      }
    }
    Syntax::FunctionDecl { params, body, .. } => {
      for p in params {
        f(p);
      }
      f(body);
    }
    Syntax::InstanceDecl { init, .. } => {
      for m in init {
        f(m);
      }
    }
  }
}

/// Preorder walk of the whole subtree rooted at `node`.
pub fn walk<'a>(node: &'a Node, f: &mut impl FnMut(&'a Node)) {
  f(node);
  for_each_child(node, &mut |c| walk(c, f));
}
