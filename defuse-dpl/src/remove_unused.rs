use crate::has_uses::HasUses;
use crate::side_effects::SideEffects;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::NodeIdGen;
use ir_dpl::ast::Syntax;
use ir_dpl::visit::walk;
use log::debug;

/// Bottom-up rewrite deleting the statements nothing reads. An assignment whose right-hand
/// side carries a side-effecting call keeps the call as a bare call statement; everything else
/// unused becomes an empty statement.
pub struct RemoveUnused<'a> {
  has_uses: &'a HasUses,
  bindings: &'a Bindings,
  ids: &'a mut NodeIdGen,
}

impl<'a> RemoveUnused<'a> {
  pub fn new(has_uses: &'a HasUses, bindings: &'a Bindings, ids: &'a mut NodeIdGen) -> RemoveUnused<'a> {
    RemoveUnused { has_uses, bindings, ids }
  }

  pub fn rewrite(&mut self, node: Node) -> Node {
    let Node { id, loc, stx } = node;
    let stx = match *stx {
      Syntax::Program { decls } => Syntax::Program {
        decls: decls.into_iter().map(|d| self.rewrite(d)).collect(),
      },
      Syntax::ParserDecl { name, params, locals, states } => Syntax::ParserDecl {
        name,
        params,
        locals: locals.into_iter().map(|l| self.rewrite(l)).collect(),
        states: states.into_iter().map(|s| self.rewrite(s)).collect(),
      },
      Syntax::ParserState { name, body, transition } => Syntax::ParserState {
        name,
        body: body.into_iter().map(|s| self.rewrite(s)).collect(),
        transition,
      },
      Syntax::ControlDecl { name, params, locals, body } => Syntax::ControlDecl {
        name,
        params,
        locals: locals.into_iter().map(|l| self.rewrite(l)).collect(),
        body: self.rewrite(body),
      },
      Syntax::ActionDecl { name, params, body } => Syntax::ActionDecl {
        name,
        params,
        body: self.rewrite(body),
      },
      Syntax::FunctionDecl { name, params, ret, body } => Syntax::FunctionDecl {
        name,
        params,
        ret,
        body: self.rewrite(body),
      },
      Syntax::InstanceDecl { name, ty, init } => Syntax::InstanceDecl {
        name,
        ty,
        init: init.into_iter().map(|m| self.rewrite(m)).collect(),
      },
      Syntax::BlockStmt { body } => Syntax::BlockStmt {
        body: body.into_iter().map(|s| self.rewrite(s)).collect(),
      },
      Syntax::IfStmt { test, if_true, if_false } => Syntax::IfStmt {
        test,
        if_true: self.rewrite(if_true),
        if_false: if_false.map(|e| self.rewrite(e)),
      },
      Syntax::SwitchStmt { select, cases } => Syntax::SwitchStmt {
        select,
        cases: cases
          .into_iter()
          .map(|mut c| {
            c.body = c.body.map(|b| self.rewrite(b));
            c
          })
          .collect(),
      },
      Syntax::AssignStmt { left, right } => {
        return self.rewrite_assignment(Node {
          id,
          loc,
          stx: Box::new(Syntax::AssignStmt { left, right }),
        });
      }
      Syntax::CallStmt { call } => {
        if !self.has_uses.has_uses(id) && !SideEffects::has_side_effect(&call, self.bindings) {
          debug!("removing call statement {}", call);
          Syntax::EmptyStmt
        } else {
          Syntax::CallStmt { call }
        }
      }
      other => other,
    };
    Node {
      id,
      loc,
      stx: Box::new(stx),
    }
  }

  fn rewrite_assignment(&mut self, stmt: Node) -> Node {
    if self.has_uses.has_uses(stmt.id) {
      return stmt;
    }
    let Syntax::AssignStmt { right, .. } = stmt.stx.as_ref() else {
      unreachable!();
    };
    debug!("removing assignment to an unread target");
    let se = SideEffects::scan(right, self.bindings);
    if let Some(call_id) = se.node_with_side_effect {
      // The earlier side-effect-ordering normalisation leaves at most one call per
      // right-hand side; more than one here means it did not run.
      if se.side_effect_count != 1 {
        panic!("{}: too many side effects in one expression", right);
      }
      let call = find_by_id(right, call_id)
        .unwrap_or_else(|| panic!("side-effecting node vanished from {}", right));
      if !matches!(call.stx.as_ref(), Syntax::CallExpr { .. }) {
        panic!("expected a method call, got {:?}", call);
      }
      let call = call.clone();
      return Node::new(self.ids, stmt.loc, Syntax::CallStmt { call });
    }
    Node::new(self.ids, stmt.loc, Syntax::EmptyStmt)
  }
}

fn find_by_id<'x>(root: &'x Node, id: NodeId) -> Option<&'x Node> {
  let mut found = None;
  walk(root, &mut |n| {
    if n.id == id {
      found = Some(n);
    }
  });
  found
}
