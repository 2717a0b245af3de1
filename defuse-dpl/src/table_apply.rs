use crate::nodes::NodeIndex;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::types;

/// The table a member expression selects out of, when the expression has the shape
/// `t.apply().<member>`.
fn applied_table(expr: &Node, bindings: &Bindings, nodes: &NodeIndex) -> Option<NodeId> {
  let Syntax::MemberExpr { base, .. } = expr.stx.as_ref() else {
    return None;
  };
  let Syntax::CallExpr { callee, .. } = base.stx.as_ref() else {
    return None;
  };
  let Syntax::MemberExpr { base: table, member } = callee.stx.as_ref() else {
    return None;
  };
  if member != types::APPLY {
    return None;
  }
  let Syntax::PathExpr { .. } = table.stx.as_ref() else {
    return None;
  };
  let decl = nodes.get(bindings.refs.get_declaration(table.id));
  match decl.stx.as_ref() {
    Syntax::TableDecl { .. } => Some(decl.id),
    _ => None,
  }
}

fn selects(expr: &Node, member_name: &str, bindings: &Bindings, nodes: &NodeIndex) -> bool {
  match expr.stx.as_ref() {
    Syntax::MemberExpr { member, .. } if member == member_name => {
      applied_table(expr, bindings, nodes).is_some()
    }
    _ => false,
  }
}

/// Whether `expr` is the `hit` or `miss` selector of a table apply.
pub fn is_hit(expr: &Node, bindings: &Bindings, nodes: &NodeIndex) -> bool {
  selects(expr, types::HIT, bindings, nodes) || selects(expr, types::MISS, bindings, nodes)
}

/// Whether `expr` is the `action_run` selector of a table apply.
pub fn is_action_run(expr: &Node, bindings: &Bindings, nodes: &NodeIndex) -> bool {
  selects(expr, types::ACTION_RUN, bindings, nodes)
}
