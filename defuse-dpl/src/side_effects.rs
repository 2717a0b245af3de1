use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::types::header;
use ir_dpl::visit::walk;

/// Side-effecting calls found in one expression. After the earlier normalisation passes a
/// right-hand side holds at most one, which the rewriter relies on.
pub struct SideEffects {
  pub node_with_side_effect: Option<NodeId>,
  pub side_effect_count: usize,
}

impl SideEffects {
  /// Whether evaluating `call` can change any state. Reading a header's validity bit is the
  /// only pure call; everything else conservatively counts.
  pub fn has_side_effect(call: &Node, bindings: &Bindings) -> bool {
    let Syntax::CallExpr { callee, .. } = call.stx.as_ref() else {
      panic!("cannot judge side effects of a non-call {:?}", call);
    };
    if let Syntax::MemberExpr { base, member } = callee.stx.as_ref() {
      if member == header::IS_VALID && bindings.types.get_type(base.id).is_header() {
        return false;
      }
    }
    true
  }

  pub fn scan(expr: &Node, bindings: &Bindings) -> SideEffects {
    let mut result = SideEffects {
      node_with_side_effect: None,
      side_effect_count: 0,
    };
    walk(expr, &mut |n| {
      if let Syntax::CallExpr { .. } = n.stx.as_ref() {
        if SideEffects::has_side_effect(n, bindings) {
          result.node_with_side_effect = Some(n.id);
          result.side_effect_count += 1;
        }
      }
    });
    result
  }
}
