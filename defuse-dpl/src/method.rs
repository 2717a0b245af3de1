use crate::nodes::NodeIndex;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::types;
use ir_dpl::types::Direction;
use ir_dpl::types::Type;
use itertools::Itertools;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuiltIn {
  PushFront,
  PopFront,
  IsValid,
  SetValid,
  SetInvalid,
}

/// What a call expression actually invokes.
pub enum MethodKind<'a> {
  /// A built-in method applied to `target` (a stack or header expression).
  BuiltIn { builtin: BuiltIn, target: &'a Node },
  Action { decl: NodeId },
  /// A plain function call. Never analysed inter-procedurally; its effect is summarised by the
  /// copy-in/copy-out treatment of its arguments.
  Function { decl: NodeId },
  TableApply { table: NodeId },
  /// An extern object's method. `may_call` lists the initializer methods of the instance that
  /// this call may transitively run.
  Extern { instance: NodeId, method: String, may_call: Vec<NodeId> },
}

pub struct SubstParam {
  pub name: String,
  pub direction: Direction,
}

pub struct MethodInstance<'a> {
  pub kind: MethodKind<'a>,
  /// Parameters paired with their arguments, in argument order.
  pub substitution: Vec<(SubstParam, &'a Node)>,
}

fn decl_params<'a>(params: &'a [Node], args: &'a [Node]) -> Vec<(SubstParam, &'a Node)> {
  params
    .iter()
    .map(|p| match p.stx.as_ref() {
      Syntax::ParamDecl { name, direction, .. } => SubstParam {
        name: name.clone(),
        direction: *direction,
      },
      other => panic!("parameter list held a non-parameter {:?}", other),
    })
    .zip_eq(args)
    .collect()
}

/// Classifies a call expression. Panics on shapes the type checker would have rejected.
pub fn resolve<'a>(call: &'a Node, bindings: &Bindings, nodes: &NodeIndex<'a>) -> MethodInstance<'a> {
  let Syntax::CallExpr { callee, args } = call.stx.as_ref() else {
    panic!("cannot resolve a non-call {:?}", call);
  };
  match callee.stx.as_ref() {
    Syntax::PathExpr { .. } => {
      let decl = nodes.get(bindings.refs.get_declaration(callee.id));
      match decl.stx.as_ref() {
        Syntax::ActionDecl { params, .. } => MethodInstance {
          kind: MethodKind::Action { decl: decl.id },
          substitution: decl_params(params, args),
        },
        Syntax::FunctionDecl { params, .. } => MethodInstance {
          kind: MethodKind::Function { decl: decl.id },
          substitution: decl_params(params, args),
        },
        other => panic!("call of a non-callable declaration {:?}", other),
      }
    }
    Syntax::MemberExpr { base, member } => {
      if let Syntax::PathExpr { .. } = base.stx.as_ref() {
        let decl = nodes.get(bindings.refs.get_declaration(base.id));
        match decl.stx.as_ref() {
          Syntax::TableDecl { .. } if member == types::APPLY => {
            return MethodInstance {
              kind: MethodKind::TableApply { table: decl.id },
              substitution: Vec::new(),
            };
          }
          Syntax::InstanceDecl { init, .. } => {
            let ty = bindings.types.get_type(decl.id);
            let sig = ty
              .method(member)
              .unwrap_or_else(|| panic!("extern has no method '{}'", member));
            let may_call = sig
              .may_call
              .iter()
              .map(|name| {
                init
                  .iter()
                  .find(|m| m.decl_name() == Some(name.as_str()))
                  .unwrap_or_else(|| panic!("instance does not implement '{}'", name))
                  .id
              })
              .collect();
            let substitution = sig
              .params
              .iter()
              .map(|p| SubstParam {
                name: p.name.clone(),
                direction: p.direction,
              })
              .zip_eq(args)
              .collect();
            return MethodInstance {
              kind: MethodKind::Extern {
                instance: decl.id,
                method: member.clone(),
                may_call,
              },
              substitution,
            };
          }
          _ => {}
        }
      }
      // Built-ins are recognised by the type of the value they are applied to.
      let base_ty = bindings.types.get_type(base.id);
      let builtin = match (base_ty, member.as_str()) {
        (Type::Stack { .. }, types::stack::PUSH_FRONT) => BuiltIn::PushFront,
        (Type::Stack { .. }, types::stack::POP_FRONT) => BuiltIn::PopFront,
        (Type::Header { .. }, types::header::IS_VALID) => BuiltIn::IsValid,
        (Type::Header { .. }, types::header::SET_VALID) => BuiltIn::SetValid,
        (Type::Header { .. }, types::header::SET_INVALID) => BuiltIn::SetInvalid,
        _ => panic!("cannot resolve method '{}' on {}", member, base),
      };
      MethodInstance {
        kind: MethodKind::BuiltIn { builtin, target: base },
        substitution: Vec::new(),
      }
    }
    other => panic!("unexpected callee shape {:?}", other),
  }
}
