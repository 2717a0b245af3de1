pub mod find_uses;
pub mod has_uses;
pub mod method;
pub mod nodes;
pub mod points;
pub mod remove_unused;
pub mod side_effects;
pub mod storage;
pub mod table_apply;

#[cfg(test)]
mod harness;

use crate::find_uses::FindUses;
use crate::has_uses::HasUses;
use crate::nodes::NodeIndex;
use crate::points::AllDefinitions;
use crate::remove_unused::RemoveUnused;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeIdGen;
use ir_dpl::ast::Syntax;
use ir_dpl::error::Diagnostics;

/// The def-use simplification pass. Takes a bound, typed IR and reaching definitions computed
/// by an earlier pass, warns about reads of possibly-uninitialized storage, and deletes the
/// assignments and calls whose results are never read while keeping their side effects.
///
/// # Examples
///
/// ```ignore
/// let bindings = bind_dpl::compute_bindings(&program)?;
/// let definitions = /* write-set builder output */;
/// let mut diag = Diagnostics::new();
/// let program = SimplifyDefUse {
///   bindings: &bindings,
///   definitions: &definitions,
///   diag: &mut diag,
///   ids: &mut ids,
/// }
/// .process(program);
/// ```
pub struct SimplifyDefUse<'a> {
  pub bindings: &'a Bindings,
  pub definitions: &'a AllDefinitions,
  pub diag: &'a mut Diagnostics,
  pub ids: &'a mut NodeIdGen,
}

impl SimplifyDefUse<'_> {
  /// Analyses and rewrites `node`, which is a whole program or a single parser, control or
  /// function. Returns the rewritten subtree.
  pub fn process(self, node: Node) -> Node {
    let SimplifyDefUse { bindings, definitions, diag, ids } = self;
    let mut has_uses = HasUses::new(&node);
    {
      let index = NodeIndex::build(&node);
      let mut find = FindUses::new(bindings, definitions, &index, &mut has_uses, diag);
      match node.stx.as_ref() {
        Syntax::Program { decls } => {
          for d in decls {
            if matches!(
              d.stx.as_ref(),
              Syntax::ParserDecl { .. } | Syntax::ControlDecl { .. } | Syntax::FunctionDecl { .. }
            ) {
              find.check(d);
            }
          }
        }
        Syntax::ParserDecl { .. } | Syntax::ControlDecl { .. } | Syntax::FunctionDecl { .. } => {
          find.check(&node);
        }
        other => panic!("def-use simplification expects a program or unit, not {:?}", other),
      }
    }
    RemoveUnused::new(&has_uses, bindings, ids).rewrite(node)
  }
}
