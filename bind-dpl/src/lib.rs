use ahash::AHashMap;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::loc::Loc;
use ir_dpl::types::Type;
use std::fmt;
use std::fmt::Formatter;

mod resolver;
mod typer;


/// Name reference resolution: every PathExpr and TypeNameExpr maps to the node id of its
/// declaration.
#[derive(Default, Debug)]
pub struct ReferenceMap {
  map: AHashMap<NodeId, NodeId>,
}

impl ReferenceMap {
  pub fn set(&mut self, reference: NodeId, decl: NodeId) {
    self.map.insert(reference, decl);
  }

  /// Panics when no resolution is recorded; an unresolved reference surviving binding is an
  /// upstream bug, not an input error.
  pub fn get_declaration(&self, reference: NodeId) -> NodeId {
    match self.map.get(&reference) {
      Some(d) => *d,
      None => panic!("no declaration recorded for node {:?}", reference),
    }
  }
}

/// Expression and declaration types, fully resolved (no Named types remain).
#[derive(Default, Debug)]
pub struct TypeMap {
  map: AHashMap<NodeId, Type>,
}

impl TypeMap {
  pub fn set(&mut self, node: NodeId, ty: Type) {
    self.map.insert(node, ty);
  }

  pub fn get(&self, node: NodeId) -> Option<&Type> {
    self.map.get(&node)
  }

  /// Panics when the node was never typed; the def-use analysis only asks about nodes binding
  /// has seen.
  pub fn get_type(&self, node: NodeId) -> &Type {
    match self.map.get(&node) {
      Some(t) => t,
      None => panic!("no type recorded for node {:?}", node),
    }
  }

  pub fn type_is_empty(&self, ty: &Type) -> bool {
    ty.is_empty()
  }
}

#[derive(Debug)]
pub struct Bindings {
  pub refs: ReferenceMap,
  pub types: TypeMap,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BindErrorKind {
  UnknownName(String),
  UnknownType(String),
  UnknownMember(String),
  NotCallable(String),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BindError {
  pub kind: BindErrorKind,
  pub loc: Loc,
}

impl fmt::Display for BindError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match &self.kind {
      BindErrorKind::UnknownName(n) => write!(f, "unknown name '{}'", n),
      BindErrorKind::UnknownType(n) => write!(f, "unknown type '{}'", n),
      BindErrorKind::UnknownMember(n) => write!(f, "unknown member '{}'", n),
      BindErrorKind::NotCallable(n) => write!(f, "'{}' cannot be called", n),
    }
  }
}

impl std::error::Error for BindError {}

pub type BindResult<T> = Result<T, BindError>;

/// Resolves names and types every expression of an already constructed program.
pub fn compute_bindings(program: &Node) -> BindResult<Bindings> {
  let mut refs = ReferenceMap::default();
  resolver::resolve(program, &mut refs)?;
  let mut types = TypeMap::default();
  typer::type_program(program, &refs, &mut types)?;
  Ok(Bindings { refs, types })
}
