use crate::loc::Loc;
use crate::types::Direction;
use crate::types::Type;
use serde::Serialize;
use serde::Serializer;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;

/// Stable identity of a node. All analysis maps are keyed by id, never by structural equality:
/// two syntactically identical assignments are distinct program objects.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
pub struct NodeId(pub u32);

/// Allocates node ids. Ids are never reused; a rewrite allocates fresh ids for the nodes it
/// creates and keeps the ids of nodes it leaves in place.
#[derive(Default)]
pub struct NodeIdGen {
  next: u32,
}

impl NodeIdGen {
  pub fn new() -> NodeIdGen {
    NodeIdGen { next: 0 }
  }

  pub fn next(&mut self) -> NodeId {
    let id = NodeId(self.next);
    self.next += 1;
    id
  }
}

/// Cloning preserves ids: a clone is the same program object in a new tree position, which is
/// exactly what a rewrite wants when it hoists a subtree out of a statement it deletes.
#[derive(Clone)]
pub struct Node {
  pub id: NodeId,
  pub loc: Loc,
  pub stx: Box<Syntax>,
}

impl Node {
  pub fn new(ids: &mut NodeIdGen, loc: Loc, stx: Syntax) -> Node {
    Node {
      id: ids.next(),
      loc,
      stx: Box::new(stx),
    }
  }

  /// Declared name, for the declaration variants that carry one.
  pub fn decl_name(&self) -> Option<&str> {
    match self.stx.as_ref() {
      Syntax::TypeDecl { name, .. }
      | Syntax::ParserDecl { name, .. }
      | Syntax::ParserState { name, .. }
      | Syntax::ControlDecl { name, .. }
      | Syntax::ActionDecl { name, .. }
      | Syntax::TableDecl { name, .. }
      | Syntax::FunctionDecl { name, .. }
      | Syntax::InstanceDecl { name, .. }
      | Syntax::VarDecl { name, .. }
      | Syntax::ParamDecl { name, .. } => Some(name),
      _ => None,
    }
  }

  pub fn as_path(&self) -> Option<&str> {
    match self.stx.as_ref() {
      Syntax::PathExpr { name } => Some(name),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self.stx.as_ref() {
      Syntax::LiteralIntExpr { value } => Some(*value),
      _ => None,
    }
  }
}

impl Debug for Node {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    self.stx.fmt(f)
  }
}

// The serialised form carries structure only. Node ids are identities, not content, so two
// trees that differ only in ids serialise identically.
impl Serialize for Node {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.stx.serialize(serializer)
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum UnaryOp {
  Not,
  Neg,
  Cmpl,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum BinaryOp {
  Add,
  Sub,
  BitAnd,
  BitOr,
  BitXor,
  Shl,
  Shr,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

/// One arm of a parser transition select. A `None` keyset is the default arm.
#[derive(Clone, Debug, Serialize)]
pub struct SelectCase {
  pub keyset: Option<Node>,
  pub target: Node,
}

#[derive(Clone, Debug, Serialize)]
pub enum SwitchLabel {
  Name(String),
  Default,
}

/// A switch case without a body falls through to the next case with one.
#[derive(Clone, Debug, Serialize)]
pub struct SwitchCase {
  pub label: SwitchLabel,
  pub body: Option<Node>,
}

#[derive(Clone, Debug, Serialize)]
pub enum Syntax {
  // Expressions.
  LiteralIntExpr { value: i64 },
  LiteralBoolExpr { value: bool },
  PathExpr { name: String },
  TypeNameExpr { name: String },
  MemberExpr { base: Node, member: String },
  IndexExpr { base: Node, index: Node },
  // Bit slice with constant bounds, high down to low inclusive.
  SliceExpr { base: Node, high: u32, low: u32 },
  CondExpr { test: Node, if_true: Node, if_false: Node },
  UnaryExpr { op: UnaryOp, operand: Node },
  BinaryExpr { op: BinaryOp, left: Node, right: Node },
  CallExpr { callee: Node, args: Vec<Node> },
  SelectExpr { exprs: Vec<Node>, cases: Vec<SelectCase> },

  // Statements.
  AssignStmt { left: Node, right: Node },
  CallStmt { call: Node },
  ReturnStmt { value: Option<Node> },
  ExitStmt,
  BlockStmt { body: Vec<Node> },
  IfStmt { test: Node, if_true: Node, if_false: Option<Node> },
  SwitchStmt { select: Node, cases: Vec<SwitchCase> },
  EmptyStmt,

  // Declarations.
  Program { decls: Vec<Node> },
  TypeDecl { name: String, ty: Type },
  ParserDecl { name: String, params: Vec<Node>, locals: Vec<Node>, states: Vec<Node> },
  // `transition` is a PathExpr naming the next state or a SelectExpr choosing one.
  ParserState { name: String, body: Vec<Node>, transition: Option<Node> },
  ControlDecl { name: String, params: Vec<Node>, locals: Vec<Node>, body: Node },
  ActionDecl { name: String, params: Vec<Node>, body: Node },
  TableDecl { name: String, keys: Vec<Node>, actions: Vec<Node> },
  FunctionDecl { name: String, params: Vec<Node>, ret: Type, body: Node },
  // An extern object instance. `init` holds the implementations of the object's abstract
  // methods; they may run whenever the object decides, not at any particular call site.
  InstanceDecl { name: String, ty: Type, init: Vec<Node> },
  VarDecl { name: String, ty: Type },
  ParamDecl { name: String, direction: Direction, ty: Type },
}

pub const ACCEPT: &str = "accept";
pub const REJECT: &str = "reject";

impl fmt::Display for UnaryOp {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      UnaryOp::Not => "!",
      UnaryOp::Neg => "-",
      UnaryOp::Cmpl => "~",
    })
  }
}

impl fmt::Display for BinaryOp {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitOr => "|",
      BinaryOp::BitXor => "^",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
    })
  }
}

// Compact rendering of expressions so diagnostics can name what was read. Statements and
// declarations render as a placeholder; nothing user-visible prints them.
impl fmt::Display for Node {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self.stx.as_ref() {
      Syntax::LiteralIntExpr { value } => write!(f, "{}", value),
      Syntax::LiteralBoolExpr { value } => write!(f, "{}", value),
      Syntax::PathExpr { name } | Syntax::TypeNameExpr { name } => f.write_str(name),
      Syntax::MemberExpr { base, member } => write!(f, "{}.{}", base, member),
      Syntax::IndexExpr { base, index } => write!(f, "{}[{}]", base, index),
      Syntax::SliceExpr { base, high, low } => write!(f, "{}[{}:{}]", base, high, low),
      Syntax::CondExpr { test, if_true, if_false } => {
        write!(f, "({} ? {} : {})", test, if_true, if_false)
      }
      Syntax::UnaryExpr { op, operand } => write!(f, "{}{}", op, operand),
      Syntax::BinaryExpr { op, left, right } => write!(f, "({} {} {})", left, op, right),
      Syntax::CallExpr { callee, args } => {
        write!(f, "{}(", callee)?;
        for (i, a) in args.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{}", a)?;
        }
        f.write_str(")")
      }
      Syntax::SelectExpr { .. } => f.write_str("select(...)"),
      _ => f.write_str("<node>"),
    }
  }
}
