use serde::Serialize;

/// Parameter passing direction. `None` is used for directionless action data parameters.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum Direction {
  None,
  In,
  Out,
  InOut,
}

impl Direction {
  pub fn is_out(self) -> bool {
    matches!(self, Direction::Out | Direction::InOut)
  }
}

/// Names of the built-in members of header stacks.
pub mod stack {
  pub const NEXT: &str = "next";
  pub const LAST: &str = "last";
  pub const LAST_INDEX: &str = "lastIndex";
  pub const PUSH_FRONT: &str = "push_front";
  pub const POP_FRONT: &str = "pop_front";
}

/// Names of the built-in methods of headers.
pub mod header {
  pub const IS_VALID: &str = "isValid";
  pub const SET_VALID: &str = "setValid";
  pub const SET_INVALID: &str = "setInvalid";
}

pub const APPLY: &str = "apply";
pub const HIT: &str = "hit";
pub const MISS: &str = "miss";
pub const ACTION_RUN: &str = "action_run";

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Field {
  pub name: String,
  pub ty: Type,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ParamSig {
  pub name: String,
  pub direction: Direction,
  pub ty: Type,
}

/// Signature of an extern object's method. `may_call` names the abstract methods of the same
/// object that invoking this method may transitively run.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct MethodSig {
  pub name: String,
  pub params: Vec<ParamSig>,
  pub ret: Type,
  pub may_call: Vec<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub enum Type {
  Bits { width: u32 },
  Bool,
  Void,
  Enum { name: String, members: Vec<String> },
  // A header is a struct carrying an implicit validity bit; writing one of its fields is
  // meaningful only while that bit is set.
  Header { name: String, fields: Vec<Field> },
  Struct { name: String, fields: Vec<Field> },
  // Fixed-capacity stack of headers with the pseudo-members next, last and lastIndex.
  Stack { element: Box<Type>, size: u32 },
  Extern { name: String, methods: Vec<MethodSig> },
  // The type of a member expression denoting a callable; calls are resolved on the whole call
  // expression, never on this member alone.
  Method { ret: Box<Type> },
  // Result of applying a table: a synthetic record with hit, miss and action_run members.
  ApplyResult { table: String },
  // Reference to a declared type, expanded during binding.
  Named { name: String },
}

impl Type {
  pub fn is_header(&self) -> bool {
    matches!(self, Type::Header { .. })
  }

  pub fn is_stack(&self) -> bool {
    matches!(self, Type::Stack { .. })
  }

  pub fn is_method(&self) -> bool {
    matches!(self, Type::Method { .. })
  }

  /// Scalar types, as opposed to composites whose cells can be initialised independently.
  pub fn is_base(&self) -> bool {
    matches!(self, Type::Bits { .. } | Type::Bool | Type::Enum { .. })
  }

  pub fn is_void(&self) -> bool {
    matches!(self, Type::Void)
  }

  pub fn field(&self, name: &str) -> Option<&Field> {
    match self {
      Type::Header { fields, .. } | Type::Struct { fields, .. } => {
        fields.iter().find(|f| f.name == name)
      }
      _ => None,
    }
  }

  pub fn method(&self, name: &str) -> Option<&MethodSig> {
    match self {
      Type::Extern { methods, .. } => methods.iter().find(|m| m.name == name),
      _ => None,
    }
  }

  /// A struct with no cells at all cannot be uninitialised. Headers are never empty since they
  /// always carry their validity bit.
  pub fn is_empty(&self) -> bool {
    match self {
      Type::Struct { fields, .. } => fields.is_empty(),
      _ => false,
    }
  }
}
