use crate::loc::Loc;
use std::fmt;
use std::fmt::Formatter;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
  Warning,
  Error,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiagnosticKind {
  // A read may observe storage that no path has written.
  UninitializedUse,
  // An out parameter may leave its unit without having been written.
  UninitializedOutParam,
  // Reading a stack's `next` slot, which is never initialised by definition.
  UninitializedRead,
  // A value-returning function has a path that falls off the end.
  MissingReturn,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub severity: Severity,
  pub kind: DiagnosticKind,
  pub loc: Loc,
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let tag = match self.severity {
      Severity::Warning => "warning",
      Severity::Error => "error",
    };
    write!(f, "{}: {}", tag, self.message)
  }
}

/// Accumulating sink for user-facing diagnostics. Warnings never stop a pass; the pass keeps
/// producing a valid rewrite alongside them.
#[derive(Default)]
pub struct Diagnostics {
  list: Vec<Diagnostic>,
}

impl Diagnostics {
  pub fn new() -> Diagnostics {
    Diagnostics::default()
  }

  pub fn warn(&mut self, kind: DiagnosticKind, loc: Loc, message: String) {
    self.list.push(Diagnostic {
      severity: Severity::Warning,
      kind,
      loc,
      message,
    });
  }

  pub fn error(&mut self, kind: DiagnosticKind, loc: Loc, message: String) {
    self.list.push(Diagnostic {
      severity: Severity::Error,
      kind,
      loc,
      message,
    });
  }

  pub fn has_errors(&self) -> bool {
    self.list.iter().any(|d| d.severity == Severity::Error)
  }

  pub fn is_empty(&self) -> bool {
    self.list.is_empty()
  }

  pub fn len(&self) -> usize {
    self.list.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.list.iter()
  }
}
