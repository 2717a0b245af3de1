use std::cmp::max;
use std::cmp::min;

/// Byte range in the original source. Rewrites copy the location of the node they replace, so
/// diagnostics and downstream passes keep pointing at real source even for synthesised nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Loc(pub usize, pub usize);

impl Loc {
  pub const NONE: Loc = Loc(0, 0);

  pub fn is_empty(&self) -> bool {
    self.0 >= self.1
  }

  pub fn len(&self) -> usize {
    self.1 - self.0
  }

  pub fn extend(&mut self, other: Loc) {
    self.0 = min(self.0, other.0);
    self.1 = max(self.1, other.1);
  }
}
