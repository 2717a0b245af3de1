use crate::points::ProgramPoint;
use crate::points::ProgramPoints;
use ahash::AHashMap;
use ahash::AHashSet;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::visit::walk;
use log::trace;

/// The statements whose writes were observed by at least one later read. Keyed by the identity
/// of the original node; the rewriter queries it before replacing anything.
pub struct HasUses {
  used: AHashSet<NodeId>,
  /// Bounds of the slice currently being written, while one is being watched.
  tracker: Option<(u32, u32)>,
  /// Assignment statement id to the bounds of its slice left-hand side, for the whole subtree
  /// under analysis. Lets the overwrite filter run without touching the tree.
  slice_writes: AHashMap<NodeId, (u32, u32)>,
}

impl HasUses {
  pub fn new(root: &Node) -> HasUses {
    let mut slice_writes = AHashMap::new();
    walk(root, &mut |n| {
      if let Syntax::AssignStmt { left, .. } = n.stx.as_ref() {
        if let Syntax::SliceExpr { high, low, .. } = left.stx.as_ref() {
          slice_writes.insert(n.id, (*high, *low));
        }
      }
    });
    HasUses {
      used: AHashSet::new(),
      tracker: None,
      slice_writes,
    }
  }

  /// A watched slice write makes any earlier write to a slice it covers bitwise dead before it
  /// is read: the wider write replaces every bit the narrower one set.
  fn overwrites(&self, previous: &ProgramPoint) -> bool {
    let Some((high, low)) = self.tracker else {
      return false;
    };
    let Some(last) = previous.last() else {
      return false;
    };
    let Some(&(prev_high, prev_low)) = self.slice_writes.get(&last) else {
      return false;
    };
    high >= prev_high && low <= prev_low
  }

  pub fn add(&mut self, points: &ProgramPoints) {
    for point in points.iter() {
      if self.overwrites(point) {
        trace!("skipping covered slice write at {}", point);
        continue;
      }
      if let Some(last) = point.last() {
        trace!("found use for {:?}", last);
        self.used.insert(last);
      }
    }
  }

  pub fn has_uses(&self, node: NodeId) -> bool {
    self.used.contains(&node)
  }

  /// Starts watching the left-hand-side slice of an assignment. Watches never nest; a second
  /// activation is an analysis bug.
  pub fn watch_for_overwrites(&mut self, high: u32, low: u32) {
    if self.tracker.is_some() {
      panic!("slice tracker is already active");
    }
    self.tracker = Some((high, low));
  }

  pub fn done_watching(&mut self) {
    self.tracker = None;
  }
}
