use crate::storage::LocId;
use crate::storage::LocationSet;
use crate::storage::StorageMap;
use ahash::AHashMap;
use ahash::AHashSet;
use ir_dpl::ast::NodeId;
use std::fmt;
use std::fmt::Formatter;

/// Marker appended by `ProgramPoint::after`. Never a real node.
const AFTER: NodeId = NodeId(u32::MAX);

/// Position in the program, qualified by the chain of call sites that led there. The empty
/// chain is the *before-start* sentinel: nothing has executed yet on some path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct ProgramPoint {
  path: Vec<NodeId>,
}

impl ProgramPoint {
  pub fn before_start() -> ProgramPoint {
    ProgramPoint::default()
  }

  pub fn single(node: NodeId) -> ProgramPoint {
    ProgramPoint { path: vec![node] }
  }

  pub fn new(context: &ProgramPoint, node: NodeId) -> ProgramPoint {
    let mut path = context.path.clone();
    path.push(node);
    ProgramPoint { path }
  }

  /// The point just past this one, where a unit's exit state lives.
  pub fn after(&self) -> ProgramPoint {
    ProgramPoint::new(self, AFTER)
  }

  pub fn is_before_start(&self) -> bool {
    self.path.is_empty()
  }

  /// The node the point names, `None` for before-start.
  pub fn last(&self) -> Option<NodeId> {
    self.path.last().copied()
  }
}

impl fmt::Display for ProgramPoint {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    if self.is_before_start() {
      return f.write_str("<before start>");
    }
    for (i, n) in self.path.iter().enumerate() {
      if i > 0 {
        f.write_str("//")?;
      }
      if *n == AFTER {
        f.write_str("<after>")?;
      } else {
        write!(f, "{}", n.0)?;
      }
    }
    Ok(())
  }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ProgramPoints {
  points: AHashSet<ProgramPoint>,
}

impl ProgramPoints {
  pub fn new() -> ProgramPoints {
    ProgramPoints::default()
  }

  pub fn singleton(point: ProgramPoint) -> ProgramPoints {
    let mut p = ProgramPoints::new();
    p.add(point);
    p
  }

  pub fn add(&mut self, point: ProgramPoint) {
    self.points.insert(point);
  }

  pub fn extend(&mut self, other: &ProgramPoints) {
    for p in &other.points {
      self.points.insert(p.clone());
    }
  }

  pub fn contains_before_start(&self) -> bool {
    self.points.iter().any(|p| p.is_before_start())
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ProgramPoint> {
    self.points.iter()
  }
}

/// Reaching writes per scalar cell, the lattice value attached to one program point.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Definitions {
  unreachable: bool,
  defs: AHashMap<LocId, ProgramPoints>,
}

impl Definitions {
  pub fn new() -> Definitions {
    Definitions::default()
  }

  /// The join identity: an impossible path that defines nothing.
  pub fn unreachable() -> Definitions {
    Definitions {
      unreachable: true,
      defs: AHashMap::new(),
    }
  }

  pub fn is_unreachable(&self) -> bool {
    self.unreachable
  }

  /// Marks the state unreachable while keeping its contents, so late queries still see the
  /// last known writes.
  pub fn set_unreachable(&mut self) {
    self.unreachable = true;
  }

  pub fn set(&mut self, loc: LocId, points: ProgramPoints) {
    self.defs.insert(loc, points);
  }

  pub fn add_point(&mut self, loc: LocId, point: ProgramPoint) {
    self.defs.entry(loc).or_default().add(point);
  }

  pub fn get_points(&self, loc: LocId) -> Option<&ProgramPoints> {
    self.defs.get(&loc)
  }

  /// Union of the reaching points of every cell the set covers. Panics when a cell was never
  /// seeded by the write-set builder; that is an upstream bug, not an input error.
  pub fn points_for(&self, set: &LocationSet, map: &StorageMap) -> ProgramPoints {
    let mut result = ProgramPoints::new();
    for leaf in set.canonical(map).iter() {
      match self.defs.get(&leaf) {
        Some(points) => result.extend(points),
        None => panic!("no definitions recorded for location {:?}", leaf),
      }
    }
    result
  }

  /// Pointwise union. An unreachable side contributes nothing: its writes cannot flow into the
  /// merged state.
  pub fn join(&self, other: &Definitions) -> Definitions {
    if self.unreachable && !other.unreachable {
      return other.clone();
    }
    if other.unreachable && !self.unreachable {
      return self.clone();
    }
    let mut result = self.clone();
    for (loc, points) in &other.defs {
      result.defs.entry(*loc).or_default().extend(points);
    }
    result
  }
}

/// All computed reaching-definition states, keyed by program point, together with the storage
/// they talk about. The builder that fills this in runs before the def-use pass.
pub struct AllDefinitions {
  pub storage: StorageMap,
  map: AHashMap<ProgramPoint, Definitions>,
}

impl AllDefinitions {
  pub fn new(storage: StorageMap) -> AllDefinitions {
    AllDefinitions {
      storage,
      map: AHashMap::new(),
    }
  }

  pub fn set(&mut self, point: ProgramPoint, defs: Definitions) {
    self.map.insert(point, defs);
  }

  /// Definitions holding immediately after `point`. Panics on a point the builder never
  /// reached; the analysis only asks about points the builder must have visited.
  pub fn get(&self, point: &ProgramPoint) -> &Definitions {
    match self.map.get(point) {
      Some(d) => d,
      None => panic!("no definitions known at point {}", point),
    }
  }
}
