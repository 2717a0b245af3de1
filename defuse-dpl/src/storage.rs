use ahash::AHashMap;
use ir_dpl::ast::NodeId;
use ir_dpl::types::Type;
use std::collections::BTreeSet;

/// Reserved field holding a header's validity bit.
pub const VALID_FIELD: &str = "$valid";
/// Reserved field holding the index of a stack's most recently written element.
pub const LAST_INDEX_FIELD: &str = "$lastIndex";

/// Interned storage location. The arena owns a tree per declared variable or parameter; sets of
/// locations are sets of these ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LocId(u32);

enum LocKind {
  // A scalar cell.
  Base,
  Struct { fields: Vec<(String, LocId)>, is_header: bool },
  Stack { elements: Vec<LocId>, last_index: LocId },
}

struct Location {
  ty: Type,
  kind: LocKind,
}

/// Storage descriptors for every declaration that owns cells. Declarations without storage
/// (externs, tables, states) have no entry.
#[derive(Default)]
pub struct StorageMap {
  locations: Vec<Location>,
  by_decl: AHashMap<NodeId, LocId>,
}

impl StorageMap {
  pub fn new() -> StorageMap {
    StorageMap::default()
  }

  fn intern(&mut self, ty: Type, kind: LocKind) -> LocId {
    let id = LocId(self.locations.len() as u32);
    self.locations.push(Location { ty, kind });
    id
  }

  fn create(&mut self, ty: &Type) -> Option<LocId> {
    match ty {
      Type::Bits { .. } | Type::Bool | Type::Enum { .. } => {
        Some(self.intern(ty.clone(), LocKind::Base))
      }
      Type::Header { fields, .. } => {
        let mut locs = Vec::with_capacity(fields.len() + 1);
        for f in fields {
          let l = self.create(&f.ty).expect("header fields always have storage");
          locs.push((f.name.clone(), l));
        }
        let valid = self.intern(Type::Bool, LocKind::Base);
        locs.push((VALID_FIELD.to_string(), valid));
        Some(self.intern(ty.clone(), LocKind::Struct { fields: locs, is_header: true }))
      }
      Type::Struct { fields, .. } => {
        let mut locs = Vec::with_capacity(fields.len());
        for f in fields {
          let l = self.create(&f.ty).expect("struct fields always have storage");
          locs.push((f.name.clone(), l));
        }
        Some(self.intern(ty.clone(), LocKind::Struct { fields: locs, is_header: false }))
      }
      Type::Stack { element, size } => {
        let elements = (0..*size)
          .map(|_| self.create(element).expect("stack elements always have storage"))
          .collect();
        let last_index = self.intern(Type::Bits { width: 32 }, LocKind::Base);
        Some(self.intern(ty.clone(), LocKind::Stack { elements, last_index }))
      }
      Type::Void
      | Type::Extern { .. }
      | Type::Method { .. }
      | Type::ApplyResult { .. }
      | Type::Named { .. } => None,
    }
  }

  /// Creates (or returns the existing) storage for a declaration.
  pub fn add_storage(&mut self, decl: NodeId, ty: &Type) -> Option<LocId> {
    if let Some(l) = self.by_decl.get(&decl) {
      return Some(*l);
    }
    let l = self.create(ty)?;
    self.by_decl.insert(decl, l);
    Some(l)
  }

  pub fn get_storage(&self, decl: NodeId) -> Option<LocId> {
    self.by_decl.get(&decl).copied()
  }

  pub fn ty(&self, loc: LocId) -> &Type {
    &self.locations[loc.0 as usize].ty
  }

  /// Root locations of every declaration with storage.
  pub fn decl_storages(&self) -> impl Iterator<Item = LocId> + '_ {
    self.by_decl.values().copied()
  }

  fn leaves_into(&self, loc: LocId, out: &mut BTreeSet<LocId>) {
    match &self.locations[loc.0 as usize].kind {
      LocKind::Base => {
        out.insert(loc);
      }
      LocKind::Struct { fields, .. } => {
        for (_, l) in fields {
          self.leaves_into(*l, out);
        }
      }
      LocKind::Stack { elements, last_index } => {
        for l in elements {
          self.leaves_into(*l, out);
        }
        out.insert(*last_index);
      }
    }
  }

  fn non_header_leaves_into(&self, loc: LocId, out: &mut BTreeSet<LocId>) {
    match &self.locations[loc.0 as usize].kind {
      LocKind::Base => {
        out.insert(loc);
      }
      // A header is allowed to stay invalid, so none of its cells count as an initialisation
      // obligation. Stacks are collections of headers and are skipped entirely.
      LocKind::Struct { is_header: true, .. } | LocKind::Stack { .. } => {}
      LocKind::Struct { fields, .. } => {
        for (_, l) in fields {
          self.non_header_leaves_into(*l, out);
        }
      }
    }
  }
}

/// Set of storage locations read or written by one expression.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LocationSet {
  locs: BTreeSet<LocId>,
}

impl LocationSet {
  pub fn empty() -> LocationSet {
    LocationSet::default()
  }

  pub fn singleton(loc: LocId) -> LocationSet {
    let mut locs = BTreeSet::new();
    locs.insert(loc);
    LocationSet { locs }
  }

  pub fn is_empty(&self) -> bool {
    self.locs.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = LocId> + '_ {
    self.locs.iter().copied()
  }

  pub fn join(&self, other: &LocationSet) -> LocationSet {
    LocationSet {
      locs: self.locs.union(&other.locs).copied().collect(),
    }
  }

  /// Projects every struct or header member of the set onto one named field. A stack projects
  /// through every element: `stack.last.f` may read the `f` of any of them.
  pub fn get_field(&self, map: &StorageMap, name: &str) -> LocationSet {
    let mut locs = BTreeSet::new();
    for l in self.iter() {
      match &map.locations[l.0 as usize].kind {
        LocKind::Struct { fields, .. } => {
          if let Some((_, f)) = fields.iter().find(|(n, _)| n == name) {
            locs.insert(*f);
          }
        }
        LocKind::Stack { elements, .. } => {
          for e in elements {
            if let LocKind::Struct { fields, .. } = &map.locations[e.0 as usize].kind {
              if let Some((_, f)) = fields.iter().find(|(n, _)| n == name) {
                locs.insert(*f);
              }
            }
          }
        }
        LocKind::Base => {}
      }
    }
    LocationSet { locs }
  }

  pub fn get_valid_field(&self, map: &StorageMap) -> LocationSet {
    self.get_field(map, VALID_FIELD)
  }

  /// Projects every stack of the set onto the element at a known index. Indexes outside the
  /// declared size project to nothing.
  pub fn get_index(&self, map: &StorageMap, index: usize) -> LocationSet {
    let mut locs = BTreeSet::new();
    for l in self.iter() {
      if let LocKind::Stack { elements, .. } = &map.locations[l.0 as usize].kind {
        if let Some(e) = elements.get(index) {
          locs.insert(*e);
        }
      }
    }
    LocationSet { locs }
  }

  /// Projects every stack of the set onto its last-written-index cell.
  pub fn get_array_last_index(&self, map: &StorageMap) -> LocationSet {
    let mut locs = BTreeSet::new();
    for l in self.iter() {
      if let LocKind::Stack { last_index, .. } = &map.locations[l.0 as usize].kind {
        locs.insert(*last_index);
      }
    }
    LocationSet { locs }
  }

  /// Expansion to scalar cells, the granularity reaching definitions are tracked at.
  pub fn canonical(&self, map: &StorageMap) -> LocationSet {
    let mut locs = BTreeSet::new();
    for l in self.iter() {
      map.leaves_into(l, &mut locs);
    }
    LocationSet { locs }
  }

  /// Scalar cells excluding everything stored inside headers.
  pub fn remove_headers(&self, map: &StorageMap) -> LocationSet {
    let mut locs = BTreeSet::new();
    for l in self.iter() {
      map.non_header_leaves_into(l, &mut locs);
    }
    LocationSet { locs }
  }
}
