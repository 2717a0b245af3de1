use ahash::AHashMap;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::visit::walk;

/// Id-to-node lookup over one subtree. Declarations reference each other by id, so the analysis
/// resolves them through this index instead of holding ownership edges, which keeps the tree
/// cycle-free.
pub struct NodeIndex<'a> {
  map: AHashMap<NodeId, &'a Node>,
}

impl<'a> NodeIndex<'a> {
  pub fn build(root: &'a Node) -> NodeIndex<'a> {
    let mut map = AHashMap::new();
    walk(root, &mut |n| {
      map.insert(n.id, n);
    });
    NodeIndex { map }
  }

  pub fn get(&self, id: NodeId) -> &'a Node {
    match self.map.get(&id) {
      Some(n) => n,
      None => panic!("node {:?} is not part of the indexed subtree", id),
    }
  }
}
