//! Test support: a small builder for IR trees and a reference write-set builder that computes
//! the reaching definitions the pass consumes. The production pipeline receives definitions
//! from an earlier compiler pass; tests construct them here, mirroring the program-point
//! chains the analysis walks.

use crate::method;
use crate::method::BuiltIn;
use crate::method::MethodKind;
use crate::nodes::NodeIndex;
use crate::points::AllDefinitions;
use crate::points::Definitions;
use crate::points::ProgramPoint;
use crate::points::ProgramPoints;
use crate::storage::LocationSet;
use crate::storage::StorageMap;
use crate::SimplifyDefUse;
use ahash::AHashMap;
use bind_dpl::compute_bindings;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::NodeIdGen;
use ir_dpl::ast::SelectCase;
use ir_dpl::ast::SwitchCase;
use ir_dpl::ast::SwitchLabel;
use ir_dpl::ast::Syntax;
use ir_dpl::ast::ACCEPT;
use ir_dpl::ast::REJECT;
use ir_dpl::error::Diagnostics;
use ir_dpl::loc::Loc;
use ir_dpl::types::Direction;
use ir_dpl::types::Field;
use ir_dpl::types::MethodSig;
use ir_dpl::types::ParamSig;
use ir_dpl::types::Type;
use ir_dpl::visit::for_each_child;
use ir_dpl::visit::walk;
use std::mem;

// -------------------------------------------------------------------------------------------
// IR construction
// -------------------------------------------------------------------------------------------

pub struct Build {
  pub ids: NodeIdGen,
}

impl Build {
  pub fn new() -> Build {
    Build { ids: NodeIdGen::new() }
  }

  fn node(&mut self, stx: Syntax) -> Node {
    Node::new(&mut self.ids, Loc::NONE, stx)
  }

  pub fn int(&mut self, value: i64) -> Node {
    self.node(Syntax::LiteralIntExpr { value })
  }

  pub fn path(&mut self, name: &str) -> Node {
    self.node(Syntax::PathExpr { name: name.to_string() })
  }

  pub fn member(&mut self, base: Node, member: &str) -> Node {
    self.node(Syntax::MemberExpr { base, member: member.to_string() })
  }

  /// Member chain rooted at a path, `field("h", &["f"])` builds `h.f`.
  pub fn field(&mut self, base: &str, members: &[&str]) -> Node {
    let mut e = self.path(base);
    for m in members {
      e = self.member(e, m);
    }
    e
  }

  pub fn slice(&mut self, base: Node, high: u32, low: u32) -> Node {
    self.node(Syntax::SliceExpr { base, high, low })
  }

  pub fn index(&mut self, base: Node, index: Node) -> Node {
    self.node(Syntax::IndexExpr { base, index })
  }

  pub fn call(&mut self, callee: Node, args: Vec<Node>) -> Node {
    self.node(Syntax::CallExpr { callee, args })
  }

  /// `method("t", "apply", vec![])` builds `t.apply()`.
  pub fn method(&mut self, base: &str, name: &str, args: Vec<Node>) -> Node {
    let callee = self.field(base, &[name]);
    self.call(callee, args)
  }

  pub fn assign(&mut self, left: Node, right: Node) -> Node {
    self.node(Syntax::AssignStmt { left, right })
  }

  pub fn call_stmt(&mut self, call: Node) -> Node {
    self.node(Syntax::CallStmt { call })
  }

  pub fn ret(&mut self, value: Option<Node>) -> Node {
    self.node(Syntax::ReturnStmt { value })
  }

  pub fn exit(&mut self) -> Node {
    self.node(Syntax::ExitStmt)
  }

  pub fn block(&mut self, body: Vec<Node>) -> Node {
    self.node(Syntax::BlockStmt { body })
  }

  pub fn iff(&mut self, test: Node, if_true: Node, if_false: Option<Node>) -> Node {
    self.node(Syntax::IfStmt { test, if_true, if_false })
  }

  pub fn switch(&mut self, select: Node, cases: Vec<SwitchCase>) -> Node {
    self.node(Syntax::SwitchStmt { select, cases })
  }

  pub fn case(&mut self, name: &str, body: Node) -> SwitchCase {
    SwitchCase {
      label: SwitchLabel::Name(name.to_string()),
      body: Some(body),
    }
  }

  pub fn default_case(&mut self, body: Node) -> SwitchCase {
    SwitchCase {
      label: SwitchLabel::Default,
      body: Some(body),
    }
  }

  pub fn var(&mut self, name: &str, ty: Type) -> Node {
    self.node(Syntax::VarDecl { name: name.to_string(), ty })
  }

  pub fn param(&mut self, name: &str, direction: Direction, ty: Type) -> Node {
    self.node(Syntax::ParamDecl { name: name.to_string(), direction, ty })
  }

  pub fn control(&mut self, name: &str, params: Vec<Node>, locals: Vec<Node>, body: Vec<Node>) -> Node {
    let body = self.block(body);
    self.node(Syntax::ControlDecl {
      name: name.to_string(),
      params,
      locals,
      body,
    })
  }

  pub fn action(&mut self, name: &str, params: Vec<Node>, body: Vec<Node>) -> Node {
    let body = self.block(body);
    self.node(Syntax::ActionDecl { name: name.to_string(), params, body })
  }

  pub fn function(&mut self, name: &str, params: Vec<Node>, ret: Type, body: Vec<Node>) -> Node {
    let body = self.block(body);
    self.node(Syntax::FunctionDecl {
      name: name.to_string(),
      params,
      ret,
      body,
    })
  }

  pub fn table(&mut self, name: &str, keys: Vec<Node>, actions: Vec<Node>) -> Node {
    self.node(Syntax::TableDecl { name: name.to_string(), keys, actions })
  }

  pub fn instance(&mut self, name: &str, ty: Type, init: Vec<Node>) -> Node {
    self.node(Syntax::InstanceDecl { name: name.to_string(), ty, init })
  }

  pub fn state(&mut self, name: &str, body: Vec<Node>, transition: Option<Node>) -> Node {
    self.node(Syntax::ParserState {
      name: name.to_string(),
      body,
      transition,
    })
  }

  pub fn goto(&mut self, state: &str) -> Node {
    self.path(state)
  }

  pub fn select(&mut self, exprs: Vec<Node>, cases: Vec<(Option<Node>, &str)>) -> Node {
    let cases = cases
      .into_iter()
      .map(|(keyset, target)| SelectCase {
        keyset,
        target: self.path(target),
      })
      .collect();
    self.node(Syntax::SelectExpr { exprs, cases })
  }

  /// Accept and reject states are part of every parser; the builder appends them.
  pub fn parser(&mut self, name: &str, params: Vec<Node>, locals: Vec<Node>, mut states: Vec<Node>) -> Node {
    let accept = self.state(ACCEPT, Vec::new(), None);
    let reject = self.state(REJECT, Vec::new(), None);
    states.push(accept);
    states.push(reject);
    self.node(Syntax::ParserDecl {
      name: name.to_string(),
      params,
      locals,
      states,
    })
  }

  pub fn program(&mut self, decls: Vec<Node>) -> Node {
    self.node(Syntax::Program { decls })
  }
}

pub fn bits(width: u32) -> Type {
  Type::Bits { width }
}

pub fn header_ty(name: &str, fields: &[(&str, Type)]) -> Type {
  Type::Header {
    name: name.to_string(),
    fields: fields
      .iter()
      .map(|(n, t)| Field { name: n.to_string(), ty: t.clone() })
      .collect(),
  }
}

pub fn struct_ty(name: &str, fields: &[(&str, Type)]) -> Type {
  Type::Struct {
    name: name.to_string(),
    fields: fields
      .iter()
      .map(|(n, t)| Field { name: n.to_string(), ty: t.clone() })
      .collect(),
  }
}

pub fn stack_ty(element: Type, size: u32) -> Type {
  Type::Stack { element: Box::new(element), size }
}

pub fn extern_ty(name: &str, methods: &[(&str, &[(&str, Direction, Type)], Type, &[&str])]) -> Type {
  Type::Extern {
    name: name.to_string(),
    methods: methods
      .iter()
      .map(|(n, params, ret, may_call)| MethodSig {
        name: n.to_string(),
        params: params
          .iter()
          .map(|(pn, d, t)| ParamSig {
            name: pn.to_string(),
            direction: *d,
            ty: t.clone(),
          })
          .collect(),
        ret: ret.clone(),
        may_call: may_call.iter().map(|c| c.to_string()).collect(),
      })
      .collect(),
  }
}

// -------------------------------------------------------------------------------------------
// Pipeline
// -------------------------------------------------------------------------------------------

/// Binds, computes reaching definitions, and runs the pass.
pub fn run_pass(program: Node, ids: &mut NodeIdGen) -> (Node, Diagnostics) {
  let bindings = compute_bindings(&program).expect("test programs must bind");
  let definitions = build_definitions(&program, &bindings);
  let mut diag = Diagnostics::new();
  let out = SimplifyDefUse {
    bindings: &bindings,
    definitions: &definitions,
    diag: &mut diag,
    ids,
  }
  .process(program);
  (out, diag)
}

/// Statements of a control body in the rewritten tree.
pub fn control_body<'a>(program: &'a Node, name: &str) -> &'a [Node] {
  let Syntax::Program { decls } = program.stx.as_ref() else {
    panic!("expected a program");
  };
  let control = decls
    .iter()
    .find(|d| d.decl_name() == Some(name))
    .unwrap_or_else(|| panic!("no control '{}'", name));
  match control.stx.as_ref() {
    Syntax::ControlDecl { body, .. } => match body.stx.as_ref() {
      Syntax::BlockStmt { body } => body,
      _ => panic!("control body must be a block"),
    },
    _ => panic!("'{}' is not a control", name),
  }
}

pub fn is_empty_stmt(s: &Node) -> bool {
  matches!(s.stx.as_ref(), Syntax::EmptyStmt)
}

pub fn is_assign(s: &Node) -> bool {
  matches!(s.stx.as_ref(), Syntax::AssignStmt { .. })
}

pub fn is_call_stmt(s: &Node) -> bool {
  matches!(s.stx.as_ref(), Syntax::CallStmt { .. })
}

// -------------------------------------------------------------------------------------------
// Reference write-set builder
// -------------------------------------------------------------------------------------------

/// Computes the reaching definitions of every program point the analysis will visit, with the
/// same call-context chains. Assignments update their target cells strongly, including slice
/// writes; writes through an unknown index only join; table applies join every action outcome
/// with the miss path; return and exit poison the rest of their path.
pub fn build_definitions(program: &Node, bindings: &Bindings) -> AllDefinitions {
  let mut storage = StorageMap::new();
  walk(program, &mut |n| {
    if matches!(n.stx.as_ref(), Syntax::VarDecl { .. } | Syntax::ParamDecl { .. }) {
      storage.add_storage(n.id, bindings.types.get_type(n.id));
    }
  });
  let nodes = NodeIndex::build(program);
  let mut b = Builder {
    bindings,
    nodes,
    all: AllDefinitions::new(storage),
    context: ProgramPoint::before_start(),
    exit: Definitions::unreachable(),
  };
  match program.stx.as_ref() {
    Syntax::Program { decls } => {
      for d in decls {
        b.unit(d);
      }
    }
    _ => b.unit(program),
  }
  b.all
}

struct Builder<'a> {
  bindings: &'a Bindings,
  nodes: NodeIndex<'a>,
  all: AllDefinitions,
  context: ProgramPoint,
  /// Join of the states at every return or exit of the unit being processed.
  exit: Definitions,
}

impl<'a> Builder<'a> {
  fn unit(&mut self, decl: &'a Node) {
    match decl.stx.as_ref() {
      Syntax::ParserDecl { .. } => self.parser_unit(decl),
      Syntax::ControlDecl { .. } => self.control_unit(decl),
      Syntax::FunctionDecl { .. } => self.function_unit(decl),
      _ => {}
    }
  }

  fn pp(&self, node: NodeId) -> ProgramPoint {
    ProgramPoint::new(&self.context, node)
  }

  /// Every cell starts before-start: nothing has written it yet on any path.
  fn seeded(&self) -> Definitions {
    let mut defs = Definitions::new();
    for root in self.all.storage.decl_storages() {
      let leaves = LocationSet::singleton(root).canonical(&self.all.storage);
      for leaf in leaves.iter() {
        defs.set(leaf, ProgramPoints::singleton(ProgramPoint::before_start()));
      }
    }
    defs
  }

  fn write(&self, defs: &mut Definitions, locs: &LocationSet, point: &ProgramPoint, strong: bool) {
    for leaf in locs.canonical(&self.all.storage).iter() {
      if strong {
        defs.set(leaf, ProgramPoints::singleton(point.clone()));
      } else {
        defs.add_point(leaf, point.clone());
      }
    }
  }

  /// The storage an assignment target names, and whether writing it replaces the previous
  /// contents of its cells. Unknown indexes may write any element, so they only join.
  fn lvalue(&self, e: &Node) -> (LocationSet, bool) {
    let map = &self.all.storage;
    match e.stx.as_ref() {
      Syntax::PathExpr { .. } => {
        let decl = self.bindings.refs.get_declaration(e.id);
        match map.get_storage(decl) {
          Some(s) => (LocationSet::singleton(s), true),
          None => (LocationSet::empty(), true),
        }
      }
      Syntax::MemberExpr { base, member } => {
        let (l, strong) = self.lvalue(base);
        (l.get_field(map, member), strong)
      }
      Syntax::IndexExpr { base, index } => {
        let (l, strong) = self.lvalue(base);
        match index.as_int() {
          Some(i) => (l.get_index(map, i as usize), strong),
          None => (l, false),
        }
      }
      Syntax::SliceExpr { base, .. } => self.lvalue(base),
      other => panic!("unexpected assignment target {:?}", other),
    }
  }

  fn param_entry(&self, defs: &mut Definitions, params: &[Node], entry: &ProgramPoint, callee: bool) {
    for p in params {
      let Syntax::ParamDecl { direction, .. } = p.stx.as_ref() else {
        panic!("parameter list held a non-parameter {:?}", p);
      };
      let Some(st) = self.all.storage.get_storage(p.id) else {
        continue;
      };
      let locs = LocationSet::singleton(st);
      match direction {
        Direction::In | Direction::InOut | Direction::None => {
          self.write(defs, &locs, entry, true);
        }
        Direction::Out => {
          if callee {
            // A fresh obligation: the callee starts with the parameter unwritten.
            for leaf in locs.canonical(&self.all.storage).iter() {
              defs.set(leaf, ProgramPoints::singleton(ProgramPoint::before_start()));
            }
          }
        }
      }
    }
  }

  // -------------------------------------------------------------------------------------
  // Units
  // -------------------------------------------------------------------------------------

  fn instance_inits(&mut self, locals: &'a [Node]) {
    for l in locals {
      if let Syntax::InstanceDecl { init, .. } = l.stx.as_ref() {
        for m in init {
          self.function_unit(m);
        }
      }
    }
  }

  fn control_unit(&mut self, c: &'a Node) {
    let Syntax::ControlDecl { params, locals, body, .. } = c.stx.as_ref() else {
      unreachable!();
    };
    self.instance_inits(locals);
    self.context = ProgramPoint::before_start();
    let entry = ProgramPoint::single(c.id);
    let mut defs = self.seeded();
    self.param_entry(&mut defs, params, &entry, false);
    self.all.set(entry, defs.clone());
    let save_exit = mem::replace(&mut self.exit, Definitions::unreachable());
    let defs = self.stmt(body, defs);
    // Paths that exited rejoin the natural exit for the out-parameter check.
    let merged = defs.join(&self.exit);
    self.all.set(self.pp(body.id), merged);
    self.exit = save_exit;
  }

  /// A function analysed on its own: a top-level function or an instance initializer method,
  /// which may run before anything else has.
  fn function_unit(&mut self, f: &'a Node) {
    let Syntax::FunctionDecl { params, body, .. } = f.stx.as_ref() else {
      unreachable!();
    };
    let save_ctx = mem::replace(&mut self.context, ProgramPoint::before_start());
    let entry = ProgramPoint::single(f.id);
    let mut defs = self.seeded();
    self.param_entry(&mut defs, params, &entry, false);
    self.all.set(entry.clone(), defs.clone());
    let save_exit = mem::replace(&mut self.exit, Definitions::unreachable());
    let defs = self.stmt(body, defs);
    let merged = defs.join(&self.exit);
    self.all.set(entry.after(), merged);
    self.exit = save_exit;
    self.context = save_ctx;
  }

  fn parser_unit(&mut self, p: &'a Node) {
    let Syntax::ParserDecl { name, params, locals, states, .. } = p.stx.as_ref() else {
      unreachable!();
    };
    self.instance_inits(locals);
    self.context = ProgramPoint::before_start();
    let entry = ProgramPoint::single(p.id);
    let mut seed = self.seeded();
    self.param_entry(&mut seed, params, &entry, false);
    self.all.set(entry, seed.clone());

    let start = states
      .iter()
      .find(|s| s.decl_name() == Some("start"))
      .unwrap_or_else(|| panic!("parser '{}' has no start state", name));
    let mut entries: AHashMap<NodeId, Definitions> = AHashMap::new();
    entries.insert(start.id, seed);
    loop {
      let mut changed = false;
      for s in states {
        let Some(in_defs) = entries.get(&s.id).cloned() else {
          continue;
        };
        let out = self.state_flow(s, in_defs);
        for target in self.state_targets(s) {
          let new = match entries.get(&target) {
            Some(old) => old.join(&out),
            None => out.clone(),
          };
          if entries.get(&target) != Some(&new) {
            entries.insert(target, new);
            changed = true;
          }
        }
      }
      if !changed {
        break;
      }
    }
    // States no transition reaches still get visited by the analysis; give them a state that
    // is marked unreachable so nothing in them is reported or recorded.
    for s in states {
      if !entries.contains_key(&s.id) {
        let mut dead = self.seeded();
        dead.set_unreachable();
        self.state_flow(s, dead);
      }
    }
  }

  fn state_flow(&mut self, s: &'a Node, mut defs: Definitions) -> Definitions {
    let Syntax::ParserState { body, transition, .. } = s.stx.as_ref() else {
      panic!("parser states must be ParserState nodes");
    };
    self.all.set(ProgramPoint::single(s.id), defs.clone());
    let save_ctx = mem::replace(&mut self.context, ProgramPoint::single(s.id));
    for stmt in body {
      defs = self.stmt(stmt, defs);
    }
    if let Some(t) = transition {
      let point = self.pp(t.id);
      defs = self.expr_effects(t, defs, &point);
    }
    self.context = save_ctx;
    defs
  }

  fn state_targets(&self, s: &'a Node) -> Vec<NodeId> {
    let Syntax::ParserState { transition, .. } = s.stx.as_ref() else {
      unreachable!();
    };
    match transition.as_ref().map(|t| t.stx.as_ref()) {
      None => Vec::new(),
      Some(Syntax::PathExpr { .. }) => {
        vec![self.bindings.refs.get_declaration(transition.as_ref().unwrap().id)]
      }
      Some(Syntax::SelectExpr { cases, .. }) => cases
        .iter()
        .map(|c| self.bindings.refs.get_declaration(c.target.id))
        .collect(),
      Some(other) => panic!("unexpected transition {:?}", other),
    }
  }

  // -------------------------------------------------------------------------------------
  // Statements and calls
  // -------------------------------------------------------------------------------------

  fn stmt(&mut self, s: &'a Node, mut defs: Definitions) -> Definitions {
    match s.stx.as_ref() {
      Syntax::AssignStmt { left, right } => {
        if !defs.is_unreachable() {
          let point = self.pp(s.id);
          defs = self.expr_effects(right, defs, &point);
          let (locs, strong) = self.lvalue(left);
          self.write(&mut defs, &locs, &point, strong);
        }
      }
      Syntax::CallStmt { call } => {
        if !defs.is_unreachable() {
          let point = self.pp(s.id);
          defs = self.expr_effects(call, defs, &point);
        }
      }
      Syntax::ReturnStmt { value } => {
        if !defs.is_unreachable() {
          if let Some(v) = value {
            let point = self.pp(s.id);
            defs = self.expr_effects(v, defs, &point);
          }
          self.exit = self.exit.join(&defs);
          defs.set_unreachable();
        }
      }
      Syntax::ExitStmt => {
        if !defs.is_unreachable() {
          self.exit = self.exit.join(&defs);
          defs.set_unreachable();
        }
      }
      Syntax::EmptyStmt => {}
      Syntax::BlockStmt { body } => {
        for stmt in body {
          defs = self.stmt(stmt, defs);
        }
      }
      Syntax::IfStmt { test, if_true, if_false } => {
        if !defs.is_unreachable() {
          let point = self.pp(s.id);
          defs = self.expr_effects(test, defs, &point);
          self.all.set(self.pp(test.id), defs.clone());
          let then_out = self.stmt(if_true, defs.clone());
          let else_out = match if_false {
            Some(e) => self.stmt(e, defs),
            None => defs,
          };
          defs = then_out.join(&else_out);
        }
      }
      Syntax::SwitchStmt { select, cases } => {
        if !defs.is_unreachable() {
          let point = self.pp(s.id);
          defs = self.expr_effects(select, defs, &point);
          self.all.set(self.pp(select.id), defs.clone());
          let mut acc: Option<Definitions> = None;
          let mut any_default = false;
          for c in cases {
            if matches!(c.label, SwitchLabel::Default) {
              any_default = true;
            }
            if let Some(body) = &c.body {
              let out = self.stmt(body, defs.clone());
              acc = Some(match acc {
                Some(a) => a.join(&out),
                None => out,
              });
            }
          }
          let mut merged = acc.unwrap_or_else(|| defs.clone());
          if !any_default {
            merged = merged.join(&defs);
          }
          defs = merged;
        }
      }
      other => panic!("unexpected statement {:?}", other),
    }
    self.all.set(self.pp(s.id), defs.clone());
    defs
  }

  /// Applies the write effects of every call inside `e`, innermost first.
  fn expr_effects(&mut self, e: &'a Node, mut defs: Definitions, write_point: &ProgramPoint) -> Definitions {
    let mut children = Vec::new();
    for_each_child(e, &mut |c| children.push(c));
    for c in children {
      defs = self.expr_effects(c, defs, write_point);
    }
    if matches!(e.stx.as_ref(), Syntax::CallExpr { .. }) {
      defs = self.call_effects(e, defs, write_point);
    }
    defs
  }

  fn call_effects(&mut self, call: &'a Node, mut defs: Definitions, write_point: &ProgramPoint) -> Definitions {
    let mi = method::resolve(call, self.bindings, &self.nodes);
    let call_point = self.pp(call.id);
    match &mi.kind {
      MethodKind::BuiltIn { builtin: BuiltIn::IsValid, .. } => {}
      MethodKind::BuiltIn { builtin: BuiltIn::SetValid | BuiltIn::SetInvalid, target } => {
        let (locs, _) = self.lvalue(target);
        let valid = locs.get_valid_field(&self.all.storage);
        self.write(&mut defs, &valid, write_point, true);
      }
      MethodKind::BuiltIn { builtin: BuiltIn::PushFront | BuiltIn::PopFront, target } => {
        // Shifts every element and moves the last-written index.
        let (locs, _) = self.lvalue(target);
        self.write(&mut defs, &locs, write_point, true);
      }
      MethodKind::Action { decl } => {
        defs = self.action_call(self.nodes.get(*decl), &call_point, defs);
      }
      MethodKind::TableApply { table } => {
        defs = self.table_apply(self.nodes.get(*table), &call_point, defs);
      }
      MethodKind::Extern { may_call, .. } => {
        for &m in may_call {
          defs = self.function_call(self.nodes.get(m), &call_point, defs);
        }
      }
      MethodKind::Function { .. } => {}
    }
    for (p, arg) in &mi.substitution {
      if p.direction.is_out() {
        let (locs, strong) = self.lvalue(arg);
        self.write(&mut defs, &locs, write_point, strong);
      }
    }
    defs
  }

  fn action_call(&mut self, a: &'a Node, call_point: &ProgramPoint, mut defs: Definitions) -> Definitions {
    let Syntax::ActionDecl { params, body, .. } = a.stx.as_ref() else {
      unreachable!();
    };
    let entry = ProgramPoint::new(call_point, a.id);
    self.param_entry(&mut defs, params, &entry, true);
    self.all.set(entry, defs.clone());
    let save_ctx = mem::replace(&mut self.context, call_point.clone());
    let save_exit = mem::replace(&mut self.exit, Definitions::unreachable());
    let defs = self.stmt(body, defs);
    let merged = defs.join(&self.exit);
    self.all.set(self.pp(body.id), merged.clone());
    self.exit = save_exit;
    self.context = save_ctx;
    merged
  }

  fn function_call(&mut self, f: &'a Node, call_point: &ProgramPoint, mut defs: Definitions) -> Definitions {
    let Syntax::FunctionDecl { params, body, .. } = f.stx.as_ref() else {
      unreachable!();
    };
    let entry = ProgramPoint::new(call_point, f.id);
    self.param_entry(&mut defs, params, &entry, true);
    self.all.set(entry.clone(), defs.clone());
    let save_ctx = mem::replace(&mut self.context, call_point.clone());
    let save_exit = mem::replace(&mut self.exit, Definitions::unreachable());
    let defs = self.stmt(body, defs);
    let merged = defs.join(&self.exit);
    self.all.set(entry.after(), merged.clone());
    self.exit = save_exit;
    self.context = save_ctx;
    merged
  }

  fn table_apply(&mut self, t: &'a Node, call_point: &ProgramPoint, defs: Definitions) -> Definitions {
    let Syntax::TableDecl { keys, actions, .. } = t.stx.as_ref() else {
      unreachable!();
    };
    let entry = ProgramPoint::new(call_point, t.id);
    let mut defs = defs;
    for k in keys {
      defs = self.expr_effects(k, defs, &entry);
    }
    self.all.set(entry, defs.clone());
    let save_ctx = mem::replace(&mut self.context, call_point.clone());
    // Any one action may run, or none on a miss.
    let mut acc = defs.clone();
    for entry_call in actions {
      let point = self.pp(entry_call.id);
      let out = self.call_effects(entry_call, defs.clone(), &point);
      acc = acc.join(&out);
    }
    self.context = save_ctx;
    acc
  }
}
