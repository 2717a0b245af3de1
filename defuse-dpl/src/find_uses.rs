use crate::has_uses::HasUses;
use crate::method;
use crate::method::BuiltIn;
use crate::method::MethodKind;
use crate::nodes::NodeIndex;
use crate::points::AllDefinitions;
use crate::points::Definitions;
use crate::points::ProgramPoint;
use crate::storage::LocationSet;
use crate::table_apply;
use ahash::AHashMap;
use bind_dpl::Bindings;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::ast::ACCEPT;
use ir_dpl::ast::REJECT;
use ir_dpl::error::DiagnosticKind;
use ir_dpl::error::Diagnostics;
use ir_dpl::types::stack;
use ir_dpl::types::Direction;
use ir_dpl::types::Type;
use log::debug;
use log::trace;
use std::mem;

/// Why the enclosing expression visited the current one. A read is reported by the outermost
/// member or index chain it belongs to, never by the chain's intermediate links.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
  MemberBase,
  IndexBase,
  Other,
}

/// Finds, for every definition, the reads it may feed. Fills `HasUses` with the definitions
/// that have at least one, and incidentally warns about reads no definition reaches.
///
/// The walk is flow-sensitive and context-sensitive: entering a callee re-enters the visitor
/// with the call site as its context while sharing the accumulated `HasUses`, the read
/// locations and the diagnostics sink. The per-call state lives in fields saved and restored
/// around the callee visit.
pub struct FindUses<'a> {
  bindings: &'a Bindings,
  definitions: &'a AllDefinitions,
  nodes: &'a NodeIndex<'a>,
  has_uses: &'a mut HasUses,
  diag: &'a mut Diagnostics,
  /// Context as of the last call or state transition.
  context: ProgramPoint,
  /// Point of the statement just processed.
  current_point: ProgramPoint,
  /// Visiting the target of an assignment or a copy-out argument.
  lhs: bool,
  /// The current statement can no longer execute on this path.
  unreachable: bool,
  /// Visiting an instance initializer method, which may run at any later time.
  virtual_method: bool,
  /// An assignment statement encloses the current expression walk.
  in_assignment: bool,
  /// Direct reads of each visited expression, excluding reads made by its subexpressions.
  read_locations: AHashMap<NodeId, LocationSet>,
  edges: Vec<Edge>,
}

impl<'a> FindUses<'a> {
  pub fn new(
    bindings: &'a Bindings,
    definitions: &'a AllDefinitions,
    nodes: &'a NodeIndex<'a>,
    has_uses: &'a mut HasUses,
    diag: &'a mut Diagnostics,
  ) -> FindUses<'a> {
    FindUses {
      bindings,
      definitions,
      nodes,
      has_uses,
      diag,
      context: ProgramPoint::before_start(),
      current_point: ProgramPoint::before_start(),
      lhs: false,
      unreachable: false,
      virtual_method: false,
      in_assignment: false,
      read_locations: AHashMap::new(),
      edges: Vec::new(),
    }
  }

  /// Analyses one top-level parser, control or function.
  pub fn check(&mut self, unit: &'a Node) {
    self.context = ProgramPoint::before_start();
    self.current_point = ProgramPoint::before_start();
    self.lhs = false;
    self.unreachable = false;
    self.virtual_method = false;
    self.in_assignment = false;
    self.edges.clear();
    match unit.stx.as_ref() {
      Syntax::ParserDecl { .. } => self.parser(unit),
      Syntax::ControlDecl { .. } => self.control(unit),
      Syntax::FunctionDecl { .. } => self.function(unit),
      other => panic!("def-use runs per parser, control or function, not on {:?}", other),
    }
  }

  fn current_defs(&self) -> &'a Definitions {
    self.definitions.get(&self.current_point)
  }

  /// `expr` directly reads the `loc` set.
  fn reads(&mut self, expr: &Node, loc: LocationSet) {
    assert!(!self.unreachable, "computed reads for an unreachable expression");
    trace!("{} reads {:?}", expr, loc);
    self.read_locations.insert(expr.id, loc);
  }

  fn reads_of(&self, expr: &Node) -> LocationSet {
    match self.read_locations.get(&expr.id) {
      Some(l) => l.clone(),
      None => panic!("no locations known for {}", expr),
    }
  }

  fn set_current(&mut self, statement: &Node) {
    self.current_point = ProgramPoint::new(&self.context, statement.id);
  }

  // ---------------------------------------------------------------------------------------
  // Units
  // ---------------------------------------------------------------------------------------

  fn parser(&mut self, p: &'a Node) {
    let Syntax::ParserDecl { name, params, locals, states } = p.stx.as_ref() else {
      unreachable!();
    };
    debug!("checking parser {}", name);
    self.visit_virtual_methods(locals);
    self.current_point = ProgramPoint::single(p.id);
    for s in states {
      self.state(s);
    }
    self.unreachable = false;
    let accept = states
      .iter()
      .find(|s| s.decl_name() == Some(ACCEPT))
      .unwrap_or_else(|| panic!("parser '{}' has no accept state", name));
    let reject = states
      .iter()
      .find(|s| s.decl_name() == Some(REJECT))
      .unwrap_or_else(|| panic!("parser '{}' has no reject state", name));
    let accept_defs = self.definitions.get(&ProgramPoint::single(accept.id));
    let reject_defs = self.definitions.get(&ProgramPoint::single(reject.id));
    // A value is defined at the parser's exit only if it is defined however parsing ended.
    let out = accept_defs.join(reject_defs);
    self.check_out_parameters(p, params, &out);
  }

  fn state(&mut self, s: &'a Node) {
    let Syntax::ParserState { name, body, transition } = s.stx.as_ref() else {
      panic!("parser states must be ParserState nodes");
    };
    trace!("visiting state {}", name);
    self.context = ProgramPoint::single(s.id);
    self.current_point = ProgramPoint::single(s.id);
    for stmt in body {
      self.visit_stmt(stmt);
    }
    if let Some(t) = transition {
      self.visit_expr(t, Edge::Other);
    }
    self.context = ProgramPoint::before_start();
  }

  fn control(&mut self, c: &'a Node) {
    let Syntax::ControlDecl { name, params, locals, body } = c.stx.as_ref() else {
      unreachable!();
    };
    debug!("checking control {}", name);
    assert!(self.context.is_before_start(), "non-empty context at a control entry");
    self.visit_virtual_methods(locals);
    self.current_point = ProgramPoint::single(c.id);
    self.unreachable = false;
    self.visit_stmt(body);
    let defs = self.current_defs();
    self.check_out_parameters(c, params, defs);
  }

  fn function(&mut self, f: &'a Node) {
    let Syntax::FunctionDecl { name, params, body, .. } = f.stx.as_ref() else {
      unreachable!();
    };
    if self.virtual_method {
      // The object may invoke this method at any later time; analyse it as if nothing has
      // executed yet.
      self.context = ProgramPoint::before_start();
      self.unreachable = false;
    }
    debug!("checking function {} called by {}", name, self.context);
    let point = ProgramPoint::new(&self.context, f.id);
    self.current_point = point.clone();
    self.visit_stmt(body);
    let ret_is_void = match self.bindings.types.get_type(f.id) {
      Type::Method { ret } => ret.is_void(),
      other => panic!("function typed as {:?}", other),
    };
    if !ret_is_void {
      // Reaching the end of the body on some path means that path had no return.
      let defs = self.current_defs();
      if !defs.is_unreachable() {
        self.diag.error(
          DiagnosticKind::MissingReturn,
          f.loc,
          format!("Function '{}' does not return a value on all paths", name),
        );
      }
    }
    self.current_point = point.after();
    let defs = self.current_defs();
    self.check_out_parameters(f, params, defs);
  }

  /// Initializer methods of local instances may be invoked whenever the object decides, so
  /// they are analysed proactively once, from a before-start context.
  fn visit_virtual_methods(&mut self, locals: &'a [Node]) {
    let save = self.context.clone();
    for l in locals {
      if let Syntax::InstanceDecl { init, .. } = l.stx.as_ref() {
        for m in init {
          self.virtual_method = true;
          self.function(m);
          self.virtual_method = false;
        }
      }
    }
    self.context = save;
  }

  fn action(&mut self, a: &'a Node) {
    let Syntax::ActionDecl { name, params, body } = a.stx.as_ref() else {
      unreachable!();
    };
    trace!("checking action {}", name);
    self.unreachable = false;
    self.current_point = ProgramPoint::new(&self.context, a.id);
    self.visit_stmt(body);
    let defs = self.current_defs();
    self.check_out_parameters(a, params, defs);
  }

  fn table(&mut self, t: &'a Node) {
    let Syntax::TableDecl { name, keys, actions } = t.stx.as_ref() else {
      unreachable!();
    };
    trace!("checking table {}", name);
    let save_point = ProgramPoint::new(&self.context, t.id);
    self.current_point = save_point.clone();
    for k in keys {
      self.visit_expr(k, Edge::Other);
    }
    for entry in actions {
      if !matches!(entry.stx.as_ref(), Syntax::CallExpr { .. }) {
        panic!("unexpected entry in action list: {:?}", entry);
      }
      self.visit_expr(entry, Edge::Other);
      // Analysing the invoked action moved the point; put it back for the next entry.
      self.current_point = save_point.clone();
    }
  }

  /// Every out or inout parameter is read by the caller when the unit terminates. Warn when
  /// some path reaches the exit without writing one, ignoring header contents since headers
  /// may legitimately stay invalid.
  fn check_out_parameters(&mut self, block: &Node, params: &'a [Node], defs: &Definitions) {
    for p in params {
      let Syntax::ParamDecl { name, direction, .. } = p.stx.as_ref() else {
        panic!("parameter list held a non-parameter {:?}", p);
      };
      if !direction.is_out() {
        continue;
      }
      let Some(storage) = self.definitions.storage.get_storage(p.id) else {
        continue;
      };
      let loc = LocationSet::singleton(storage);
      let points = defs.points_for(&loc, &self.definitions.storage);
      self.has_uses.add(&points);
      let ty = self.bindings.types.get_type(p.id);
      if self.bindings.types.type_is_empty(ty) {
        continue;
      }
      let scalars = loc.remove_headers(&self.definitions.storage);
      let points = defs.points_for(&scalars, &self.definitions.storage);
      if points.contains_before_start() {
        self.diag.warn(
          DiagnosticKind::UninitializedOutParam,
          p.loc,
          format!(
            "out parameter '{}' may be uninitialized when '{}' terminates",
            name,
            block.decl_name().unwrap_or("<anonymous>"),
          ),
        );
      }
    }
  }

  // ---------------------------------------------------------------------------------------
  // Statements
  // ---------------------------------------------------------------------------------------

  fn visit_stmt(&mut self, s: &'a Node) {
    match s.stx.as_ref() {
      Syntax::AssignStmt { left, right } => {
        if !self.unreachable {
          let save_in_assignment = mem::replace(&mut self.in_assignment, true);
          self.lhs = true;
          self.visit_expr(left, Edge::Other);
          self.check_header_field_write(left, left);
          self.lhs = false;
          self.visit_expr(right, Edge::Other);
          self.in_assignment = save_in_assignment;
        }
      }
      Syntax::ReturnStmt { value } => {
        if !self.unreachable {
          if let Some(v) = value {
            self.visit_expr(v, Edge::Other);
          }
        }
        self.unreachable = true;
      }
      Syntax::ExitStmt => {
        self.unreachable = true;
      }
      Syntax::CallStmt { call } => {
        if !self.unreachable {
          self.visit_expr(call, Edge::Other);
        }
      }
      Syntax::BlockStmt { body } => {
        if !self.unreachable {
          for stmt in body {
            self.visit_stmt(stmt);
          }
        }
      }
      Syntax::IfStmt { test, if_true, if_false } => {
        if !self.unreachable {
          self.visit_expr(test, Edge::Other);
          self.current_point = ProgramPoint::new(&self.context, test.id);
          let save_point = self.current_point.clone();
          let save_unreachable = self.unreachable;
          self.visit_stmt(if_true);
          let unreachable_after_then = self.unreachable;
          self.unreachable = save_unreachable;
          if let Some(e) = if_false {
            self.current_point = save_point;
            self.visit_stmt(e);
          }
          self.unreachable = unreachable_after_then && self.unreachable;
        }
      }
      Syntax::SwitchStmt { select, cases } => {
        if !self.unreachable {
          self.visit_expr(select, Edge::Other);
          self.current_point = ProgramPoint::new(&self.context, select.id);
          let save_point = self.current_point.clone();
          let save_unreachable = self.unreachable;
          let mut final_unreachable = true;
          for c in cases {
            if let Some(body) = &c.body {
              self.current_point = save_point.clone();
              self.unreachable = save_unreachable;
              self.visit_stmt(body);
              final_unreachable = final_unreachable && self.unreachable;
            }
          }
          self.unreachable = final_unreachable;
        }
      }
      Syntax::EmptyStmt => {}
      other => panic!("unexpected statement {:?}", other),
    }
    self.set_current(s);
  }

  /// Walks the structure of an assignment target until it reaches the storage it names. When
  /// the target sits inside a header, the write also reads that header's validity bit: writing
  /// `h.x` only takes effect while `h` is valid. Overwriting a whole header replaces the bit
  /// instead of reading it.
  fn check_header_field_write(&mut self, expr: &'a Node, parent: &'a Node) -> LocationSet {
    let map = &self.definitions.storage;
    let loc = match parent.stx.as_ref() {
      Syntax::MemberExpr { base, member } => {
        self.check_header_field_write(expr, base).get_field(map, member)
      }
      Syntax::IndexExpr { base, index } => {
        let loc = self.check_header_field_write(expr, base);
        match index.as_int() {
          Some(i) => loc.get_index(map, i as usize),
          // An unknown index keeps the whole stack.
          None => loc,
        }
      }
      Syntax::SliceExpr { base, .. } => self.check_header_field_write(expr, base),
      Syntax::PathExpr { .. } => {
        let decl = self.bindings.refs.get_declaration(parent.id);
        match self.definitions.storage.get_storage(decl) {
          Some(s) => LocationSet::singleton(s),
          None => LocationSet::empty(),
        }
      }
      other => panic!("unexpected expression on the left of an assignment: {:?}", other),
    };
    let ty = self.bindings.types.get_type(parent.id);
    if ty.is_header() && expr.id != parent.id {
      let valid = loc.get_valid_field(&self.definitions.storage);
      trace!("{} reads validity bit {:?}", expr, valid);
      self.reads(expr, valid.clone());
      self.register_uses(expr, true);
      return valid;
    }
    loc
  }

  // ---------------------------------------------------------------------------------------
  // Expressions
  // ---------------------------------------------------------------------------------------

  fn visit_expr(&mut self, e: &'a Node, edge: Edge) {
    self.edges.push(edge);
    self.expr(e);
    self.edges.pop();
  }

  /// Records the reads an expression made and the uses they imply. Skipped for the inner links
  /// of member and index chains (the outermost expression reports for the whole chain), for
  /// unreachable code, and for expressions that read nothing.
  fn register_uses(&mut self, e: &Node, report_uninitialized: bool) {
    if matches!(self.edges.last(), Some(Edge::MemberBase | Edge::IndexBase)) {
      return;
    }
    let defs = self.current_defs();
    if defs.is_unreachable() {
      return;
    }
    let Some(read) = self.read_locations.get(&e.id) else {
      return;
    };
    if read.is_empty() {
      return;
    }
    let points = defs.points_for(read, &self.definitions.storage);
    if report_uninitialized && !self.lhs && points.contains_before_start() {
      // Never reported on the left-hand side; a write through an unknown array index reads
      // the array without observing its values.
      let ty = self.bindings.types.get_type(e.id);
      let message = if ty.is_base() {
        format!("{} may be uninitialized", e)
      } else {
        format!("{} may not be completely initialized", e)
      };
      self.diag.warn(DiagnosticKind::UninitializedUse, e.loc, message);
    }
    self.has_uses.add(&points);
  }

  fn expr(&mut self, e: &'a Node) {
    match e.stx.as_ref() {
      Syntax::LiteralIntExpr { .. } | Syntax::LiteralBoolExpr { .. } => {
        self.reads(e, LocationSet::empty());
      }
      Syntax::TypeNameExpr { .. } => {
        self.reads(e, LocationSet::empty());
      }
      Syntax::PathExpr { .. } => {
        if self.lhs {
          self.reads(e, LocationSet::empty());
          return;
        }
        let decl = self.bindings.refs.get_declaration(e.id);
        let result = match self.definitions.storage.get_storage(decl) {
          Some(s) => LocationSet::singleton(s),
          None => LocationSet::empty(),
        };
        self.reads(e, result);
        self.register_uses(e, true);
      }
      Syntax::MemberExpr { base, member } => {
        self.visit_expr(base, Edge::MemberBase);
        if matches!(base.stx.as_ref(), Syntax::TypeNameExpr { .. }) {
          // An enum constant reads nothing.
          self.reads(e, LocationSet::empty());
          return;
        }
        if table_apply::is_hit(e, self.bindings, self.nodes)
          || table_apply::is_action_run(e, self.bindings, self.nodes)
        {
          // The enclosing apply call accounts for the table's reads.
          return;
        }
        if self.bindings.types.get_type(e.id).is_method() {
          // Dealt with by the enclosing call.
          return;
        }
        let storage = self.reads_of(base);
        let base_ty = self.bindings.types.get_type(base.id);
        if base_ty.is_stack() {
          if member == stack::NEXT || member == stack::LAST {
            self.reads(e, storage);
            self.register_uses(e, false);
            if !self.lhs && member == stack::NEXT {
              // The next slot is past every write by definition.
              self.diag.warn(
                DiagnosticKind::UninitializedRead,
                e.loc,
                format!("{}: reading uninitialized value", e),
              );
            }
            return;
          } else if member == stack::LAST_INDEX {
            let index = storage.get_array_last_index(&self.definitions.storage);
            self.reads(e, index);
            self.register_uses(e, false);
            return;
          }
        }
        let fields = storage.get_field(&self.definitions.storage, member);
        self.reads(e, fields);
        self.register_uses(e, true);
      }
      Syntax::IndexExpr { base, index } => {
        match index.as_int() {
          Some(i) => {
            if self.lhs {
              // The element is written, not read.
              self.reads(e, LocationSet::empty());
            } else {
              self.visit_expr(base, Edge::IndexBase);
              let storage = self.reads_of(base);
              self.reads(e, storage.get_index(&self.definitions.storage, i as usize));
            }
          }
          None => {
            // An unknown index reads the index expression and, whichever side of an
            // assignment it is on, the whole stack.
            let save_lhs = mem::replace(&mut self.lhs, false);
            self.visit_expr(index, Edge::Other);
            self.visit_expr(base, Edge::IndexBase);
            let storage = self.reads_of(base);
            self.lhs = save_lhs;
            self.reads(e, storage);
          }
        }
        self.register_uses(e, true);
      }
      Syntax::SliceExpr { base, high, low } => {
        if self.in_assignment && self.lhs {
          self.has_uses.watch_for_overwrites(*high, *low);
        }
        // Slicing reads the unmodified bits even on the left of an assignment.
        let save_lhs = mem::replace(&mut self.lhs, false);
        self.visit_expr(base, Edge::Other);
        let storage = self.reads_of(base);
        self.reads(e, storage);
        self.register_uses(e, true);
        self.lhs = save_lhs;
        self.has_uses.done_watching();
      }
      Syntax::CondExpr { test, if_true, if_false } => {
        self.visit_expr(test, Edge::Other);
        self.visit_expr(if_true, Edge::Other);
        self.visit_expr(if_false, Edge::Other);
        self.other_expression(e);
      }
      Syntax::UnaryExpr { operand, .. } => {
        self.visit_expr(operand, Edge::Other);
        self.other_expression(e);
      }
      Syntax::BinaryExpr { left, right, .. } => {
        self.visit_expr(left, Edge::Other);
        self.visit_expr(right, Edge::Other);
        self.other_expression(e);
      }
      Syntax::CallExpr { .. } => self.call_expr(e),
      Syntax::SelectExpr { exprs, cases } => {
        for ex in exprs {
          self.visit_expr(ex, Edge::Other);
        }
        for c in cases {
          if let Some(k) = &c.keyset {
            self.visit_expr(k, Edge::Other);
          }
          self.visit_expr(&c.target, Edge::Other);
        }
      }
      other => panic!("unexpected expression {:?}", other),
    }
  }

  /// Operators read only the temporaries their operands produced, which the analysis does not
  /// model as storage.
  fn other_expression(&mut self, e: &Node) {
    assert!(!self.lhs, "unexpected operation on the left of an assignment: {}", e);
    self.reads(e, LocationSet::empty());
    self.register_uses(e, true);
  }

  fn call_expr(&mut self, e: &'a Node) {
    let Syntax::CallExpr { callee, .. } = e.stx.as_ref() else {
      unreachable!();
    };
    trace!("visiting call {}", e);
    self.visit_expr(callee, Edge::Other);
    let mi = method::resolve(e, self.bindings, self.nodes);
    match &mi.kind {
      MethodKind::BuiltIn { builtin: BuiltIn::PushFront | BuiltIn::PopFront, target } => {
        // Shifts every element, so the whole stack is read; warning about the freshly
        // shifted-in slot would punish the deliberate use.
        let base = self.reads_of(target);
        self.reads(e, base);
        self.register_uses(e, false);
        return;
      }
      MethodKind::BuiltIn { builtin: BuiltIn::IsValid, target } => {
        let base = self.reads_of(target);
        let valid = base.get_valid_field(&self.definitions.storage);
        self.reads(e, valid);
        self.register_uses(e, true);
        return;
      }
      // The remaining built-ins write without reading; the general treatment below covers
      // them with an empty substitution and no callees.
      _ => {}
    }

    // Copy-in: every argument bound to a readable parameter is read by the call.
    for (p, arg) in &mi.substitution {
      if p.direction != Direction::Out {
        self.visit_expr(arg, Edge::Other);
      }
    }

    // Actions, applied tables and extern callbacks are entered symbolically. Control and
    // function applies are not: copy-in plus copy-out summarises them completely.
    let callees: Vec<NodeId> = match &mi.kind {
      MethodKind::Action { decl } => vec![*decl],
      MethodKind::TableApply { table } => vec![*table],
      MethodKind::Extern { may_call, .. } => may_call.clone(),
      _ => Vec::new(),
    };
    if !callees.is_empty() {
      let call_point = ProgramPoint::new(&self.context, e.id);
      self.visit_callees(&callees, call_point);
    }

    // Copy-out: writable arguments are written when the call returns.
    for (p, arg) in &mi.substitution {
      if p.direction.is_out() {
        let save_lhs = mem::replace(&mut self.lhs, true);
        self.visit_expr(arg, Edge::Other);
        self.lhs = save_lhs;
      }
    }
    self.reads(e, LocationSet::empty());
  }

  /// Enters callees with the call site as their context. The frame of per-call state is saved
  /// here and restored afterwards; everything cumulative flows through shared maps.
  fn visit_callees(&mut self, callees: &[NodeId], call_point: ProgramPoint) {
    let save_context = self.context.clone();
    let save_point = self.current_point.clone();
    let save_lhs = self.lhs;
    let save_unreachable = self.unreachable;
    let save_virtual = self.virtual_method;
    let save_in_assignment = self.in_assignment;
    let save_edges = mem::take(&mut self.edges);
    for &callee in callees {
      self.context = call_point.clone();
      self.current_point = call_point.clone();
      self.lhs = false;
      self.unreachable = false;
      self.virtual_method = false;
      self.in_assignment = false;
      self.edges.clear();
      let decl = self.nodes.get(callee);
      debug!("entering callee {:?} from {}", decl.decl_name(), call_point);
      match decl.stx.as_ref() {
        Syntax::ActionDecl { .. } => self.action(decl),
        Syntax::TableDecl { .. } => self.table(decl),
        Syntax::FunctionDecl { .. } => self.function(decl),
        other => panic!("cannot analyse callee {:?}", other),
      }
    }
    self.context = save_context;
    self.current_point = save_point;
    self.lhs = save_lhs;
    self.unreachable = save_unreachable;
    self.virtual_method = save_virtual;
    self.in_assignment = save_in_assignment;
    self.edges = save_edges;
  }
}
