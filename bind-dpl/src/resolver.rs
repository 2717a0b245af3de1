use crate::BindError;
use crate::BindErrorKind;
use crate::BindResult;
use crate::ReferenceMap;
use ahash::AHashMap;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::Syntax;
use ir_dpl::visit::for_each_child;
use log::trace;

/// Scope-stack resolver. Frames are pushed for the program, each parser/control, and each
/// action/function; lookup walks from the innermost frame outwards.
struct Resolver<'a> {
  refs: &'a mut ReferenceMap,
  scopes: Vec<AHashMap<&'a str, NodeId>>,
}

pub fn resolve<'a>(program: &'a Node, refs: &mut ReferenceMap) -> BindResult<()> {
  let mut r = Resolver {
    refs,
    scopes: Vec::new(),
  };
  r.program(program)
}

impl<'a> Resolver<'a> {
  fn enter(&mut self) {
    self.scopes.push(AHashMap::new());
  }

  fn leave(&mut self) {
    self.scopes.pop().unwrap();
  }

  fn declare(&mut self, decl: &'a Node) {
    if let Some(name) = decl.decl_name() {
      self.scopes.last_mut().unwrap().insert(name, decl.id);
    }
  }

  fn lookup(&self, name: &str) -> Option<NodeId> {
    self.scopes.iter().rev().find_map(|s| s.get(name).copied())
  }

  fn program(&mut self, program: &'a Node) -> BindResult<()> {
    let Syntax::Program { decls } = program.stx.as_ref() else {
      panic!("resolver expects a program root");
    };
    self.enter();
    for d in decls {
      self.declare(d);
    }
    for d in decls {
      self.decl(d)?;
    }
    self.leave();
    Ok(())
  }

  fn decl(&mut self, decl: &'a Node) -> BindResult<()> {
    match decl.stx.as_ref() {
      Syntax::ParserDecl { params, locals, states, .. } => {
        self.enter();
        for p in params {
          self.declare(p);
        }
        for l in locals {
          self.declare(l);
        }
        for s in states {
          self.declare(s);
        }
        for l in locals {
          self.decl(l)?;
        }
        for s in states {
          let Syntax::ParserState { body, transition, .. } = s.stx.as_ref() else {
            panic!("parser states must be ParserState nodes");
          };
          for stmt in body {
            self.stmt(stmt)?;
          }
          if let Some(t) = transition {
            self.expr(t)?;
          }
        }
        self.leave();
      }
      Syntax::ControlDecl { params, locals, body, .. } => {
        self.enter();
        for p in params {
          self.declare(p);
        }
        for l in locals {
          self.declare(l);
        }
        for l in locals {
          self.decl(l)?;
        }
        self.stmt(body)?;
        self.leave();
      }
      Syntax::ActionDecl { params, body, .. } => {
        self.enter();
        for p in params {
          self.declare(p);
        }
        self.stmt(body)?;
        self.leave();
      }
      Syntax::FunctionDecl { params, body, .. } => {
        self.enter();
        for p in params {
          self.declare(p);
        }
        self.stmt(body)?;
        self.leave();
      }
      Syntax::TableDecl { keys, actions, .. } => {
        for k in keys {
          self.expr(k)?;
        }
        for a in actions {
          self.expr(a)?;
        }
      }
      Syntax::InstanceDecl { init, .. } => {
        for m in init {
          self.decl(m)?;
        }
      }
      Syntax::TypeDecl { .. } | Syntax::VarDecl { .. } | Syntax::ParamDecl { .. } => {}
      other => panic!("unexpected declaration {:?}", other),
    }
    Ok(())
  }

  fn stmt(&mut self, stmt: &'a Node) -> BindResult<()> {
    match stmt.stx.as_ref() {
      Syntax::AssignStmt { left, right } => {
        self.expr(left)?;
        self.expr(right)?;
      }
      Syntax::CallStmt { call } => self.expr(call)?,
      Syntax::ReturnStmt { value } => {
        if let Some(v) = value {
          self.expr(v)?;
        }
      }
      Syntax::ExitStmt | Syntax::EmptyStmt => {}
      Syntax::BlockStmt { body } => {
        for s in body {
          self.stmt(s)?;
        }
      }
      Syntax::IfStmt { test, if_true, if_false } => {
        self.expr(test)?;
        self.stmt(if_true)?;
        if let Some(e) = if_false {
          self.stmt(e)?;
        }
      }
      Syntax::SwitchStmt { select, cases } => {
        self.expr(select)?;
        for c in cases {
          if let Some(b) = &c.body {
            self.stmt(b)?;
          }
        }
      }
      other => panic!("unexpected statement {:?}", other),
    }
    Ok(())
  }

  fn expr(&mut self, expr: &'a Node) -> BindResult<()> {
    match expr.stx.as_ref() {
      Syntax::PathExpr { name } => match self.lookup(name) {
        Some(decl) => {
          trace!("resolved '{}' to {:?}", name, decl);
          self.refs.set(expr.id, decl);
        }
        None => {
          return Err(BindError {
            kind: BindErrorKind::UnknownName(name.clone()),
            loc: expr.loc,
          })
        }
      },
      Syntax::TypeNameExpr { name } => match self.lookup(name) {
        Some(decl) => self.refs.set(expr.id, decl),
        None => {
          return Err(BindError {
            kind: BindErrorKind::UnknownType(name.clone()),
            loc: expr.loc,
          })
        }
      },
      _ => {
        let mut err = None;
        for_each_child(expr, &mut |c| {
          if err.is_none() {
            err = self.expr(c).err();
          }
        });
        if let Some(e) = err {
          return Err(e);
        }
      }
    }
    Ok(())
  }
}
