use crate::BindError;
use crate::BindErrorKind;
use crate::BindResult;
use crate::ReferenceMap;
use crate::TypeMap;
use ahash::AHashMap;
use ir_dpl::ast::Node;
use ir_dpl::ast::NodeId;
use ir_dpl::ast::BinaryOp;
use ir_dpl::ast::Syntax;
use ir_dpl::ast::UnaryOp;
use ir_dpl::loc::Loc;
use ir_dpl::types;
use ir_dpl::types::Field;
use ir_dpl::types::MethodSig;
use ir_dpl::types::ParamSig;
use ir_dpl::types::Type;
use ir_dpl::visit::walk;

/// Bottom-up expression typing. Path types are derived from the resolved declaration node, so
/// declaration order never matters.
struct Typer<'a> {
  refs: &'a ReferenceMap,
  types: &'a mut TypeMap,
  nodes: AHashMap<NodeId, &'a Node>,
  named: AHashMap<&'a str, &'a Type>,
}

pub fn type_program(program: &Node, refs: &ReferenceMap, types: &mut TypeMap) -> BindResult<()> {
  let mut nodes = AHashMap::new();
  walk(program, &mut |n| {
    nodes.insert(n.id, n);
  });
  let mut named = AHashMap::new();
  if let Syntax::Program { decls } = program.stx.as_ref() {
    for d in decls {
      if let Syntax::TypeDecl { name, ty } = d.stx.as_ref() {
        named.insert(name.as_str(), ty);
      }
    }
  }
  let mut t = Typer {
    refs,
    types,
    nodes,
    named,
  };
  t.decl(program)
}

impl<'a> Typer<'a> {
  fn err(&self, kind: BindErrorKind, loc: Loc) -> BindError {
    BindError { kind, loc }
  }

  /// Expands Named references, recursively through composite types.
  fn resolve_ty(&self, ty: &Type, loc: Loc) -> BindResult<Type> {
    Ok(match ty {
      Type::Named { name } => {
        let target = self
          .named
          .get(name.as_str())
          .ok_or_else(|| self.err(BindErrorKind::UnknownType(name.clone()), loc))?;
        self.resolve_ty(target, loc)?
      }
      Type::Header { name, fields } => Type::Header {
        name: name.clone(),
        fields: self.resolve_fields(fields, loc)?,
      },
      Type::Struct { name, fields } => Type::Struct {
        name: name.clone(),
        fields: self.resolve_fields(fields, loc)?,
      },
      Type::Stack { element, size } => Type::Stack {
        element: Box::new(self.resolve_ty(element, loc)?),
        size: *size,
      },
      Type::Extern { name, methods } => Type::Extern {
        name: name.clone(),
        methods: methods
          .iter()
          .map(|m| {
            Ok(MethodSig {
              name: m.name.clone(),
              params: m
                .params
                .iter()
                .map(|p| {
                  Ok(ParamSig {
                    name: p.name.clone(),
                    direction: p.direction,
                    ty: self.resolve_ty(&p.ty, loc)?,
                  })
                })
                .collect::<BindResult<Vec<_>>>()?,
              ret: self.resolve_ty(&m.ret, loc)?,
              may_call: m.may_call.clone(),
            })
          })
          .collect::<BindResult<Vec<_>>>()?,
      },
      other => other.clone(),
    })
  }

  fn resolve_fields(&self, fields: &[Field], loc: Loc) -> BindResult<Vec<Field>> {
    fields
      .iter()
      .map(|f| {
        Ok(Field {
          name: f.name.clone(),
          ty: self.resolve_ty(&f.ty, loc)?,
        })
      })
      .collect()
  }

  fn decl(&mut self, decl: &'a Node) -> BindResult<()> {
    match decl.stx.as_ref() {
      Syntax::Program { decls } => {
        for d in decls {
          self.decl(d)?;
        }
      }
      Syntax::TypeDecl { .. } => {}
      Syntax::VarDecl { ty, .. } | Syntax::ParamDecl { ty, .. } => {
        let resolved = self.resolve_ty(ty, decl.loc)?;
        self.types.set(decl.id, resolved);
      }
      Syntax::InstanceDecl { ty, init, .. } => {
        let resolved = self.resolve_ty(ty, decl.loc)?;
        self.types.set(decl.id, resolved);
        for m in init {
          self.decl(m)?;
        }
      }
      Syntax::FunctionDecl { params, ret, body, .. } => {
        let ret = self.resolve_ty(ret, decl.loc)?;
        self.types.set(decl.id, Type::Method { ret: Box::new(ret) });
        for p in params {
          self.decl(p)?;
        }
        self.stmt(body)?;
      }
      Syntax::ActionDecl { params, body, .. } => {
        self.types.set(decl.id, Type::Method { ret: Box::new(Type::Void) });
        for p in params {
          self.decl(p)?;
        }
        self.stmt(body)?;
      }
      Syntax::TableDecl { keys, actions, .. } => {
        for k in keys {
          self.expr(k)?;
        }
        for a in actions {
          self.expr(a)?;
        }
      }
      Syntax::ParserDecl { params, locals, states, .. } => {
        for p in params {
          self.decl(p)?;
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
      }
      Syntax::ControlDecl { params, locals, body, .. } => {
        for p in params {
          self.decl(p)?;
        }
        // Storage declarations first so action bodies can read them in any order.
        for l in locals {
          if matches!(l.stx.as_ref(), Syntax::VarDecl { .. } | Syntax::InstanceDecl { .. }) {
            self.decl(l)?;
          }
        }
        for l in locals {
          if !matches!(l.stx.as_ref(), Syntax::VarDecl { .. } | Syntax::InstanceDecl { .. }) {
            self.decl(l)?;
          }
        }
        self.stmt(body)?;
      }
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
      Syntax::CallStmt { call } => {
        self.expr(call)?;
      }
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

  /// The declaration a path resolves to, if the expression is a path at all.
  fn path_target(&self, expr: &Node) -> Option<&'a Node> {
    match expr.stx.as_ref() {
      Syntax::PathExpr { .. } => Some(self.nodes[&self.refs.get_declaration(expr.id)]),
      _ => None,
    }
  }

  fn expr(&mut self, expr: &'a Node) -> BindResult<Type> {
    let ty = self.expr_ty(expr)?;
    self.types.set(expr.id, ty.clone());
    Ok(ty)
  }

  fn expr_ty(&mut self, expr: &'a Node) -> BindResult<Type> {
    match expr.stx.as_ref() {
      Syntax::LiteralIntExpr { .. } => Ok(Type::Bits { width: 32 }),
      Syntax::LiteralBoolExpr { .. } => Ok(Type::Bool),
      Syntax::PathExpr { .. } => {
        let decl = self.nodes[&self.refs.get_declaration(expr.id)];
        match decl.stx.as_ref() {
          Syntax::VarDecl { ty, .. } | Syntax::ParamDecl { ty, .. } => {
            self.resolve_ty(ty, expr.loc)
          }
          Syntax::InstanceDecl { ty, .. } => self.resolve_ty(ty, expr.loc),
          Syntax::ActionDecl { .. } => Ok(Type::Method { ret: Box::new(Type::Void) }),
          Syntax::FunctionDecl { ret, .. } => Ok(Type::Method {
            ret: Box::new(self.resolve_ty(ret, expr.loc)?),
          }),
          // Tables and states are referenced by name but have no value of their own.
          Syntax::TableDecl { .. } | Syntax::ParserState { .. } => Ok(Type::Void),
          other => panic!("path resolved to unexpected declaration {:?}", other),
        }
      }
      Syntax::TypeNameExpr { .. } => {
        let decl = self.nodes[&self.refs.get_declaration(expr.id)];
        match decl.stx.as_ref() {
          Syntax::TypeDecl { ty, .. } => self.resolve_ty(ty, expr.loc),
          other => panic!("type name resolved to unexpected declaration {:?}", other),
        }
      }
      Syntax::MemberExpr { base, member } => {
        // Table applies are recognised on the path, not on the base value.
        if let Some(decl) = self.path_target(base) {
          if matches!(decl.stx.as_ref(), Syntax::TableDecl { .. }) {
            self.expr(base)?;
            let Syntax::TableDecl { name, .. } = decl.stx.as_ref() else {
              unreachable!();
            };
            if member == types::APPLY {
              return Ok(Type::Method {
                ret: Box::new(Type::ApplyResult { table: name.clone() }),
              });
            }
            return Err(self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc));
          }
        }
        let bt = self.expr(base)?;
        match &bt {
          Type::Enum { .. } if matches!(base.stx.as_ref(), Syntax::TypeNameExpr { .. }) => {
            // Enum constant.
            Ok(bt.clone())
          }
          Type::Stack { element, .. } => match member.as_str() {
            types::stack::NEXT | types::stack::LAST => Ok((**element).clone()),
            types::stack::LAST_INDEX => Ok(Type::Bits { width: 32 }),
            types::stack::PUSH_FRONT | types::stack::POP_FRONT => {
              Ok(Type::Method { ret: Box::new(Type::Void) })
            }
            _ => Err(self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
          },
          Type::Header { .. } => match member.as_str() {
            types::header::IS_VALID => Ok(Type::Method { ret: Box::new(Type::Bool) }),
            types::header::SET_VALID | types::header::SET_INVALID => {
              Ok(Type::Method { ret: Box::new(Type::Void) })
            }
            _ => bt
              .field(member)
              .map(|f| f.ty.clone())
              .ok_or_else(|| self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
          },
          Type::Struct { .. } => bt
            .field(member)
            .map(|f| f.ty.clone())
            .ok_or_else(|| self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
          Type::ApplyResult { table } => match member.as_str() {
            types::HIT | types::MISS => Ok(Type::Bool),
            types::ACTION_RUN => Ok(Type::Enum {
              name: format!("{}_action_run", table),
              members: Vec::new(),
            }),
            _ => Err(self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
          },
          Type::Extern { .. } => bt
            .method(member)
            .map(|m| Type::Method { ret: Box::new(m.ret.clone()) })
            .ok_or_else(|| self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
          _ => Err(self.err(BindErrorKind::UnknownMember(member.clone()), expr.loc)),
        }
      }
      Syntax::IndexExpr { base, index } => {
        let bt = self.expr(base)?;
        self.expr(index)?;
        match bt {
          Type::Stack { element, .. } => Ok(*element),
          _ => Err(self.err(BindErrorKind::UnknownMember("[]".to_string()), expr.loc)),
        }
      }
      Syntax::SliceExpr { base, high, low } => {
        self.expr(base)?;
        Ok(Type::Bits { width: high - low + 1 })
      }
      Syntax::CondExpr { test, if_true, if_false } => {
        self.expr(test)?;
        let t = self.expr(if_true)?;
        self.expr(if_false)?;
        Ok(t)
      }
      Syntax::UnaryExpr { op, operand } => {
        let t = self.expr(operand)?;
        Ok(match op {
          UnaryOp::Not => Type::Bool,
          _ => t,
        })
      }
      Syntax::BinaryExpr { op, left, right } => {
        let t = self.expr(left)?;
        self.expr(right)?;
        Ok(match op {
          BinaryOp::Eq
          | BinaryOp::Ne
          | BinaryOp::Lt
          | BinaryOp::Le
          | BinaryOp::Gt
          | BinaryOp::Ge
          | BinaryOp::And
          | BinaryOp::Or => Type::Bool,
          _ => t,
        })
      }
      Syntax::CallExpr { callee, args } => {
        let ct = self.expr(callee)?;
        for a in args {
          self.expr(a)?;
        }
        match ct {
          Type::Method { ret } => Ok(*ret),
          _ => Err(self.err(BindErrorKind::NotCallable(callee.to_string()), expr.loc)),
        }
      }
      Syntax::SelectExpr { exprs, cases } => {
        for e in exprs {
          self.expr(e)?;
        }
        for c in cases {
          if let Some(k) = &c.keyset {
            self.expr(k)?;
          }
          self.expr(&c.target)?;
        }
        Ok(Type::Void)
      }
      other => panic!("unexpected expression {:?}", other),
    }
  }
}
