//! Code generation: lower the syntax tree into AArch64 instructions.
//!
//! The emitter uses a simple stack machine: every expression leaves exactly
//! one 16-byte slot on the stack (a value, or an address for lvalues) and its
//! consumer pops operands right before combining them. Locals live below the
//! frame pointer at increasing offsets, so the stack adjustment in the
//! prologue is only known once the whole body has been walked; bodies are
//! buffered and the prologue is put in front afterwards.
//!
//! State is split by lifetime. `Unit` holds what lives for the whole
//! translation unit (globals, pooled strings, function labels and the label
//! counter). `FunctionContext` is created fresh for every function and
//! owns that function's locals and instruction buffer.

use std::collections::HashMap;

use tracing::debug;

use crate::asm::{
  Address, Condition, ENTRY_POINT, Instruction, Label, LocalKind, Operand, Register, Section,
  Width,
};
use crate::error::{CompileError, CompileResult, InvalidSyntaxSnafu, NoSuchVariableSnafu};
use crate::syntax::{
  BinaryOp, Expr, ForInit, FunctionDecl, InitValue, Item, PrefixOp, SourceBody, SourceFile, Stmt,
  Syntax, VariableDecl, integer_value,
};
use crate::tokenizer::{Token, TokenKind};
use crate::ty::Type;

/// Required alignment of `sp` at every call boundary.
pub const FRAME_ALIGNMENT: usize = 16;

/// Largest value accepted by `add`/`sub` immediates.
const MAX_ADD_IMMEDIATE: usize = 4095;

/// Largest frame whose rounded size still fits an `i64` immediate.
const MAX_FRAME_SIZE: usize = i64::MAX as usize - (FRAME_ALIGNMENT - 1);

/// Lower a parsed translation unit into one instruction list: text, then
/// data, then pooled strings.
pub fn generate(file: &SourceFile) -> CompileResult<Vec<Instruction>> {
  let mut unit = Unit::default();
  let mut text = Vec::new();

  match &file.body {
    SourceBody::Expression(expr) => {
      let mut cx = FunctionContext::new(&mut unit);
      cx.expr(expr)?;
      cx.emit(Instruction::Pop(Register::X0));
      cx.epilogue();
      text.extend(cx.finish(ENTRY_POINT));
    }
    SourceBody::Items(items) => {
      for item in items {
        if let Item::Function(function) = item {
          unit
            .functions
            .insert(function.name().to_string(), function.return_type.ty()?);
        }
      }
      for item in items {
        match item {
          Item::Function(function) => text.extend(function_body(&mut unit, function)?),
          Item::Variable(decl) => unit.global(decl)?,
        }
      }
    }
  }

  let mut program = Vec::new();
  if !unit.function_labels.is_empty() {
    let labels = unit
      .function_labels
      .iter()
      .map(|name| Label::symbol(name.as_str()))
      .collect();
    program.push(Instruction::Globl(labels));
  }
  program.extend(text);

  if !unit.data.is_empty() {
    program.push(Instruction::Section(Section::Data));
    program.append(&mut unit.data);
  }

  if !unit.strings.is_empty() {
    program.push(Instruction::Section(Section::Strings));
    for (id, content) in unit.strings.contents.iter().enumerate() {
      program.push(Instruction::Label(Label::Strings(id)));
      program.push(Instruction::Asciz(content.clone()));
    }
  }

  Ok(program)
}

fn function_body(unit: &mut Unit, function: &FunctionDecl) -> CompileResult<Vec<Instruction>> {
  let mut cx = FunctionContext::new(unit);

  if let Some(extra) = function.parameters.get(Register::ARGUMENTS.len()) {
    return InvalidSyntaxSnafu {
      location: extra.location(),
      message: "too many parameters",
    }
    .fail();
  }

  for (param, reg) in function.parameters.iter().zip(Register::ARGUMENTS) {
    let ty = param.ty.ty()?.decay();
    let width = Width::of_size(ty.size());
    let offset = cx.declare(&param.name, ty)?;
    cx.store_to_frame(reg, offset, width);
  }

  for stmt in &function.body.stmts {
    cx.stmt(stmt)?;
  }

  // Falling off the end returns 0.
  cx.emit(Instruction::MovImm {
    dst: Register::X0,
    value: 0,
  });
  cx.epilogue();

  Ok(cx.finish(function.name()))
}

/// Deduplicating pool of string literal contents.
#[derive(Debug, Default)]
struct StringPool {
  ids: HashMap<String, usize>,
  contents: Vec<String>,
}

impl StringPool {
  fn intern(&mut self, content: &str) -> Label {
    if let Some(&id) = self.ids.get(content) {
      return Label::Strings(id);
    }
    let id = self.contents.len();
    self.contents.push(content.to_string());
    self.ids.insert(content.to_string(), id);
    Label::Strings(id)
  }

  fn is_empty(&self) -> bool {
    self.contents.is_empty()
  }
}

/// State that lives for the whole translation unit.
#[derive(Debug, Default)]
struct Unit {
  globals: HashMap<String, Type>,
  /// Return types of every function defined in the unit.
  functions: HashMap<String, Type>,
  strings: StringPool,
  /// Functions emitted so far, in definition order.
  function_labels: Vec<String>,
  label_counter: usize,
  data: Vec<Instruction>,
}

impl Unit {
  fn next_label_id(&mut self) -> usize {
    let id = self.label_counter;
    self.label_counter += 1;
    id
  }

  fn global(&mut self, decl: &VariableDecl) -> CompileResult<()> {
    let ty = decl.ty.ty()?;
    let name = decl.name().to_string();
    self.globals.insert(name.clone(), ty.clone());
    let label = Label::Symbol(name);

    let Some(init) = &decl.initializer else {
      self.data.push(Instruction::Comm {
        label,
        size: ty.size(),
        align: ty.align(),
      });
      return Ok(());
    };

    let mut values = Vec::new();
    match (&init.value, &ty) {
      (InitValue::Expr(Expr::Str(token)), Type::Array(element, length))
        if **element == Type::Char =>
      {
        let bytes = string_bytes(token, *length)?;
        let missing = length - bytes.len();
        values.extend(bytes.into_iter().map(Instruction::Byte));
        if missing > 0 {
          values.push(Instruction::Zero(missing));
        }
      }
      (InitValue::Expr(expr), Type::Array(..)) => {
        return InvalidSyntaxSnafu {
          location: expr.location(),
          message: "array initializer must be a brace list",
        }
        .fail();
      }
      (InitValue::Expr(expr), scalar) => values.push(self.static_value(expr, scalar)?),
      (InitValue::List(list), Type::Array(element, length)) => {
        if element.is_array() {
          return InvalidSyntaxSnafu {
            location: list.open.location(),
            message: "nested array initializers are not supported",
          }
          .fail();
        }
        if let Some(extra) = list.elements.get(*length) {
          return InvalidSyntaxSnafu {
            location: extra.expr.location(),
            message: "excess elements in array initializer",
          }
          .fail();
        }
        for element_init in &list.elements {
          values.push(self.static_value(&element_init.expr, element)?);
        }
        let missing = length - list.elements.len();
        if missing > 0 {
          values.push(Instruction::Zero(missing * element.size()));
        }
      }
      (InitValue::List(list), _) => {
        return InvalidSyntaxSnafu {
          location: list.open.location(),
          message: "scalar initializer cannot be a brace list",
        }
        .fail();
      }
    }

    self
      .data
      .push(Instruction::Align(ty.align().trailing_zeros()));
    self.data.push(Instruction::Label(label));
    self.data.extend(values);
    Ok(())
  }

  /// A data directive for a constant initializer: a literal, a string
  /// literal, or the address of a global optionally offset by a literal.
  fn static_value(&mut self, expr: &Expr, ty: &Type) -> CompileResult<Instruction> {
    let not_constant = || {
      InvalidSyntaxSnafu {
        location: expr.location(),
        message: "global initializer must be a constant",
      }
      .fail()
    };

    let expr = expr.strip_parens();
    if let Some(value) = literal_value(expr)? {
      return Ok(if *ty == Type::Char {
        Instruction::Byte(value as u8)
      } else {
        Instruction::Quad(value)
      });
    }
    if *ty == Type::Char {
      return not_constant();
    }

    match expr {
      Expr::Str(token) => Ok(Instruction::QuadAddress {
        label: self.strings.intern(string_content(token)),
        offset: 0,
      }),
      Expr::Prefix(prefix) if prefix.op == PrefixOp::AddressOf => {
        let (label, _) = self.global_address(&prefix.operand)?;
        Ok(Instruction::QuadAddress { label, offset: 0 })
      }
      Expr::Infix(infix) if matches!(infix.op, BinaryOp::Add | BinaryOp::Sub) => {
        let Expr::Prefix(prefix) = infix.left.strip_parens() else {
          return not_constant();
        };
        if prefix.op != PrefixOp::AddressOf {
          return not_constant();
        }
        let Some(count) = literal_value(infix.right.strip_parens())? else {
          return not_constant();
        };
        let (label, target) = self.global_address(&prefix.operand)?;
        let offset = count
          .checked_mul(target.size() as i64)
          .and_then(|offset| match infix.op {
            BinaryOp::Sub => offset.checked_neg(),
            _ => Some(offset),
          });
        match offset {
          Some(offset) => Ok(Instruction::QuadAddress { label, offset }),
          None => InvalidSyntaxSnafu {
            location: infix.right.location(),
            message: "address offset is out of range",
          }
          .fail(),
        }
      }
      _ => not_constant(),
    }
  }

  fn global_address(&self, operand: &Expr) -> CompileResult<(Label, Type)> {
    let Expr::Ident(token) = operand.strip_parens() else {
      return InvalidSyntaxSnafu {
        location: operand.location(),
        message: "global initializer must be a constant",
      }
      .fail();
    };
    match self.globals.get(&token.text) {
      Some(ty) => Ok((Label::symbol(token.text.as_str()), ty.clone())),
      None => Err(no_such_variable(token)),
    }
  }
}

/// Value of `N`, `+N` or `-N`, if the expression is one of those.
fn literal_value(expr: &Expr) -> CompileResult<Option<i64>> {
  Ok(match expr {
    Expr::Integer(token) => Some(integer_value(token)?),
    Expr::Prefix(prefix) => match (prefix.op, prefix.operand.as_ref()) {
      (PrefixOp::Minus, Expr::Integer(token)) => Some(integer_value(token)?.wrapping_neg()),
      (PrefixOp::Plus, Expr::Integer(token)) => Some(integer_value(token)?),
      _ => None,
    },
    _ => None,
  })
}

fn string_content(token: &Token) -> &str {
  match &token.kind {
    TokenKind::Str(content) => content,
    _ => &token.text,
  }
}

/// Bytes of a string literal used to fill a `char[length]`. The caller pads
/// the rest of the array with zeros.
fn string_bytes(token: &Token, length: usize) -> CompileResult<Vec<u8>> {
  let bytes = string_content(token).as_bytes().to_vec();
  if bytes.len() > length {
    return InvalidSyntaxSnafu {
      location: token.location(),
      message: format!("string of {} bytes does not fit in char[{length}]", bytes.len()),
    }
    .fail();
  }
  Ok(bytes)
}

fn no_such_variable(token: &Token) -> CompileError {
  NoSuchVariableSnafu {
    name: token.text.as_str(),
    location: token.location(),
  }
  .build()
}

fn align_to(n: usize, align: usize) -> usize {
  n.div_ceil(align) * align
}

#[derive(Debug, Clone)]
struct Local {
  ty: Type,
  /// Distance below the frame pointer of the variable's lowest byte.
  offset: usize,
}

/// Per-function generation state, created fresh for every function.
struct FunctionContext<'u> {
  unit: &'u mut Unit,
  locals: HashMap<String, Local>,
  frame_size: usize,
  code: Vec<Instruction>,
}

impl<'u> FunctionContext<'u> {
  fn new(unit: &'u mut Unit) -> Self {
    Self {
      unit,
      locals: HashMap::new(),
      frame_size: 0,
      code: Vec::new(),
    }
  }

  fn emit(&mut self, instruction: Instruction) {
    self.code.push(instruction);
  }

  /// Wrap the buffered body with the label and prologue, now that the frame
  /// size is known.
  fn finish(self, name: &str) -> Vec<Instruction> {
    let frame_size = align_to(self.frame_size, FRAME_ALIGNMENT);
    debug!(function = name, frame_size, "generated function");

    let label = Label::symbol(name);
    if !self.unit.function_labels.iter().any(|known| known == name) {
      self.unit.function_labels.push(name.to_string());
    }

    let mut out = vec![
      Instruction::Align(2),
      Instruction::Label(label),
      Instruction::StorePair {
        first: Register::Fp,
        second: Register::Lr,
        address: Address::PreIndex(Register::Sp, -16),
      },
      Instruction::Mov {
        dst: Register::Fp,
        src: Register::Sp,
      },
    ];
    if frame_size > 0 {
      out.extend(subtract(Register::Sp, Register::Sp, frame_size));
    }
    out.extend(self.code);
    out
  }

  fn epilogue(&mut self) {
    self.emit(Instruction::Mov {
      dst: Register::Sp,
      src: Register::Fp,
    });
    self.emit(Instruction::LoadPair {
      first: Register::Fp,
      second: Register::Lr,
      address: Address::PostIndex(Register::Sp, 16),
    });
    self.emit(Instruction::Ret);
  }

  /// Reserve a slot for a local below everything allocated so far.
  fn declare(&mut self, name: &Token, ty: Type) -> CompileResult<usize> {
    let offset = self
      .frame_size
      .checked_add(ty.size())
      .and_then(|end| end.checked_next_multiple_of(ty.align()))
      .filter(|&offset| offset <= MAX_FRAME_SIZE);
    let Some(offset) = offset else {
      return InvalidSyntaxSnafu {
        location: name.location(),
        message: "stack frame is too large",
      }
      .fail();
    };
    self.frame_size = offset;
    self
      .locals
      .insert(name.text.clone(), Local { ty, offset });
    Ok(offset)
  }

  fn lookup(&self, token: &Token) -> CompileResult<Type> {
    if let Some(local) = self.locals.get(&token.text) {
      return Ok(local.ty.clone());
    }
    match self.unit.globals.get(&token.text) {
      Some(ty) => Ok(ty.clone()),
      None => Err(no_such_variable(token)),
    }
  }

  fn next_label_id(&mut self) -> usize {
    self.unit.next_label_id()
  }

  /// `dst = fp - offset`
  fn frame_address(&mut self, dst: Register, offset: usize) {
    self.code.extend(subtract(dst, Register::Fp, offset));
  }

  fn store_to_frame(&mut self, src: Register, offset: usize, width: Width) {
    if offset <= 256 {
      self.emit(Instruction::Store {
        src,
        address: Address::Offset(Register::Fp, -(offset as i64)),
        width,
      });
    } else {
      self.frame_address(Register::X9, offset);
      self.emit(Instruction::Store {
        src,
        address: Address::Base(Register::X9),
        width,
      });
    }
  }

  /// Replace the address on top of the stack with the value it points to.
  fn load(&mut self, ty: &Type) {
    self.emit(Instruction::Pop(Register::X0));
    self.emit(Instruction::Load {
      dst: Register::X0,
      address: Address::Base(Register::X0),
      width: Width::of_size(ty.size()),
    });
    self.emit(Instruction::Push(Register::X0));
  }

  /// Pop a value then an address and store the value there.
  fn store(&mut self, ty: &Type) {
    self.emit(Instruction::Pop(Register::X1));
    self.emit(Instruction::Pop(Register::X0));
    self.emit(Instruction::Store {
      src: Register::X1,
      address: Address::Base(Register::X0),
      width: Width::of_size(ty.size()),
    });
  }

  /// `reg *= size`, skipped for byte-sized elements.
  fn scale(&mut self, reg: Register, size: usize) {
    if size == 1 {
      return;
    }
    self.emit(Instruction::MovImm {
      dst: Register::X9,
      value: size as i64,
    });
    self.emit(Instruction::Mul {
      dst: reg,
      lhs: reg,
      rhs: Register::X9,
    });
  }

  /// Pop the top of the stack and branch to `label` when it is zero.
  fn branch_if_zero(&mut self, label: Label) {
    self.emit(Instruction::Pop(Register::X0));
    self.emit(Instruction::Cmp {
      lhs: Register::X0,
      rhs: Operand::Imm(0),
    });
    self.emit(Instruction::BranchIf {
      condition: Condition::Eq,
      label,
    });
  }

  fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Expr(stmt) => {
        self.expr(&stmt.expr)?;
        self.emit(Instruction::Pop(Register::X0));
      }
      Stmt::Return(ret) => {
        self.expr(&ret.value)?;
        self.emit(Instruction::Pop(Register::X0));
        self.epilogue();
      }
      Stmt::If(stmt) => {
        let id = self.next_label_id();
        let end = Label::Local(LocalKind::End, id);
        self.expr(&stmt.condition)?;
        match stmt.else_body() {
          Some(else_body) => {
            let otherwise = Label::Local(LocalKind::Else, id);
            self.branch_if_zero(otherwise.clone());
            self.stmt(&stmt.then_body)?;
            self.emit(Instruction::Branch(end.clone()));
            self.emit(Instruction::Label(otherwise));
            self.stmt(else_body)?;
          }
          None => {
            self.branch_if_zero(end.clone());
            self.stmt(&stmt.then_body)?;
            self.emit(Instruction::Branch(end.clone()));
          }
        }
        self.emit(Instruction::Label(end));
      }
      Stmt::While(stmt) => {
        let id = self.next_label_id();
        let begin = Label::Local(LocalKind::Begin, id);
        let end = Label::Local(LocalKind::End, id);
        self.emit(Instruction::Label(begin.clone()));
        self.expr(&stmt.condition)?;
        self.branch_if_zero(end.clone());
        self.stmt(&stmt.body)?;
        self.emit(Instruction::Branch(begin));
        self.emit(Instruction::Label(end));
      }
      Stmt::For(stmt) => {
        let id = self.next_label_id();
        let begin = Label::Local(LocalKind::Begin, id);
        let end = Label::Local(LocalKind::End, id);
        match &stmt.init {
          ForInit::Empty(_) => {}
          ForInit::Expr(init) => {
            self.expr(&init.expr)?;
            self.emit(Instruction::Pop(Register::X0));
          }
          ForInit::Decl(decl) => self.local(decl)?,
        }
        self.emit(Instruction::Label(begin.clone()));
        match &stmt.condition {
          Some(condition) => self.expr(condition)?,
          None => {
            self.emit(Instruction::MovImm {
              dst: Register::X0,
              value: 1,
            });
            self.emit(Instruction::Push(Register::X0));
          }
        }
        self.branch_if_zero(end.clone());
        self.stmt(&stmt.body)?;
        if let Some(post) = &stmt.post {
          self.expr(post)?;
          self.emit(Instruction::Pop(Register::X0));
        }
        self.emit(Instruction::Branch(begin));
        self.emit(Instruction::Label(end));
      }
      Stmt::Block(block) => {
        for stmt in &block.stmts {
          self.stmt(stmt)?;
        }
      }
      Stmt::Decl(decl) => self.local(decl)?,
      Stmt::Empty(_) => {}
    }
    Ok(())
  }

  /// Allocate a local and run its initializer, if any.
  fn local(&mut self, decl: &VariableDecl) -> CompileResult<()> {
    let ty = decl.ty.ty()?;
    let offset = self.declare(&decl.name, ty.clone())?;
    let Some(init) = &decl.initializer else {
      return Ok(());
    };

    match (&init.value, &ty) {
      (InitValue::Expr(Expr::Str(token)), Type::Array(element, length))
        if **element == Type::Char =>
      {
        let bytes = string_bytes(token, *length)?;
        for i in 0..*length {
          self.frame_address(Register::X0, offset - i);
          let src = match bytes.get(i) {
            Some(&byte) => {
              self.emit(Instruction::MovImm {
                dst: Register::X1,
                value: i64::from(byte),
              });
              Register::X1
            }
            None => Register::Xzr,
          };
          self.emit(Instruction::Store {
            src,
            address: Address::Base(Register::X0),
            width: Width::Byte,
          });
        }
      }
      (InitValue::Expr(expr), Type::Array(..)) => {
        return InvalidSyntaxSnafu {
          location: expr.location(),
          message: "array initializer must be a brace list",
        }
        .fail();
      }
      (InitValue::Expr(expr), scalar) => {
        self.frame_address(Register::X0, offset);
        self.emit(Instruction::Push(Register::X0));
        self.expr(expr)?;
        self.store(scalar);
      }
      (InitValue::List(list), Type::Array(element, length)) => {
        if element.is_array() {
          return InvalidSyntaxSnafu {
            location: list.open.location(),
            message: "nested array initializers are not supported",
          }
          .fail();
        }
        if let Some(extra) = list.elements.get(*length) {
          return InvalidSyntaxSnafu {
            location: extra.expr.location(),
            message: "excess elements in array initializer",
          }
          .fail();
        }
        let size = element.size();
        for i in 0..*length {
          let slot = offset - i * size;
          match list.elements.get(i) {
            Some(element_init) => {
              self.frame_address(Register::X0, slot);
              self.emit(Instruction::Push(Register::X0));
              self.expr(&element_init.expr)?;
              self.store(element);
            }
            None => {
              self.frame_address(Register::X0, slot);
              self.emit(Instruction::Store {
                src: Register::Xzr,
                address: Address::Base(Register::X0),
                width: Width::of_size(size),
              });
            }
          }
        }
      }
      (InitValue::List(list), _) => {
        return InvalidSyntaxSnafu {
          location: list.open.location(),
          message: "scalar initializer cannot be a brace list",
        }
        .fail();
      }
    }
    Ok(())
  }

  /// Emit code that leaves the expression's value on the stack.
  fn expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Integer(token) => {
        let value = integer_value(token)?;
        self.emit(Instruction::MovImm {
          dst: Register::X0,
          value,
        });
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Str(_) => self.addr(expr)?,
      Expr::Ident(token) => {
        let ty = self.lookup(token)?;
        self.addr(expr)?;
        if !ty.is_array() {
          self.load(&ty);
        }
      }
      Expr::Paren(paren) => self.expr(&paren.inner)?,
      Expr::Prefix(prefix) => match prefix.op {
        PrefixOp::Plus => self.expr(&prefix.operand)?,
        PrefixOp::Minus => {
          self.expr(&prefix.operand)?;
          self.emit(Instruction::Pop(Register::X0));
          self.emit(Instruction::Neg {
            dst: Register::X0,
            src: Register::X0,
          });
          self.emit(Instruction::Push(Register::X0));
        }
        PrefixOp::Deref => {
          let ty = self.type_of(expr)?;
          self.expr(&prefix.operand)?;
          if !ty.is_array() {
            self.load(&ty);
          }
        }
        PrefixOp::AddressOf => self.addr(&prefix.operand)?,
      },
      Expr::Sizeof(size) => {
        let ty = self.type_of(&size.operand)?;
        self.emit(Instruction::MovImm {
          dst: Register::X0,
          value: ty.size() as i64,
        });
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Infix(infix) => {
        let left_ty = self.type_of(&infix.left)?;
        let right_ty = self.type_of(&infix.right)?;
        self.expr(&infix.left)?;
        self.expr(&infix.right)?;
        self.emit(Instruction::Pop(Register::X1));
        self.emit(Instruction::Pop(Register::X0));
        self.binary(infix.op, &left_ty, &right_ty);
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Assign(assign) => {
        let target = assign.target.strip_parens();
        if !is_assignable(target) {
          return InvalidSyntaxSnafu {
            location: assign.target.location(),
            message: "expression is not assignable",
          }
          .fail();
        }
        let ty = self.type_of(target)?;
        if ty.is_array() {
          return InvalidSyntaxSnafu {
            location: assign.target.location(),
            message: "array is not assignable",
          }
          .fail();
        }
        self.addr(target)?;
        self.expr(&assign.value)?;
        self.store(&ty);
        // The value of a char assignment is the truncated byte.
        if Width::of_size(ty.size()) == Width::Byte {
          self.emit(Instruction::Load {
            dst: Register::X1,
            address: Address::Base(Register::X0),
            width: Width::Byte,
          });
        }
        self.emit(Instruction::Push(Register::X1));
      }
      Expr::Call(call) => {
        if let Some(extra) = call.arguments.get(Register::ARGUMENTS.len()) {
          return InvalidSyntaxSnafu {
            location: extra.expr.location(),
            message: "too many arguments",
          }
          .fail();
        }
        for argument in &call.arguments {
          self.expr(&argument.expr)?;
        }
        for reg in Register::ARGUMENTS[..call.arguments.len()].iter().rev() {
          self.emit(Instruction::Pop(*reg));
        }
        self.emit(Instruction::BranchLink(Label::symbol(call.name())));
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Subscript(_) => {
        let ty = self.type_of(expr)?;
        self.addr(expr)?;
        if !ty.is_array() {
          self.load(&ty);
        }
      }
    }
    Ok(())
  }

  /// Combine x0 (left) and x1 (right) into x0.
  fn binary(&mut self, op: BinaryOp, left: &Type, right: &Type) {
    let (lhs, rhs) = (Register::X0, Register::X1);
    match op {
      BinaryOp::Add | BinaryOp::Sub => {
        match (op, left.base(), right.base()) {
          (BinaryOp::Sub, Some(base), Some(_)) => {
            self.emit(Instruction::Sub {
              dst: lhs,
              lhs,
              rhs: Operand::Reg(rhs),
            });
            if base.size() > 1 {
              self.emit(Instruction::MovImm {
                dst: rhs,
                value: base.size() as i64,
              });
              self.emit(Instruction::SDiv { dst: lhs, lhs, rhs });
            }
            return;
          }
          (_, Some(base), _) => self.scale(rhs, base.size()),
          (BinaryOp::Add, None, Some(base)) => self.scale(lhs, base.size()),
          _ => {}
        }
        let rhs = Operand::Reg(rhs);
        self.emit(match op {
          BinaryOp::Add => Instruction::Add { dst: lhs, lhs, rhs },
          _ => Instruction::Sub { dst: lhs, lhs, rhs },
        });
      }
      BinaryOp::Mul => self.emit(Instruction::Mul { dst: lhs, lhs, rhs }),
      BinaryOp::Div => self.emit(Instruction::SDiv { dst: lhs, lhs, rhs }),
      _ => {
        let condition = match op {
          BinaryOp::Eq => Condition::Eq,
          BinaryOp::Ne => Condition::Ne,
          BinaryOp::Lt => Condition::Lt,
          BinaryOp::Le => Condition::Le,
          BinaryOp::Gt => Condition::Gt,
          _ => Condition::Ge,
        };
        self.emit(Instruction::Cmp {
          lhs,
          rhs: Operand::Reg(rhs),
        });
        self.emit(Instruction::CSet {
          dst: lhs,
          condition,
        });
      }
    }
  }

  /// Emit code that leaves the expression's address on the stack.
  fn addr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Ident(token) => {
        if let Some(local) = self.locals.get(&token.text) {
          let offset = local.offset;
          self.frame_address(Register::X0, offset);
        } else if self.unit.globals.contains_key(&token.text) {
          let label = Label::symbol(token.text.as_str());
          self.emit(Instruction::AddressPage {
            dst: Register::X0,
            label: label.clone(),
          });
          self.emit(Instruction::AddPageOffset {
            dst: Register::X0,
            src: Register::X0,
            label,
          });
        } else {
          return Err(no_such_variable(token));
        }
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Str(token) => {
        let label = self.unit.strings.intern(string_content(token));
        self.emit(Instruction::AddressPage {
          dst: Register::X0,
          label: label.clone(),
        });
        self.emit(Instruction::AddPageOffset {
          dst: Register::X0,
          src: Register::X0,
          label,
        });
        self.emit(Instruction::Push(Register::X0));
      }
      Expr::Paren(paren) => self.addr(&paren.inner)?,
      Expr::Prefix(prefix) if prefix.op == PrefixOp::Deref => self.expr(&prefix.operand)?,
      Expr::Subscript(sub) => {
        let base_ty = self.lookup(&sub.base)?;
        let element_size = base_ty.base().map_or(Type::Int.size(), Type::size);
        let base = Expr::Ident(sub.base.clone());
        if base_ty.is_array() {
          self.addr(&base)?;
        } else {
          self.expr(&base)?;
        }
        self.expr(&sub.index)?;
        self.emit(Instruction::Pop(Register::X1));
        self.emit(Instruction::Pop(Register::X0));
        self.scale(Register::X1, element_size);
        self.emit(Instruction::Add {
          dst: Register::X0,
          lhs: Register::X0,
          rhs: Operand::Reg(Register::X1),
        });
        self.emit(Instruction::Push(Register::X0));
      }
      _ => {
        return InvalidSyntaxSnafu {
          location: expr.location(),
          message: "expression has no address",
        }
        .fail();
      }
    }
    Ok(())
  }

  /// The type an expression evaluates to, as far as instruction selection
  /// needs to know.
  fn type_of(&self, expr: &Expr) -> CompileResult<Type> {
    Ok(match expr {
      Expr::Integer(_) | Expr::Sizeof(_) => Type::Int,
      Expr::Str(token) => Type::array_of(Type::Char, string_content(token).len() + 1),
      Expr::Ident(token) => self.lookup(token)?,
      Expr::Paren(paren) => self.type_of(&paren.inner)?,
      Expr::Prefix(prefix) => match prefix.op {
        PrefixOp::Plus | PrefixOp::Minus => Type::Int,
        PrefixOp::Deref => self
          .type_of(&prefix.operand)?
          .base()
          .cloned()
          .unwrap_or(Type::Int),
        PrefixOp::AddressOf => Type::pointer_to(self.type_of(&prefix.operand)?),
      },
      Expr::Infix(infix) => match infix.op {
        BinaryOp::Add | BinaryOp::Sub => {
          let left = self.type_of(&infix.left)?;
          let right = self.type_of(&infix.right)?;
          match (infix.op, left.is_pointer_like(), right.is_pointer_like()) {
            (BinaryOp::Sub, true, true) => Type::Int,
            (_, true, _) => left.decay(),
            (BinaryOp::Add, false, true) => right.decay(),
            _ => Type::Int,
          }
        }
        _ => Type::Int,
      },
      Expr::Assign(assign) => self.type_of(&assign.target)?,
      Expr::Call(call) => self
        .unit
        .functions
        .get(call.name())
        .cloned()
        .unwrap_or(Type::Int),
      Expr::Subscript(sub) => self.lookup(&sub.base)?.base().cloned().unwrap_or(Type::Int),
    })
  }
}

fn is_assignable(target: &Expr) -> bool {
  match target {
    Expr::Ident(_) | Expr::Subscript(_) => true,
    Expr::Prefix(prefix) => prefix.op == PrefixOp::Deref,
    _ => false,
  }
}

/// `dst = src - amount`, going through x9 when the amount does not fit an
/// immediate.
fn subtract(dst: Register, src: Register, amount: usize) -> Vec<Instruction> {
  let mut out = Vec::new();
  let rhs = if amount <= MAX_ADD_IMMEDIATE {
    Operand::Imm(amount as i64)
  } else {
    out.push(Instruction::MovImm {
      dst: Register::X9,
      value: amount as i64,
    });
    Operand::Reg(Register::X9)
  };
  out.push(Instruction::Sub { dst, lhs: src, rhs });
  out
}
