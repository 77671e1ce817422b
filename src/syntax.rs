//! Lossless syntax tree: one node type per grammar production.
//!
//! Nodes own the tokens that produced them and nothing else. A node's token
//! sequence is always the in-order concatenation of its children's token
//! sequences, so source ranges and error positions are derived from the tree
//! on demand rather than stored.

use crate::error::{CompileResult, InvalidSyntaxSnafu};
use crate::tokenizer::{SourceLocation, SourceRange, Token};
use crate::ty::Type;

/// Shared behaviour of every node: walking its source tokens in order.
pub trait Syntax {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>);

  fn tokens(&self) -> Vec<&Token> {
    let mut out = Vec::new();
    self.collect_tokens(&mut out);
    out
  }

  /// Location of the first token, where diagnostics about the node point.
  fn location(&self) -> SourceLocation {
    self
      .tokens()
      .first()
      .map(|token| token.location())
      .unwrap_or_default()
  }

  fn range(&self) -> SourceRange {
    let tokens = self.tokens();
    match (tokens.first(), tokens.last()) {
      (Some(first), Some(last)) => first.range.to(last.range),
      _ => SourceRange::default(),
    }
  }
}

impl Syntax for Token {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(self);
  }
}

impl<T: Syntax> Syntax for Option<T> {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    if let Some(node) = self {
      node.collect_tokens(out);
    }
  }
}

impl<T: Syntax> Syntax for Box<T> {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    (**self).collect_tokens(out);
  }
}

impl<T: Syntax> Syntax for Vec<T> {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    for node in self {
      node.collect_tokens(out);
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
  pub body: SourceBody,
  pub eof: Token,
}

impl SourceFile {
  /// Reassemble the exact input text, trivia included.
  pub fn to_source(&self) -> String {
    self.tokens().into_iter().map(Token::full_text).collect()
  }
}

impl Syntax for SourceFile {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.body.collect_tokens(out);
    out.push(&self.eof);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceBody {
  Items(Vec<Item>),
  /// A lone expression, compiled as an entry function returning its value.
  Expression(Expr),
}

impl Syntax for SourceBody {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      SourceBody::Items(items) => items.collect_tokens(out),
      SourceBody::Expression(expr) => expr.collect_tokens(out),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
  Function(FunctionDecl),
  Variable(VariableDecl),
}

impl Syntax for Item {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      Item::Function(function) => function.collect_tokens(out),
      Item::Variable(variable) => variable.collect_tokens(out),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
  pub return_type: TypeNode,
  pub name: Token,
  pub open: Token,
  pub parameters: Vec<Parameter>,
  pub close: Token,
  pub body: Block,
}

impl FunctionDecl {
  pub fn name(&self) -> &str {
    &self.name.text
  }
}

impl Syntax for FunctionDecl {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.return_type.collect_tokens(out);
    out.push(&self.name);
    out.push(&self.open);
    self.parameters.collect_tokens(out);
    out.push(&self.close);
    self.body.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
  pub ty: TypeNode,
  pub name: Token,
  /// Separator following this parameter, if any.
  pub comma: Option<Token>,
}

impl Syntax for Parameter {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.ty.collect_prefix(out);
    out.push(&self.name);
    self.ty.collect_suffix(out);
    self.comma.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
  pub ty: TypeNode,
  pub name: Token,
  pub initializer: Option<Initializer>,
  pub semicolon: Token,
}

impl VariableDecl {
  pub fn name(&self) -> &str {
    &self.name.text
  }
}

impl Syntax for VariableDecl {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.ty.collect_prefix(out);
    out.push(&self.name);
    self.ty.collect_suffix(out);
    self.initializer.collect_tokens(out);
    out.push(&self.semicolon);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
  pub equals: Token,
  pub value: InitValue,
}

impl Syntax for Initializer {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.equals);
    self.value.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitValue {
  Expr(Expr),
  List(InitList),
}

impl Syntax for InitValue {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      InitValue::Expr(expr) => expr.collect_tokens(out),
      InitValue::List(list) => list.collect_tokens(out),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitList {
  pub open: Token,
  pub elements: Vec<ListElement>,
  pub close: Token,
}

impl Syntax for InitList {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.open);
    self.elements.collect_tokens(out);
    out.push(&self.close);
  }
}

/// An expression inside a brace list or argument list, with its separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
  pub expr: Expr,
  pub comma: Option<Token>,
}

impl Syntax for ListElement {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.expr.collect_tokens(out);
    self.comma.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
  Int(Token),
  Char(Token),
  Pointer(PointerType),
  Array(ArrayType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerType {
  pub referenced: Box<TypeNode>,
  pub star: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
  pub element: Box<TypeNode>,
  pub open: Token,
  pub length: Token,
  pub close: Token,
}

impl TypeNode {
  /// The semantic type this syntax spells.
  pub fn ty(&self) -> CompileResult<Type> {
    Ok(match self {
      TypeNode::Int(_) => Type::Int,
      TypeNode::Char(_) => Type::Char,
      TypeNode::Pointer(pointer) => Type::pointer_to(pointer.referenced.ty()?),
      TypeNode::Array(array) => {
        let ty = Type::array_of(array.element.ty()?, array.length()?);
        if ty.checked_size().is_none() {
          return InvalidSyntaxSnafu {
            location: array.length.location(),
            message: "array is too large",
          }
          .fail();
        }
        ty
      }
    })
  }

  /// Tokens written before a declarator's name (`int *`).
  pub fn collect_prefix<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      TypeNode::Int(token) | TypeNode::Char(token) => out.push(token),
      TypeNode::Pointer(pointer) => {
        pointer.referenced.collect_prefix(out);
        out.push(&pointer.star);
      }
      TypeNode::Array(array) => array.element.collect_prefix(out),
    }
  }

  /// Tokens written after a declarator's name (`[2][3]`), outermost first.
  pub fn collect_suffix<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      TypeNode::Int(_) | TypeNode::Char(_) => {}
      TypeNode::Pointer(pointer) => pointer.referenced.collect_suffix(out),
      TypeNode::Array(array) => {
        out.push(&array.open);
        out.push(&array.length);
        out.push(&array.close);
        array.element.collect_suffix(out);
      }
    }
  }
}

impl ArrayType {
  pub fn length(&self) -> CompileResult<usize> {
    match self.length.text.parse::<usize>() {
      Ok(length) => Ok(length),
      Err(err) => InvalidSyntaxSnafu {
        location: self.length.location(),
        message: format!("invalid array length: {err}"),
      }
      .fail(),
    }
  }
}

impl Syntax for TypeNode {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.collect_prefix(out);
    self.collect_suffix(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Expr(ExprStmt),
  Return(ReturnStmt),
  If(IfStmt),
  While(WhileStmt),
  For(ForStmt),
  Block(Block),
  Decl(VariableDecl),
  Empty(Token),
}

impl Syntax for Stmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      Stmt::Expr(stmt) => stmt.collect_tokens(out),
      Stmt::Return(stmt) => stmt.collect_tokens(out),
      Stmt::If(stmt) => stmt.collect_tokens(out),
      Stmt::While(stmt) => stmt.collect_tokens(out),
      Stmt::For(stmt) => stmt.collect_tokens(out),
      Stmt::Block(block) => block.collect_tokens(out),
      Stmt::Decl(decl) => decl.collect_tokens(out),
      Stmt::Empty(semicolon) => out.push(semicolon),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprStmt {
  pub expr: Expr,
  pub semicolon: Token,
}

impl Syntax for ExprStmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.expr.collect_tokens(out);
    out.push(&self.semicolon);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnStmt {
  pub keyword: Token,
  pub value: Expr,
  pub semicolon: Token,
}

impl Syntax for ReturnStmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    self.value.collect_tokens(out);
    out.push(&self.semicolon);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfStmt {
  pub keyword: Token,
  pub open: Token,
  pub condition: Expr,
  pub close: Token,
  pub then_body: Box<Stmt>,
  pub else_branch: Option<ElseBranch>,
}

impl IfStmt {
  pub fn else_body(&self) -> Option<&Stmt> {
    self.else_branch.as_ref().map(|branch| branch.body.as_ref())
  }
}

impl Syntax for IfStmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    out.push(&self.open);
    self.condition.collect_tokens(out);
    out.push(&self.close);
    self.then_body.collect_tokens(out);
    self.else_branch.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElseBranch {
  pub keyword: Token,
  pub body: Box<Stmt>,
}

impl Syntax for ElseBranch {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    self.body.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhileStmt {
  pub keyword: Token,
  pub open: Token,
  pub condition: Expr,
  pub close: Token,
  pub body: Box<Stmt>,
}

impl Syntax for WhileStmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    out.push(&self.open);
    self.condition.collect_tokens(out);
    out.push(&self.close);
    self.body.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForStmt {
  pub keyword: Token,
  pub open: Token,
  pub init: ForInit,
  pub condition: Option<Expr>,
  pub condition_semicolon: Token,
  pub post: Option<Expr>,
  pub close: Token,
  pub body: Box<Stmt>,
}

impl Syntax for ForStmt {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    out.push(&self.open);
    self.init.collect_tokens(out);
    self.condition.collect_tokens(out);
    out.push(&self.condition_semicolon);
    self.post.collect_tokens(out);
    out.push(&self.close);
    self.body.collect_tokens(out);
  }
}

/// The first clause of a `for` header, including its `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForInit {
  Empty(Token),
  Expr(ExprStmt),
  Decl(VariableDecl),
}

impl Syntax for ForInit {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      ForInit::Empty(semicolon) => out.push(semicolon),
      ForInit::Expr(stmt) => stmt.collect_tokens(out),
      ForInit::Decl(decl) => decl.collect_tokens(out),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
  pub open: Token,
  pub stmts: Vec<Stmt>,
  pub close: Token,
}

impl Syntax for Block {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.open);
    self.stmts.collect_tokens(out);
    out.push(&self.close);
  }
}

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
  Plus,
  Minus,
  Deref,
  AddressOf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Integer(Token),
  Str(Token),
  Ident(Token),
  Paren(ParenExpr),
  Prefix(PrefixExpr),
  Sizeof(SizeofExpr),
  Infix(InfixExpr),
  Assign(AssignExpr),
  Call(CallExpr),
  Subscript(SubscriptExpr),
}

impl Expr {
  /// The expression with any enclosing parentheses removed.
  pub fn strip_parens(&self) -> &Expr {
    match self {
      Expr::Paren(paren) => paren.inner.strip_parens(),
      other => other,
    }
  }
}

impl Syntax for Expr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    match self {
      Expr::Integer(token) | Expr::Str(token) | Expr::Ident(token) => out.push(token),
      Expr::Paren(expr) => expr.collect_tokens(out),
      Expr::Prefix(expr) => expr.collect_tokens(out),
      Expr::Sizeof(expr) => expr.collect_tokens(out),
      Expr::Infix(expr) => expr.collect_tokens(out),
      Expr::Assign(expr) => expr.collect_tokens(out),
      Expr::Call(expr) => expr.collect_tokens(out),
      Expr::Subscript(expr) => expr.collect_tokens(out),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParenExpr {
  pub open: Token,
  pub inner: Box<Expr>,
  pub close: Token,
}

impl Syntax for ParenExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.open);
    self.inner.collect_tokens(out);
    out.push(&self.close);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixExpr {
  pub op: PrefixOp,
  pub operator: Token,
  pub operand: Box<Expr>,
}

impl Syntax for PrefixExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.operator);
    self.operand.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeofExpr {
  pub keyword: Token,
  pub operand: Box<Expr>,
}

impl Syntax for SizeofExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.keyword);
    self.operand.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfixExpr {
  pub left: Box<Expr>,
  pub op: BinaryOp,
  pub operator: Token,
  pub right: Box<Expr>,
}

impl Syntax for InfixExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.left.collect_tokens(out);
    out.push(&self.operator);
    self.right.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignExpr {
  pub target: Box<Expr>,
  pub operator: Token,
  pub value: Box<Expr>,
}

impl Syntax for AssignExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    self.target.collect_tokens(out);
    out.push(&self.operator);
    self.value.collect_tokens(out);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
  pub callee: Token,
  pub open: Token,
  pub arguments: Vec<ListElement>,
  pub close: Token,
}

impl CallExpr {
  pub fn name(&self) -> &str {
    &self.callee.text
  }
}

impl Syntax for CallExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.callee);
    out.push(&self.open);
    self.arguments.collect_tokens(out);
    out.push(&self.close);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptExpr {
  pub base: Token,
  pub open: Token,
  pub index: Box<Expr>,
  pub close: Token,
}

impl Syntax for SubscriptExpr {
  fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
    out.push(&self.base);
    out.push(&self.open);
    self.index.collect_tokens(out);
    out.push(&self.close);
  }
}

/// Value of an integer literal token.
pub fn integer_value(token: &Token) -> CompileResult<i64> {
  match token.text.parse::<i64>() {
    Ok(value) => Ok(value),
    Err(err) => InvalidSyntaxSnafu {
      location: token.location(),
      message: format!("invalid number: {err}"),
    }
    .fail(),
  }
}
