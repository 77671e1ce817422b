//! Recursive-descent parser producing the lossless syntax tree.
//!
//! The parser mirrors the classic chibicc structure: statements and
//! declarations are parsed by hand and expressions go through a
//! precedence-climbing ladder, lowest first:
//!
//! ```text
//! assign -> equality -> relational -> add -> mul -> unary -> primary
//! ```
//!
//! Every token that is consumed ends up in exactly one node. When an expected
//! token is missing, the error points at the token that was found instead.

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult, InvalidSyntaxSnafu};
use crate::syntax::{
  ArrayType, AssignExpr, BinaryOp, Block, CallExpr, ElseBranch, Expr, ExprStmt, ForInit, ForStmt,
  FunctionDecl, IfStmt, InfixExpr, InitList, InitValue, Initializer, Item, ListElement,
  Parameter, ParenExpr, PointerType, PrefixExpr, PrefixOp, ReturnStmt, SizeofExpr, SourceBody,
  SourceFile, Stmt, SubscriptExpr, TypeNode, VariableDecl, WhileStmt, integer_value,
};
use crate::tokenizer::{
  Keyword, Reserved, SourceRange, Token, TokenKind, TypeKeyword,
};

/// Parse a whole translation unit from the token stream.
pub fn parse(tokens: Vec<Token>) -> CompileResult<SourceFile> {
  let mut stream = TokenStream::new(tokens);

  let body = if stream.is_eof() || stream.at_type() {
    let mut items = Vec::new();
    while !stream.is_eof() {
      items.push(parse_item(&mut stream)?);
    }
    SourceBody::Items(items)
  } else {
    SourceBody::Expression(parse_expr(&mut stream)?)
  };

  if !stream.is_eof() {
    return Err(stream.error(format!(
      "unexpected token \"{}\"",
      stream.peek().describe()
    )));
  }
  let eof = stream.advance();

  if let SourceBody::Items(items) = &body {
    debug!(items = items.len(), "parsed source file");
  }
  Ok(SourceFile { body, eof })
}

/// A top-level item: a type and a name, then `(` for a function or anything
/// else for a variable.
fn parse_item(stream: &mut TokenStream) -> CompileResult<Item> {
  let ty = parse_base_type(stream)?;
  let name = stream.get_ident()?;

  if stream.peek().is_reserved(Reserved::LParen) {
    return Ok(Item::Function(parse_function(stream, ty, name)?));
  }

  Ok(Item::Variable(parse_variable_rest(stream, ty, name)?))
}

fn parse_function(
  stream: &mut TokenStream,
  return_type: TypeNode,
  name: Token,
) -> CompileResult<FunctionDecl> {
  let open = stream.skip(Reserved::LParen)?;
  let mut parameters = Vec::new();

  if !stream.peek().is_reserved(Reserved::RParen) {
    loop {
      let base = parse_base_type(stream)?;
      let param_name = stream.get_ident()?;
      let ty = parse_array_suffixes(stream, base)?;
      let comma = stream.equal(Reserved::Comma);
      let done = comma.is_none();
      parameters.push(Parameter {
        ty,
        name: param_name,
        comma,
      });
      if done {
        break;
      }
    }
  }

  let close = stream.skip(Reserved::RParen)?;
  let body = parse_block(stream)?;

  Ok(FunctionDecl {
    return_type,
    name,
    open,
    parameters,
    close,
    body,
  })
}

/// `int` or `char` followed by any number of `*`.
fn parse_base_type(stream: &mut TokenStream) -> CompileResult<TypeNode> {
  let mut ty = match stream.peek().kind {
    TokenKind::Type(TypeKeyword::Int) => TypeNode::Int(stream.advance()),
    TokenKind::Type(TypeKeyword::Char) => TypeNode::Char(stream.advance()),
    _ => {
      return Err(stream.error(format!(
        "expected a type, but got \"{}\"",
        stream.peek().describe()
      )));
    }
  };

  while let Some(star) = stream.equal(Reserved::Star) {
    ty = TypeNode::Pointer(PointerType {
      referenced: Box::new(ty),
      star,
    });
  }
  Ok(ty)
}

/// Trailing `[N]` declarators. The first suffix is the outermost dimension.
fn parse_array_suffixes(stream: &mut TokenStream, base: TypeNode) -> CompileResult<TypeNode> {
  let mut suffixes = Vec::new();
  while let Some(open) = stream.equal(Reserved::LBracket) {
    let length = stream.get_number()?;
    let close = stream.skip(Reserved::RBracket)?;
    suffixes.push((open, length, close));
  }

  let mut ty = base;
  for (open, length, close) in suffixes.into_iter().rev() {
    let array = ArrayType {
      element: Box::new(ty),
      open,
      length,
      close,
    };
    array.length()?;
    ty = TypeNode::Array(array);
  }
  Ok(ty)
}

fn parse_declaration(stream: &mut TokenStream) -> CompileResult<VariableDecl> {
  let ty = parse_base_type(stream)?;
  let name = stream.get_ident()?;
  parse_variable_rest(stream, ty, name)
}

fn parse_variable_rest(
  stream: &mut TokenStream,
  base: TypeNode,
  name: Token,
) -> CompileResult<VariableDecl> {
  let ty = parse_array_suffixes(stream, base)?;

  let initializer = match stream.equal(Reserved::Assign) {
    Some(equals) => Some(Initializer {
      equals,
      value: parse_init_value(stream)?,
    }),
    None => None,
  };

  let semicolon = stream.skip(Reserved::Semicolon)?;
  Ok(VariableDecl {
    ty,
    name,
    initializer,
    semicolon,
  })
}

fn parse_init_value(stream: &mut TokenStream) -> CompileResult<InitValue> {
  let Some(open) = stream.equal(Reserved::LBrace) else {
    return Ok(InitValue::Expr(parse_assign(stream)?));
  };

  let mut elements = Vec::new();
  while !stream.peek().is_reserved(Reserved::RBrace) {
    let expr = parse_assign(stream)?;
    let comma = stream.equal(Reserved::Comma);
    let done = comma.is_none();
    elements.push(ListElement { expr, comma });
    if done {
      break;
    }
  }
  let close = stream.skip(Reserved::RBrace)?;

  Ok(InitValue::List(InitList {
    open,
    elements,
    close,
  }))
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Block> {
  let open = stream.skip(Reserved::LBrace)?;
  let mut stmts = Vec::new();
  while !stream.peek().is_reserved(Reserved::RBrace) {
    if stream.is_eof() {
      return Err(stream.error("expected \"}\", but got \"EOF\""));
    }
    stmts.push(parse_stmt(stream)?);
  }
  let close = stream.skip(Reserved::RBrace)?;
  Ok(Block { open, stmts, close })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if let Some(keyword) = stream.keyword(Keyword::Return) {
    let value = parse_expr(stream)?;
    let semicolon = stream.skip(Reserved::Semicolon)?;
    return Ok(Stmt::Return(ReturnStmt {
      keyword,
      value,
      semicolon,
    }));
  }

  if let Some(keyword) = stream.keyword(Keyword::If) {
    let open = stream.skip(Reserved::LParen)?;
    let condition = parse_expr(stream)?;
    let close = stream.skip(Reserved::RParen)?;
    let then_body = Box::new(parse_stmt(stream)?);
    let else_branch = match stream.keyword(Keyword::Else) {
      Some(keyword) => Some(ElseBranch {
        keyword,
        body: Box::new(parse_stmt(stream)?),
      }),
      None => None,
    };
    return Ok(Stmt::If(IfStmt {
      keyword,
      open,
      condition,
      close,
      then_body,
      else_branch,
    }));
  }

  if let Some(keyword) = stream.keyword(Keyword::While) {
    let open = stream.skip(Reserved::LParen)?;
    let condition = parse_expr(stream)?;
    let close = stream.skip(Reserved::RParen)?;
    let body = Box::new(parse_stmt(stream)?);
    return Ok(Stmt::While(WhileStmt {
      keyword,
      open,
      condition,
      close,
      body,
    }));
  }

  if let Some(keyword) = stream.keyword(Keyword::For) {
    return parse_for(stream, keyword).map(Stmt::For);
  }

  if stream.peek().is_reserved(Reserved::LBrace) {
    return parse_block(stream).map(Stmt::Block);
  }

  if stream.at_type() {
    return parse_declaration(stream).map(Stmt::Decl);
  }

  if let Some(semicolon) = stream.equal(Reserved::Semicolon) {
    return Ok(Stmt::Empty(semicolon));
  }

  parse_expr_stmt(stream).map(Stmt::Expr)
}

fn parse_for(stream: &mut TokenStream, keyword: Token) -> CompileResult<ForStmt> {
  let open = stream.skip(Reserved::LParen)?;

  let init = if let Some(semicolon) = stream.equal(Reserved::Semicolon) {
    ForInit::Empty(semicolon)
  } else if stream.at_type() {
    ForInit::Decl(parse_declaration(stream)?)
  } else {
    ForInit::Expr(parse_expr_stmt(stream)?)
  };

  let condition = if stream.peek().is_reserved(Reserved::Semicolon) {
    None
  } else {
    Some(parse_expr(stream)?)
  };
  let condition_semicolon = stream.skip(Reserved::Semicolon)?;

  let post = if stream.peek().is_reserved(Reserved::RParen) {
    None
  } else {
    Some(parse_expr(stream)?)
  };
  let close = stream.skip(Reserved::RParen)?;
  let body = Box::new(parse_stmt(stream)?);

  Ok(ForStmt {
    keyword,
    open,
    init,
    condition,
    condition_semicolon,
    post,
    close,
    body,
  })
}

fn parse_expr_stmt(stream: &mut TokenStream) -> CompileResult<ExprStmt> {
  let expr = parse_expr(stream)?;
  let semicolon = stream.skip(Reserved::Semicolon)?;
  Ok(ExprStmt { expr, semicolon })
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_assign(stream)
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<Expr> {
  let node = parse_equality(stream)?;

  if let Some(operator) = stream.equal(Reserved::Assign) {
    let value = parse_assign(stream)?;
    return Ok(Expr::Assign(AssignExpr {
      target: Box::new(node),
      operator,
      value: Box::new(value),
    }));
  }

  Ok(node)
}

fn infix(left: Expr, op: BinaryOp, operator: Token, right: Expr) -> Expr {
  Expr::Infix(InfixExpr {
    left: Box::new(left),
    op,
    operator,
    right: Box::new(right),
  })
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_relational(stream)?;

  loop {
    let op = match stream.peek().kind {
      TokenKind::Reserved(Reserved::EqEq) => BinaryOp::Eq,
      TokenKind::Reserved(Reserved::NotEq) => BinaryOp::Ne,
      _ => break,
    };
    let operator = stream.advance();
    let rhs = parse_relational(stream)?;
    node = infix(node, op, operator, rhs);
  }

  Ok(node)
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_add(stream)?;

  loop {
    let op = match stream.peek().kind {
      TokenKind::Reserved(Reserved::Lt) => BinaryOp::Lt,
      TokenKind::Reserved(Reserved::Le) => BinaryOp::Le,
      TokenKind::Reserved(Reserved::Gt) => BinaryOp::Gt,
      TokenKind::Reserved(Reserved::Ge) => BinaryOp::Ge,
      _ => break,
    };
    let operator = stream.advance();
    let rhs = parse_add(stream)?;
    node = infix(node, op, operator, rhs);
  }

  Ok(node)
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_mul(stream)?;

  loop {
    let op = match stream.peek().kind {
      TokenKind::Reserved(Reserved::Plus) => BinaryOp::Add,
      TokenKind::Reserved(Reserved::Minus) => BinaryOp::Sub,
      _ => break,
    };
    let operator = stream.advance();
    let rhs = parse_mul(stream)?;
    node = infix(node, op, operator, rhs);
  }

  Ok(node)
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_unary(stream)?;

  loop {
    let op = match stream.peek().kind {
      TokenKind::Reserved(Reserved::Star) => BinaryOp::Mul,
      TokenKind::Reserved(Reserved::Slash) => BinaryOp::Div,
      _ => break,
    };
    let operator = stream.advance();
    let rhs = parse_unary(stream)?;
    node = infix(node, op, operator, rhs);
  }

  Ok(node)
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if let Some(keyword) = stream.keyword(Keyword::Sizeof) {
    let operand = parse_unary(stream)?;
    return Ok(Expr::Sizeof(SizeofExpr {
      keyword,
      operand: Box::new(operand),
    }));
  }

  let op = match stream.peek().kind {
    TokenKind::Reserved(Reserved::Plus) => PrefixOp::Plus,
    TokenKind::Reserved(Reserved::Minus) => PrefixOp::Minus,
    TokenKind::Reserved(Reserved::Star) => PrefixOp::Deref,
    TokenKind::Reserved(Reserved::Amp) => PrefixOp::AddressOf,
    _ => return parse_primary(stream),
  };
  let operator = stream.advance();

  // Sign operators bind to a primary only; `*` and `&` nest.
  let operand = match op {
    PrefixOp::Plus | PrefixOp::Minus => parse_primary(stream)?,
    PrefixOp::Deref | PrefixOp::AddressOf => parse_unary(stream)?,
  };

  Ok(Expr::Prefix(PrefixExpr {
    op,
    operator,
    operand: Box::new(operand),
  }))
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if let Some(open) = stream.equal(Reserved::LParen) {
    let inner = parse_expr(stream)?;
    let close = stream.skip(Reserved::RParen)?;
    return Ok(Expr::Paren(ParenExpr {
      open,
      inner: Box::new(inner),
      close,
    }));
  }

  match stream.peek().kind {
    TokenKind::Integer(_) => {
      let token = stream.advance();
      integer_value(&token)?;
      Ok(Expr::Integer(token))
    }
    TokenKind::Str(_) => Ok(Expr::Str(stream.advance())),
    TokenKind::Ident(_) => {
      let name = stream.advance();
      if let Some(open) = stream.equal(Reserved::LParen) {
        return parse_call(stream, name, open);
      }
      if let Some(open) = stream.equal(Reserved::LBracket) {
        let index = parse_expr(stream)?;
        let close = stream.skip(Reserved::RBracket)?;
        return Ok(Expr::Subscript(SubscriptExpr {
          base: name,
          open,
          index: Box::new(index),
          close,
        }));
      }
      Ok(Expr::Ident(name))
    }
    _ => Err(stream.error(format!(
      "expected an expression, but got \"{}\"",
      stream.peek().describe()
    ))),
  }
}

fn parse_call(stream: &mut TokenStream, callee: Token, open: Token) -> CompileResult<Expr> {
  let mut arguments = Vec::new();
  if !stream.peek().is_reserved(Reserved::RParen) {
    loop {
      let expr = parse_assign(stream)?;
      let comma = stream.equal(Reserved::Comma);
      let done = comma.is_none();
      arguments.push(ListElement { expr, comma });
      if done {
        break;
      }
    }
  }
  let close = stream.skip(Reserved::RParen)?;
  Ok(Expr::Call(CallExpr {
    callee,
    open,
    arguments,
    close,
  }))
}

/// Lightweight cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the token stream, making sure it ends in `Eof` so the
  /// cursor always has a token to look at.
  fn new(mut tokens: Vec<Token>) -> Self {
    if !tokens.last().is_some_and(Token::is_eof) {
      let end = tokens
        .last()
        .map(|token| token.range.end)
        .unwrap_or_default();
      tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        range: SourceRange::new(end, end),
        leading_trivia: String::new(),
        trailing_trivia: String::new(),
      });
    }
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> &Token {
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  /// Consume the current token. The cursor never moves past `Eof`.
  fn advance(&mut self) -> Token {
    let token = self.peek().clone();
    trace!(pos = self.pos, text = %token.describe(), "advance");
    if !token.is_eof() {
      self.pos += 1;
    }
    token
  }

  /// Consume the current token if it is the given punctuator.
  fn equal(&mut self, reserved: Reserved) -> Option<Token> {
    self
      .peek()
      .is_reserved(reserved)
      .then(|| self.advance())
  }

  fn keyword(&mut self, keyword: Keyword) -> Option<Token> {
    self.peek().is_keyword(keyword).then(|| self.advance())
  }

  fn skip(&mut self, reserved: Reserved) -> CompileResult<Token> {
    match self.equal(reserved) {
      Some(token) => Ok(token),
      None => Err(self.error(format!(
        "expected \"{}\", but got \"{}\"",
        reserved.spelling(),
        self.peek().describe()
      ))),
    }
  }

  fn get_number(&mut self) -> CompileResult<Token> {
    if matches!(self.peek().kind, TokenKind::Integer(_)) {
      return Ok(self.advance());
    }
    Err(self.error(format!(
      "expected a number, but got \"{}\"",
      self.peek().describe()
    )))
  }

  fn get_ident(&mut self) -> CompileResult<Token> {
    if matches!(self.peek().kind, TokenKind::Ident(_)) {
      return Ok(self.advance());
    }
    Err(self.error(format!(
      "expected an identifier, but got \"{}\"",
      self.peek().describe()
    )))
  }

  fn at_type(&self) -> bool {
    matches!(self.peek().kind, TokenKind::Type(_))
  }

  fn is_eof(&self) -> bool {
    self.peek().is_eof()
  }

  /// Syntax error located at the token the parser is looking at.
  fn error(&self, message: impl Into<String>) -> CompileError {
    InvalidSyntaxSnafu {
      location: self.peek().location(),
      message: message.into(),
    }
    .build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::syntax::Syntax;
  use crate::tokenizer::{SourceLocation, tokenize};
  use pretty_assertions::assert_eq;
  use proptest::prelude::*;

  fn parse_source(source: &str) -> CompileResult<SourceFile> {
    parse(tokenize(source)?)
  }

  fn expr(source: &str) -> Expr {
    match parse_source(source).unwrap().body {
      SourceBody::Expression(expr) => expr,
      SourceBody::Items(_) => panic!("expected a bare expression"),
    }
  }

  /// Fully parenthesised rendering, to make tree shape visible in asserts.
  fn shape(expr: &Expr) -> String {
    match expr {
      Expr::Integer(token) | Expr::Str(token) | Expr::Ident(token) => token.text.clone(),
      Expr::Paren(paren) => shape(&paren.inner),
      Expr::Prefix(prefix) => format!("({}{})", prefix.operator.text, shape(&prefix.operand)),
      Expr::Sizeof(size) => format!("(sizeof {})", shape(&size.operand)),
      Expr::Infix(infix) => format!(
        "({} {} {})",
        shape(&infix.left),
        infix.operator.text,
        shape(&infix.right)
      ),
      Expr::Assign(assign) => format!("({} = {})", shape(&assign.target), shape(&assign.value)),
      Expr::Call(call) => {
        let args: Vec<String> = call.arguments.iter().map(|arg| shape(&arg.expr)).collect();
        format!("{}({})", call.name(), args.join(", "))
      }
      Expr::Subscript(sub) => format!("{}[{}]", sub.base.text, shape(&sub.index)),
    }
  }

  fn syntax_error_at(source: &str) -> SourceLocation {
    match parse_source(source) {
      Err(CompileError::InvalidSyntax { location, .. }) => location,
      other => panic!("expected a syntax error, got {other:?}"),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    assert_eq!(shape(&expr("1+2*3")), "(1 + (2 * 3))");
    assert_eq!(shape(&expr("(1+2)*3")), "((1 + 2) * 3)");
  }

  #[test]
  fn binary_tiers_are_left_associative() {
    assert_eq!(shape(&expr("5+20-4")), "((5 + 20) - 4)");
    assert_eq!(shape(&expr("8/4/2")), "((8 / 4) / 2)");
  }

  #[test]
  fn assignment_is_right_associative() {
    assert_eq!(shape(&expr("a = b = c")), "(a = (b = c))");
  }

  #[test]
  fn comparison_tiers_nest() {
    assert_eq!(shape(&expr("1 < 2 == 3 >= 4")), "((1 < 2) == (3 >= 4))");
  }

  #[test]
  fn deref_address_of_and_sizeof_nest() {
    assert_eq!(shape(&expr("&*p")), "(&(*p))");
    assert_eq!(shape(&expr("sizeof sizeof x")), "(sizeof (sizeof x))");
    assert_eq!(shape(&expr("-x * 2")), "((-x) * 2)");
  }

  #[test]
  fn sign_applies_only_to_a_primary() {
    assert_eq!(syntax_error_at("- -1"), SourceLocation::new(1, 3));
  }

  #[test]
  fn calls_and_subscripts() {
    assert_eq!(shape(&expr("f(1, g(), a[2])")), "f(1, g(), a[2])");
  }

  #[test]
  fn error_points_at_found_token() {
    assert_eq!(syntax_error_at("1 + ;"), SourceLocation::new(1, 5));
    assert_eq!(
      syntax_error_at("int main() {\n  return 1\n}"),
      SourceLocation::new(3, 1)
    );
    assert_eq!(syntax_error_at("int x = 1"), SourceLocation::new(1, 10));
  }

  #[test]
  fn trailing_tokens_after_expression_are_rejected() {
    assert_eq!(syntax_error_at("1 2"), SourceLocation::new(1, 3));
  }

  #[test]
  fn missing_type_at_top_level_points_at_name() {
    assert_eq!(
      syntax_error_at("int a; b;"),
      SourceLocation::new(1, 8)
    );
  }

  #[test]
  fn items_are_disambiguated_by_paren() {
    let file = parse_source("int x; int *f(int a, char b) { return a; } char s[4];").unwrap();
    let SourceBody::Items(items) = &file.body else {
      panic!("expected items");
    };
    assert_eq!(items.len(), 3);
    assert!(matches!(&items[0], Item::Variable(v) if v.name() == "x"));
    let Item::Function(function) = &items[1] else {
      panic!("expected a function");
    };
    assert_eq!(function.name(), "f");
    assert_eq!(function.parameters.len(), 2);
    assert!(matches!(function.return_type, TypeNode::Pointer(_)));
    let Item::Variable(array) = &items[2] else {
      panic!("expected a variable");
    };
    assert_eq!(array.ty.ty().unwrap().to_string(), "char[4]");
  }

  #[test]
  fn array_suffixes_nest_outermost_first() {
    let file = parse_source("int m[2][3];").unwrap();
    let SourceBody::Items(items) = &file.body else {
      panic!("expected items");
    };
    let Item::Variable(decl) = &items[0] else {
      panic!("expected a variable");
    };
    assert_eq!(decl.ty.ty().unwrap().to_string(), "int[3][2]");
    assert_eq!(decl.ty.ty().unwrap().size(), 48);
    let texts: Vec<&str> = decl.tokens().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, ["int", "m", "[", "2", "]", "[", "3", "]", ";"]);
  }

  #[test]
  fn initializer_shapes() {
    let file =
      parse_source("int a[3] = {1, 2,}; char s[8] = \"hi\"; int *p = &a;").unwrap();
    let SourceBody::Items(items) = &file.body else {
      panic!("expected items");
    };
    let Item::Variable(list) = &items[0] else {
      panic!("expected a variable");
    };
    let Some(Initializer {
      value: InitValue::List(init),
      ..
    }) = &list.initializer
    else {
      panic!("expected a list initializer");
    };
    assert_eq!(init.elements.len(), 2);
    assert!(init.elements[1].comma.is_some());
  }

  #[test]
  fn for_header_variants() {
    let source = "int main() { for (;;) ; for (int i = 0; i < 3; i = i + 1) {} for (x = 0; ; ) x; }";
    let file = parse_source(source).unwrap();
    let SourceBody::Items(items) = &file.body else {
      panic!("expected items");
    };
    let Item::Function(main) = &items[0] else {
      panic!("expected a function");
    };
    let fors: Vec<&ForStmt> = main
      .body
      .stmts
      .iter()
      .filter_map(|stmt| match stmt {
        Stmt::For(f) => Some(f),
        _ => None,
      })
      .collect();
    assert_eq!(fors.len(), 3);
    assert!(matches!(fors[0].init, ForInit::Empty(_)));
    assert!(fors[0].condition.is_none() && fors[0].post.is_none());
    assert!(matches!(fors[1].init, ForInit::Decl(_)));
    assert!(matches!(fors[2].init, ForInit::Expr(_)));
  }

  #[test]
  fn dangling_else_binds_to_nearest_if() {
    let file = parse_source("int main() { if (a) if (b) return 1; else return 2; }").unwrap();
    let SourceBody::Items(items) = &file.body else {
      panic!("expected items");
    };
    let Item::Function(main) = &items[0] else {
      panic!("expected a function");
    };
    let Stmt::If(outer) = &main.body.stmts[0] else {
      panic!("expected an if");
    };
    assert!(outer.else_branch.is_none());
    let Stmt::If(inner) = outer.then_body.as_ref() else {
      panic!("expected a nested if");
    };
    assert!(inner.else_body().is_some());
  }

  #[test]
  fn unclosed_block_reports_eof() {
    assert_eq!(syntax_error_at("int main() { 1;"), SourceLocation::new(1, 16));
  }

  #[test]
  fn oversized_integer_is_invalid_syntax() {
    assert_eq!(
      syntax_error_at("1 + 99999999999999999999"),
      SourceLocation::new(1, 5)
    );
  }

  #[test]
  fn node_tokens_reproduce_consumed_slice() {
    let source = "int g[2] = {1, 2};\nint main(int a, char *b) {\n  // loop\n  for (int i = 0; i < a; i = i + 1) { g[0] = *b + sizeof i; }\n  if (a) return f(a, \"s\"); else ;\n  return -(a);\n}\n";
    let tokens = tokenize(source).unwrap();
    let file = parse(tokens.clone()).unwrap();
    let collected: Vec<Token> = file.tokens().into_iter().cloned().collect();
    assert_eq!(collected, tokens);
    assert_eq!(file.to_source(), source);
  }

  fn expression_source() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
      (0u32..1000).prop_map(|n| n.to_string()),
      "[a-z][a-z0-9_]{0,3}".prop_filter("not a keyword", |s| {
        !["if", "else", "while", "for", "return", "sizeof", "int", "char"].contains(&s.as_str())
      }),
      Just("\"str\"".to_string()),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
      prop_oneof![
        (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "==", "!=", "<", "<=", ">", ">="]), inner.clone())
          .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
        inner.clone().prop_map(|e| format!("({e})")),
        inner.clone().prop_map(|e| format!("*{e}")),
        inner.clone().prop_map(|e| format!("sizeof {e}")),
        (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("f({a}, {b})")),
        inner.prop_map(|e| format!("a[{e}]")),
      ]
    })
  }

  proptest! {
    #[test]
    fn parsing_is_deterministic_and_lossless(source in expression_source()) {
      let tokens = tokenize(&source).unwrap();
      let first = parse(tokens.clone()).unwrap();
      let second = parse(tokens.clone()).unwrap();
      prop_assert_eq!(&first, &second);
      let collected: Vec<Token> = first.tokens().into_iter().cloned().collect();
      prop_assert_eq!(collected, tokens);
      prop_assert_eq!(first.to_source(), source);
    }
  }
}
