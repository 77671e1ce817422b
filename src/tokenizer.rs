//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! Whitespace and comments never become tokens of their own. They are kept as
//! trivia on the neighbouring token so the token stream still accounts for
//! every character of the input: trivia up to the end of a line trails the
//! token before it, everything else leads the token after it.
//!
//! Reserved symbols, keywords and type names are matched longest-first so
//! `<=` is one token rather than `<` followed by `=`. A keyword match only
//! stands if it is not immediately followed by another identifier character,
//! which keeps `returnX` an identifier.

use std::fmt;

use tracing::debug;

use crate::error::{CompileResult, UnknownTokenSnafu};

/// A 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
  pub line: usize,
  pub column: usize,
}

impl SourceLocation {
  pub const fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

impl fmt::Display for SourceLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Half-open span of a token, trivia excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceRange {
  pub start: SourceLocation,
  pub end: SourceLocation,
}

impl SourceRange {
  pub const fn new(start: SourceLocation, end: SourceLocation) -> Self {
    Self { start, end }
  }

  /// Smallest range covering both `self` and `other`.
  pub fn to(self, other: SourceRange) -> SourceRange {
    SourceRange::new(self.start.min(other.start), self.end.max(other.end))
  }
}

/// Punctuation recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reserved {
  Plus,
  Minus,
  Star,
  Slash,
  EqEq,
  NotEq,
  Lt,
  Le,
  Gt,
  Ge,
  Assign,
  Semicolon,
  Comma,
  LParen,
  RParen,
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  Amp,
}

impl Reserved {
  pub const ALL: [Reserved; 20] = [
    Reserved::Plus,
    Reserved::Minus,
    Reserved::Star,
    Reserved::Slash,
    Reserved::EqEq,
    Reserved::NotEq,
    Reserved::Lt,
    Reserved::Le,
    Reserved::Gt,
    Reserved::Ge,
    Reserved::Assign,
    Reserved::Semicolon,
    Reserved::Comma,
    Reserved::LParen,
    Reserved::RParen,
    Reserved::LBrace,
    Reserved::RBrace,
    Reserved::LBracket,
    Reserved::RBracket,
    Reserved::Amp,
  ];

  pub fn spelling(self) -> &'static str {
    match self {
      Reserved::Plus => "+",
      Reserved::Minus => "-",
      Reserved::Star => "*",
      Reserved::Slash => "/",
      Reserved::EqEq => "==",
      Reserved::NotEq => "!=",
      Reserved::Lt => "<",
      Reserved::Le => "<=",
      Reserved::Gt => ">",
      Reserved::Ge => ">=",
      Reserved::Assign => "=",
      Reserved::Semicolon => ";",
      Reserved::Comma => ",",
      Reserved::LParen => "(",
      Reserved::RParen => ")",
      Reserved::LBrace => "{",
      Reserved::RBrace => "}",
      Reserved::LBracket => "[",
      Reserved::RBracket => "]",
      Reserved::Amp => "&",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  If,
  Else,
  While,
  For,
  Return,
  Sizeof,
}

impl Keyword {
  pub const ALL: [Keyword; 6] = [
    Keyword::If,
    Keyword::Else,
    Keyword::While,
    Keyword::For,
    Keyword::Return,
    Keyword::Sizeof,
  ];

  pub fn spelling(self) -> &'static str {
    match self {
      Keyword::If => "if",
      Keyword::Else => "else",
      Keyword::While => "while",
      Keyword::For => "for",
      Keyword::Return => "return",
      Keyword::Sizeof => "sizeof",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKeyword {
  Int,
  Char,
}

impl TypeKeyword {
  pub const ALL: [TypeKeyword; 2] = [TypeKeyword::Int, TypeKeyword::Char];

  pub fn spelling(self) -> &'static str {
    match self {
      TypeKeyword::Int => "int",
      TypeKeyword::Char => "char",
    }
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Reserved(Reserved),
  Keyword(Keyword),
  Type(TypeKeyword),
  Ident(String),
  Integer(String),
  /// Raw content between the quotes, escapes left untouched.
  Str(String),
  Eof,
}

/// One substantive token plus the trivia surrounding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
  pub kind: TokenKind,
  /// Exact source spelling; string literals keep their quotes.
  pub text: String,
  pub range: SourceRange,
  pub leading_trivia: String,
  pub trailing_trivia: String,
}

impl Token {
  pub fn location(&self) -> SourceLocation {
    self.range.start
  }

  pub fn is_reserved(&self, reserved: Reserved) -> bool {
    self.kind == TokenKind::Reserved(reserved)
  }

  pub fn is_keyword(&self, keyword: Keyword) -> bool {
    self.kind == TokenKind::Keyword(keyword)
  }

  pub fn is_eof(&self) -> bool {
    self.kind == TokenKind::Eof
  }

  /// Human-friendly description used in diagnostics.
  pub fn describe(&self) -> &str {
    match self.kind {
      TokenKind::Eof => "EOF",
      _ => &self.text,
    }
  }

  /// The token with its trivia, exactly as it appeared in the source.
  pub fn full_text(&self) -> String {
    format!("{}{}{}", self.leading_trivia, self.text, self.trailing_trivia)
  }
}

/// A spelling that can be matched verbatim at the cursor.
#[derive(Clone, Copy)]
enum Fixed {
  Reserved(Reserved),
  Keyword(Keyword),
  Type(TypeKeyword),
}

impl Fixed {
  fn spelling(self) -> &'static str {
    match self {
      Fixed::Reserved(r) => r.spelling(),
      Fixed::Keyword(k) => k.spelling(),
      Fixed::Type(t) => t.spelling(),
    }
  }

  fn is_word(self) -> bool {
    !matches!(self, Fixed::Reserved(_))
  }

  fn kind(self) -> TokenKind {
    match self {
      Fixed::Reserved(r) => TokenKind::Reserved(r),
      Fixed::Keyword(k) => TokenKind::Keyword(k),
      Fixed::Type(t) => TokenKind::Type(t),
    }
  }
}

fn fixed_spellings() -> impl Iterator<Item = Fixed> {
  Reserved::ALL
    .into_iter()
    .map(Fixed::Reserved)
    .chain(Keyword::ALL.into_iter().map(Fixed::Keyword))
    .chain(TypeKeyword::ALL.into_iter().map(Fixed::Type))
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Character cursor that keeps line/column in step with the index.
struct Scanner {
  chars: Vec<char>,
  pos: usize,
  location: SourceLocation,
}

impl Scanner {
  fn new(input: &str) -> Self {
    Self {
      chars: input.chars().collect(),
      pos: 0,
      location: SourceLocation::new(1, 1),
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.chars.get(self.pos + offset).copied()
  }

  fn at_end(&self) -> bool {
    self.pos >= self.chars.len()
  }

  fn starts_with(&self, s: &str) -> bool {
    let mut i = self.pos;
    for c in s.chars() {
      if self.chars.get(i) != Some(&c) {
        return false;
      }
      i += 1;
    }
    true
  }

  fn bump(&mut self, out: &mut String) {
    if let Some(c) = self.peek() {
      out.push(c);
      self.pos += 1;
      if c == '\n' {
        self.location.line += 1;
        self.location.column = 1;
      } else {
        self.location.column += 1;
      }
    }
  }

  fn bump_n(&mut self, n: usize, out: &mut String) {
    for _ in 0..n {
      self.bump(out);
    }
  }

  /// Consume whitespace and comments. Trailing trivia stops in front of the
  /// first newline so that the newline leads the next token.
  fn trivia(&mut self, trailing: bool) -> CompileResult<String> {
    let mut out = String::new();
    loop {
      match self.peek() {
        Some('\n') if trailing => break,
        Some(c) if c.is_whitespace() => self.bump(&mut out),
        Some('/') if self.peek_at(1) == Some('/') => {
          while !self.at_end() && self.peek() != Some('\n') {
            self.bump(&mut out);
          }
        }
        Some('/') if self.peek_at(1) == Some('*') => {
          let start = self.location;
          self.bump_n(2, &mut out);
          loop {
            if self.at_end() {
              return UnknownTokenSnafu { location: start }.fail();
            }
            if self.starts_with("*/") {
              self.bump_n(2, &mut out);
              break;
            }
            self.bump(&mut out);
          }
        }
        _ => break,
      }
    }
    Ok(out)
  }

  /// Scan one substantive token at the cursor.
  fn token(&mut self) -> CompileResult<(TokenKind, String)> {
    let start = self.location;
    let mut text = String::new();
    let Some(c) = self.peek() else {
      return Ok((TokenKind::Eof, text));
    };

    if c.is_ascii_digit() {
      while self.peek().is_some_and(|c| c.is_ascii_digit()) {
        self.bump(&mut text);
      }
      return Ok((TokenKind::Integer(text.clone()), text));
    }

    if c == '"' {
      self.bump(&mut text);
      let mut content = String::new();
      loop {
        match self.peek() {
          None | Some('\n') => return UnknownTokenSnafu { location: start }.fail(),
          Some('"') => break,
          Some('\\') if self.peek_at(1).is_some_and(|next| next != '\n') => {
            let before = text.len();
            self.bump_n(2, &mut text);
            content.push_str(&text[before..]);
          }
          Some(_) => {
            let before = text.len();
            self.bump(&mut text);
            content.push_str(&text[before..]);
          }
        }
      }
      self.bump(&mut text);
      return Ok((TokenKind::Str(content), text));
    }

    let longest = fixed_spellings()
      .filter(|fixed| self.starts_with(fixed.spelling()))
      .max_by_key(|fixed| fixed.spelling().len());
    if let Some(fixed) = longest {
      let len = fixed.spelling().chars().count();
      let runs_on = self.peek_at(len).is_some_and(is_ident_char);
      if !(fixed.is_word() && runs_on) {
        self.bump_n(len, &mut text);
        return Ok((fixed.kind(), text));
      }
    }

    if is_ident_char(c) {
      while self.peek().is_some_and(is_ident_char) {
        self.bump(&mut text);
      }
      return Ok((TokenKind::Ident(text.clone()), text));
    }

    UnknownTokenSnafu { location: start }.fail()
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut scanner = Scanner::new(input);
  let mut tokens = Vec::new();

  loop {
    let leading_trivia = scanner.trivia(false)?;
    let start = scanner.location;
    let (kind, text) = scanner.token()?;
    let end = scanner.location;
    let is_eof = kind == TokenKind::Eof;
    let trailing_trivia = if is_eof {
      String::new()
    } else {
      scanner.trivia(true)?
    };
    tokens.push(Token {
      kind,
      text,
      range: SourceRange::new(start, end),
      leading_trivia,
      trailing_trivia,
    });
    if is_eof {
      break;
    }
  }

  debug!(count = tokens.len(), "tokenized source");
  Ok(tokens)
}
