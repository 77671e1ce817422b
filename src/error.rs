//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage stops at the first problem it finds and reports it as one of
//! three structured variants carrying the exact source location of the
//! offending token. Turning a location into something a human can read is
//! left to [`CompileError::render`], which the command-line driver calls.

use snafu::Snafu;

use crate::tokenizer::SourceLocation;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  /// A character sequence that matches no token rule.
  #[snafu(display("{location}: unknown token"))]
  UnknownToken { location: SourceLocation },

  /// The token stream (or an initializer shape) does not fit the grammar.
  #[snafu(display("{location}: invalid syntax: {message}"))]
  InvalidSyntax {
    location: SourceLocation,
    message: String,
  },

  /// An identifier with no declaration visible from the current function.
  #[snafu(display("{location}: no such variable '{name}'"))]
  NoSuchVariable {
    name: String,
    location: SourceLocation,
  },
}

impl CompileError {
  /// Where the error was detected.
  pub fn location(&self) -> SourceLocation {
    match self {
      Self::UnknownToken { location }
      | Self::InvalidSyntax { location, .. }
      | Self::NoSuchVariable { location, .. } => *location,
    }
  }

  /// Format the offending source line with a caret under the error column.
  pub fn render(&self, source: &str) -> String {
    let location = self.location();
    let line = source
      .lines()
      .nth(location.line.saturating_sub(1))
      .unwrap_or_default();
    let prefix: String = line
      .chars()
      .take(location.column.saturating_sub(1))
      .map(|c| if c == '\t' { '\t' } else { ' ' })
      .collect();
    let message = match self {
      Self::UnknownToken { .. } => "unknown token".to_string(),
      Self::InvalidSyntax { message, .. } => message.clone(),
      Self::NoSuchVariable { name, .. } => format!("no such variable '{name}'"),
    };
    format!("{location}\n{line}\n{prefix}^ {message}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn render_points_at_column() {
    let err = CompileError::UnknownToken {
      location: SourceLocation::new(2, 3),
    };
    let rendered = err.render("int x;\n1 ^ 2\n");
    assert_eq!(rendered, "2:3\n1 ^ 2\n  ^ unknown token");
  }

  #[test]
  fn render_keeps_tabs_aligned() {
    let err = CompileError::NoSuchVariable {
      name: "a".to_string(),
      location: SourceLocation::new(1, 2),
    };
    assert_eq!(err.render("\ta = 0;"), "1:2\n\ta = 0;\n\t^ no such variable 'a'");
  }

  #[test]
  fn location_is_shared_by_all_variants() {
    let location = SourceLocation::new(4, 7);
    let err = CompileError::InvalidSyntax {
      location,
      message: "expected \";\"".to_string(),
    };
    assert_eq!(err.location(), location);
    assert_eq!(err.to_string(), "4:7: invalid syntax: expected \";\"");
  }
}
