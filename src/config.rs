//! Compile options.
//!
//! The target only changes spelling in the printed assembly (symbol prefixes,
//! page-offset relocations and section names); code generation is the same
//! for both.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
  /// Mach-O conventions (`_main`, `@PAGE`/`@PAGEOFF`, `__DATA` sections).
  Darwin,
  /// ELF conventions (`main`, `:lo12:`, `.data`/`.rodata`).
  Linux,
}

impl Target {
  pub fn host() -> Self {
    if cfg!(target_os = "macos") {
      Target::Darwin
    } else {
      Target::Linux
    }
  }
}

impl Default for Target {
  fn default() -> Self {
    Target::host()
  }
}

impl FromStr for Target {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "darwin" | "macos" => Ok(Target::Darwin),
      "linux" => Ok(Target::Linux),
      other => Err(format!("unknown target '{other}' (expected darwin or linux)")),
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Darwin => write!(f, "darwin"),
      Target::Linux => write!(f, "linux"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
  pub target: Target,
  /// Run the peephole pipeline over the generated instructions.
  pub optimize: bool,
}

impl Options {
  pub fn new(target: Target) -> Self {
    Self {
      target,
      optimize: true,
    }
  }
}

impl Default for Options {
  fn default() -> Self {
    Self::new(Target::host())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn target_names_round_trip() {
    for target in [Target::Darwin, Target::Linux] {
      assert_eq!(target.to_string().parse::<Target>(), Ok(target));
    }
    assert!("windows".parse::<Target>().is_err());
  }

  #[test]
  fn optimisation_is_on_by_default() {
    assert!(Options::default().optimize);
    assert_eq!(Options::new(Target::Linux).target, Target::Linux);
  }
}
