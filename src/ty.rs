//! Semantic types used by code generation to pick instruction forms.
//!
//! Sizes are recomputed from structure on every call; two equal type trees
//! always report the same size.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
  Int,
  Char,
  Pointer(Box<Type>),
  Array(Box<Type>, usize),
}

impl Type {
  pub fn pointer_to(base: Type) -> Self {
    Self::Pointer(Box::new(base))
  }

  pub fn array_of(element: Type, length: usize) -> Self {
    Self::Array(Box::new(element), length)
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Type::Array(..))
  }

  /// Pointers and arrays both take part in pointer arithmetic.
  pub fn is_pointer_like(&self) -> bool {
    self.base().is_some()
  }

  /// The referenced type of a pointer or the element type of an array.
  pub fn base(&self) -> Option<&Type> {
    match self {
      Type::Pointer(base) | Type::Array(base, _) => Some(base),
      Type::Int | Type::Char => None,
    }
  }

  /// Arrays decay to a pointer to their first element in value position.
  pub fn decay(&self) -> Type {
    match self {
      Type::Array(element, _) => Type::Pointer(element.clone()),
      other => other.clone(),
    }
  }

  pub fn size(&self) -> usize {
    match self {
      Type::Int => 8,
      Type::Char => 1,
      Type::Pointer(_) => 8,
      Type::Array(element, length) => length.saturating_mul(element.size()),
    }
  }

  /// Size in bytes, or `None` when it does not fit an `i64` displacement.
  pub fn checked_size(&self) -> Option<usize> {
    let size = match self {
      Type::Array(element, length) => length.checked_mul(element.checked_size()?)?,
      other => other.size(),
    };
    (size <= i64::MAX as usize).then_some(size)
  }

  pub fn align(&self) -> usize {
    match self {
      Type::Int | Type::Pointer(_) => 8,
      Type::Char => 1,
      Type::Array(element, _) => element.align(),
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Int => write!(f, "int"),
      Type::Char => write!(f, "char"),
      Type::Pointer(base) => write!(f, "{base}*"),
      Type::Array(element, length) => write!(f, "{element}[{length}]"),
    }
  }
}
