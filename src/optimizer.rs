//! Peephole passes over the generated instruction list.

use tracing::debug;

use crate::asm::Instruction;

/// A rewrite from one instruction list to another.
pub type Pass = fn(Vec<Instruction>) -> Vec<Instruction>;

/// Passes in the order they run.
pub const PIPELINE: &[(&str, Pass)] = &[("push-pop", remove_push_pop)];

/// Run every pass of the pipeline in sequence.
pub fn optimize(program: Vec<Instruction>) -> Vec<Instruction> {
  PIPELINE.iter().fold(program, |program, (name, pass)| {
    let before = program.len();
    let program = pass(program);
    debug!(
      pass = name,
      removed = before - program.len(),
      "optimizer pass"
    );
    program
  })
}

/// Delete `push R` immediately followed by `pop R`.
///
/// One left-to-right scan: after a pair is dropped, the instructions that
/// become adjacent are not looked at again.
pub fn remove_push_pop(program: Vec<Instruction>) -> Vec<Instruction> {
  let mut out = Vec::with_capacity(program.len());
  let mut iter = program.into_iter().peekable();

  while let Some(instruction) = iter.next() {
    if let Instruction::Push(pushed) = instruction
      && let Some(Instruction::Pop(popped)) = iter.peek()
      && *popped == pushed
    {
      iter.next();
      continue;
    }
    out.push(instruction);
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asm::Instruction::{Pop, Push, Ret};
  use crate::asm::Register::{X0, X1};
  use pretty_assertions::assert_eq;

  #[test]
  fn drops_matching_pair() {
    assert_eq!(remove_push_pop(vec![Push(X0), Pop(X0), Ret]), vec![Ret]);
  }

  #[test]
  fn keeps_pairs_on_different_registers() {
    let program = vec![Push(X0), Pop(X1)];
    assert_eq!(remove_push_pop(program.clone()), program);
  }

  #[test]
  fn keeps_separated_pairs() {
    let program = vec![Push(X0), Ret, Pop(X0)];
    assert_eq!(remove_push_pop(program.clone()), program);
  }

  #[test]
  fn does_not_revisit_after_removal() {
    // Removing the inner pair exposes an outer one, which stays.
    let program = vec![Push(X1), Push(X0), Pop(X0), Pop(X1)];
    assert_eq!(remove_push_pop(program), vec![Push(X1), Pop(X1)]);
  }

  #[test]
  fn pipeline_runs_the_pass() {
    assert_eq!(
      optimize(vec![Push(X0), Pop(X0), Push(X0), Pop(X0)]),
      Vec::<Instruction>::new()
    );
  }
}
