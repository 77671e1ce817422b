//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` turns source text into tokens with trivia and locations.
//! - `parser` builds the lossless syntax tree defined in `syntax`.
//! - `codegen` lowers the tree into the instruction model of `asm`.
//! - `optimizer` runs peephole passes over those instructions.
//! - `asm::Printer` spells the result for a target.
//! - `error` holds the diagnostics shared by every stage.

pub mod asm;
pub mod codegen;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod parser;
pub mod syntax;
pub mod tokenizer;
pub mod ty;

pub use config::{Options, Target};
pub use error::{CompileError, CompileResult};

/// Compile a source string into assembly for the host target.
pub fn compile(source: &str) -> CompileResult<String> {
  compile_with(source, &Options::default())
}

/// Compile a source string into assembly with explicit options.
pub fn compile_with(source: &str, options: &Options) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let file = parser::parse(tokens)?;
  let mut program = codegen::generate(&file)?;
  if options.optimize {
    program = optimizer::optimize(program);
  }
  Ok(asm::Printer::new(options.target).print(&program))
}
