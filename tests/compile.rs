use std::collections::HashMap;

use pretty_assertions::assert_eq;
use rarmcc::asm::{Instruction, Operand, Register};
use rarmcc::tokenizer::SourceLocation;
use rarmcc::{CompileError, Options, Target, codegen, compile_with, optimizer, parser, tokenizer};

fn linux() -> Options {
  Options::new(Target::Linux)
}

fn darwin() -> Options {
  Options::new(Target::Darwin)
}

fn lower(source: &str, optimize: bool) -> Vec<Instruction> {
  let tokens = tokenizer::tokenize(source).unwrap();
  let file = parser::parse(tokens).unwrap();
  let program = codegen::generate(&file).unwrap();
  if optimize {
    optimizer::optimize(program)
  } else {
    program
  }
}

/// Runs straight-line integer code up to the first `ret` and returns x0.
fn run(program: &[Instruction]) -> i64 {
  let mut regs: HashMap<Register, i64> = HashMap::new();
  let mut stack = Vec::new();
  let value = |regs: &HashMap<Register, i64>, operand: &Operand| match operand {
    Operand::Reg(reg) => regs.get(reg).copied().unwrap_or(0),
    Operand::Imm(imm) => *imm,
  };

  for instruction in program {
    match instruction {
      Instruction::MovImm { dst, value } => {
        regs.insert(*dst, *value);
      }
      Instruction::Push(reg) => stack.push(regs.get(reg).copied().unwrap_or(0)),
      Instruction::Pop(reg) => {
        let top = stack.pop().expect("stack underflow");
        regs.insert(*reg, top);
      }
      Instruction::Add { dst, lhs, rhs } => {
        let result = regs[lhs] + value(&regs, rhs);
        regs.insert(*dst, result);
      }
      Instruction::Sub { dst, lhs, rhs } if *dst != Register::Sp => {
        let result = regs[lhs] - value(&regs, rhs);
        regs.insert(*dst, result);
      }
      Instruction::Mul { dst, lhs, rhs } => {
        let result = regs[lhs] * regs[rhs];
        regs.insert(*dst, result);
      }
      Instruction::SDiv { dst, lhs, rhs } => {
        let result = regs[lhs] / regs[rhs];
        regs.insert(*dst, result);
      }
      Instruction::Neg { dst, src } => {
        let result = -regs[src];
        regs.insert(*dst, result);
      }
      Instruction::Ret => return regs[&Register::X0],
      _ => {}
    }
  }
  panic!("no ret reached");
}

#[test]
fn single_literal_returns_it() {
  let asm = compile_with("5", &linux()).unwrap();
  assert_eq!(
    asm,
    "\
.globl main
.p2align 2
main:
    stp x29, x30, [sp, #-16]!
    mov x29, sp
    mov x0, #5
    mov sp, x29
    ldp x29, x30, [sp], #16
    ret
"
  );
}

#[test]
fn darwin_spells_the_entry_point_with_underscore() {
  let asm = compile_with("5", &darwin()).unwrap();
  assert!(asm.starts_with(".globl _main\n.p2align 2\n_main:\n"), "{asm}");
}

#[test]
fn arithmetic_evaluates() {
  for optimize in [false, true] {
    assert_eq!(run(&lower("5+20-4", optimize)), 21);
    assert_eq!(run(&lower("2*(3+4)-10/3", optimize)), 11);
    assert_eq!(run(&lower("-3*-4", optimize)), 12);
    assert_eq!(run(&lower("-(-7)", optimize)), 7);
  }
}

#[test]
fn optimizer_only_shrinks_the_output() {
  let source = "int main() { int a; a = 1 + 2; return a * 3; }";
  let plain = lower(source, false);
  let optimized = lower(source, true);
  assert!(optimized.len() < plain.len());
  let plain_text = compile_with(
    source,
    &Options {
      optimize: false,
      ..linux()
    },
  )
  .unwrap();
  assert!(plain_text.contains("str x0, [sp, #-16]!\n    ldr x0, [sp], #16"));
}

#[test]
fn reserved_tokens_back_to_back() {
  let err = compile_with("1 + ;", &linux()).unwrap_err();
  assert!(matches!(err, CompileError::InvalidSyntax { .. }), "{err}");
  assert_eq!(err.location(), SourceLocation::new(1, 5));
}

#[test]
fn undeclared_variable() {
  let err = compile_with("int main(){ a = 0; }", &linux()).unwrap_err();
  assert_eq!(
    err,
    CompileError::NoSuchVariable {
      name: "a".to_string(),
      location: SourceLocation::new(1, 13),
    }
  );
}

#[test]
fn unknown_character() {
  let err = compile_with("1 ^", &linux()).unwrap_err();
  assert_eq!(
    err,
    CompileError::UnknownToken {
      location: SourceLocation::new(1, 3),
    }
  );
  assert_eq!(err.render("1 ^"), "1:3\n1 ^\n  ^ unknown token");
}

#[test]
fn global_array_is_zero_padded() {
  let asm = compile_with("int a[3] = {1,2};", &linux()).unwrap();
  assert_eq!(
    asm,
    "\
.section .data
.p2align 3
a:
    .quad 1
    .quad 2
    .zero 8
"
  );
}

#[test]
fn output_layout() {
  let source = r#"
int counter;
char *greeting = "hi";

int add(int a, int b) { return a + b; }

int main() {
  char *s;
  s = "hi";
  counter = add(1, 2);
  return counter;
}
"#;
  let asm = compile_with(source, &linux()).unwrap();
  let lines: Vec<&str> = asm.lines().collect();
  assert_eq!(lines[0], ".globl add, main");

  let add = lines.iter().position(|l| *l == "add:").unwrap();
  let main = lines.iter().position(|l| *l == "main:").unwrap();
  let data = lines.iter().position(|l| *l == ".section .data").unwrap();
  let strings = lines.iter().position(|l| *l == ".section .rodata").unwrap();
  assert!(add < main && main < data && data < strings);
  assert_eq!(lines[add - 1], ".p2align 2");

  assert!(lines.contains(&".comm counter, 8, 8"));
  assert!(lines.contains(&"    .quad strings0"));
  assert!(lines.contains(&"    bl add"));
  assert!(lines.contains(&"    adrp x0, counter"));
  assert!(lines.contains(&"    add x0, x0, :lo12:counter"));
  assert_eq!(lines.iter().filter(|l| **l == "strings0:").count(), 1);
  assert_eq!(lines.last(), Some(&"    .asciz \"hi\""));
}

#[test]
fn darwin_relocations_and_sections() {
  let source = "int g; int main() { char *s; s = \"x\"; g = 1; return g; }";
  let asm = compile_with(source, &darwin()).unwrap();
  assert!(asm.contains("    adrp x0, g@PAGE\n    add x0, x0, g@PAGEOFF\n"));
  assert!(asm.contains(".section __DATA,__data\n.comm g, 8, 3\n"));
  assert!(asm.contains(".section __TEXT,__cstring,cstring_literals\nstrings0:\n"));
}

#[test]
fn control_flow_labels_per_target() {
  let source = "int main() { int i; i = 0; while (i < 3) i = i + 1; if (i) return 1; else return 0; }";
  let asm = compile_with(source, &linux()).unwrap();
  for label in [".Lbegin0:", ".Lend0:", ".Lelse1:", ".Lend1:"] {
    assert!(asm.lines().any(|l| l == label), "{label} missing from\n{asm}");
  }
  assert!(asm.contains("    b.eq .Lend0\n"));

  let asm = compile_with(source, &darwin()).unwrap();
  assert!(asm.lines().any(|l| l == "Lbegin0:"));
  assert!(asm.contains("    b Lbegin0\n"));
}

#[test]
fn char_access_uses_byte_instructions() {
  let asm = compile_with("int main() { char c; c = 65; return c; }", &linux()).unwrap();
  assert!(asm.contains("strb w1, [x0]"), "{asm}");
  assert!(asm.contains("ldrb w0, [x0]"), "{asm}");
}

#[test]
fn parameters_are_spilled_to_the_frame() {
  let asm = compile_with("int f(int a, char b) { return a; }", &linux()).unwrap();
  assert!(asm.contains("    str x0, [x29, #-8]\n    strb w1, [x29, #-9]\n"), "{asm}");
  assert!(asm.contains("    sub sp, sp, #16\n"));
}

#[test]
fn large_constants_use_movz_and_movk() {
  let asm = compile_with("70000", &linux()).unwrap();
  assert!(asm.contains("    movz x0, #4464\n    movk x0, #1, lsl #16\n"), "{asm}");
}
