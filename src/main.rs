use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use rarmcc::{Options, Target, compile_with};

const USAGE: &str = "usage: rarmcc <input.c> [-o <output.s>] [--target darwin|linux] [-O0]";

#[derive(Debug)]
struct Args {
  input: PathBuf,
  output: PathBuf,
  options: Options,
}

impl Args {
  fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut options = Options::default();

    while let Some(arg) = args.next() {
      match arg.as_str() {
        "-o" => {
          let path = args.next().ok_or("-o needs a path")?;
          output = Some(PathBuf::from(path));
        }
        "--target" => {
          let name = args.next().ok_or("--target needs a value")?;
          options.target = name.parse::<Target>()?;
        }
        "-O0" => options.optimize = false,
        flag if flag.starts_with('-') => return Err(format!("unknown option '{flag}'")),
        path => {
          if input.is_some() {
            return Err("only one input file is accepted".to_string());
          }
          input = Some(PathBuf::from(path));
        }
      }
    }

    let input = input.ok_or("missing input file")?;
    let output = output.unwrap_or_else(|| input.with_extension("s"));
    Ok(Self {
      input,
      output,
      options,
    })
  }
}

fn init_tracing() {
  use tracing_subscriber::{EnvFilter, fmt, prelude::*};

  if env::var("RUST_LOG").is_ok() {
    tracing_subscriber::registry()
      .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
      .with(EnvFilter::from_default_env())
      .init();
  }
}

fn main() {
  init_tracing();

  let args = match Args::parse(env::args().skip(1)) {
    Ok(args) => args,
    Err(message) => {
      eprintln!("{message}\n{USAGE}");
      process::exit(1);
    }
  };

  let source = match fs::read_to_string(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("{}: {err}", args.input.display());
      process::exit(1);
    }
  };

  let asm = match compile_with(&source, &args.options) {
    Ok(asm) => asm,
    Err(err) => {
      eprintln!("{}:{}", args.input.display(), err.render(&source));
      process::exit(1);
    }
  };

  if let Err(err) = fs::write(&args.output, asm) {
    eprintln!("{}: {err}", args.output.display());
    process::exit(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Result<Args, String> {
    Args::parse(args.iter().map(|arg| arg.to_string()))
  }

  #[test]
  fn output_defaults_next_to_input() {
    let args = parse(&["dir/prog.c"]).unwrap();
    assert_eq!(args.output, PathBuf::from("dir/prog.s"));
    assert!(args.options.optimize);
  }

  #[test]
  fn flags_are_applied() {
    let args = parse(&["a.c", "-o", "out.s", "--target", "linux", "-O0"]).unwrap();
    assert_eq!(args.output, PathBuf::from("out.s"));
    assert_eq!(args.options.target, Target::Linux);
    assert!(!args.options.optimize);
  }

  #[test]
  fn bad_arguments_are_rejected() {
    assert!(parse(&[]).is_err());
    assert!(parse(&["a.c", "b.c"]).is_err());
    assert!(parse(&["a.c", "--target"]).is_err());
    assert!(parse(&["a.c", "--target", "windows"]).is_err());
    assert!(parse(&["a.c", "-x"]).is_err());
  }
}
