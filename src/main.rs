use clap::Parser;
use log::{LevelFilter, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::panic;
use std::path::PathBuf;
use std::process;
use tinylisp::Error;
use tinylisp::ast::Value;
use tinylisp::evaluator::Interpreter;
use tinylisp::reader::{ParseConfig, read_program};

#[derive(Parser)]
#[command(name = "tinylisp")]
#[command(about = "Run TinyLisp programs or start an interactive session")]
struct Cli {
    /// Program to run; without it the interactive loop starts
    file: Option<PathBuf>,

    /// Only read the program and report how many forms it holds
    #[arg(long)]
    check: bool,

    /// Start the interactive loop (after running FILE, if given)
    #[arg(long)]
    repl: bool,

    /// Log evaluator activity at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn panic_exit(msg: &str) -> ! {
    eprintln!("[Panic]: {msg}");
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_module("tinylisp", LevelFilter::Debug);
    }
    logger.init();

    let mut interp = Interpreter::new();

    if let Some(path) = &cli.file {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => panic_exit(&format!("{}: {}", path.display(), Error::from(err))),
        };

        let forms = match read_program(&source, interp.interner_mut(), ParseConfig::default()) {
            Ok(forms) => forms,
            Err(err) => panic_exit(&err.to_string()),
        };

        if cli.check {
            println!("{}: {} forms", path.display(), forms.len());
            return;
        }

        let result = interp.run_forms(forms);
        if let Value::Error(reason) = &result {
            warn!("program finished with an error: {reason}");
        }

        if !cli.repl {
            return;
        }
    } else if cli.check {
        panic_exit("--check needs a FILE");
    }

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| run_repl(&mut interp)));

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl(interp: &mut Interpreter) {
    println!("TinyLisp interactive interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => panic_exit(&format!("could not initialize REPL: {err}")),
    };

    let config = ParseConfig {
        handle_comments: true,
        ..ParseConfig::default()
    };

    loop {
        match rl.readline("tinylisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(interp);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match read_program(line, interp.interner_mut(), config) {
                    Ok(forms) => {
                        for form in &forms {
                            let result = interp.eval(form);
                            println!("{result}");
                            if result.is_error() {
                                break;
                            }
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("TinyLisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show builtins and current bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Language:");
    println!("  Numbers: 42 (negative values via (- 0 5))");
    println!("  Strings: \"text\" (no escapes)");
    println!("  Constants: T, F, NIL (only T is true)");
    println!("  Quote: 'x, '(1 2 3)");
    println!("  Arithmetic: +, -, *, /");
    println!("  Comparison: <, >, <=, >=, eq");
    println!("  Conditionals: if, cond");
    println!("  Definitions: setq, defun");
    println!("  Output: print");
    println!();
    println!("Examples:");
    println!("  (setq x 10)");
    println!("  (defun add1 (n) (+ n 1))");
    println!("  (if (< x 5) 'small 'large)");
    println!("  (cond (eq x 1) \"one\" (eq x 10) \"ten\" \"other\")");
    println!();
}

fn print_environment(interp: &Interpreter) {
    let builtins = interp.builtins().ops();
    println!("Built-in operations ({}):", builtins.len());
    let mut col = 0;
    for op in &builtins {
        print!("  {:<15}", op.name);
        col += 1;
        if col % 4 == 0 {
            println!();
        }
    }
    if col % 4 != 0 {
        println!();
    }
    println!();

    let bindings = interp.env().bindings();
    if bindings.is_empty() {
        println!("No user bindings.");
        return;
    }

    println!("User bindings ({}):", bindings.len());
    for (name, value) in bindings {
        println!("  {name} = {value}");
    }
}
