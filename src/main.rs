// File: src/main.rs
//
// CLI entry point (spec.md §6). `clap`-derived, in the teacher's own
// `main.rs` shape (a `ClapParser` struct plus a `Subcommand` for `Repl`),
// retargeted at this spec's flags and exit codes instead of the teacher's
// `Bench`/`Test`/`Profile`/JIT subcommands.

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use loxi::compiler::Compiler;
use loxi::gc::StressMode;
use loxi::object::ObjKind;
use loxi::optimizer;
use loxi::parser;
use loxi::repl::Repl;
use loxi::value::Value;
use loxi::vm::Thread;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(ClapParser)]
#[command(name = "loxi", version, about = "A lean, class-based scripting language", long_about = None)]
struct Cli {
    /// Execute FILE as the main program.
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<PathBuf>,

    /// Evaluate STRING as the program.
    #[arg(short = 'e', value_name = "STRING", conflicts_with = "file")]
    eval: Option<String>,

    /// Prepend PATH(s) to the load path used by loadScript/requireScript.
    #[arg(short = 'L', value_name = "PATH", value_delimiter = ':')]
    load_path: Vec<String>,

    /// Stop after parsing.
    #[arg(long)]
    parse_only: bool,

    /// Stop after compiling; do not run.
    #[arg(long)]
    compile_only: bool,

    /// Print lexer tokens before compiling.
    #[arg(long)]
    debug_tokens: bool,

    /// Print compiled bytecode before running.
    #[arg(long)]
    debug_bytecode: bool,

    /// Trace VM opcode dispatch.
    #[arg(long = "debug-VM")]
    debug_vm: bool,

    /// Trace GVL quantum bookkeeping.
    #[arg(long)]
    debug_threads: bool,

    /// Print the parsed AST.
    #[arg(long)]
    print_ast: bool,

    /// Disable the peephole optimizer.
    #[arg(long)]
    disable_bopt: bool,

    /// Disable the garbage collector.
    #[arg(long = "disable-GC")]
    disable_gc: bool,

    /// Force a GC stress mode.
    #[arg(long = "stress-GC", value_enum)]
    stress_gc: Option<StressGcArg>,

    /// Remaining arguments, exposed to the script as `ARGV`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    argv: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive REPL (default when no FILE or `-e` is given).
    Repl,
}

#[derive(Clone, Copy, ValueEnum)]
enum StressGcArg {
    Young,
    Full,
    Both,
    None,
}

fn main() {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Repl)) || (cli.file.is_none() && cli.eval.is_none()) {
        match Repl::new() {
            Ok(mut repl) => {
                if let Err(e) = repl.run() {
                    eprintln!("REPL error: {e}");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Failed to start REPL: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let (source, file_label) = if let Some(path) = &cli.file {
        match std::fs::read_to_string(path) {
            Ok(s) => (s, Some(path.clone())),
            Err(e) => {
                eprintln!("cannot read '{}': {e}", path.display());
                std::process::exit(1);
            }
        }
    } else {
        (cli.eval.clone().expect("clap guarantees file or eval is set"), None)
    };

    std::process::exit(run_source(&cli, &source, file_label));
}

fn run_source(cli: &Cli, source: &str, file_path: Option<PathBuf>) -> i32 {
    if cli.debug_tokens {
        for tok in loxi::lexer::tokenize(source) {
            eprintln!("{tok:?}");
        }
    }

    let stmts = match parser::parse_source(source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    if cli.print_ast {
        eprintln!("{stmts:#?}");
    }
    if cli.parse_only {
        return 0;
    }

    let mut chunk = match Compiler::compile_keep_last(&stmts) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    if !cli.disable_bopt {
        optimizer::optimize(&mut chunk, false);
    }
    if cli.debug_bytecode {
        eprintln!("{:#?}", chunk.code);
    }
    if cli.compile_only {
        return 0;
    }

    let mut thread = Thread::new();
    thread.debug_vm = cli.debug_vm;
    thread.set_gc_enabled(!cli.disable_gc);
    if let Some(mode) = cli.stress_gc {
        thread.set_stress(match mode {
            StressGcArg::Young => StressMode::Young,
            StressGcArg::Full => StressMode::Full,
            StressGcArg::Both => StressMode::Both,
            StressGcArg::None => StressMode::None,
        });
    }
    install_script_globals(&mut thread, file_path.as_deref(), &cli.argv);

    let file_label = file_path.map(|p| p.to_string_lossy().into_owned());
    match thread.interpret(Rc::new(chunk), file_label) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

/// Populates the per-script read-only globals and `ARGV` (spec.md §6).
fn install_script_globals(thread: &mut Thread, file_path: Option<&std::path::Path>, argv: &[String]) {
    let file_value = match file_path.and_then(|p| std::fs::canonicalize(p).ok()) {
        Some(abs) => alloc_string(thread, abs.to_string_lossy().into_owned()),
        None => Value::Nil,
    };
    let dir_value = match file_path.and_then(|p| p.parent()) {
        Some(dir) if !dir.as_os_str().is_empty() => alloc_string(thread, dir.to_string_lossy().into_owned()),
        _ => Value::Nil,
    };
    let func_value = alloc_string(thread, "(main)".to_string());
    let argv_items: Vec<Value> = argv.iter().map(|a| alloc_string(thread, a.clone())).collect();
    let argv_value = Value::Object(thread.heap.alloc(ObjKind::Array(argv_items)));

    thread.globals.insert("__FILE__".to_string(), file_value);
    thread.globals.insert("__DIR__".to_string(), dir_value);
    thread.globals.insert("__FUNC__".to_string(), func_value);
    thread.globals.insert("ARGV".to_string(), argv_value);
}

fn alloc_string(thread: &mut Thread, s: String) -> Value {
    Value::Object(thread.heap.alloc(ObjKind::String { value: s, interned: false }))
}
