// File: src/repl.rs
//
// Interactive REPL. Grounded in the teacher's own `repl.rs`: rustyline for
// line editing/history, colored for banner/error output, a brace/bracket/
// paren/string balance check to decide whether input is ready to run, and
// `:`-prefixed session commands. Retargeted at the bytecode pipeline
// (lexer -> parser -> compiler -> optimizer -> vm::Thread) instead of the
// teacher's tree-walking `Interpreter`.

use crate::compiler::Compiler;
use crate::errors::RuntimeError;
use crate::optimizer;
use crate::parser;
use crate::vm::Thread;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub struct Repl {
    thread: Thread,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { thread: Thread::new(), editor })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║               Loxi REPL - Interactive Shell           ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: end with unclosed braces", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();
        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() { "loxi> ".bright_green().to_string() } else { "....> ".bright_blue().to_string() };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to keep the REPL running, false to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                self.thread = Thread::new();
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!();
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  Show defined globals", ":vars".bright_yellow(), " or :v    ".dimmed());
        println!("  {}{}  Reset the session", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Multi-line input:".bright_cyan().bold());
        println!("  Leave braces/brackets/parens unclosed to continue on the next line.");
        println!();
    }

    fn show_variables(&self) {
        println!();
        println!("{}", "Globals:".bright_cyan().bold());
        let mut names: Vec<&String> = self.thread.globals.keys().collect();
        names.sort();
        for name in names {
            let v = self.thread.globals[name];
            println!("  {} = {}", name.bright_yellow(), self.thread.display_value(v));
        }
        println!();
    }

    fn eval_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }
        match compile_for_repl(input) {
            Ok(chunk) => match self.thread.interpret(chunk, None) {
                Ok(v) => self.print_value(v),
                Err(err) => self.print_runtime_error(&err),
            },
            Err(err) => println!("{} {}", "Error:".bright_red(), err),
        }
    }

    fn print_value(&self, v: crate::value::Value) {
        println!("{} {}", "=>".bright_blue(), self.thread.display_value(v));
    }

    fn print_runtime_error(&self, err: &RuntimeError) {
        println!("{} {}", "Error:".bright_red().bold(), err.to_string().trim_end());
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("failed to create REPL")
    }
}

fn compile_for_repl(source: &str) -> Result<crate::iseq::ChunkRef, String> {
    let stmts = parser::parse_source(source).map_err(|e| e.to_string())?;
    let mut chunk = Compiler::compile_keep_last(&stmts).map_err(|e| e.to_string())?;
    optimizer::optimize(&mut chunk, true);
    Ok(std::rc::Rc::new(chunk))
}

/// True if brackets/braces/parens are balanced and we're not mid-string, so
/// the REPL should run the buffered input rather than keep reading lines.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;
    let mut in_comment = false;

    for ch in trimmed.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            continue;
        }
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' | '\'' => in_string = !in_string,
            '#' if !in_string => in_comment = true,
            '{' | '[' | '(' if !in_string => depth += 1,
            '}' | ']' | ')' if !in_string => depth -= 1,
            _ => {}
        }
    }

    !in_string && depth == 0
}
