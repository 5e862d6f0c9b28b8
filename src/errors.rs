// File: src/errors.rs
//
// Error taxonomy for the Lox-like execution core.
// Compile errors are reported through a `CompileError` return value, never
// thrown; runtime errors are represented as `ErrorClass` values that travel
// through the catch-table unwinder exactly like any other user-visible
// throwable (see vm::unwind).

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0, file: None }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// The error class hierarchy rooted at `Error` (spec.md §7).
///
/// `BlockBreak`/`BlockContinue`/`BlockReturn` are internal, user-invisible
/// control-transfer errors used to implement non-local exits from blocks
/// (§7); they are caught exclusively by the construct that set up the
/// block and must never be visible to a user `catch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Error,
    ArgumentError,
    TypeError,
    NameError,
    SyntaxError,
    SystemError,
    LoadError,
    RecursionError,
    IndexError,
    ZeroDivisionError,
    BlockBreak,
    BlockContinue,
    BlockReturn,
}

impl ErrorClass {
    /// Name as it would appear as a constant / class name in user code.
    pub fn name(self) -> &'static str {
        match self {
            ErrorClass::Error => "Error",
            ErrorClass::ArgumentError => "ArgumentError",
            ErrorClass::TypeError => "TypeError",
            ErrorClass::NameError => "NameError",
            ErrorClass::SyntaxError => "SyntaxError",
            ErrorClass::SystemError => "SystemError",
            ErrorClass::LoadError => "LoadError",
            ErrorClass::RecursionError => "RecursionError",
            ErrorClass::IndexError => "IndexError",
            ErrorClass::ZeroDivisionError => "ZeroDivisionError",
            ErrorClass::BlockBreak => "BlockBreakError",
            ErrorClass::BlockContinue => "BlockContinueError",
            ErrorClass::BlockReturn => "BlockReturnError",
        }
    }

    /// Direct superclass, or `None` for the `Error` root. Mirrors the
    /// ancestor walk the catch-table scanner performs (spec.md §4.5).
    pub fn superclass(self) -> Option<ErrorClass> {
        match self {
            ErrorClass::Error => None,
            ErrorClass::BlockBreak | ErrorClass::BlockContinue | ErrorClass::BlockReturn => {
                None
            }
            ErrorClass::IndexError => Some(ErrorClass::ArgumentError),
            ErrorClass::ZeroDivisionError => Some(ErrorClass::Error),
            _ => Some(ErrorClass::Error),
        }
    }

    /// Whether `self` is `other` or a descendant of it in the class chain.
    pub fn is_a(self, other: ErrorClass) -> bool {
        let mut cur = Some(self);
        while let Some(c) = cur {
            if c == other {
                return true;
            }
            cur = c.superclass();
        }
        false
    }

    /// The three block-control classes never participate in user `catch`
    /// resolution (spec.md §7); the unwinder special-cases them.
    pub fn is_block_control(self) -> bool {
        matches!(self, ErrorClass::BlockBreak | ErrorClass::BlockContinue | ErrorClass::BlockReturn)
    }

    pub fn by_name(name: &str) -> Option<ErrorClass> {
        Some(match name {
            "Error" => ErrorClass::Error,
            "ArgumentError" => ErrorClass::ArgumentError,
            "TypeError" => ErrorClass::TypeError,
            "NameError" => ErrorClass::NameError,
            "SyntaxError" => ErrorClass::SyntaxError,
            "SystemError" => ErrorClass::SystemError,
            "LoadError" => ErrorClass::LoadError,
            "RecursionError" => ErrorClass::RecursionError,
            "IndexError" => ErrorClass::IndexError,
            "ZeroDivisionError" => ErrorClass::ZeroDivisionError,
            _ => return None,
        })
    }
}

/// A compile-time error: reported via a `Result`, never thrown (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub location: SourceLocation,
    pub note: Option<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self { message: message.into(), location, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}: {}", "CompileError".red().bold(), self.message.bold())?;
        writeln!(f, "  {} {}", "-->".bright_blue(), self.location)?;
        if let Some(note) = &self.note {
            writeln!(f, "   {} {}", "=".bright_cyan(), format!("note: {}", note).bright_cyan())?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// A single backtrace frame captured when an error is thrown (spec.md §4.5
/// step 1: "walking all contexts and frames and capturing `file:line
/// <func>` for each").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub file: String,
    pub line: usize,
    pub func: String,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.func)
    }
}

/// Runtime throwable: a value travelling through the catch table. Carries
/// the class that was thrown, a message and a backtrace. The payload value
/// itself lives on the heap (an `Instance` of `class`); this struct is the
/// VM-internal wrapper used while the throw is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub class: ErrorClass,
    pub message: String,
    pub backtrace: Vec<BacktraceFrame>,
}

impl RuntimeError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self { class, message: message.into(), backtrace: Vec::new() }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}: {}", self.class.name().red().bold(), self.message.bold())?;
        for frame in &self.backtrace {
            writeln!(f, "    {} {}", "from".bright_blue(), frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Computes the Levenshtein distance between two strings, used for
/// NameError "did you mean?" suggestions (spec.md's NameError on failed
/// method/constant resolution).
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];
    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(matrix[i - 1][j] + 1, matrix[i][j - 1] + 1),
                matrix[i - 1][j - 1] + cost,
            );
        }
    }

    matrix[len1][len2]
}

/// Finds the closest match from a list of candidates, for did-you-mean hints.
pub fn find_closest_match<'a>(target: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.as_str());
        }
    }

    best_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_class_ancestry_walks_to_root() {
        assert!(ErrorClass::ZeroDivisionError.is_a(ErrorClass::Error));
        assert!(ErrorClass::IndexError.is_a(ErrorClass::ArgumentError));
        assert!(ErrorClass::IndexError.is_a(ErrorClass::Error));
        assert!(!ErrorClass::TypeError.is_a(ErrorClass::ArgumentError));
    }

    #[test]
    fn block_control_errors_are_not_catchable_by_name() {
        assert!(ErrorClass::BlockBreak.is_block_control());
        assert!(!ErrorClass::BlockBreak.is_a(ErrorClass::Error));
    }

    #[test]
    fn closest_match_finds_typo() {
        let candidates = vec!["length".to_string(), "push".to_string()];
        assert_eq!(find_closest_match("lenght", &candidates), Some("length"));
    }
}
