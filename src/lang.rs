//! Language and symbol hints.
//!
//! Both are best-effort guesses: the language comes from the file extension
//! and the symbol from the text git prints after a hunk header's closing
//! `@@` (its "function context").

use std::fmt;
use std::path::Path;

/// Languages recognized by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Ruby,
    Rust,
    C,
    Cpp,
    Nix,
    Shell,
}

impl Language {
    /// Lower-case tag used in atomic change tags
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Nix => "nix",
            Language::Shell => "shell",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guess the language of a file from its extension
pub fn detect_language(path: &str) -> Option<Language> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "py" => Language::Python,
        "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
        "ts" | "tsx" => Language::TypeScript,
        "go" => Language::Go,
        "java" => Language::Java,
        "rb" => Language::Ruby,
        "rs" => Language::Rust,
        "c" | "h" => Language::C,
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => Language::Cpp,
        "nix" => Language::Nix,
        "sh" | "bash" | "zsh" => Language::Shell,
        _ => return None,
    };
    Some(language)
}

/// Extract a symbol hint from the text after a hunk header's closing `@@`
pub fn symbol_from_trailing(trailing: &str) -> Option<&str> {
    let symbol = trailing.trim();
    (!symbol.is_empty()).then_some(symbol)
}

/// Collapse whitespace runs and lower-case a symbol so that matching
/// source and test hunks compare equal
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
