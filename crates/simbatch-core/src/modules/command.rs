//! Macro invocation rendering and command-line display.
//!
//! A macro call is handed to the interpreter as one argv element, e.g.
//! `run_digi.C("tra.00001.root", "par.00001.root", "digi.00001.root", 1000)`.
//! String arguments are C string literals; numbers and booleans are bare.

use crate::common::constants::INTERPRETER_FLAGS;
use crate::domain::ProcessSpec;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum MacroArg {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl MacroArg {
    pub fn path(path: &Path) -> Self {
        Self::Str(path.to_string_lossy().into_owned())
    }

    pub fn optional_path(path: Option<&Path>) -> Self {
        path.map_or_else(|| Self::Str(String::new()), Self::path)
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Self::Str(value) => {
                out.push('"');
                for ch in value.chars() {
                    match ch {
                        '\\' => out.push_str("\\\\"),
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            Self::Int(value) => {
                let _ = write!(out, "{}", value);
            }
            Self::Bool(value) => out.push(if *value { '1' } else { '0' }),
        }
    }
}

impl From<&str> for MacroArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MacroArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&Path> for MacroArg {
    fn from(value: &Path) -> Self {
        Self::path(value)
    }
}

impl From<i64> for MacroArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for MacroArg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for MacroArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroCall {
    pub macro_path: PathBuf,
    pub args: Vec<MacroArg>,
}

impl MacroCall {
    pub fn new(macro_path: impl Into<PathBuf>) -> Self {
        Self {
            macro_path: macro_path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<MacroArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn render(&self) -> String {
        let mut out = self.macro_path.to_string_lossy().into_owned();
        out.push('(');
        for (position, arg) in self.args.iter().enumerate() {
            if position > 0 {
                out.push_str(", ");
            }
            arg.render_into(&mut out);
        }
        out.push(')');
        out
    }

    /// `<interpreter> -l -b -q <rendered call>`
    pub fn into_process(&self, interpreter: &str) -> ProcessSpec {
        ProcessSpec::new(interpreter)
            .args(INTERPRETER_FLAGS)
            .arg(self.render())
    }
}

/// Macro files live side by side under one directory of the workflow checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCatalog {
    dir: PathBuf,
}

impl MacroCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn macro_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

fn is_shell_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '/' | '=' | ':' | ',' | '%' | '+' | '@')
}

/// POSIX single-quote quoting; safe words are returned unchanged.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

pub fn display_line(spec: &ProcessSpec) -> String {
    std::iter::once(spec.program.as_str())
        .chain(spec.args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
