//! ui::output
//!
//! Terminal output for command handlers.
//!
//! # Design
//!
//! Results go to stdout so they can be piped; progress notes, warnings and
//! errors go to stderr. Everything except errors is suppressed by `--quiet`.
//! Handlers never print secrets; callers pass already-masked values.

use std::fmt::Display;
use std::io::{self, Write};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only machine-readable results and errors
    Quiet,
    /// Standard output
    Normal,
    /// Standard output plus debug logs
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags. Quiet wins over debug.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Whether non-essential output is suppressed.
    pub fn is_quiet(self) -> bool {
        self == Verbosity::Quiet
    }
}

/// Print a result line to stdout.
pub fn print(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        println!("{}", message);
    }
}

/// Print a progress note to stderr, keeping stdout clean for results.
pub fn progress(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        eprintln!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning to stderr.
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        eprintln!("warning: {}", message);
    }
}

/// Print a success message to stdout.
pub fn success(message: impl Display, verbosity: Verbosity) {
    if !verbosity.is_quiet() {
        println!("{}", message);
    }
}

/// Print labelled fields under a heading, with values aligned.
///
/// ```text
/// Authenticated via OAuth 2.0 (Bearer auth)
///   Source:   /home/dev/.config/bbkt/credentials.json
///   Scopes:   pullrequest, repository
/// ```
pub fn fields(heading: impl Display, fields: &[(&str, String)], verbosity: Verbosity) {
    if verbosity.is_quiet() {
        return;
    }
    let stdout = io::stdout();
    let _ = write_fields(&mut stdout.lock(), heading, fields);
}

fn write_fields<W: Write>(
    out: &mut W,
    heading: impl Display,
    fields: &[(&str, String)],
) -> io::Result<()> {
    writeln!(out, "{}", heading)?;
    let width = fields.iter().map(|(label, _)| label.len() + 1).max().unwrap_or(0);
    for (label, value) in fields {
        writeln!(out, "  {:<width$} {}", format!("{}:", label), value, width = width)?;
    }
    Ok(())
}
