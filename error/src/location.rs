//! Source-location capture for error call sites.

use std::fmt;

/// A captured source location, analogous to [`std::panic::Location`] but
/// `Snafu`-friendly (implements `Default` so it can be used with
/// `#[snafu(implicit)]`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[track_caller]
    pub fn here() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self::here()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn here_captures_this_file() {
        let loc = Location::here();
        assert!(loc.file.ends_with("location.rs"));
        assert!(loc.line > 0);
    }

    #[test]
    fn display_matches_file_line_column() {
        let loc = Location {
            file: "foo.rs",
            line: 12,
            column: 5,
        };
        assert_eq!(loc.to_string(), "foo.rs:12:5");
    }
}
