//! Porcelain status parsing.
//!
//! Translates one line of porcelain-v1 status output into a change kind and
//! an affected path. Directory paths are distinguished from file paths by
//! the trailing separator porcelain emits for untracked directories. Any
//! code outside the fixed table maps to `Unknown`, which the reconciler
//! treats as a fatal classification error rather than guessing.

use crate::tree_path::TreePath;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Untracked,
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Typechange,
    /// Updated but unmerged.
    Updated,
    Unknown,
}

impl ChangeKind {
    pub fn from_code(code: &str) -> ChangeKind {
        match code {
            "??" => ChangeKind::Untracked,
            "A" => ChangeKind::Added,
            "M" => ChangeKind::Modified,
            "D" => ChangeKind::Deleted,
            "R" => ChangeKind::Renamed,
            "C" => ChangeKind::Copied,
            "T" => ChangeKind::Typechange,
            "U" => ChangeKind::Updated,
            _ => ChangeKind::Unknown,
        }
    }
}

/// One parsed status line. The path is relative to the repository root and
/// carries its file-vs-directory kind; the raw line is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: ChangeKind,
    pub path: TreePath,
    pub raw: String,
}

/// Parse the full output of a porcelain status query.
///
/// Each non-empty line is split on whitespace: the first token selects the
/// change kind, the second is the affected path. Renamed lines carry extra
/// tokens past the path; only the pre-rename name is captured. A line with
/// no path token is surfaced as `Unknown` so it fails loudly downstream.
pub fn parse_porcelain(output: &str) -> Vec<StatusLine> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<StatusLine> {
    let mut tokens = line.split_whitespace();
    let code = tokens.next()?;

    let (kind, path) = match tokens.next() {
        Some(path) => (ChangeKind::from_code(code), path),
        None => (ChangeKind::Unknown, ""),
    };

    let path = if let Some(dir) = path.strip_suffix('/') {
        TreePath::Dir(PathBuf::from(dir))
    } else {
        TreePath::File(PathBuf::from(path))
    };

    Some(StatusLine {
        kind,
        path,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(line: &str) -> StatusLine {
        let parsed = parse_porcelain(line);
        assert_eq!(parsed.len(), 1, "expected one status line from {line:?}");
        parsed.into_iter().next().unwrap()
    }

    #[test]
    fn test_code_table() {
        let table = [
            ("??", ChangeKind::Untracked),
            ("A", ChangeKind::Added),
            ("M", ChangeKind::Modified),
            ("D", ChangeKind::Deleted),
            ("R", ChangeKind::Renamed),
            ("C", ChangeKind::Copied),
            ("T", ChangeKind::Typechange),
            ("U", ChangeKind::Updated),
        ];

        for (code, kind) in table {
            assert_eq!(ChangeKind::from_code(code), kind, "code {code:?}");
        }
    }

    #[test]
    fn test_untracked_file() {
        let line = parse_one("?? notes.ipynb");

        assert_eq!(line.kind, ChangeKind::Untracked);
        assert_eq!(line.path, TreePath::File(PathBuf::from("notes.ipynb")));
    }

    #[test]
    fn test_trailing_separator_marks_directory() {
        let line = parse_one("?? datasets/");

        assert_eq!(line.kind, ChangeKind::Untracked);
        assert_eq!(line.path, TreePath::Dir(PathBuf::from("datasets")));
    }

    #[test]
    fn test_modified_with_leading_space() {
        // Porcelain pads the two-column code; whitespace splitting absorbs it.
        let line = parse_one(" M lecture/01.md");

        assert_eq!(line.kind, ChangeKind::Modified);
        assert_eq!(line.path, TreePath::File(PathBuf::from("lecture/01.md")));
    }

    #[test]
    fn test_renamed_captures_pre_rename_path_only() {
        let line = parse_one("R old_name.md -> new_name.md");

        assert_eq!(line.kind, ChangeKind::Renamed);
        assert_eq!(line.path, TreePath::File(PathBuf::from("old_name.md")));
    }

    #[test]
    fn test_unrecognized_code_is_unknown() {
        let line = parse_one("XX broken_file");

        assert_eq!(line.kind, ChangeKind::Unknown);
        assert_eq!(line.path, TreePath::File(PathBuf::from("broken_file")));
        assert_eq!(line.raw, "XX broken_file");
    }

    #[test]
    fn test_combined_two_column_code_is_unknown() {
        // A staged-and-unstaged entry like "MM" is outside the fixed table
        // and must fail loudly rather than be half-classified.
        let line = parse_one("MM edited_twice.md");

        assert_eq!(line.kind, ChangeKind::Unknown);
    }

    #[test]
    fn test_line_without_path_is_unknown() {
        let line = parse_one("M");

        assert_eq!(line.kind, ChangeKind::Unknown);
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let parsed = parse_porcelain("?? a.txt\n\n M b.txt\n");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, ChangeKind::Untracked);
        assert_eq!(parsed[1].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_empty_output_parses_to_nothing() {
        assert!(parse_porcelain("").is_empty());
    }
}
