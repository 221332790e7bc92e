use std::collections::BTreeMap;
use std::fmt;

use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{map_res, opt},
    sequence::preceded,
};

use crate::lang::{self, Language};

/// Marker git emits after a line that has no trailing newline.
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Kind of a single line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Add,
    Delete,
    Context,
}

impl LineKind {
    /// The leading character used for this kind in unified diff syntax
    pub fn marker(self) -> char {
        match self {
            LineKind::Add => '+',
            LineKind::Delete => '-',
            LineKind::Context => ' ',
        }
    }
}

/// A single line of a hunk body, with its marker stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
    /// Line number in the old file (deletions and context)
    pub old_lineno: Option<u32>,
    /// Line number in the new file (additions and context)
    pub new_lineno: Option<u32>,
    /// Set when the line was followed by the "No newline at end of file" marker
    pub missing_newline: bool,
}

/// Start and optional count of one side of a hunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u32,
    pub count: Option<u32>,
}

/// Parsed `@@ -a,b +c,d @@ trailing` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader<'a> {
    pub old: Range,
    pub new: Range,
    pub trailing: &'a str,
}

impl<'a> HunkHeader<'a> {
    /// Parse a hunk header line. Returns `None` for anything that is not one.
    pub fn parse(line: &'a str) -> Option<Self> {
        header(line)
            .ok()
            .map(|(trailing, (old, new))| HunkHeader { old, new, trailing })
    }

    /// The symbol hint carried by the header's trailing text
    pub fn symbol(&self) -> Option<&'a str> {
        lang::symbol_from_trailing(self.trailing)
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>()).parse(input)
}

fn range(input: &str) -> IResult<&str, Range> {
    (number, opt(preceded(char(','), number)))
        .map(|(start, count)| Range { start, count })
        .parse(input)
}

fn header(input: &str) -> IResult<&str, (Range, Range)> {
    (tag("@@ -"), range, tag(" +"), range, tag(" @@"))
        .map(|(_, old, _, new, _)| (old, new))
        .parse(input)
}

/// Metadata attached to a hunk by the parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HunkMeta {
    pub language: Option<Language>,
    pub symbol: Option<String>,
    /// Free-form annotations added by later stages
    pub extra: BTreeMap<String, String>,
}

/// A contiguous block of changes in one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    /// `<path>::h<ordinal>`, unique within a diff
    pub id: String,
    pub path: String,
    /// Raw header line, reused verbatim when rendering
    pub header: String,
    pub lines: Vec<DiffLine>,
    pub meta: HunkMeta,
}

impl DiffHunk {
    /// Build the stable id for the `ordinal`-th hunk of `path`
    pub fn make_id(path: &str, ordinal: usize) -> String {
        format!("{path}::h{ordinal}")
    }

    /// Parse a hunk from its header line and body lines.
    ///
    /// The body must already be cut at the next hunk or file marker. Lines
    /// with an unknown leading character are kept as context so nothing is
    /// silently discarded; the final `git apply` is the authority on them.
    pub fn parse(
        path: &str,
        ordinal: usize,
        language: Option<Language>,
        header_line: &str,
        body: &[&str],
    ) -> Self {
        let parsed = HunkHeader::parse(header_line);
        let mut old_lineno = parsed.as_ref().map(|h| h.old.start);
        let mut new_lineno = parsed.as_ref().map(|h| h.new.start);

        let mut lines: Vec<DiffLine> = Vec::with_capacity(body.len());
        for &raw in body {
            if raw.starts_with(NO_NEWLINE_MARKER) {
                if let Some(last) = lines.last_mut() {
                    last.missing_newline = true;
                }
                continue;
            }

            let (kind, content) = match raw.chars().next() {
                Some('+') => (LineKind::Add, &raw[1..]),
                Some('-') => (LineKind::Delete, &raw[1..]),
                Some(' ') => (LineKind::Context, &raw[1..]),
                None => (LineKind::Context, ""),
                Some(_) => (LineKind::Context, raw),
            };

            let (old, new) = match kind {
                LineKind::Add => (None, new_lineno),
                LineKind::Delete => (old_lineno, None),
                LineKind::Context => (old_lineno, new_lineno),
            };
            lines.push(DiffLine {
                kind,
                content: content.to_string(),
                old_lineno: old,
                new_lineno: new,
                missing_newline: false,
            });

            if kind != LineKind::Add {
                old_lineno = old_lineno.and_then(|n| n.checked_add(1));
            }
            if kind != LineKind::Delete {
                new_lineno = new_lineno.and_then(|n| n.checked_add(1));
            }
        }

        DiffHunk {
            id: Self::make_id(path, ordinal),
            path: path.to_string(),
            header: header_line.to_string(),
            lines,
            meta: HunkMeta {
                language,
                symbol: parsed.and_then(|h| h.symbol()).map(str::to_string),
                extra: BTreeMap::new(),
            },
        }
    }

    /// Symbol hint, if the header carried one
    pub fn symbol(&self) -> Option<&str> {
        self.meta.symbol.as_deref()
    }

    pub fn additions(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == LineKind::Add).count()
    }

    pub fn deletions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind == LineKind::Delete)
            .count()
    }
}

impl fmt::Display for DiffHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.lines {
            writeln!(f, "{}{}", line.kind.marker(), line.content)?;
            if line.missing_newline {
                writeln!(f, "{NO_NEWLINE_MARKER}")?;
            }
        }
        Ok(())
    }
}
