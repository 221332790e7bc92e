use super::hunk::{DiffHunk, HunkHeader};
use crate::lang;

/// How a file changed between the two sides of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    Rename,
}

/// A complete diff for a single file.
///
/// Binary, rename-only and mode-only changes carry no hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path before the change; absent for added files
    pub old_path: Option<String>,
    /// Path after the change; absent for deleted files
    pub new_path: Option<String>,
    pub kind: ChangeKind,
    pub binary: bool,
    pub old_mode: Option<String>,
    pub new_mode: Option<String>,
    /// All hunks for this file, in emission order
    pub hunks: Vec<DiffHunk>,
}

impl FileDiff {
    /// Parse one `diff --git` section (header line included, next section
    /// excluded).
    ///
    /// Returns `None` if the section header carries no usable paths.
    #[must_use]
    pub fn parse(section: &[&str]) -> Option<Self> {
        let (first, rest) = section.split_first()?;
        let (mut old_path, mut new_path) = split_git_header(first)?;

        let mut rename_from = None;
        let mut rename_to = None;
        let mut marker_kind = None;
        let mut null_kind = None;
        let mut binary = false;
        let mut old_mode = None;
        let mut new_mode = None;

        let mut i = 0;
        while i < rest.len() {
            let line = rest[i];
            if line.starts_with("--- ") || HunkHeader::parse(line).is_some() {
                break;
            }
            if let Some(mode) = line.strip_prefix("new file mode ") {
                marker_kind = Some(ChangeKind::Add);
                new_mode = Some(mode.trim().to_string());
            } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
                marker_kind = Some(ChangeKind::Delete);
                old_mode = Some(mode.trim().to_string());
            } else if let Some(mode) = line.strip_prefix("old mode ") {
                old_mode = Some(mode.trim().to_string());
            } else if let Some(mode) = line.strip_prefix("new mode ") {
                new_mode = Some(mode.trim().to_string());
            } else if let Some(from) = line.strip_prefix("rename from ") {
                rename_from = Some(unquote(from.trim()));
            } else if let Some(to) = line.strip_prefix("rename to ") {
                rename_to = Some(unquote(to.trim()));
            } else if (line.starts_with("Binary files ") && line.contains(" differ"))
                || line.starts_with("GIT binary patch")
            {
                binary = true;
                break;
            }
            i += 1;
        }

        if !binary && i < rest.len() {
            if let Some(old) = rest[i].strip_prefix("--- ") {
                match content_path(old, "a/") {
                    Some(path) => old_path = Some(path),
                    None => {
                        old_path = None;
                        null_kind = Some(ChangeKind::Add);
                    }
                }
                i += 1;
            }
            if let Some(new) = rest.get(i).and_then(|l| l.strip_prefix("+++ ")) {
                match content_path(new, "b/") {
                    Some(path) => new_path = Some(path),
                    None => {
                        new_path = None;
                        null_kind = Some(ChangeKind::Delete);
                    }
                }
                i += 1;
            }
        }

        let renamed = rename_from.is_some() || rename_to.is_some();
        if let Some(from) = rename_from {
            old_path = Some(from);
        }
        if let Some(to) = rename_to {
            new_path = Some(to);
        }

        let kind = if renamed {
            ChangeKind::Rename
        } else {
            marker_kind.or(null_kind).unwrap_or(ChangeKind::Modify)
        };
        match kind {
            ChangeKind::Add => old_path = None,
            ChangeKind::Delete => new_path = None,
            ChangeKind::Modify | ChangeKind::Rename => {}
        }

        let mut file = FileDiff {
            old_path,
            new_path,
            kind,
            binary,
            old_mode,
            new_mode,
            hunks: Vec::new(),
        };
        if !binary {
            file.hunks = file.parse_hunks(&rest[i..]);
        }
        Some(file)
    }

    fn parse_hunks(&self, lines: &[&str]) -> Vec<DiffHunk> {
        let path = self.path().to_string();
        let language = lang::detect_language(&path);

        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| HunkHeader::parse(line).is_some())
            .map(|(idx, _)| idx)
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(ordinal, &start)| {
                let end = starts.get(ordinal + 1).copied().unwrap_or(lines.len());
                DiffHunk::parse(
                    &path,
                    ordinal,
                    language,
                    lines[start],
                    &lines[start + 1..end],
                )
            })
            .collect()
    }

    /// The path hunks are addressed by: new path, else old path
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or_default()
    }

    /// Human-readable path, `old -> new` when they differ
    pub fn display_path(&self) -> String {
        let old = self.old_path.as_deref().unwrap_or("unknown");
        let new = self.new_path.as_deref().unwrap_or("unknown");
        match (&self.old_path, &self.new_path) {
            (Some(_), Some(_)) if old != new => format!("{old} -> {new}"),
            (None, Some(_)) => new.to_string(),
            _ => old.to_string(),
        }
    }

    /// True when the old and new file modes differ
    pub fn mode_changed(&self) -> bool {
        matches!((&self.old_mode, &self.new_mode), (Some(a), Some(b)) if a != b)
    }
}

/// Split `diff --git a/<old> b/<new>` into its two paths
fn split_git_header(line: &str) -> Option<(Option<String>, Option<String>)> {
    let rest = line.strip_prefix("diff --git ")?.trim_end();
    let (old, new) = if rest.starts_with('"') {
        let (old, tail) = take_quoted(rest)?;
        (old, unquote(tail.trim_start()))
    } else if let Some(idx) = rest.rfind(" \"b/") {
        (rest[..idx].to_string(), unquote(&rest[idx + 1..]))
    } else if let Some((old, new)) = rest.rsplit_once(" b/") {
        (old.to_string(), format!("b/{new}"))
    } else {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() < 2 {
            return None;
        }
        (
            parts[parts.len() - 2].to_string(),
            parts[parts.len() - 1].to_string(),
        )
    };
    let old = strip_side(old, "a/");
    let new = strip_side(new, "b/");
    if old.is_empty() && new.is_empty() {
        return None;
    }
    Some((Some(old), Some(new)))
}

/// Path from a `---`/`+++` header; `None` for the null device
fn content_path(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == "/dev/null" {
        return None;
    }
    Some(strip_side(unquote(raw), prefix))
}

fn strip_side(path: String, prefix: &str) -> String {
    match path.strip_prefix(prefix) {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

/// Decode a path git may have C-quoted (`"caf\303\251.txt"`)
pub fn unquote(s: &str) -> String {
    take_quoted(s).map_or_else(|| s.to_string(), |(path, _)| path)
}

/// Decode one leading quoted string, returning it and the text after it
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), &s[i + 1..])),
            b'\\' => {
                let esc = *bytes.get(i + 1)?;
                i += 2;
                match esc {
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b't' => out.push(b'\t'),
                    b'n' => out.push(b'\n'),
                    b'v' => out.push(0x0b),
                    b'f' => out.push(0x0c),
                    b'r' => out.push(b'\r'),
                    b'0'..=b'7' => {
                        let mut value = u32::from(esc - b'0');
                        let mut digits = 1;
                        while digits < 3 {
                            match bytes.get(i) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(u8::try_from(value).ok()?);
                    }
                    other => out.push(other),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

/// Quote `path` the way git does when it holds special bytes
pub fn quote(path: &str) -> String {
    let needs_quoting = path
        .bytes()
        .any(|b| b < 0x20 || b == 0x7f || b >= 0x80 || b == b'"' || b == b'\\');
    if !needs_quoting {
        return path.to_string();
    }
    let mut out = String::with_capacity(path.len() + 2);
    out.push('"');
    for b in path.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            0x0b => out.push_str("\\v"),
            0x0c => out.push_str("\\f"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{b:03o}")),
            b => out.push(char::from(b)),
        }
    }
    out.push('"');
    out
}
