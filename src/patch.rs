//! Rendering a subset of a diff's hunks back into a unified diff.
//!
//! Hunk headers and line content are reused byte for byte; ranges are not
//! recomputed. Hunks of one file are always applied in their native order
//! (the plan validator enforces it), so every partial patch lands on the
//! exact state its original ranges describe.

use std::collections::HashSet;

use crate::diff::file::quote;
use crate::diff::{ChangeKind, Diff, FileDiff};

/// Build a patch containing only the selected hunks.
///
/// Files are emitted in diff order with minimal headers. Returns an empty
/// string when nothing is selected.
pub fn render<I, S>(diff: &Diff, hunk_ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let selected: HashSet<String> = hunk_ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .collect();
    if selected.is_empty() {
        return String::new();
    }

    let mut patch = String::new();
    for file in &diff.files {
        let hunks: Vec<_> = file
            .hunks
            .iter()
            .filter(|h| selected.contains(&h.id))
            .collect();
        if hunks.is_empty() {
            continue;
        }

        // Only the patch holding the file's first hunk performs the rename
        // or mode change; later patches see the file under its new name.
        let opens_file = file
            .hunks
            .first()
            .is_some_and(|h| selected.contains(&h.id));
        push_file_header(&mut patch, file, opens_file);

        for hunk in hunks {
            patch.push_str(&hunk.to_string());
        }
    }

    patch
}

fn push_file_header(patch: &mut String, file: &FileDiff, opens_file: bool) {
    let path = file.path();
    let old = file.old_path.as_deref().unwrap_or(path);
    let new = file.new_path.as_deref().unwrap_or(path);
    let a = |p: &str| quote(&format!("a/{p}"));
    let b = |p: &str| quote(&format!("b/{p}"));

    match file.kind {
        ChangeKind::Add => {
            patch.push_str(&format!("diff --git {} {}\n", a(new), b(new)));
            if let Some(mode) = &file.new_mode {
                patch.push_str(&format!("new file mode {mode}\n"));
            }
            patch.push_str("--- /dev/null\n");
            patch.push_str(&format!("+++ {}\n", b(new)));
        }
        ChangeKind::Delete => {
            patch.push_str(&format!("diff --git {} {}\n", a(old), b(old)));
            if let Some(mode) = &file.old_mode {
                patch.push_str(&format!("deleted file mode {mode}\n"));
            }
            patch.push_str(&format!("--- {}\n", a(old)));
            patch.push_str("+++ /dev/null\n");
        }
        ChangeKind::Modify | ChangeKind::Rename => {
            let from = if opens_file { old } else { new };
            patch.push_str(&format!("diff --git {} {}\n", a(from), b(new)));
            if opens_file && file.mode_changed() {
                if let (Some(old_mode), Some(new_mode)) = (&file.old_mode, &file.new_mode) {
                    patch.push_str(&format!("old mode {old_mode}\n"));
                    patch.push_str(&format!("new mode {new_mode}\n"));
                }
            }
            if opens_file && file.kind == ChangeKind::Rename {
                patch.push_str(&format!("rename from {}\n", quote(old)));
                patch.push_str(&format!("rename to {}\n", quote(new)));
            }
            patch.push_str(&format!("--- {}\n", a(from)));
            patch.push_str(&format!("+++ {}\n", b(new)));
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_content() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::char::range(' ', '~'), 0..16)
            .prop_map(|chars| chars.into_iter().collect())
    }

    fn arb_hunk_body() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            (prop::sample::select(vec!['+', '-', ' ']), arb_content())
                .prop_map(|(marker, content)| format!("{marker}{content}")),
            1..6,
        )
    }

    fn arb_file(index: usize) -> impl Strategy<Value = String> {
        (
            prop::collection::vec((arb_hunk_body(), prop::option::of("[a-z ]{1,10}")), 1..4),
            prop::sample::select(vec!["py", "rs", "txt"]),
        )
            .prop_map(move |(hunks, ext)| {
                let path = format!("dir/file{index}.{ext}");
                let mut text = format!("diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n");
                for (n, (body, symbol)) in hunks.into_iter().enumerate() {
                    let start = n * 20 + 1;
                    text.push_str(&format!("@@ -{start},3 +{start},3 @@"));
                    if let Some(symbol) = symbol {
                        text.push(' ');
                        text.push_str(&symbol);
                    }
                    text.push('\n');
                    for line in body {
                        text.push_str(&line);
                        text.push('\n');
                    }
                }
                text
            })
    }

    fn arb_diff_text() -> impl Strategy<Value = String> {
        (arb_file(0), arb_file(1), arb_file(2)).prop_map(|(a, b, c)| a + &b + &c)
    }

    proptest! {
        /// Rendering every hunk and parsing again keeps files, hunks and ids
        #[test]
        fn full_render_roundtrips(text in arb_diff_text()) {
            let diff = Diff::parse(&text);
            let rendered = render(&diff, diff.hunk_ids());
            let reparsed = Diff::parse(&rendered);

            prop_assert_eq!(reparsed.files.len(), diff.files.len());
            prop_assert_eq!(reparsed.hunk_count(), diff.hunk_count());
            prop_assert_eq!(reparsed.hunk_ids(), diff.hunk_ids());
        }

        /// A partial render contains exactly the selected hunks
        #[test]
        fn partial_render_keeps_selection(text in arb_diff_text(), mask in prop::collection::vec(any::<bool>(), 12)) {
            let diff = Diff::parse(&text);
            let selected: Vec<&str> = diff
                .hunk_ids()
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask[*i % mask.len()])
                .map(|(_, id)| id)
                .collect();

            let reparsed = Diff::parse(&render(&diff, &selected));
            let reparsed_ids = reparsed.hunk_ids();
            let headers: Vec<&str> = reparsed.hunks().map(|h| h.header.as_str()).collect();
            let expected_headers: Vec<&str> = diff
                .hunks()
                .filter(|h| selected.contains(&h.id.as_str()))
                .map(|h| h.header.as_str())
                .collect();

            prop_assert_eq!(reparsed_ids.len(), selected.len());
            prop_assert_eq!(headers, expected_headers);
        }
    }
}
