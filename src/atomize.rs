//! Semantic atomization: grouping hunks into atomic changes and ordering
//! them so that sources come before the tests that exercise them.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::path::Path;

use tracing::debug;

use crate::diff::Diff;
use crate::lang::{self, Language};

/// Classification of an atomic change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    pub language: Option<Language>,
    pub is_test: bool,
    pub path: String,
    /// Filename stem with `test_` / `_test` removed, lower-cased
    pub module: Option<String>,
    /// Normalized symbol (whitespace collapsed, lower-cased)
    pub symbol: Option<String>,
}

impl Tags {
    /// Tags derived from a file path alone
    pub fn for_path(path: &str) -> Self {
        Tags {
            language: lang::detect_language(path),
            is_test: is_test_path(path),
            path: path.to_string(),
            module: module_key(path),
            symbol: None,
        }
    }

    /// The flat string form: `<language>`, `test`, `path:…`, `module:…`, `symbol:…`
    pub fn to_strings(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        if let Some(language) = self.language {
            tags.insert(language.as_str().to_string());
        }
        if self.is_test {
            tags.insert("test".to_string());
        }
        tags.insert(format!("path:{}", self.path));
        if let Some(module) = &self.module {
            tags.insert(format!("module:{module}"));
        }
        if let Some(symbol) = &self.symbol {
            tags.insert(format!("symbol:{symbol}"));
        }
        tags
    }
}

/// Smallest independently committable unit: hunks of one file sharing a symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicChange {
    pub id: String,
    pub hunk_ids: Vec<String>,
    pub tags: Tags,
    pub summary: Option<String>,
}

struct Group {
    id: String,
    file_index: usize,
    hunk_ids: Vec<String>,
    tags: Tags,
    summary: String,
    first_order: usize,
}

/// Group the hunks of `diff` into atomic changes in dependency order.
///
/// Every hunk lands in exactly one change. An empty diff yields an empty list.
pub fn atomize(diff: &Diff) -> Vec<AtomicChange> {
    let groups = build_groups(diff);
    if groups.is_empty() {
        return Vec::new();
    }

    let edges = build_edges(&groups);
    let first_orders: Vec<usize> = groups.iter().map(|g| g.first_order).collect();
    let order = order_groups(&first_orders, &edges);

    let mut slots: Vec<Option<Group>> = groups.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .map(|group| AtomicChange {
            id: group.id,
            hunk_ids: group.hunk_ids,
            tags: group.tags,
            summary: Some(group.summary),
        })
        .collect()
}

/// Split each file's hunks into runs sharing a symbol key.
///
/// A key change always starts a new run, even when that key shows up again
/// later in the file.
fn build_groups(diff: &Diff) -> Vec<Group> {
    let order = diff.canonical_order();
    let mut groups = Vec::new();

    for (file_index, file) in diff.files.iter().enumerate() {
        let path = file.path();
        if file.hunks.is_empty() || path.is_empty() {
            continue;
        }

        let mut runs: Vec<(Option<&str>, Vec<&str>)> = Vec::new();
        for hunk in &file.hunks {
            let key = hunk.symbol().map(str::trim).filter(|s| !s.is_empty());
            match runs.last_mut() {
                Some((last_key, ids)) if *last_key == key => ids.push(&hunk.id),
                _ => runs.push((key, vec![&hunk.id])),
            }
        }

        for (local, (symbol, ids)) in runs.into_iter().enumerate() {
            let mut tags = Tags::for_path(path);
            tags.symbol = symbol
                .map(lang::normalize_symbol)
                .filter(|s| !s.is_empty());

            let summary = match symbol {
                Some(symbol) => format!("Changes in {path} ({symbol})"),
                None => format!("Changes in {path}"),
            };
            let first_order = ids
                .iter()
                .filter_map(|id| order.get(id).copied())
                .min()
                .unwrap_or(usize::MAX);

            groups.push(Group {
                id: format!("{path}::ac{local}"),
                file_index,
                hunk_ids: ids.into_iter().map(str::to_string).collect(),
                tags,
                summary,
                first_order,
            });
        }
    }

    groups
}

/// Dependency edges: `edges[a]` holds every group that must come after `a`
fn build_edges(groups: &[Group]) -> Vec<BTreeSet<usize>> {
    let mut edges = vec![BTreeSet::new(); groups.len()];

    for (idx, pair) in groups.windows(2).enumerate() {
        if pair[0].file_index == pair[1].file_index {
            edges[idx].insert(idx + 1);
        }
    }

    let mut by_symbol: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut by_module: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, group) in groups.iter().enumerate() {
        if group.tags.is_test {
            continue;
        }
        if let Some(symbol) = &group.tags.symbol {
            by_symbol.entry(symbol).or_default().push(idx);
        }
        if let Some(module) = &group.tags.module {
            by_module.entry(module).or_default().push(idx);
        }
    }

    for (test_idx, group) in groups.iter().enumerate() {
        if !group.tags.is_test {
            continue;
        }
        let mut sources: Vec<usize> = group
            .tags
            .symbol
            .as_deref()
            .and_then(|symbol| by_symbol.get(symbol))
            .cloned()
            .unwrap_or_default();
        if sources.is_empty() {
            sources = group
                .tags
                .module
                .as_deref()
                .and_then(|module| by_module.get(module))
                .cloned()
                .unwrap_or_default();
        }
        for source in sources {
            if source != test_idx {
                edges[source].insert(test_idx);
            }
        }
    }

    edges
}

/// Topologically order groups, always taking the ready group whose earliest
/// hunk comes first.
///
/// If the graph has a cycle the topological result is dropped and every
/// group is returned sorted by earliest hunk instead.
fn order_groups(first_orders: &[usize], edges: &[BTreeSet<usize>]) -> Vec<usize> {
    let n = first_orders.len();
    let mut indegree = vec![0usize; n];
    for targets in edges {
        for &target in targets {
            indegree[target] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..n)
        .filter(|&idx| indegree[idx] == 0)
        .map(|idx| Reverse((first_orders[idx], idx)))
        .collect();

    let mut ordered = Vec::with_capacity(n);
    while let Some(Reverse((_, idx))) = ready.pop() {
        ordered.push(idx);
        for &target in &edges[idx] {
            indegree[target] -= 1;
            if indegree[target] == 0 {
                ready.push(Reverse((first_orders[target], target)));
            }
        }
    }

    if ordered.len() != n {
        debug!(
            groups = n,
            reached = ordered.len(),
            "dependency cycle between atomic changes, keeping diff order"
        );
        let mut fallback: Vec<usize> = (0..n).collect();
        fallback.sort_by_key(|&idx| first_orders[idx]);
        return fallback;
    }

    ordered
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = Path::new(&lower)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    lower.contains("test")
        || lower.starts_with("spec/")
        || lower.contains("/spec/")
        || name.contains(".spec.")
        || name.ends_with("_spec.rb")
}

fn module_key(path: &str) -> Option<String> {
    let stem = Path::new(path).file_stem()?.to_str()?.to_lowercase();
    let stem = stem.strip_prefix("test_").unwrap_or(&stem);
    let stem = stem.strip_suffix("_test").unwrap_or(stem);
    (!stem.is_empty()).then(|| stem.to_string())
}
