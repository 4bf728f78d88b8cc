//! Backend-independent helpers over resolved project snapshots.

use crate::error::MetadataResult;
use crate::models::{FileRevisionRow, NewRevision};
use hangar_core::ChangeKind;
use std::collections::BTreeMap;

/// Revisions that bring `current` back to `target`.
///
/// A target path is rewritten only when the current snapshot lacks it or
/// resolves it to a different content hash or change kind. Paths live in
/// `current` but absent from `target` get a deletion carrying their current
/// content hash. Output is ordered by path.
pub fn plan_restore(
    current: &[FileRevisionRow],
    target: &[FileRevisionRow],
) -> MetadataResult<Vec<NewRevision>> {
    let current: BTreeMap<&str, &FileRevisionRow> =
        current.iter().map(|r| (r.path.as_str(), r)).collect();
    let target: BTreeMap<&str, &FileRevisionRow> =
        target.iter().map(|r| (r.path.as_str(), r)).collect();

    let mut planned = Vec::new();
    for (path, wanted) in &target {
        let unchanged = current.get(path).is_some_and(|have| {
            have.content_hash == wanted.content_hash && have.change_kind == wanted.change_kind
        });
        if !unchanged {
            planned.push(NewRevision {
                path: (*path).to_string(),
                content_hash: wanted.content_hash.clone(),
                change_kind: wanted.change_kind()?,
            });
        }
    }
    for (path, have) in &current {
        if !target.contains_key(path) {
            planned.push(NewRevision {
                path: (*path).to_string(),
                content_hash: have.content_hash.clone(),
                change_kind: ChangeKind::Delete,
            });
        }
    }
    planned.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(planned)
}

/// Distinct content hashes of `revisions`, in first-seen order.
pub fn distinct_hashes(revisions: &[NewRevision]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    revisions
        .iter()
        .filter(|r| seen.insert(r.content_hash.as_str()))
        .map(|r| r.content_hash.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(path: &str, hash: &str, kind: ChangeKind) -> FileRevisionRow {
        FileRevisionRow {
            revision_id: 1,
            project_id: 1,
            path: path.to_string(),
            commit_id: 1,
            content_hash: hash.to_string(),
            change_kind: kind.code(),
            chunk_count: 1,
        }
    }

    #[test]
    fn test_plan_restore_writes_only_differences() {
        let current = vec![
            row("same", "h1", ChangeKind::Add),
            row("edited", "h2", ChangeKind::Modify),
            row("extra", "h3", ChangeKind::Add),
        ];
        let target = vec![
            row("same", "h1", ChangeKind::Add),
            row("edited", "h0", ChangeKind::Add),
            row("gone", "h4", ChangeKind::Add),
        ];

        let plan = plan_restore(&current, &target).unwrap();
        let summary: Vec<_> = plan
            .iter()
            .map(|r| (r.path.as_str(), r.content_hash.as_str(), r.change_kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("edited", "h0", ChangeKind::Add),
                ("extra", "h3", ChangeKind::Delete),
                ("gone", "h4", ChangeKind::Add),
            ]
        );
    }

    #[test]
    fn test_plan_restore_change_kind_counts_as_difference() {
        let current = vec![row("a", "h1", ChangeKind::Modify)];
        let target = vec![row("a", "h1", ChangeKind::Add)];
        let plan = plan_restore(&current, &target).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].change_kind, ChangeKind::Add);
    }

    #[test]
    fn test_plan_restore_identical_is_empty() {
        let state = vec![row("a", "h1", ChangeKind::Add)];
        assert!(plan_restore(&state, &state).unwrap().is_empty());
    }

    #[test]
    fn test_distinct_hashes_keeps_first_seen_order() {
        let revisions = ["b", "a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, h)| NewRevision {
                path: format!("p{i}"),
                content_hash: h.to_string(),
                change_kind: ChangeKind::Add,
            })
            .collect::<Vec<_>>();
        assert_eq!(distinct_hashes(&revisions), vec!["b", "a", "c"]);
    }
}
