use std::collections::{BTreeMap, BTreeSet};

use crate::{ItemKey, ItemKind, ItemRecord, PlanId};

/// Text fields compared for fixtures. Fields outside this list never count as
/// a spec change.
pub const FIXTURE_SPEC_FIELDS: &[&str] = &[
    "description",
    "manufacturer",
    "model",
    "mounting",
    "voltage",
    "wattage",
    "lamp_type",
    "dimming",
];

pub const KEYNOTE_SPEC_FIELDS: &[&str] = &["text"];

pub fn spec_fields(kind: ItemKind) -> &'static [&'static str] {
    match kind {
        ItemKind::Fixture => FIXTURE_SPEC_FIELDS,
        ItemKind::Keynote => KEYNOTE_SPEC_FIELDS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    Count {
        item: ItemKey,
        plan: PlanId,
        before: u32,
        after: u32,
    },
    Field {
        item: ItemKey,
        field: &'static str,
        before: Option<String>,
        after: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffSummary {
    pub count_changes: usize,
    pub spec_changes: usize,
    pub items_added: usize,
    pub items_removed: usize,
    pub total_diffs: usize,
    /// Structural changes need a backend pass; in-place edits do not.
    pub needs_rerun: bool,
    pub added: Vec<ItemKey>,
    pub removed: Vec<ItemKey>,
    pub changes: Vec<DiffEntry>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.total_diffs == 0
    }
}

/// Compares two item collections. Keys are walked in sorted order so the
/// result does not depend on how either side was built.
pub fn compute_diff(
    baseline: &BTreeMap<ItemKey, ItemRecord>,
    current: &BTreeMap<ItemKey, ItemRecord>,
) -> DiffSummary {
    let mut summary = DiffSummary::default();

    for key in current.keys() {
        if !baseline.contains_key(key) {
            summary.added.push(key.clone());
        }
    }
    for key in baseline.keys() {
        if !current.contains_key(key) {
            summary.removed.push(key.clone());
        }
    }

    for (key, before) in baseline {
        let Some(after) = current.get(key) else {
            continue;
        };

        let plans: BTreeSet<&PlanId> = before
            .counts_by_plan
            .keys()
            .chain(after.counts_by_plan.keys())
            .collect();
        for plan in plans {
            let (old, new) = (before.count_on(plan), after.count_on(plan));
            if old != new {
                summary.count_changes += 1;
                summary.changes.push(DiffEntry::Count {
                    item: key.clone(),
                    plan: plan.clone(),
                    before: old,
                    after: new,
                });
            }
        }

        for &field in spec_fields(key.kind) {
            let old = before.text_fields.get(field);
            let new = after.text_fields.get(field);
            if normalized(old) != normalized(new) {
                summary.spec_changes += 1;
                summary.changes.push(DiffEntry::Field {
                    item: key.clone(),
                    field,
                    before: old.cloned(),
                    after: new.cloned(),
                });
            }
        }
    }

    summary.items_added = summary.added.len();
    summary.items_removed = summary.removed.len();
    summary.total_diffs = summary.count_changes
        + summary.spec_changes
        + summary.items_added
        + summary.items_removed;
    summary.needs_rerun = summary.items_added > 0 || summary.items_removed > 0;
    summary
}

// A missing field and an empty one read the same to the user.
fn normalized(value: Option<&String>) -> &str {
    value.map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(records: Vec<ItemRecord>) -> BTreeMap<ItemKey, ItemRecord> {
        records.into_iter().map(|r| (r.key.clone(), r)).collect()
    }

    #[test]
    fn plan_keys_are_unioned_with_missing_as_zero() {
        let before = collection(vec![
            ItemRecord::new(ItemKey::fixture("A1")).with_count("E1", 2)
        ]);
        let after = collection(vec![ItemRecord::new(ItemKey::fixture("A1"))
            .with_count("E1", 2)
            .with_count("E2", 1)]);

        let diff = compute_diff(&before, &after);
        assert_eq!(diff.count_changes, 1);
        assert!(!diff.needs_rerun);
        assert_eq!(
            diff.changes,
            vec![DiffEntry::Count {
                item: ItemKey::fixture("A1"),
                plan: "E2".into(),
                before: 0,
                after: 1,
            }]
        );
    }

    #[test]
    fn only_listed_fields_are_compared() {
        let before = collection(vec![ItemRecord::new(ItemKey::fixture("A1"))
            .with_field("voltage", "120")
            .with_field("notes", "old")]);
        let after = collection(vec![ItemRecord::new(ItemKey::fixture("A1"))
            .with_field("voltage", "277")
            .with_field("notes", "new")]);

        let diff = compute_diff(&before, &after);
        assert_eq!(diff.spec_changes, 1);
        assert_eq!(diff.total_diffs, 1);
    }

    #[test]
    fn empty_and_missing_fields_are_equal() {
        let before = collection(vec![
            ItemRecord::new(ItemKey::keynote("3")).with_field("text", "")
        ]);
        let after = collection(vec![ItemRecord::new(ItemKey::keynote("3"))]);

        assert!(compute_diff(&before, &after).is_empty());
    }

    #[test]
    fn whitespace_edits_are_changes() {
        let before = collection(vec![
            ItemRecord::new(ItemKey::keynote("3")).with_field("text", "EXISTING")
        ]);
        let after = collection(vec![
            ItemRecord::new(ItemKey::keynote("3")).with_field("text", "EXISTING ")
        ]);

        assert_eq!(compute_diff(&before, &after).spec_changes, 1);
    }
}
