use std::collections::BTreeMap;

use takeoff_logging::takeoff_debug;
use thiserror::Error;

use crate::diff::{compute_diff, DiffSummary};
use crate::{ItemCollection, ItemKey, ItemRecord, PlanId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown item {0}")]
    UnknownItem(ItemKey),
    #[error("item {0} already exists")]
    DuplicateItem(ItemKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionKind {
    CountOverride,
    OverlayReview,
    ItemAdded,
    ItemRemoved,
    FieldEdited,
}

/// One human correction. The log only ever grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub kind: CorrectionKind,
    pub item: ItemKey,
    pub plan: Option<PlanId>,
    pub original_count: u32,
    pub corrected_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SnapshotTag {
    /// First pipeline output for the project.
    Original,
    /// Baseline captured right before asking the backend to reprocess.
    PreReprocess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tag: SnapshotTag,
    pub items: BTreeMap<ItemKey, ItemRecord>,
    /// Edit counter at capture time.
    pub edit_count: u64,
}

/// The user-editable projection of the latest extraction results.
///
/// Count edits are two-phase: `set_count` only writes the plan entry and a
/// later `recalculate` re-derives totals, so several counts can be written
/// before the aggregates move.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ledger {
    collection: ItemCollection,
    project_total: u64,
    corrections: Vec<Correction>,
    edit_count: u64,
    snapshots: BTreeMap<SnapshotTag, Snapshot>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self) -> &ItemCollection {
        &self.collection
    }

    pub fn item(&self, key: &ItemKey) -> Option<&ItemRecord> {
        self.collection.items.get(key)
    }

    pub fn project_total(&self) -> u64 {
        self.project_total
    }

    pub fn edit_count(&self) -> u64 {
        self.edit_count
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    /// Wholesale replacement with freshly fetched results.
    pub fn replace_collection(&mut self, collection: ItemCollection) {
        takeoff_debug!(
            "ledger: replacing collection ({} items, {} plans)",
            collection.items.len(),
            collection.plans.len()
        );
        self.collection = collection;
        self.recalculate();
    }

    pub fn set_count(&mut self, key: &ItemKey, plan: &str, value: u32) -> Result<u32, LedgerError> {
        let record = self
            .collection
            .items
            .get_mut(key)
            .ok_or_else(|| LedgerError::UnknownItem(key.clone()))?;
        let previous = record
            .counts_by_plan
            .insert(plan.to_string(), value)
            .unwrap_or(0);
        Ok(previous)
    }

    pub fn set_field(
        &mut self,
        key: &ItemKey,
        field: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>, LedgerError> {
        let record = self
            .collection
            .items
            .get_mut(key)
            .ok_or_else(|| LedgerError::UnknownItem(key.clone()))?;
        Ok(record.text_fields.insert(field.to_string(), value.into()))
    }

    pub fn add_item(&mut self, record: ItemRecord) -> Result<(), LedgerError> {
        if self.collection.items.contains_key(&record.key) {
            return Err(LedgerError::DuplicateItem(record.key));
        }
        self.collection.items.insert(record.key.clone(), record);
        Ok(())
    }

    pub fn remove_item(&mut self, key: &ItemKey) -> Result<ItemRecord, LedgerError> {
        self.collection
            .items
            .remove(key)
            .ok_or_else(|| LedgerError::UnknownItem(key.clone()))
    }

    pub fn recalculate(&mut self) {
        let mut project_total = 0u64;
        for record in self.collection.items.values_mut() {
            record.total = record.counts_sum();
            project_total += u64::from(record.total);
        }
        self.project_total = project_total;
    }

    pub fn record_correction(&mut self, correction: Correction) {
        self.corrections.push(correction);
        self.edit_count += 1;
    }

    /// Captures a deep copy under `tag`, replacing any live snapshot with the same tag.
    pub fn snapshot(&mut self, tag: SnapshotTag) {
        takeoff_debug!("ledger: snapshot {:?} at edit {}", tag, self.edit_count);
        self.snapshots.insert(
            tag,
            Snapshot {
                tag,
                items: self.collection.items.clone(),
                edit_count: self.edit_count,
            },
        );
    }

    pub fn snapshot_ref(&self, tag: SnapshotTag) -> Option<&Snapshot> {
        self.snapshots.get(&tag)
    }

    /// Retrieve-and-clear. A second call for the same tag yields `None`.
    pub fn consume_snapshot(&mut self, tag: SnapshotTag) -> Option<Snapshot> {
        self.snapshots.remove(&tag)
    }

    pub fn diff_against(&self, baseline: &Snapshot) -> DiffSummary {
        compute_diff(&baseline.items, &self.collection.items)
    }

    pub fn compare_with_original(&self) -> Option<DiffSummary> {
        self.snapshot_ref(SnapshotTag::Original)
            .map(|snapshot| self.diff_against(snapshot))
    }
}
