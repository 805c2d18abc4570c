use std::collections::BTreeMap;
use std::fmt;

pub type PlanId = String;

/// Fixtures and keynotes share one record shape; the kind only selects which
/// text fields are compared and which detection set the backend returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Fixture,
    Keynote,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Fixture => "fixture",
            ItemKind::Keynote => "keynote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub identifier: String,
}

impl ItemKey {
    pub fn new(kind: ItemKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn fixture(identifier: impl Into<String>) -> Self {
        Self::new(ItemKind::Fixture, identifier)
    }

    pub fn keynote(identifier: impl Into<String>) -> Self {
        Self::new(ItemKind::Keynote, identifier)
    }

    pub fn is_keynote(&self) -> bool {
        self.kind == ItemKind::Keynote
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ItemKind::Fixture => 'F',
            ItemKind::Keynote => 'K',
        };
        write!(f, "{prefix}:{}", self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub key: ItemKey,
    pub text_fields: BTreeMap<String, String>,
    pub counts_by_plan: BTreeMap<PlanId, u32>,
    /// Derived. Only trustworthy after `Ledger::recalculate`.
    pub total: u32,
}

impl ItemRecord {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            text_fields: BTreeMap::new(),
            counts_by_plan: BTreeMap::new(),
            total: 0,
        }
    }

    pub fn with_count(mut self, plan: impl Into<PlanId>, count: u32) -> Self {
        self.counts_by_plan.insert(plan.into(), count);
        self.total = self.counts_sum();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.text_fields.insert(name.into(), value.into());
        self
    }

    pub fn count_on(&self, plan: &str) -> u32 {
        self.counts_by_plan.get(plan).copied().unwrap_or(0)
    }

    pub fn counts_sum(&self) -> u32 {
        self.counts_by_plan
            .values()
            .fold(0u32, |acc, count| acc.saturating_add(*count))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSheet {
    pub id: PlanId,
    /// Document page the plan lives on; positions are fetched per page.
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemCollection {
    /// Plans in document order.
    pub plans: Vec<PlanSheet>,
    pub items: BTreeMap<ItemKey, ItemRecord>,
}

impl ItemCollection {
    pub fn new(plans: Vec<PlanSheet>, records: impl IntoIterator<Item = ItemRecord>) -> Self {
        let items = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        Self { plans, items }
    }

    pub fn page_of(&self, plan: &str) -> Option<u32> {
        self.plans
            .iter()
            .find(|sheet| sheet.id == plan)
            .map(|sheet| sheet.page)
    }

    /// Plans where the item has a nonzero count: document order first, then
    /// any plans the item references that the sheet list does not know.
    pub fn plans_with_counts(&self, key: &ItemKey) -> Vec<PlanId> {
        let Some(record) = self.items.get(key) else {
            return Vec::new();
        };
        let mut plans: Vec<PlanId> = self
            .plans
            .iter()
            .filter(|sheet| record.count_on(&sheet.id) > 0)
            .map(|sheet| sheet.id.clone())
            .collect();
        for (plan, count) in &record.counts_by_plan {
            if *count > 0 && !plans.contains(plan) {
                plans.push(plan.clone());
            }
        }
        plans
    }
}
