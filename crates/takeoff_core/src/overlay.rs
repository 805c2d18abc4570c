use std::collections::{BTreeMap, BTreeSet};

use takeoff_logging::{takeoff_debug, takeoff_warn};

use crate::geometry::{PageTransform, Position, ADDED_MARKER_RADIUS};
use crate::{ItemCollection, ItemKey, PlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Loading,
    Ready,
}

/// Review decisions for one `(item, plan)` pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReviewMarks {
    pub rejected: BTreeSet<usize>,
    pub added: Vec<Position>,
}

impl ReviewMarks {
    pub fn is_empty(&self) -> bool {
        self.rejected.is_empty() && self.added.is_empty()
    }
}

/// Flat export of one persisted entry, for saving across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewMarksSnapshot {
    pub item: ItemKey,
    pub plan: PlanId,
    pub rejected: Vec<usize>,
    pub added: Vec<Position>,
}

/// Condition the reviewer should see on the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayNotice {
    /// The positions fetch failed; the overlay is empty but editable.
    PositionsUnavailable,
    /// The last click could not be mapped onto the page.
    MarkerNotPlaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionsRequest {
    pub request_id: u64,
    pub item: ItemKey,
    pub plan: PlanId,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedPositions {
    pub page_width: f64,
    pub page_height: f64,
    pub detections_by_item: BTreeMap<String, Vec<Position>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSession {
    pub item: ItemKey,
    pub plan: PlanId,
    pub page: Option<u32>,
    pub available_plans: Vec<PlanId>,
    pub detections: Vec<Position>,
    pub rejected: BTreeSet<usize>,
    pub added: Vec<Position>,
    pub add_mode: bool,
    pub phase: OverlayPhase,
    pub page_width: f64,
    pub page_height: f64,
    pub notice: Option<OverlayNotice>,
    request_id: u64,
}

impl HighlightSession {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn is_loading(&self) -> bool {
        self.phase == OverlayPhase::Loading
    }

    /// `detections - rejected + added`. Rejections that point past the
    /// detection list (restored marks before a fetch lands) do not count.
    pub fn acceptance_count(&self) -> u32 {
        let len = self.detections.len();
        let rejected = self.rejected.iter().filter(|index| **index < len).count();
        let accepted = len - rejected + self.added.len();
        u32::try_from(accepted).unwrap_or(u32::MAX)
    }

    /// Without a known page size the rendered page is taken as document
    /// space, so markers can still be added after a failed fetch.
    pub fn transform(&self, rendered_width: f64, rendered_height: f64) -> Option<PageTransform> {
        PageTransform::new(
            self.page_width,
            self.page_height,
            rendered_width,
            rendered_height,
        )
        .or_else(|| {
            PageTransform::new(
                rendered_width,
                rendered_height,
                rendered_width,
                rendered_height,
            )
        })
    }

    pub fn marks(&self) -> ReviewMarks {
        ReviewMarks {
            rejected: self.rejected.clone(),
            added: self.added.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerEdit {
    Rejected { index: usize, position: Position },
    Restored { index: usize, position: Position },
    Added { position: Position },
    Removed { index: usize, position: Position },
}

/// Outcome of a marker mutation. The caller writes `acceptance` back into
/// the ledger for `(item, plan)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerChange {
    pub item: ItemKey,
    pub plan: PlanId,
    pub acceptance: u32,
    pub edit: MarkerEdit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerPlacement {
    Added(MarkerChange),
    /// Ready session, but the click could not be mapped onto the page.
    NotPlaced,
    /// No ready session.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundClick {
    Added(MarkerChange),
    NotPlaced,
    Dismissed,
    Ignored,
}

/// Owns the (at most one) highlight session and the durable per-key marks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayEngine {
    session: Option<HighlightSession>,
    persisted: BTreeMap<(ItemKey, PlanId), ReviewMarks>,
    next_request_id: u64,
    marks_dirty: bool,
    /// Page size from the last successful fetch, reused when a fetch fails.
    last_page_size: Option<(f64, f64)>,
}

impl OverlayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&HighlightSession> {
        self.session.as_ref()
    }

    pub fn marks_for(&self, item: &ItemKey, plan: &str) -> Option<&ReviewMarks> {
        self.persisted.get(&(item.clone(), plan.to_string()))
    }

    /// Opens a session in `Loading`. The plan is the explicit one or the
    /// first plan with a nonzero count. Persisted marks for the pair are
    /// restored immediately.
    pub fn select(
        &mut self,
        collection: &ItemCollection,
        item: ItemKey,
        plan: Option<PlanId>,
    ) -> Option<PositionsRequest> {
        if !collection.items.contains_key(&item) {
            takeoff_warn!("overlay: cannot select unknown item {}", item);
            return None;
        }
        let available_plans = collection.plans_with_counts(&item);
        let Some(plan) = plan.or_else(|| available_plans.first().cloned()) else {
            takeoff_debug!("overlay: {} has no counted plans", item);
            return None;
        };

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let restored = self
            .persisted
            .get(&(item.clone(), plan.clone()))
            .cloned()
            .unwrap_or_default();
        let page = collection.page_of(&plan);

        takeoff_debug!(
            "overlay: select {} on {} (request {}, restored {} rejected / {} added)",
            item,
            plan,
            request_id,
            restored.rejected.len(),
            restored.added.len()
        );
        self.session = Some(HighlightSession {
            item: item.clone(),
            plan: plan.clone(),
            page,
            available_plans,
            detections: Vec::new(),
            rejected: restored.rejected,
            added: restored.added,
            add_mode: false,
            phase: OverlayPhase::Loading,
            page_width: 0.0,
            page_height: 0.0,
            notice: None,
            request_id,
        });

        Some(PositionsRequest {
            request_id,
            item,
            plan,
            page,
        })
    }

    pub fn dismiss(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Applies a fetch result if it belongs to the live session. Returns
    /// `false` for stale results, which are dropped.
    pub fn positions_loaded(
        &mut self,
        request_id: u64,
        result: Result<FetchedPositions, String>,
    ) -> bool {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.request_id == request_id)
        else {
            takeoff_debug!("overlay: dropping stale positions for request {}", request_id);
            return false;
        };

        match result {
            Ok(mut fetched) => {
                session.detections = fetched
                    .detections_by_item
                    .remove(&session.item.identifier)
                    .unwrap_or_default();
                session.page_width = fetched.page_width;
                session.page_height = fetched.page_height;
                session.notice = None;
                let (width, height) = (fetched.page_width, fetched.page_height);
                if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
                    self.last_page_size = Some((width, height));
                }
                let len = session.detections.len();
                let before = session.rejected.len();
                session.rejected.retain(|index| *index < len);
                if session.rejected.len() != before {
                    let key = (session.item.clone(), session.plan.clone());
                    let marks = session.marks();
                    self.store(key, marks);
                }
            }
            Err(message) => {
                takeoff_warn!(
                    "overlay: positions for {} on {} unavailable: {}",
                    session.item,
                    session.plan,
                    message
                );
                session.detections.clear();
                if let Some((width, height)) = self.last_page_size {
                    session.page_width = width;
                    session.page_height = height;
                }
                session.notice = Some(OverlayNotice::PositionsUnavailable);
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.phase = OverlayPhase::Ready;
        }
        true
    }

    pub fn toggle_detection(&mut self, index: usize) -> Option<MarkerChange> {
        let session = self.ready_session_mut()?;
        let position = *session.detections.get(index)?;
        let edit = if session.rejected.remove(&index) {
            MarkerEdit::Restored { index, position }
        } else {
            session.rejected.insert(index);
            MarkerEdit::Rejected { index, position }
        };
        self.commit(edit)
    }

    /// Adds a marker centred on a document-space point.
    pub fn add_marker(&mut self, center_x: f64, center_y: f64) -> Option<MarkerChange> {
        let session = self.ready_session_mut()?;
        let position = Position::around(center_x, center_y, ADDED_MARKER_RADIUS);
        session.added.push(position);
        self.commit(MarkerEdit::Added { position })
    }

    /// Adds a marker at a clicked pixel on a page rendered at `(width, height)`.
    pub fn add_marker_at_pixel(
        &mut self,
        px: f64,
        py: f64,
        rendered_width: f64,
        rendered_height: f64,
    ) -> MarkerPlacement {
        let Some(session) = self.ready_session_mut() else {
            return MarkerPlacement::Ignored;
        };
        let Some(transform) = session.transform(rendered_width, rendered_height) else {
            takeoff_warn!(
                "overlay: cannot place a marker on a {}x{} rendering",
                rendered_width,
                rendered_height
            );
            session.notice = Some(OverlayNotice::MarkerNotPlaced);
            return MarkerPlacement::NotPlaced;
        };
        let (x, y) = transform.to_document(px, py);
        match self.add_marker(x, y) {
            Some(change) => MarkerPlacement::Added(change),
            None => MarkerPlacement::Ignored,
        }
    }

    pub fn remove_added(&mut self, index: usize) -> Option<MarkerChange> {
        let session = self.ready_session_mut()?;
        if index >= session.added.len() {
            return None;
        }
        let position = session.added.remove(index);
        self.commit(MarkerEdit::Removed { index, position })
    }

    pub fn toggle_add_mode(&mut self) -> Option<bool> {
        let session = self.session.as_mut()?;
        session.add_mode = !session.add_mode;
        Some(session.add_mode)
    }

    pub fn background_click(
        &mut self,
        px: f64,
        py: f64,
        rendered_width: f64,
        rendered_height: f64,
    ) -> BackgroundClick {
        let Some(session) = self.session.as_ref() else {
            return BackgroundClick::Ignored;
        };
        if !session.add_mode {
            self.dismiss();
            return BackgroundClick::Dismissed;
        }
        match self.add_marker_at_pixel(px, py, rendered_width, rendered_height) {
            MarkerPlacement::Added(change) => BackgroundClick::Added(change),
            MarkerPlacement::NotPlaced => BackgroundClick::NotPlaced,
            MarkerPlacement::Ignored => BackgroundClick::Ignored,
        }
    }

    /// Moves to the next (or previous) plan of the session, wrapping around.
    /// The route keeps every plan the session started with, so a plan whose
    /// count was reviewed down to zero stays reachable.
    pub fn step_plan(
        &mut self,
        collection: &ItemCollection,
        forward: bool,
    ) -> Option<PositionsRequest> {
        let session = self.session.as_ref()?;
        let route = navigation_route(collection, session);
        if route.len() < 2 {
            return None;
        }
        let current = route.iter().position(|plan| *plan == session.plan)?;
        let next = if forward {
            (current + 1) % route.len()
        } else {
            (current + route.len() - 1) % route.len()
        };
        let item = session.item.clone();
        let request = self.select(collection, item, Some(route[next].clone()))?;
        if let Some(session) = self.session.as_mut() {
            session.available_plans = route;
        }
        Some(request)
    }

    /// Ends the session if its item disappeared from the collection.
    pub fn retain_known(&mut self, collection: &ItemCollection) -> bool {
        let gone = self
            .session
            .as_ref()
            .is_some_and(|session| !collection.items.contains_key(&session.item));
        if gone {
            self.session = None;
        }
        gone
    }

    pub fn review_snapshot(&self) -> Vec<ReviewMarksSnapshot> {
        self.persisted
            .iter()
            .filter(|(_, marks)| !marks.is_empty())
            .map(|((item, plan), marks)| ReviewMarksSnapshot {
                item: item.clone(),
                plan: plan.clone(),
                rejected: marks.rejected.iter().copied().collect(),
                added: marks.added.clone(),
            })
            .collect()
    }

    pub fn restore_review(&mut self, entries: Vec<ReviewMarksSnapshot>) {
        for entry in entries {
            self.persisted.insert(
                (entry.item, entry.plan),
                ReviewMarks {
                    rejected: entry.rejected.into_iter().collect(),
                    added: entry.added,
                },
            );
        }
    }

    /// True once after any change to the persisted marks.
    pub fn consume_marks_dirty(&mut self) -> bool {
        std::mem::take(&mut self.marks_dirty)
    }

    fn ready_session_mut(&mut self) -> Option<&mut HighlightSession> {
        self.session
            .as_mut()
            .filter(|session| session.phase == OverlayPhase::Ready)
    }

    fn commit(&mut self, edit: MarkerEdit) -> Option<MarkerChange> {
        let session = self.session.as_mut()?;
        if session.notice == Some(OverlayNotice::MarkerNotPlaced) {
            session.notice = None;
        }
        let key = (session.item.clone(), session.plan.clone());
        let change = MarkerChange {
            item: session.item.clone(),
            plan: session.plan.clone(),
            acceptance: session.acceptance_count(),
            edit,
        };
        let marks = session.marks();
        self.store(key, marks);
        Some(change)
    }

    fn store(&mut self, key: (ItemKey, PlanId), marks: ReviewMarks) {
        self.persisted.insert(key, marks);
        self.marks_dirty = true;
    }
}

/// Session plans, plans counted now, and the current plan, in document
/// order. Plans missing from the document go last.
fn navigation_route(collection: &ItemCollection, session: &HighlightSession) -> Vec<PlanId> {
    let counted = collection.plans_with_counts(&session.item);
    let wanted = |plan: &PlanId| {
        *plan == session.plan || session.available_plans.contains(plan) || counted.contains(plan)
    };
    let mut route: Vec<PlanId> = collection
        .plans
        .iter()
        .map(|sheet| sheet.id.clone())
        .filter(|plan| wanted(plan))
        .collect();
    let extra = session
        .available_plans
        .iter()
        .chain(&counted)
        .chain(std::iter::once(&session.plan));
    for plan in extra {
        if !route.contains(plan) {
            route.push(plan.clone());
        }
    }
    route
}
