use takeoff_core::{
    AppViewModel, DiffEntry, DiffOrigin, DiffReport, ItemRowView, OverlayNotice, OverlayView,
    RunState, TaskRowView, TaskStatus,
};

/// Renders the view model as console lines.
pub fn render(view: &AppViewModel) -> Vec<String> {
    let mut lines = vec![status_line(view)];
    lines.extend(view.tasks.iter().map(task_line));
    if !view.items.is_empty() {
        lines.push(format!(
            "items: {} on {} plans, project total {}",
            view.items.len(),
            view.plans.len(),
            view.project_total
        ));
        lines.extend(view.items.iter().map(item_line));
    }
    if let Some(overlay) = &view.overlay {
        lines.push(overlay_line(overlay));
    }
    if let Some(report) = &view.last_diff {
        lines.extend(diff_lines(report));
    }
    lines
}

fn status_line(view: &AppViewModel) -> String {
    let run = match (&view.run_state, &view.active_run) {
        (RunState::Idle, _) => "idle".to_string(),
        (RunState::Running, Some(run_id)) => format!("running {run_id}"),
        (RunState::Running, None) => "running".to_string(),
        (RunState::Completed, _) => "completed".to_string(),
        (RunState::Failed { message }, _) => format!("failed: {message}"),
    };
    let mut line = format!("[{}] {}", view.project_id, run);
    if view.can_save {
        line.push_str(&format!(" | {} edits", view.edit_count));
    }
    if view.feedback_reported > 0 {
        line.push_str(&format!(
            " | feedback {} sent / {} on server",
            view.feedback_reported, view.feedback_confirmed
        ));
    }
    line
}

fn task_line(task: &TaskRowView) -> String {
    let marker = match task.status {
        TaskStatus::Pending => ' ',
        TaskStatus::Running => '>',
        TaskStatus::Completed => '+',
        TaskStatus::Error => '!',
    };
    let mut line = format!("  [{marker}] {:<14} {:?}", task.name, task.status);
    if let Some(elapsed) = task.elapsed_seconds {
        line.push_str(&format!(" {elapsed:.1}s"));
    }
    if !task.flags.is_empty() {
        line.push_str(&format!(" flags={}", task.flags.join(",")));
    }
    if let Some(confidence) = task.confidence {
        line.push_str(&format!(
            " verify={:?} ({:.0}%, {} issues)",
            task.verification,
            confidence * 100.0,
            task.issue_count
        ));
    }
    line
}

fn item_line(item: &ItemRowView) -> String {
    let counts = item
        .counts
        .iter()
        .map(|(plan, count)| format!("{plan}={count}"))
        .collect::<Vec<_>>()
        .join(" ");
    let key = item.key.to_string();
    match &item.description {
        Some(description) => format!("  {key:<8} {:>5}  {counts}  {description}", item.total),
        None => format!("  {key:<8} {:>5}  {counts}", item.total),
    }
}

fn overlay_line(overlay: &OverlayView) -> String {
    if overlay.loading {
        return format!("overlay {} on {}: loading...", overlay.item, overlay.plan);
    }
    let position = overlay
        .plan_position
        .map(|index| format!("{}/{}", index + 1, overlay.plan_count))
        .unwrap_or_else(|| "-".to_string());
    let notice = match overlay.notice {
        Some(OverlayNotice::PositionsUnavailable) => " [positions unavailable]",
        Some(OverlayNotice::MarkerNotPlaced) => " [marker not placed]",
        None => "",
    };
    format!(
        "overlay {} on {} ({}): {} detections, rejected {:?}, {} added -> {} accepted (ledger {}){}{}",
        overlay.item,
        overlay.plan,
        position,
        overlay.detections,
        overlay.rejected,
        overlay.added,
        overlay.acceptance,
        overlay.ledger_count,
        if overlay.add_mode { " [add mode]" } else { "" },
        notice
    )
}

fn diff_lines(report: &DiffReport) -> Vec<String> {
    let summary = &report.summary;
    let origin = match report.origin {
        DiffOrigin::Reprocess => "since reprocess",
        DiffOrigin::Original => "vs original",
    };
    let mut lines = vec![format!(
        "diff {origin}: {} count, {} spec, +{} -{} items{}",
        summary.count_changes,
        summary.spec_changes,
        summary.items_added,
        summary.items_removed,
        if summary.needs_rerun { " (rerun needed)" } else { "" }
    )];
    lines.extend(summary.added.iter().map(|key| format!("  + {key}")));
    lines.extend(summary.removed.iter().map(|key| format!("  - {key}")));
    lines.extend(summary.changes.iter().map(|change| match change {
        DiffEntry::Count {
            item,
            plan,
            before,
            after,
        } => format!("  ~ {item} {plan}: {before} -> {after}"),
        DiffEntry::Field {
            item,
            field,
            before,
            after,
        } => format!(
            "  ~ {item} {field}: {:?} -> {:?}",
            before.as_deref().unwrap_or(""),
            after.as_deref().unwrap_or("")
        ),
    }));
    lines
}
