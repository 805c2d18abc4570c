use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use takeoff_core::{ItemKey, ItemKind, Position, ReviewMarksSnapshot};
use takeoff_engine::AtomicFileWriter;
use takeoff_logging::{takeoff_error, takeoff_info, takeoff_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PersistedKind {
    Fixture,
    Keynote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedMarker {
    x0: f64,
    top: f64,
    x1: f64,
    bottom: f64,
    center_x: f64,
    center_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedMarks {
    kind: PersistedKind,
    identifier: String,
    plan: String,
    #[serde(default)]
    rejected: Vec<usize>,
    #[serde(default)]
    added: Vec<PersistedMarker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct PersistedReview {
    project: String,
    saved_utc: String,
    marks: Vec<PersistedMarks>,
}

/// `.takeoff_review_<project>.ron`, with anything outside `[A-Za-z0-9_-]`
/// in the project id replaced by `_`.
pub(crate) fn review_filename(project_id: &str) -> String {
    let safe: String = project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(".takeoff_review_{safe}.ron")
}

pub(crate) fn load_review_marks(state_dir: &Path, project_id: &str) -> Vec<ReviewMarksSnapshot> {
    let writer = AtomicFileWriter::new(PathBuf::from(state_dir));
    let filename = review_filename(project_id);
    let content = match writer.read(&filename) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(err) => {
            takeoff_warn!("Failed to read review marks {:?}: {}", filename, err);
            return Vec::new();
        }
    };

    let review: PersistedReview = match ron::from_str(&content) {
        Ok(review) => review,
        Err(err) => {
            takeoff_warn!("Failed to parse review marks {:?}: {}", filename, err);
            return Vec::new();
        }
    };
    if review.project != project_id {
        takeoff_warn!(
            "Review marks in {:?} belong to project {:?}; ignoring",
            filename,
            review.project
        );
        return Vec::new();
    }

    let marks: Vec<ReviewMarksSnapshot> = review
        .marks
        .into_iter()
        .map(|entry| ReviewMarksSnapshot {
            item: ItemKey::new(
                match entry.kind {
                    PersistedKind::Fixture => ItemKind::Fixture,
                    PersistedKind::Keynote => ItemKind::Keynote,
                },
                entry.identifier,
            ),
            plan: entry.plan,
            rejected: entry.rejected,
            added: entry
                .added
                .into_iter()
                .map(|marker| Position {
                    x0: marker.x0,
                    top: marker.top,
                    x1: marker.x1,
                    bottom: marker.bottom,
                    center_x: marker.center_x,
                    center_y: marker.center_y,
                })
                .collect(),
        })
        .collect();
    takeoff_info!(
        "Loaded {} review entries saved {}",
        marks.len(),
        review.saved_utc
    );
    marks
}

pub(crate) fn save_review_marks(state_dir: &Path, project_id: &str, marks: &[ReviewMarksSnapshot]) {
    let review = PersistedReview {
        project: project_id.to_string(),
        saved_utc: Utc::now().to_rfc3339(),
        marks: marks
            .iter()
            .map(|entry| PersistedMarks {
                kind: match entry.item.kind {
                    ItemKind::Fixture => PersistedKind::Fixture,
                    ItemKind::Keynote => PersistedKind::Keynote,
                },
                identifier: entry.item.identifier.clone(),
                plan: entry.plan.clone(),
                rejected: entry.rejected.clone(),
                added: entry
                    .added
                    .iter()
                    .map(|position| PersistedMarker {
                        x0: position.x0,
                        top: position.top,
                        x1: position.x1,
                        bottom: position.bottom,
                        center_x: position.center_x,
                        center_y: position.center_y,
                    })
                    .collect(),
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&review, pretty) {
        Ok(text) => text,
        Err(err) => {
            takeoff_error!("Failed to serialize review marks: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(PathBuf::from(state_dir));
    if let Err(err) = writer.write(&review_filename(project_id), &content) {
        takeoff_error!("Failed to write review marks to {:?}: {}", state_dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> Vec<ReviewMarksSnapshot> {
        vec![
            ReviewMarksSnapshot {
                item: ItemKey::fixture("B6"),
                plan: "E1".into(),
                rejected: vec![3, 7],
                added: vec![Position::around(1224.0, 792.0, 10.0)],
            },
            ReviewMarksSnapshot {
                item: ItemKey::keynote("12"),
                plan: "E2".into(),
                rejected: vec![0],
                added: Vec::new(),
            },
        ]
    }

    #[test]
    fn saved_marks_load_back() {
        let temp = TempDir::new().unwrap();
        save_review_marks(temp.path(), "job-7", &sample());
        assert!(temp.path().join(".takeoff_review_job-7.ron").is_file());
        assert_eq!(load_review_marks(temp.path(), "job-7"), sample());
    }

    #[test]
    fn missing_or_corrupt_files_load_empty() {
        let temp = TempDir::new().unwrap();
        assert!(load_review_marks(temp.path(), "job-7").is_empty());

        fs::write(temp.path().join(review_filename("job-7")), "not ron").unwrap();
        assert!(load_review_marks(temp.path(), "job-7").is_empty());
    }

    #[test]
    fn marks_for_another_project_are_ignored() {
        let temp = TempDir::new().unwrap();
        save_review_marks(temp.path(), "a/b", &sample());
        // "a/b" and "a_b" share a file name but not a project.
        assert!(load_review_marks(temp.path(), "a_b").is_empty());
        assert_eq!(load_review_marks(temp.path(), "a/b").len(), 2);
    }
}
