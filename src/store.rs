use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::models::Student;

/// Where the roster lives between runs.
pub trait StudentRepository {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>>;
    async fn save_students(&self, students: &[Student]) -> anyhow::Result<()>;
}

/// Roster kept as one pretty-printed JSON document.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StudentRepository for JsonFileStore {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no roster file yet");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };

        serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not a valid roster file", self.path.display()))
    }

    async fn save_students(&self, students: &[Student]) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(students)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = students.len(), "roster saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentCategory, AssessmentEntry};
    use crate::risk::Policy;
    use crate::roster::{tests::new_student, Roster};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("risk-monitor-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_file_loads_empty_roster() {
        let store = JsonFileStore::new(scratch_path());
        assert!(store.load_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_roster_reloads_with_history_and_risk() {
        let store = JsonFileStore::new(scratch_path());
        let mut roster = Roster::new(Vec::new(), Policy::default());
        roster.add_student(new_student("S-1", "Ana")).unwrap();
        let entry = AssessmentEntry {
            category: AssessmentCategory::Exam,
            name: "Midterm".to_string(),
            max_score: 50.0,
            date: NaiveDate::from_ymd_opt(2026, 10, 5).unwrap(),
        };
        roster.record_assessment("S-1", &entry, 20.0).unwrap();

        store.save_students(roster.students()).await.unwrap();
        let loaded = store.load_students().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let original = &roster.students()[0];
        assert_eq!(loaded[0].id, original.id);
        assert_eq!(loaded[0].assessments[0].name, "Midterm");
        assert_eq!(loaded[0].risk.tier, original.risk.tier);
        assert!((loaded[0].risk.probability - original.risk.probability).abs() < 1e-9);

        tokio::fs::remove_file(store.path()).await.unwrap();
    }

    #[tokio::test]
    async fn roster_stays_loadable_after_non_finite_score() {
        let store = JsonFileStore::new(scratch_path());
        let mut roster = Roster::new(Vec::new(), Policy::default());
        roster.add_student(new_student("S-1", "Ana")).unwrap();
        let entry = AssessmentEntry {
            category: AssessmentCategory::Quiz,
            name: "Quiz 1".to_string(),
            max_score: 100.0,
            date: NaiveDate::from_ymd_opt(2026, 10, 5).unwrap(),
        };
        let nan: f64 = "NaN".parse().unwrap();
        assert!(roster.record_assessment("S-1", &entry, nan).is_err());

        let zero_max = AssessmentEntry {
            max_score: 0.0,
            ..entry.clone()
        };
        roster.record_assessment("S-1", &zero_max, 40.0).unwrap();

        store.save_students(roster.students()).await.unwrap();
        let loaded = store.load_students().await.unwrap();
        assert_eq!(loaded[0].assessments.len(), 1);
        assert_eq!(loaded[0].assessments[0].ratio(), 0.0);
        assert!(loaded[0].risk.probability.is_finite());

        tokio::fs::remove_file(store.path()).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let store = JsonFileStore::new(scratch_path());
        tokio::fs::write(store.path(), b"{not json").await.unwrap();
        assert!(store.load_students().await.is_err());
        tokio::fs::remove_file(store.path()).await.unwrap();
    }
}
