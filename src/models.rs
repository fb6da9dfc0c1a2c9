use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::{RiskAssessment, RiskTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentCategory {
    Quiz,
    Exam,
    Project,
    Participation,
}

impl std::str::FromStr for AssessmentCategory {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiz" => Ok(Self::Quiz),
            "exam" => Ok(Self::Exam),
            "project" => Ok(Self::Project),
            "participation" => Ok(Self::Participation),
            other => anyhow::bail!("unknown assessment category '{other}'"),
        }
    }
}

impl std::fmt::Display for AssessmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Quiz => "Quiz",
            Self::Exam => "Exam",
            Self::Project => "Project",
            Self::Participation => "Participation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub category: AssessmentCategory,
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub date: NaiveDate,
}

impl Assessment {
    /// Score as a fraction of the maximum. Degenerate rows (non-positive
    /// maximum, negative or non-finite score) count as 0.
    pub fn ratio(&self) -> f64 {
        if self.max_score.is_nan() || self.max_score <= 0.0 {
            return 0.0;
        }
        let ratio = self.score / self.max_score;
        if ratio.is_finite() {
            ratio.max(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl std::str::FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => Ok(Self::Present),
            "absent" | "a" => Ok(Self::Absent),
            "late" | "l" => Ok(Self::Late),
            other => anyhow::bail!("unknown attendance status '{other}'"),
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<String>,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AttendanceRecord {
    pub fn same_slot(&self, date: NaiveDate, time_slot: Option<&str>) -> bool {
        self.date == date && self.time_slot.as_deref() == time_slot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionLog {
    pub id: Uuid,
    pub logged_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub kind: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub student_id: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub email: String,
    pub course: String,
    pub year_level: i32,
    pub block: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub interventions: Vec<InterventionLog>,
    #[serde(default)]
    pub risk: RiskAssessment,
}

impl Student {
    pub fn full_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Roster entry before it has any history attached.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub student_id: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub email: String,
    pub course: String,
    pub year_level: i32,
    pub block: String,
    pub gender: String,
    pub birthday: Option<NaiveDate>,
    pub contact: String,
}

/// Assessment details shared by every score in one grading session.
#[derive(Debug, Clone)]
pub struct AssessmentEntry {
    pub category: AssessmentCategory,
    pub name: String,
    pub max_score: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TierCounts {
    pub low: usize,
    pub early_warning: usize,
    pub moderate: usize,
    pub high: usize,
}

impl TierCounts {
    pub fn tally<'a>(students: impl IntoIterator<Item = &'a Student>) -> Self {
        let mut counts = Self::default();
        for student in students {
            match student.risk.tier {
                RiskTier::Low => counts.low += 1,
                RiskTier::EarlyWarning => counts.early_warning += 1,
                RiskTier::Moderate => counts.moderate += 1,
                RiskTier::High => counts.high += 1,
            }
        }
        counts
    }
}
