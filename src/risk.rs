use serde::{Deserialize, Serialize};

use crate::models::{Assessment, AttendanceRecord, AttendanceStatus, Student};

pub const DEFAULT_PASSING_THRESHOLD: f64 = 0.75;
pub const DEFAULT_ATTENDANCE_ABSENCE_LIMIT: f64 = 0.20;

const GRADE_WEIGHT: f64 = 0.6;
const ATTENDANCE_WEIGHT: f64 = 0.4;

const SUDDEN_DROP_MARGIN: f64 = 0.20;
const SUDDEN_DROP_BONUS: f64 = 0.30;
const SLIPPING_BONUS: f64 = 0.15;

const LATE_WEIGHT: f64 = 0.33;
const WATCH_FACTOR: f64 = 0.4;
const ABSENCE_STREAK_LEN: usize = 3;
const ABSENCE_STREAK_BONUS: f64 = 0.20;

/// Tunable thresholds the engine scores against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub passing_threshold: f64,
    pub attendance_absence_limit: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            passing_threshold: DEFAULT_PASSING_THRESHOLD,
            attendance_absence_limit: DEFAULT_ATTENDANCE_ABSENCE_LIMIT,
        }
    }
}

impl Policy {
    pub fn new(passing_threshold: f64, attendance_absence_limit: f64) -> anyhow::Result<Self> {
        for (name, value) in [
            ("passing threshold", passing_threshold),
            ("attendance absence limit", attendance_absence_limit),
        ] {
            if !(value > 0.0 && value < 1.0) {
                anyhow::bail!("{name} must be between 0 and 1 (exclusive), got {value}");
            }
        }
        Ok(Self {
            passing_threshold,
            attendance_absence_limit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum RiskTier {
    #[default]
    Low,
    EarlyWarning,
    Moderate,
    High,
}

impl RiskTier {
    /// Lower bounds are inclusive: 0.80 is High, 0.66 Moderate, 0.51 EarlyWarning.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.80 {
            Self::High
        } else if probability >= 0.66 {
            Self::Moderate
        } else if probability >= 0.51 {
            Self::EarlyWarning
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::EarlyWarning => "EarlyWarning",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::EarlyWarning => "Early Warning",
            Self::Moderate => "Moderate Risk",
            Self::High => "High Risk",
        }
    }

    pub fn alert_heading(self) -> &'static str {
        match self {
            Self::Low => "",
            Self::EarlyWarning => "Tier 1: EARLY WARNING",
            Self::Moderate => "Tier 2: MODERATE RISK",
            Self::High => "Tier 3: HIGH RISK",
        }
    }

    pub fn alert_message(self) -> &'static str {
        match self {
            Self::Low => "",
            Self::EarlyWarning => "Showing first signs of academic or attendance risk.",
            Self::Moderate => "Consistent decline in performance or attendance detected.",
            Self::High => "Critical academic failure likely without immediate intervention.",
        }
    }
}

impl std::str::FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "low" => Ok(Self::Low),
            "earlywarning" => Ok(Self::EarlyWarning),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            other => anyhow::bail!("unknown risk tier '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskFlags {
    pub slipping: bool,
    pub sudden_drop: bool,
    pub chronic_absentee: bool,
}

impl RiskFlags {
    pub fn any(&self) -> bool {
        self.slipping || self.sudden_drop || self.chronic_absentee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub probability: f64,
    pub tier: RiskTier,
    pub flags: RiskFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradeFactor {
    pub value: f64,
    pub slipping: bool,
    pub sudden_drop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttendanceFactor {
    pub value: f64,
    pub chronic_absentee: bool,
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn grade_factor(assessments: &[Assessment], policy: &Policy) -> GradeFactor {
    if assessments.is_empty() {
        return GradeFactor::default();
    }

    let ratios: Vec<f64> = assessments.iter().map(Assessment::ratio).collect();
    let avg_score = ratios.iter().sum::<f64>() / ratios.len() as f64;
    let threshold = policy.passing_threshold;

    let mut factor = GradeFactor::default();
    if threshold > 0.0 && avg_score < threshold {
        factor.value = clamp_unit((threshold - avg_score) / threshold * 2.0);
    }

    if let [.., prev, last] = ratios.as_slice() {
        if prev - last > SUDDEN_DROP_MARGIN {
            factor.sudden_drop = true;
            factor.value = clamp_unit(factor.value + SUDDEN_DROP_BONUS);
        }
    }

    if let [.., a, b, c] = ratios.as_slice() {
        if a > b && b > c {
            factor.slipping = true;
            factor.value = clamp_unit(factor.value + SLIPPING_BONUS);
        }
    }

    factor
}

pub fn attendance_factor(attendance: &[AttendanceRecord], policy: &Policy) -> AttendanceFactor {
    if attendance.is_empty() {
        return AttendanceFactor::default();
    }

    let count = |status: AttendanceStatus| {
        attendance
            .iter()
            .filter(|record| record.status == status)
            .count()
    };
    let absences = count(AttendanceStatus::Absent) as f64;
    let lates = count(AttendanceStatus::Late) as f64;
    let rate = (absences + lates * LATE_WEIGHT) / attendance.len() as f64;
    let limit = policy.attendance_absence_limit;

    let mut factor = AttendanceFactor::default();
    if limit > 0.0 {
        if rate > limit {
            factor.chronic_absentee = true;
            factor.value = clamp_unit(rate / limit);
        } else if rate > limit / 2.0 {
            factor.value = WATCH_FACTOR;
        }
    }

    if attendance.len() >= ABSENCE_STREAK_LEN
        && attendance[attendance.len() - ABSENCE_STREAK_LEN..]
            .iter()
            .all(|r| r.status == AttendanceStatus::Absent)
    {
        factor.value = clamp_unit(factor.value + ABSENCE_STREAK_BONUS);
    }

    factor
}

/// Scores one student's history. Pure: inputs are only read, and degenerate
/// input (empty lists, zero maximum scores) contributes nothing.
pub fn evaluate(
    assessments: &[Assessment],
    attendance: &[AttendanceRecord],
    policy: &Policy,
) -> RiskAssessment {
    let grades = grade_factor(assessments, policy);
    let presence = attendance_factor(attendance, policy);
    let probability = clamp_unit(grades.value * GRADE_WEIGHT + presence.value * ATTENDANCE_WEIGHT);

    RiskAssessment {
        probability,
        tier: RiskTier::from_probability(probability),
        flags: RiskFlags {
            slipping: grades.slipping,
            sudden_drop: grades.sudden_drop,
            chronic_absentee: presence.chronic_absentee,
        },
    }
}

pub fn evaluate_student(student: &Student, policy: &Policy) -> RiskAssessment {
    evaluate(&student.assessments, &student.attendance, policy)
}

pub fn evaluate_batch(students: &[Student], policy: &Policy) -> Vec<RiskAssessment> {
    students
        .iter()
        .map(|student| evaluate_student(student, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssessmentCategory;
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap() + Duration::days(offset)
    }

    fn scores(ratios: &[(f64, f64)]) -> Vec<Assessment> {
        ratios
            .iter()
            .enumerate()
            .map(|(i, (score, max_score))| Assessment {
                id: Uuid::new_v4(),
                category: AssessmentCategory::Quiz,
                name: format!("Quiz {}", i + 1),
                score: *score,
                max_score: *max_score,
                date: day(i as i64 * 7),
            })
            .collect()
    }

    fn days(statuses: &[AttendanceStatus]) -> Vec<AttendanceRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| AttendanceRecord {
                date: day(i as i64),
                time_slot: None,
                status: *status,
                reason: None,
            })
            .collect()
    }

    use AttendanceStatus::{Absent, Late, Present};

    #[test]
    fn empty_history_is_low_risk() {
        let result = evaluate(&[], &[], &Policy::default());
        assert_eq!(result.probability, 0.0);
        assert_eq!(result.tier, RiskTier::Low);
        assert!(!result.flags.any());
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        assert_eq!(RiskTier::from_probability(0.50), RiskTier::Low);
        assert_eq!(RiskTier::from_probability(0.51), RiskTier::EarlyWarning);
        assert_eq!(RiskTier::from_probability(0.65), RiskTier::EarlyWarning);
        assert_eq!(RiskTier::from_probability(0.66), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.79), RiskTier::Moderate);
        assert_eq!(RiskTier::from_probability(0.80), RiskTier::High);
        assert_eq!(RiskTier::from_probability(1.0), RiskTier::High);
    }

    #[test]
    fn absent_streak_with_mixed_grades_is_early_warning() {
        let assessments = scores(&[(80.0, 100.0), (45.0, 100.0), (55.0, 100.0)]);
        let mut attendance = days(&[Present, Absent, Absent, Absent]);
        attendance[1].reason = Some("Fever".to_string());

        let result = evaluate(&assessments, &attendance, &Policy::default());
        assert!((result.probability - 0.64).abs() < 0.001);
        assert_eq!(result.tier, RiskTier::EarlyWarning);
        assert_eq!(
            result.flags,
            RiskFlags {
                slipping: false,
                sudden_drop: false,
                chronic_absentee: true,
            }
        );
    }

    #[test]
    fn perfect_single_score_scores_zero() {
        let result = evaluate(&scores(&[(100.0, 100.0)]), &[], &Policy::default());
        assert_eq!(result.probability, 0.0);
        assert_eq!(result.tier, RiskTier::Low);
        assert!(!result.flags.any());
    }

    #[test]
    fn sudden_drop_flags_even_when_tier_is_low() {
        let assessments = scores(&[(90.0, 100.0), (40.0, 100.0)]);
        let grades = grade_factor(&assessments, &Policy::default());
        assert!((grades.value - 0.5667).abs() < 0.001);

        let result = evaluate(&assessments, &[], &Policy::default());
        assert!((result.probability - 0.34).abs() < 0.001);
        assert_eq!(result.tier, RiskTier::Low);
        assert!(result.flags.sudden_drop);
        assert!(!result.flags.slipping);
    }

    #[test]
    fn strict_three_step_decline_marks_slipping() {
        let policy = Policy::default();
        let declining = grade_factor(
            &scores(&[(95.0, 100.0), (90.0, 100.0), (85.0, 100.0)]),
            &policy,
        );
        assert!(declining.slipping);
        assert!(!declining.sudden_drop);
        assert!((declining.value - 0.15).abs() < 0.001);

        let flat = grade_factor(
            &scores(&[(90.0, 100.0), (90.0, 100.0), (85.0, 100.0)]),
            &policy,
        );
        assert!(!flat.slipping);
        assert_eq!(flat.value, 0.0);
    }

    #[test]
    fn grade_bonuses_cap_at_one() {
        let grades = grade_factor(
            &scores(&[(60.0, 100.0), (30.0, 100.0), (0.0, 100.0)]),
            &Policy::default(),
        );
        assert!(grades.slipping);
        assert!(grades.sudden_drop);
        assert_eq!(grades.value, 1.0);
    }

    #[test]
    fn zero_max_score_counts_as_zero_ratio() {
        let grades = grade_factor(&scores(&[(50.0, 0.0)]), &Policy::default());
        assert_eq!(grades.value, 1.0);
        let result = evaluate(&scores(&[(50.0, 0.0)]), &[], &Policy::default());
        assert!(result.probability.is_finite());
        assert!((result.probability - 0.6).abs() < 0.001);
    }

    #[test]
    fn exact_thresholds_are_exclusive() {
        let policy = Policy::default();

        let even_drop = grade_factor(&scores(&[(50.0, 100.0), (30.0, 100.0)]), &policy);
        assert!(!even_drop.sudden_drop);
        let steeper_drop = grade_factor(&scores(&[(50.0, 100.0), (29.0, 100.0)]), &policy);
        assert!(steeper_drop.sudden_drop);

        // 2 absences over 10 days sits exactly on the limit
        let mut statuses = vec![Absent, Absent];
        statuses.extend(vec![Present; 8]);
        let at_limit = attendance_factor(&days(&statuses), &policy);
        assert!(!at_limit.chronic_absentee);
        assert!((at_limit.value - 0.4).abs() < 0.001);

        // 1 absence over 10 days sits exactly on half the limit
        let mut statuses = vec![Absent];
        statuses.extend(vec![Present; 9]);
        let at_half = attendance_factor(&days(&statuses), &policy);
        assert!(!at_half.chronic_absentee);
        assert_eq!(at_half.value, 0.0);
    }

    #[test]
    fn lates_count_as_a_third_of_an_absence() {
        // 3 lates over 10 days = 0.099, below half the limit
        let mut statuses = vec![Present; 7];
        statuses.extend([Late, Late, Late]);
        let light = attendance_factor(&days(&statuses), &Policy::default());
        assert_eq!(light.value, 0.0);
        assert!(!light.chronic_absentee);

        // 1 absence + 1 late over 10 days = 0.133, inside the watch band
        let mut statuses = vec![Present; 8];
        statuses.extend([Absent, Late]);
        let watch = attendance_factor(&days(&statuses), &Policy::default());
        assert!((watch.value - 0.4).abs() < 0.001);
        assert!(!watch.chronic_absentee);
    }

    #[test]
    fn chronic_absence_saturates_attendance_factor() {
        // 3 absences over 10 days, not consecutive
        let statuses = [
            Absent, Present, Absent, Present, Absent, Present, Present, Present, Present, Present,
        ];
        let factor = attendance_factor(&days(&statuses), &Policy::default());
        assert!(factor.chronic_absentee);
        assert!((factor.value - 1.0).abs() < 0.001);

        // 5 absences over 20 days sits just past a 0.24 limit
        let mut statuses = vec![Absent; 5];
        statuses.extend(vec![Present; 15]);
        let policy = Policy::new(0.75, 0.24).unwrap();
        let factor = attendance_factor(&days(&statuses), &policy);
        assert!(factor.chronic_absentee);
        assert_eq!(factor.value, 1.0);
    }

    #[test]
    fn absence_streak_applies_without_chronic_flag() {
        let mut statuses = vec![Present; 17];
        statuses.extend([Absent, Absent, Absent]);
        let factor = attendance_factor(&days(&statuses), &Policy::default());
        // 3 / 20 = 0.15 is a watch rate, plus the streak bonus
        assert!(!factor.chronic_absentee);
        assert!((factor.value - 0.6).abs() < 0.001);

        let short = attendance_factor(&days(&[Absent, Absent]), &Policy::default());
        assert!(short.chronic_absentee);
        assert_eq!(short.value, 1.0);
    }

    #[test]
    fn lowering_latest_score_never_lowers_grade_factor() {
        let policy = Policy::default();
        let history = |latest: f64| scores(&[(70.0, 100.0), (80.0, 100.0), (latest, 100.0)]);
        let mut previous = grade_factor(&history(100.0), &policy).value;
        for latest in (0..=19).rev().map(|step| step as f64 * 5.0) {
            let current = grade_factor(&history(latest), &policy).value;
            assert!(current + 1e-12 >= previous, "latest={latest} {current} < {previous}");
            previous = current;
        }
    }

    #[test]
    fn probability_stays_in_unit_range() {
        let policy = Policy::default();
        let worst = evaluate(
            &scores(&[(100.0, 100.0), (50.0, 100.0), (0.0, 100.0), (-20.0, 100.0)]),
            &days(&[Absent, Late, Absent, Absent, Absent]),
            &policy,
        );
        assert!((0.0..=1.0).contains(&worst.probability));
        assert_eq!(worst.tier, RiskTier::High);

        let odd = evaluate(&scores(&[(f64::INFINITY, 100.0), (5.0, f64::NAN)]), &[], &policy);
        assert!((0.0..=1.0).contains(&odd.probability));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let assessments = scores(&[(80.0, 100.0), (45.0, 100.0)]);
        let attendance = days(&[Present, Late, Absent]);
        let policy = Policy::default();
        let first = evaluate(&assessments, &attendance, &policy);
        let second = evaluate(&assessments, &attendance, &policy);
        assert_eq!(first, second);
    }

    #[test]
    fn policy_rejects_out_of_range_values() {
        assert!(Policy::new(0.75, 0.20).is_ok());
        assert!(Policy::new(0.0, 0.20).is_err());
        assert!(Policy::new(0.75, 1.0).is_err());
        assert!(Policy::new(f64::NAN, 0.20).is_err());
    }

    #[test]
    fn stricter_policy_raises_risk() {
        let assessments = scores(&[(78.0, 100.0), (80.0, 100.0)]);
        let lenient = evaluate(&assessments, &[], &Policy::default());
        let strict = evaluate(&assessments, &[], &Policy::new(0.90, 0.20).unwrap());
        assert_eq!(lenient.probability, 0.0);
        assert!(strict.probability > 0.0);
    }
}
