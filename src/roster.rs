use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    Assessment, AssessmentEntry, AttendanceRecord, AttendanceStatus, InterventionLog, NewStudent,
    Student, TierCounts,
};
use crate::risk::{self, Policy, RiskTier};

/// In-memory roster. Every write recomputes the touched students' risk so the
/// cached assessment never lags behind their history.
#[derive(Debug, Clone)]
pub struct Roster {
    students: Vec<Student>,
    policy: Policy,
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student_id: String,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
}

impl Roster {
    pub fn new(students: Vec<Student>, policy: Policy) -> Self {
        let mut roster = Self { students, policy };
        roster.recompute_all();
        roster
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn find(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    fn position(&self, student_id: &str) -> anyhow::Result<usize> {
        self.students
            .iter()
            .position(|s| s.student_id == student_id)
            .with_context(|| format!("no student with id {student_id}"))
    }

    fn recompute(&mut self, index: usize) {
        let student = &mut self.students[index];
        student.risk = risk::evaluate_student(student, &self.policy);
        debug!(
            student_id = %student.student_id,
            probability = student.risk.probability,
            tier = ?student.risk.tier,
            "risk recomputed"
        );
    }

    pub fn recompute_all(&mut self) {
        let scores = risk::evaluate_batch(&self.students, &self.policy);
        for (student, score) in self.students.iter_mut().zip(scores) {
            student.risk = score;
        }
    }

    pub fn add_student(&mut self, new: NewStudent) -> anyhow::Result<Uuid> {
        if self.find(&new.student_id).is_some() {
            anyhow::bail!("student id {} is already on the roster", new.student_id);
        }

        let id = Uuid::new_v4();
        self.students.push(Student {
            id,
            student_id: new.student_id,
            first_name: new.first_name,
            middle_name: new.middle_name,
            last_name: new.last_name,
            email: new.email,
            course: new.course,
            year_level: new.year_level,
            block: new.block,
            gender: new.gender,
            birthday: new.birthday,
            contact: new.contact,
            assessments: Vec::new(),
            attendance: Vec::new(),
            interventions: Vec::new(),
            risk: Default::default(),
        });
        let index = self.students.len() - 1;
        self.recompute(index);
        info!(student_id = %self.students[index].student_id, "student added");
        Ok(id)
    }

    pub fn remove_student(&mut self, student_id: &str) -> anyhow::Result<Student> {
        let index = self.position(student_id)?;
        info!(student_id, "student removed");
        Ok(self.students.remove(index))
    }

    pub fn record_assessment(
        &mut self,
        student_id: &str,
        entry: &AssessmentEntry,
        score: f64,
    ) -> anyhow::Result<()> {
        self.record_grades(entry, &[(student_id.to_string(), score)])
    }

    /// Appends one grading session to every listed student. Unknown ids and
    /// non-finite scores fail the whole sheet before anything is written.
    pub fn record_grades(
        &mut self,
        entry: &AssessmentEntry,
        scores: &[(String, f64)],
    ) -> anyhow::Result<()> {
        if !entry.max_score.is_finite() {
            anyhow::bail!("max score for {} must be a finite number", entry.name);
        }
        if let Some((student_id, score)) = scores.iter().find(|(_, score)| !score.is_finite()) {
            anyhow::bail!("score {score} for {student_id} must be a finite number");
        }
        let indexes = scores
            .iter()
            .map(|(student_id, _)| self.position(student_id))
            .collect::<anyhow::Result<Vec<_>>>()?;

        for (index, (_, score)) in indexes.into_iter().zip(scores) {
            self.students[index].assessments.push(Assessment {
                id: Uuid::new_v4(),
                category: entry.category,
                name: entry.name.clone(),
                score: *score,
                max_score: entry.max_score,
                date: entry.date,
            });
            self.recompute(index);
        }

        info!(assessment = %entry.name, students = scores.len(), "grades recorded");
        Ok(())
    }

    /// Records one attendance session. A mark for a (date, slot) the student
    /// already has replaces the old record.
    pub fn record_attendance(
        &mut self,
        date: NaiveDate,
        time_slot: Option<&str>,
        marks: &[AttendanceMark],
    ) -> anyhow::Result<()> {
        let indexes = marks
            .iter()
            .map(|mark| self.position(&mark.student_id))
            .collect::<anyhow::Result<Vec<_>>>()?;

        for (index, mark) in indexes.into_iter().zip(marks) {
            let history = &mut self.students[index].attendance;
            history.retain(|record| !record.same_slot(date, time_slot));
            history.push(AttendanceRecord {
                date,
                time_slot: time_slot.map(str::to_string),
                status: mark.status,
                reason: mark.reason.clone(),
            });
            self.recompute(index);
        }

        info!(
            %date,
            slot = time_slot.unwrap_or("-"),
            students = marks.len(),
            "attendance recorded"
        );
        Ok(())
    }

    pub fn add_intervention(
        &mut self,
        student_id: &str,
        kind: &str,
        notes: &str,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Uuid> {
        let index = self.position(student_id)?;
        let id = Uuid::new_v4();
        self.students[index].interventions.push(InterventionLog {
            id,
            logged_at: Utc::now(),
            scheduled_for,
            kind: kind.to_string(),
            notes: notes.to_string(),
        });
        info!(student_id, kind, "intervention logged");
        Ok(id)
    }

    /// Students above the Low tier, highest probability first.
    pub fn alerts(&self, tier: Option<RiskTier>) -> Vec<&Student> {
        let mut alerted: Vec<&Student> = self
            .students
            .iter()
            .filter(|s| s.risk.tier != RiskTier::Low)
            .filter(|s| tier.map_or(true, |wanted| s.risk.tier == wanted))
            .collect();
        alerted.sort_by(|a, b| {
            b.risk
                .probability
                .partial_cmp(&a.risk.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        alerted
    }

    pub fn tier_counts(&self) -> TierCounts {
        TierCounts::tally(&self.students)
    }

    /// Interventions scheduled within the hour after `now`.
    pub fn upcoming_interventions(&self, now: DateTime<Utc>) -> Vec<(&Student, &InterventionLog)> {
        let horizon = now + Duration::hours(1);
        let mut upcoming: Vec<(&Student, &InterventionLog)> = self
            .students
            .iter()
            .flat_map(|s| s.interventions.iter().map(move |log| (s, log)))
            .filter(|(_, log)| {
                log.scheduled_for
                    .map_or(false, |at| at > now && at <= horizon)
            })
            .collect();
        upcoming.sort_by_key(|(_, log)| log.scheduled_for);
        upcoming
    }
}
