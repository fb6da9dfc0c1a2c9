use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::models::{AssessmentCategory, AssessmentEntry, AttendanceStatus, NewStudent};
use crate::roster::{AttendanceMark, Roster};

pub const DEFAULT_EMAIL_DOMAIN: &str = "university.edu.ph";

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub applied: usize,
    pub skipped: usize,
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

fn open(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Splits "First Middle Names Last" into its three parts.
pub fn split_full_name(full_name: &str) -> (String, String, String) {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    match parts.as_slice() {
        [] => ("Unknown".to_string(), String::new(), String::new()),
        [first] => (first.to_string(), String::new(), String::new()),
        [first, middle @ .., last] => (first.to_string(), middle.join(" "), last.to_string()),
    }
}

pub fn import_roster_csv(
    roster: &mut Roster,
    path: &Path,
    email_domain: &str,
) -> anyhow::Result<ImportSummary> {
    import_roster(roster, open(path)?, email_domain)
}

pub fn import_roster<R: Read>(
    roster: &mut Roster,
    source: R,
    email_domain: &str,
) -> anyhow::Result<ImportSummary> {
    #[derive(Deserialize)]
    struct CsvRow {
        full_name: String,
        student_id: String,
        #[serde(default)]
        course: Option<String>,
        #[serde(default)]
        year_level: Option<i32>,
        #[serde(default)]
        block: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        gender: Option<String>,
        #[serde(default)]
        birthday: Option<NaiveDate>,
        #[serde(default)]
        contact: Option<String>,
    }

    let mut summary = ImportSummary::default();
    for result in reader(source).deserialize::<CsvRow>() {
        let row = result?;
        if roster.find(&row.student_id).is_some() {
            warn!(student_id = %row.student_id, "student already on roster, skipping");
            summary.skipped += 1;
            continue;
        }

        let (first_name, middle_name, last_name) = split_full_name(&row.full_name);
        let email = row.email.filter(|e| !e.is_empty()).unwrap_or_else(|| {
            format!("{}@{}", row.student_id.to_lowercase(), email_domain)
        });
        roster.add_student(NewStudent {
            student_id: row.student_id,
            first_name,
            middle_name,
            last_name,
            email,
            course: row.course.unwrap_or_else(|| "BS IT".to_string()),
            year_level: row.year_level.unwrap_or(1),
            block: row.block.unwrap_or_else(|| "A".to_string()),
            gender: row.gender.unwrap_or_default(),
            birthday: row.birthday,
            contact: row.contact.unwrap_or_default(),
        })?;
        summary.applied += 1;
    }

    Ok(summary)
}

pub fn import_grades_csv(roster: &mut Roster, path: &Path) -> anyhow::Result<ImportSummary> {
    import_grades(roster, open(path)?)
}

pub fn import_grades<R: Read>(roster: &mut Roster, source: R) -> anyhow::Result<ImportSummary> {
    #[derive(Deserialize)]
    struct CsvRow {
        student_id: String,
        category: String,
        name: String,
        score: f64,
        max_score: f64,
        date: NaiveDate,
    }

    let mut summary = ImportSummary::default();
    for (line, result) in reader(source).deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let category: AssessmentCategory = row
            .category
            .parse()
            .with_context(|| format!("row {}", line + 1))?;
        if roster.find(&row.student_id).is_none() {
            warn!(student_id = %row.student_id, "unknown student in grade sheet, skipping");
            summary.skipped += 1;
            continue;
        }
        let entry = AssessmentEntry {
            category,
            name: row.name,
            max_score: row.max_score,
            date: row.date,
        };
        roster
            .record_assessment(&row.student_id, &entry, row.score)
            .with_context(|| format!("row {}", line + 1))?;
        summary.applied += 1;
    }

    Ok(summary)
}

pub fn import_attendance_csv(roster: &mut Roster, path: &Path) -> anyhow::Result<ImportSummary> {
    import_attendance(roster, open(path)?)
}

pub fn import_attendance<R: Read>(roster: &mut Roster, source: R) -> anyhow::Result<ImportSummary> {
    #[derive(Deserialize)]
    struct CsvRow {
        student_id: String,
        date: NaiveDate,
        #[serde(default)]
        time_slot: Option<String>,
        status: String,
        #[serde(default)]
        reason: Option<String>,
    }

    let mut summary = ImportSummary::default();
    for (line, result) in reader(source).deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .with_context(|| format!("row {}", line + 1))?;
        if roster.find(&row.student_id).is_none() {
            warn!(student_id = %row.student_id, "unknown student in attendance sheet, skipping");
            summary.skipped += 1;
            continue;
        }
        let mark = AttendanceMark {
            student_id: row.student_id,
            status,
            reason: row.reason.filter(|r| !r.is_empty()),
        };
        let slot = row.time_slot.filter(|s| !s.is_empty());
        roster.record_attendance(row.date, slot.as_deref(), &[mark])?;
        summary.applied += 1;
    }

    Ok(summary)
}

/// Demo roster used by `seed`.
pub fn seed_demo(roster: &mut Roster) -> anyhow::Result<()> {
    let students = "\
full_name,student_id,course,year_level,block,email,gender,birthday,contact
Juan Miguel Dela-Cruz,2021-00123,BS Information Technology,3,IT3-A,juan.delacruz@university.edu.ph,Male,2002-05-15,09171234567
Maria Clara Santos,2021-00456,BS Information Technology,3,IT3-A,,Female,2003-02-11,
Jose Rizal Mercado,2022-00789,BS Computer Science,2,CS2-B,,,,
";
    let grades = "\
student_id,category,name,score,max_score,date
2021-00123,Quiz,Quiz 1,85,100,2026-09-01
2021-00123,Quiz,Quiz 2,45,100,2026-09-15
2021-00123,Exam,Midterm,55,100,2026-10-05
2021-00456,Quiz,Quiz 1,92,100,2026-09-01
2021-00456,Quiz,Quiz 2,88,100,2026-09-15
2021-00456,Exam,Midterm,81,100,2026-10-05
2022-00789,Quiz,Quiz 1,70,100,2026-09-01
2022-00789,Project,Prototype,35,50,2026-09-20
";
    let attendance = "\
student_id,date,time_slot,status,reason
2021-00123,2026-10-01,08:00-10:00,Present,
2021-00123,2026-10-02,08:00-10:00,Absent,Fever
2021-00123,2026-10-03,08:00-10:00,Absent,
2021-00123,2026-10-04,08:00-10:00,Absent,
2021-00456,2026-10-01,08:00-10:00,Present,
2021-00456,2026-10-02,08:00-10:00,Present,
2022-00789,2026-10-01,13:00-15:00,Late,
2022-00789,2026-10-02,13:00-15:00,Present,
";

    import_roster(roster, students.as_bytes(), DEFAULT_EMAIL_DOMAIN)?;
    import_grades(roster, grades.as_bytes())?;
    import_attendance(roster, attendance.as_bytes())?;
    Ok(())
}
