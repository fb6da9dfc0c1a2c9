use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{Assessment, AttendanceRecord, InterventionLog, Student};
use crate::risk::{RiskAssessment, RiskFlags};
use crate::store::StudentRepository;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Roster stored in the `risk_monitor` Postgres schema.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl StudentRepository for PgStore {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, first_name, middle_name, last_name, email, course,
                   year_level, block, gender, birthday, contact,
                   failure_probability, risk_tier,
                   slipping, sudden_drop, chronic_absentee
            FROM risk_monitor.students
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load students")?;

        let mut students = Vec::with_capacity(rows.len());
        let mut index_by_id: HashMap<Uuid, usize> = HashMap::new();

        for row in rows {
            let tier: String = row.get("risk_tier");
            let student = Student {
                id: row.get("id"),
                student_id: row.get("student_id"),
                first_name: row.get("first_name"),
                middle_name: row.get("middle_name"),
                last_name: row.get("last_name"),
                email: row.get("email"),
                course: row.get("course"),
                year_level: row.get("year_level"),
                block: row.get("block"),
                gender: row.get("gender"),
                birthday: row.get::<Option<NaiveDate>, _>("birthday"),
                contact: row.get("contact"),
                assessments: Vec::new(),
                attendance: Vec::new(),
                interventions: Vec::new(),
                risk: RiskAssessment {
                    probability: row.get("failure_probability"),
                    tier: tier.parse()?,
                    flags: RiskFlags {
                        slipping: row.get("slipping"),
                        sudden_drop: row.get("sudden_drop"),
                        chronic_absentee: row.get("chronic_absentee"),
                    },
                },
            };
            index_by_id.insert(student.id, students.len());
            students.push(student);
        }

        let assessments = sqlx::query(
            r#"
            SELECT id, student_id, category, name, score, max_score, taken_on
            FROM risk_monitor.assessments
            ORDER BY student_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load assessments")?;

        for row in assessments {
            let owner: Uuid = row.get("student_id");
            let Some(&index) = index_by_id.get(&owner) else {
                continue;
            };
            let category: String = row.get("category");
            students[index].assessments.push(Assessment {
                id: row.get("id"),
                category: category.parse()?,
                name: row.get("name"),
                score: row.get("score"),
                max_score: row.get("max_score"),
                date: row.get::<NaiveDate, _>("taken_on"),
            });
        }

        let attendance = sqlx::query(
            r#"
            SELECT student_id, attended_on, time_slot, status, reason
            FROM risk_monitor.attendance
            ORDER BY student_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load attendance")?;

        for row in attendance {
            let owner: Uuid = row.get("student_id");
            let Some(&index) = index_by_id.get(&owner) else {
                continue;
            };
            let status: String = row.get("status");
            students[index].attendance.push(AttendanceRecord {
                date: row.get("attended_on"),
                time_slot: row.get("time_slot"),
                status: status.parse()?,
                reason: row.get("reason"),
            });
        }

        let interventions = sqlx::query(
            r#"
            SELECT id, student_id, logged_at, scheduled_for, kind, notes
            FROM risk_monitor.interventions
            ORDER BY student_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load interventions")?;

        for row in interventions {
            let owner: Uuid = row.get("student_id");
            let Some(&index) = index_by_id.get(&owner) else {
                continue;
            };
            students[index].interventions.push(InterventionLog {
                id: row.get("id"),
                logged_at: row.get::<DateTime<Utc>, _>("logged_at"),
                scheduled_for: row.get("scheduled_for"),
                kind: row.get("kind"),
                notes: row.get("notes"),
            });
        }

        Ok(students)
    }

    /// Replaces the stored roster with `students` in a single transaction.
    async fn save_students(&self, students: &[Student]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM risk_monitor.students")
            .execute(&mut *tx)
            .await?;

        for (position, student) in students.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO risk_monitor.students
                (id, position, student_id, first_name, middle_name, last_name, email, course,
                 year_level, block, gender, birthday, contact, failure_probability, risk_tier,
                 slipping, sudden_drop, chronic_absentee)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                        $16, $17, $18)
                "#,
            )
            .bind(student.id)
            .bind(position as i32)
            .bind(&student.student_id)
            .bind(&student.first_name)
            .bind(&student.middle_name)
            .bind(&student.last_name)
            .bind(&student.email)
            .bind(&student.course)
            .bind(student.year_level)
            .bind(&student.block)
            .bind(&student.gender)
            .bind(student.birthday)
            .bind(&student.contact)
            .bind(student.risk.probability)
            .bind(student.risk.tier.as_str())
            .bind(student.risk.flags.slipping)
            .bind(student.risk.flags.sudden_drop)
            .bind(student.risk.flags.chronic_absentee)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to save student {}", student.student_id))?;

            for (position, assessment) in student.assessments.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO risk_monitor.assessments
                    (id, student_id, position, category, name, score, max_score, taken_on)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(assessment.id)
                .bind(student.id)
                .bind(position as i32)
                .bind(assessment.category.to_string())
                .bind(&assessment.name)
                .bind(assessment.score)
                .bind(assessment.max_score)
                .bind(assessment.date)
                .execute(&mut *tx)
                .await?;
            }

            for (position, record) in student.attendance.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO risk_monitor.attendance
                    (student_id, position, attended_on, time_slot, status, reason)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(student.id)
                .bind(position as i32)
                .bind(record.date)
                .bind(&record.time_slot)
                .bind(record.status.to_string())
                .bind(&record.reason)
                .execute(&mut *tx)
                .await?;
            }

            for (position, log) in student.interventions.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO risk_monitor.interventions
                    (id, student_id, position, logged_at, scheduled_for, kind, notes)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(log.id)
                .bind(student.id)
                .bind(position as i32)
                .bind(log.logged_at)
                .bind(log.scheduled_for)
                .bind(&log.kind)
                .bind(&log.notes)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        info!(count = students.len(), "roster written to postgres");
        Ok(())
    }
}
