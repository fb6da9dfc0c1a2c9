use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Student, TierCounts};
use crate::risk::{RiskFlags, RiskTier};
use crate::roster::Roster;

pub fn format_flags(flags: &RiskFlags) -> String {
    let mut names = Vec::new();
    if flags.slipping {
        names.push("slipping trend");
    }
    if flags.sudden_drop {
        names.push("sudden drop");
    }
    if flags.chronic_absentee {
        names.push("chronic absentee");
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// One-line guidance for the student, led by the most specific flag.
pub fn advisory(student: &Student) -> &'static str {
    let flags = &student.risk.flags;
    if flags.slipping {
        "Focus on reviewing previous failed quizzes to reverse the sliding trend."
    } else if flags.chronic_absentee {
        "Improve your attendance to recover missing participation points."
    } else if flags.sudden_drop {
        "Meet with your instructor to go over the most recent assessment."
    } else if student.risk.tier >= RiskTier::Moderate {
        "Schedule a one-on-one consultation to plan catch-up work."
    } else {
        "Maintain your study routine and participate more in class discussions."
    }
}

pub fn summary_line(student: &Student) -> String {
    format!(
        "{} ({}, {}) {:.1}% {} [flags: {}]",
        student.full_name(),
        student.student_id,
        student.block,
        student.risk.probability * 100.0,
        student.risk.tier.label(),
        format_flags(&student.risk.flags)
    )
}

pub fn build_report(
    roster: &Roster,
    block: Option<&str>,
    limit: usize,
    now: DateTime<Utc>,
) -> String {
    let in_scope = |s: &&Student| block.map_or(true, |b| s.block == b);
    let students: Vec<&Student> = roster.students().iter().filter(in_scope).collect();
    let counts = TierCounts::tally(students.iter().copied());
    let alerts: Vec<&Student> = roster
        .alerts(None)
        .into_iter()
        .filter(in_scope)
        .collect();

    let mut output = String::new();
    let scope_label = block.unwrap_or("all blocks");

    let _ = writeln!(output, "# Academic Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} students)",
        scope_label,
        now.format("%Y-%m-%d %H:%M UTC"),
        students.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");
    let _ = writeln!(output, "- {}: {}", RiskTier::High.label(), counts.high);
    let _ = writeln!(output, "- {}: {}", RiskTier::Moderate.label(), counts.moderate);
    let _ = writeln!(output, "- {}: {}", RiskTier::EarlyWarning.label(), counts.early_warning);
    let _ = writeln!(output, "- {}: {}", RiskTier::Low.label(), counts.low);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Priority Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "No students above the low risk tier.");
    } else {
        for student in alerts.iter().take(limit) {
            let _ = writeln!(
                output,
                "- **{}** {}: {}",
                student.risk.tier.alert_heading(),
                summary_line(student),
                student.risk.tier.alert_message()
            );
        }
    }

    let flagged: Vec<&&Student> = students
        .iter()
        .filter(|s| s.risk.flags.any())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Behavioral Flags");

    if flagged.is_empty() {
        let _ = writeln!(output, "No behavioral flags raised.");
    } else {
        for student in flagged {
            let _ = writeln!(
                output,
                "- {} ({}): {}. {}",
                student.full_name(),
                student.risk.tier.label(),
                format_flags(&student.risk.flags),
                advisory(student)
            );
        }
    }

    let upcoming: Vec<_> = roster
        .upcoming_interventions(now)
        .into_iter()
        .filter(|(s, _)| in_scope(s))
        .collect();
    if !upcoming.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Upcoming Interventions");
        for (student, log) in upcoming {
            if let Some(at) = log.scheduled_for {
                let _ = writeln!(
                    output,
                    "- {} at {}: {}",
                    student.full_name(),
                    at.format("%H:%M UTC"),
                    log.kind
                );
            }
        }
    }

    output
}
