use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GradeError, GradeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMark {
    Present,
    Excused,
    Sick,
    Absent,
}

impl AttendanceMark {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "hadir" => Some(AttendanceMark::Present),
            "excused" | "izin" => Some(AttendanceMark::Excused),
            "sick" | "sakit" => Some(AttendanceMark::Sick),
            "absent" | "alfa" => Some(AttendanceMark::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceMark::Present => "present",
            AttendanceMark::Excused => "excused",
            AttendanceMark::Sick => "sick",
            AttendanceMark::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttendanceCounts {
    pub total: u32,
    pub present: u32,
    pub excused: u32,
    pub sick: u32,
    pub absent: u32,
}

impl AttendanceCounts {
    /// present / total, or 1.0 when nothing has been recorded.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.present as f64 / self.total as f64
        }
    }
}

pub fn summarize<I>(marks: I) -> AttendanceCounts
where
    I: IntoIterator<Item = AttendanceMark>,
{
    let mut c = AttendanceCounts::default();
    for m in marks {
        c.total += 1;
        match m {
            AttendanceMark::Present => c.present += 1,
            AttendanceMark::Excused => c.excused += 1,
            AttendanceMark::Sick => c.sick += 1,
            AttendanceMark::Absent => c.absent += 1,
        }
    }
    c
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub student_id: String,
    pub class_id: String,
    pub term_id: String,
    pub sessions_total: u32,
    pub sessions_present: u32,
    pub sessions_excused: u32,
    pub sessions_sick: u32,
    pub sessions_absent: u32,
    pub ratio: f64,
}

impl AttendanceSummary {
    pub fn from_counts(student_id: &str, class_id: &str, term_id: &str, c: AttendanceCounts) -> Self {
        AttendanceSummary {
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            term_id: term_id.to_string(),
            sessions_total: c.total,
            sessions_present: c.present,
            sessions_excused: c.excused,
            sessions_sick: c.sick,
            sessions_absent: c.absent,
            ratio: c.ratio(),
        }
    }
}

pub fn compute_attendance(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    term_id: &str,
) -> GradeResult<AttendanceSummary> {
    let mut stmt = conn.prepare(
        "SELECT e.status
         FROM attendance_entries e
         JOIN attendance_sessions s ON s.id = e.session_id
         WHERE e.student_id = ? AND s.class_id = ? AND s.term_id = ?",
    )?;
    let raw = stmt
        .query_map((student_id, class_id, term_id), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    // Unknown codes are skipped rather than counted either way.
    let counts = summarize(raw.iter().filter_map(|s| AttendanceMark::parse(s)));
    Ok(AttendanceSummary::from_counts(
        student_id, class_id, term_id, counts,
    ))
}

#[derive(Debug, Clone)]
pub struct SessionInput {
    pub session_id: Option<String>,
    pub schedule_id: String,
    pub session_date: String,
    pub entries: Vec<(String, AttendanceMark)>,
}

/// Writes one session and its entries. Re-recording an existing session id
/// replaces the marks of the students listed; the id stays bound to the
/// schedule it was first recorded on.
pub fn record_session(conn: &Connection, input: &SessionInput) -> GradeResult<String> {
    let schedule: Option<(String, String)> = conn
        .query_row(
            "SELECT class_id, term_id FROM schedules WHERE id = ?",
            [&input.schedule_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((class_id, term_id)) = schedule else {
        return Err(GradeError::NotFound {
            what: "schedule",
            id: input.schedule_id.clone(),
        });
    };

    let session_id = input
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let tx = conn.unchecked_transaction()?;
    let existing: Option<(String, String, String)> = tx
        .query_row(
            "SELECT class_id, term_id, schedule_id FROM attendance_sessions WHERE id = ?",
            [&session_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    if let Some((old_class, old_term, old_schedule)) = existing {
        if old_class != class_id || old_term != term_id || old_schedule != input.schedule_id {
            return Err(GradeError::SessionMismatch {
                session_id,
                recorded_schedule_id: old_schedule,
                requested_schedule_id: input.schedule_id.clone(),
            });
        }
    }
    tx.execute(
        "INSERT INTO attendance_sessions(id, class_id, term_id, schedule_id, session_date)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET session_date = excluded.session_date",
        (
            &session_id,
            &class_id,
            &term_id,
            &input.schedule_id,
            &input.session_date,
        ),
    )?;
    for (student_id, mark) in &input.entries {
        tx.execute(
            "INSERT INTO attendance_entries(session_id, student_id, status)
             VALUES(?, ?, ?)
             ON CONFLICT(session_id, student_id) DO UPDATE SET status = excluded.status",
            (&session_id, student_id, mark.as_str()),
        )?;
    }
    tx.commit()?;
    Ok(session_id)
}
