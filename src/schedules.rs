use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{GradeError, GradeResult};
use crate::records::{self, GradeKey};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub class_id: String,
    pub term_id: String,
    pub teacher_id: String,
    pub subject: String,
}

pub type ScheduleInput = Schedule;

pub fn upsert_schedule(conn: &Connection, input: &ScheduleInput) -> GradeResult<()> {
    conn.execute(
        "INSERT INTO schedules(id, class_id, term_id, teacher_id, subject)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           teacher_id = excluded.teacher_id,
           subject = excluded.subject",
        (
            &input.id,
            &input.class_id,
            &input.term_id,
            &input.teacher_id,
            &input.subject,
        ),
    )?;
    Ok(())
}

pub fn get_schedule(conn: &Connection, schedule_id: &str) -> GradeResult<Option<Schedule>> {
    let s = conn
        .query_row(
            "SELECT id, class_id, term_id, teacher_id, subject FROM schedules WHERE id = ?",
            [schedule_id],
            |r| {
                Ok(Schedule {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    term_id: r.get(2)?,
                    teacher_id: r.get(3)?,
                    subject: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(s)
}

/// Looks up a schedule and checks it belongs to the given class and term.
pub fn require_schedule(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: &str,
) -> GradeResult<Schedule> {
    match get_schedule(conn, schedule_id)? {
        Some(s) if s.class_id == class_id && s.term_id == term_id => Ok(s),
        _ => Err(GradeError::NotFound {
            what: "schedule",
            id: schedule_id.to_string(),
        }),
    }
}

pub fn list_schedules(conn: &Connection, class_id: &str, term_id: &str) -> GradeResult<Vec<Schedule>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, term_id, teacher_id, subject
         FROM schedules
         WHERE class_id = ? AND term_id = ?
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map((class_id, term_id), |r| {
            Ok(Schedule {
                id: r.get(0)?,
                class_id: r.get(1)?,
                term_id: r.get(2)?,
                teacher_id: r.get(3)?,
                subject: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_roster(conn: &Connection, class_id: &str, term_id: &str) -> GradeResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT student_id FROM roster_members
         WHERE class_id = ? AND term_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map((class_id, term_id), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterOutcome {
    pub members: usize,
    pub placeholders_created: usize,
}

/// Replaces the class+term roster and creates empty Draft records for every
/// member on every schedule already registered. Existing grade records of
/// students dropped from the roster are left alone.
pub fn set_roster(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    student_ids: &[String],
    now: DateTime<Utc>,
) -> GradeResult<RosterOutcome> {
    // A locked or published schedule must not gain new Draft records.
    let mut schedules = Vec::new();
    for s in list_schedules(conn, class_id, term_id)? {
        let frozen: i64 = conn.query_row(
            "SELECT COUNT(*) FROM grade_records
             WHERE class_id = ? AND term_id = ? AND schedule_id = ? AND lifecycle_status <> 'draft'",
            (class_id, term_id, &s.id),
            |r| r.get(0),
        )?;
        if frozen == 0 {
            schedules.push(s);
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM roster_members WHERE class_id = ? AND term_id = ?",
        (class_id, term_id),
    )?;
    let mut outcome = RosterOutcome::default();
    for (i, student_id) in student_ids.iter().enumerate() {
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO roster_members(class_id, term_id, student_id, sort_order)
             VALUES(?, ?, ?, ?)",
            (class_id, term_id, student_id, i as i64),
        )?;
        if inserted == 0 {
            continue;
        }
        outcome.members += 1;
        for s in &schedules {
            let key = GradeKey::new(student_id, class_id, term_id, &s.id);
            if records::ensure_placeholder(&tx, &key, now)? {
                outcome.placeholders_created += 1;
            }
        }
    }
    tx.commit()?;
    Ok(outcome)
}
