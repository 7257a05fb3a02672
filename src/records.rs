use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GradeError, GradeResult};
use crate::grade_scale::{self, PassStatus};
use crate::roles::Actor;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GradeKey {
    pub student_id: String,
    pub class_id: String,
    pub term_id: String,
    pub schedule_id: String,
}

impl GradeKey {
    pub fn new(student_id: &str, class_id: &str, term_id: &str, schedule_id: &str) -> Self {
        GradeKey {
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            term_id: term_id.to_string(),
            schedule_id: schedule_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LifecycleStatus {
    Draft,
    Locked,
    Published,
}

impl LifecycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::Locked => "locked",
            LifecycleStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(LifecycleStatus::Draft),
            "locked" => Some(LifecycleStatus::Locked),
            "published" => Some(LifecycleStatus::Published),
            _ => None,
        }
    }

    pub fn is_past_draft(self) -> bool {
        self != LifecycleStatus::Draft
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleStatus::Draft => "Draft",
            LifecycleStatus::Locked => "Locked",
            LifecycleStatus::Published => "Published",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub term_id: String,
    pub schedule_id: String,
    pub numeric_score: Option<f64>,
    pub letter_grade: Option<String>,
    pub descriptive_label: Option<String>,
    pub pass_status: PassStatus,
    pub notes: Option<String>,
    pub lifecycle_status: LifecycleStatus,
    pub locked_at: Option<String>,
    pub locked_by: Option<String>,
    pub published_at: Option<String>,
    pub published_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by: Option<String>,
}

pub(crate) const RECORD_COLUMNS: &str = "id, student_id, class_id, term_id, schedule_id,
    numeric_score, letter_grade, descriptive_label, pass_status, notes,
    lifecycle_status, locked_at, locked_by, published_at, published_by,
    created_at, updated_at, updated_by";

pub(crate) fn record_from_row(r: &Row<'_>) -> rusqlite::Result<GradeRecord> {
    let pass_raw: String = r.get(8)?;
    let status_raw: String = r.get(10)?;
    let lifecycle_status = LifecycleStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown lifecycle status: {}", status_raw).into(),
        )
    })?;
    Ok(GradeRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        term_id: r.get(3)?,
        schedule_id: r.get(4)?,
        numeric_score: r.get(5)?,
        letter_grade: r.get(6)?,
        descriptive_label: r.get(7)?,
        pass_status: PassStatus::parse(&pass_raw).unwrap_or(PassStatus::NotAssessed),
        notes: r.get(9)?,
        lifecycle_status,
        locked_at: r.get(11)?,
        locked_by: r.get(12)?,
        published_at: r.get(13)?,
        published_by: r.get(14)?,
        created_at: r.get(15)?,
        updated_at: r.get(16)?,
        updated_by: r.get(17)?,
    })
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn get(conn: &Connection, key: &GradeKey) -> GradeResult<Option<GradeRecord>> {
    let sql = format!(
        "SELECT {} FROM grade_records
         WHERE student_id = ? AND class_id = ? AND term_id = ? AND schedule_id = ?",
        RECORD_COLUMNS
    );
    let rec = conn
        .query_row(
            &sql,
            (
                &key.student_id,
                &key.class_id,
                &key.term_id,
                &key.schedule_id,
            ),
            record_from_row,
        )
        .optional()?;
    Ok(rec)
}

/// Writes a Draft record's score and notes, recomputing the derived fields.
///
/// This is the storage half of a grade write; callers go through
/// [`crate::eligibility::enter_grade`] so the attendance gate runs first.
pub fn upsert(
    conn: &Connection,
    key: &GradeKey,
    numeric_score: Option<f64>,
    notes: Option<&str>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> GradeResult<GradeRecord> {
    if let Some(score) = numeric_score {
        if !grade_scale::is_valid_score(score) {
            return Err(GradeError::InvalidScoreRange { score });
        }
    }
    if let Some(existing) = get(conn, key)? {
        if existing.lifecycle_status.is_past_draft() {
            return Err(GradeError::RecordLocked {
                key: key.clone(),
                status: existing.lifecycle_status,
            });
        }
    }

    let derived = grade_scale::derive(numeric_score);
    let ts = timestamp(now);
    // The WHERE on the conflict branch keeps a concurrent lock from being overwritten.
    let changed = conn.execute(
        "INSERT INTO grade_records(id, student_id, class_id, term_id, schedule_id,
             numeric_score, letter_grade, descriptive_label, pass_status, notes,
             lifecycle_status, created_at, updated_at, updated_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?, ?)
         ON CONFLICT(student_id, class_id, term_id, schedule_id) DO UPDATE SET
           numeric_score = excluded.numeric_score,
           letter_grade = excluded.letter_grade,
           descriptive_label = excluded.descriptive_label,
           pass_status = excluded.pass_status,
           notes = excluded.notes,
           updated_at = excluded.updated_at,
           updated_by = excluded.updated_by
         WHERE grade_records.lifecycle_status = 'draft'",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            key.student_id,
            key.class_id,
            key.term_id,
            key.schedule_id,
            numeric_score,
            derived.letter,
            derived.label,
            derived.pass_status.as_str(),
            notes,
            ts,
            ts,
            actor.user_id,
        ],
    )?;

    let rec = get(conn, key)?.ok_or_else(|| GradeError::NotFound {
        what: "grade record",
        id: key.student_id.clone(),
    })?;
    if changed == 0 {
        return Err(GradeError::RecordLocked {
            key: key.clone(),
            status: rec.lifecycle_status,
        });
    }
    Ok(rec)
}

/// Creates an empty Draft record for `key` unless one already exists.
/// Returns true when a row was inserted.
pub fn ensure_placeholder(conn: &Connection, key: &GradeKey, now: DateTime<Utc>) -> GradeResult<bool> {
    let ts = timestamp(now);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO grade_records(id, student_id, class_id, term_id, schedule_id,
             pass_status, lifecycle_status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 'not_assessed', 'draft', ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &key.student_id,
            &key.class_id,
            &key.term_id,
            &key.schedule_id,
            &ts,
            &ts,
        ),
    )?;
    Ok(inserted > 0)
}

pub fn list_by_class_term(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: Option<&str>,
) -> GradeResult<Vec<GradeRecord>> {
    let mut sql = format!(
        "SELECT {} FROM grade_records WHERE class_id = ? AND term_id = ?",
        RECORD_COLUMNS
    );
    let mut binds: Vec<Value> = vec![
        Value::Text(class_id.to_string()),
        Value::Text(term_id.to_string()),
    ];
    if let Some(s) = schedule_id {
        sql.push_str(" AND schedule_id = ?");
        binds.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY schedule_id, student_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// What a student is allowed to see: Published records only.
pub fn list_published_for_student(
    conn: &Connection,
    student_id: &str,
    term_id: Option<&str>,
) -> GradeResult<Vec<GradeRecord>> {
    let mut sql = format!(
        "SELECT {} FROM grade_records WHERE student_id = ? AND lifecycle_status = 'published'",
        RECORD_COLUMNS
    );
    let mut binds: Vec<Value> = vec![Value::Text(student_id.to_string())];
    if let Some(t) = term_id {
        sql.push_str(" AND term_id = ?");
        binds.push(Value::Text(t.to_string()));
    }
    sql.push_str(" ORDER BY term_id, class_id, schedule_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::roles::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).single().expect("ts")
    }

    fn teacher() -> Actor {
        Actor::new("guru1", Role::Teacher)
    }

    fn key() -> GradeKey {
        GradeKey::new("S", "C", "T", "M")
    }

    fn force_status(conn: &Connection, status: &str) {
        conn.execute(
            "UPDATE grade_records SET lifecycle_status = ? WHERE student_id = 'S'",
            [status],
        )
        .expect("force status");
    }

    #[test]
    fn upsert_derives_letter_label_and_keeps_notes() {
        let conn = db::open_in_memory().expect("db");
        let rec = upsert(&conn, &key(), Some(85.0), Some("  rajin  "), &teacher(), now())
            .expect("upsert");
        assert_eq!(rec.lifecycle_status, LifecycleStatus::Draft);
        assert_eq!(rec.numeric_score, Some(85.0));
        assert_eq!(rec.letter_grade.as_deref(), Some("B"));
        assert_eq!(rec.descriptive_label.as_deref(), Some("Baik"));
        assert_eq!(rec.pass_status, PassStatus::Passed);
        assert_eq!(rec.notes.as_deref(), Some("  rajin  "));
        assert_eq!(rec.updated_by.as_deref(), Some("guru1"));

        let rec2 = upsert(&conn, &key(), Some(59.9), None, &teacher(), now()).expect("again");
        assert_eq!(rec2.id, rec.id);
        assert_eq!(rec2.letter_grade.as_deref(), Some("E"));
        assert_eq!(rec2.descriptive_label.as_deref(), Some("Sangat Kurang"));
        assert_eq!(rec2.pass_status, PassStatus::Failed);
    }

    #[test]
    fn upsert_rejects_out_of_range_scores() {
        let conn = db::open_in_memory().expect("db");
        for bad in [-1.0, 101.0, f64::NAN] {
            let err = upsert(&conn, &key(), Some(bad), None, &teacher(), now())
                .expect_err("out of range");
            assert!(matches!(err, GradeError::InvalidScoreRange { .. }));
        }
        assert!(get(&conn, &key()).expect("get").is_none());
    }

    #[test]
    fn upsert_refuses_once_past_draft_even_for_original_teacher() {
        let conn = db::open_in_memory().expect("db");
        upsert(&conn, &key(), Some(70.0), None, &teacher(), now()).expect("draft write");
        for status in ["locked", "published"] {
            force_status(&conn, status);
            let err = upsert(&conn, &key(), Some(99.0), None, &teacher(), now())
                .expect_err("locked");
            assert_eq!(err.code(), "record_locked");
            let rec = get(&conn, &key()).expect("get").expect("exists");
            assert_eq!(rec.numeric_score, Some(70.0));
        }
    }

    #[test]
    fn placeholder_is_empty_draft_and_idempotent() {
        let conn = db::open_in_memory().expect("db");
        assert!(ensure_placeholder(&conn, &key(), now()).expect("first"));
        assert!(!ensure_placeholder(&conn, &key(), now()).expect("second"));
        let rec = get(&conn, &key()).expect("get").expect("exists");
        assert_eq!(rec.numeric_score, None);
        assert_eq!(rec.letter_grade, None);
        assert_eq!(rec.pass_status, PassStatus::NotAssessed);
        assert_eq!(rec.lifecycle_status, LifecycleStatus::Draft);
    }

    #[test]
    fn list_filters_by_schedule_and_published_view_hides_unpublished() {
        let conn = db::open_in_memory().expect("db");
        upsert(&conn, &GradeKey::new("S", "C", "T", "M1"), Some(90.0), None, &teacher(), now())
            .expect("m1");
        upsert(&conn, &GradeKey::new("S", "C", "T", "M2"), Some(80.0), None, &teacher(), now())
            .expect("m2");
        upsert(&conn, &GradeKey::new("S2", "C", "T", "M1"), Some(70.0), None, &teacher(), now())
            .expect("s2");

        assert_eq!(list_by_class_term(&conn, "C", "T", None).expect("all").len(), 3);
        assert_eq!(list_by_class_term(&conn, "C", "T", Some("M1")).expect("m1").len(), 2);
        assert!(list_by_class_term(&conn, "C", "other", None).expect("none").is_empty());

        assert!(list_published_for_student(&conn, "S", None).expect("pub").is_empty());
        conn.execute(
            "UPDATE grade_records SET lifecycle_status = 'published' WHERE schedule_id = 'M1'",
            [],
        )
        .expect("publish m1");
        let visible = list_published_for_student(&conn, "S", Some("T")).expect("pub");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].schedule_id, "M1");
    }
}
