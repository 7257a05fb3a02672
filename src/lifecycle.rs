//! Draft -> Locked -> Published transitions.
//!
//! Every transition is all-or-nothing over its scope and runs inside one
//! SQLite transaction. There is no way back: Published is terminal and no
//! unlock exists.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{GradeError, GradeResult, Scope};
use crate::grade_scale;
use crate::records::{self, timestamp, GradeKey, GradeRecord};
use crate::roles::Actor;
use crate::schedules;
use crate::status::Tally;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOutcome {
    pub locked: usize,
    pub backfilled: usize,
    pub placeholders_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub published: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSchedule {
    pub schedule_id: String,
    pub draft: usize,
    pub already_published: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTermPublishOutcome {
    pub published_schedules: Vec<String>,
    pub records_published: usize,
    pub skipped: Vec<SkippedSchedule>,
}

/// Freezes every record of one schedule. Only the schedule's teacher of
/// record may lock. Roster members without a record get one, and any record
/// without a score is filled with `lock_floor_score` before it is frozen.
pub fn lock(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: &str,
    actor: &Actor,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
) -> GradeResult<LockOutcome> {
    let scope = Scope::schedule(class_id, term_id, schedule_id);
    let schedule = schedules::require_schedule(conn, class_id, term_id, schedule_id)?;
    if !actor.is_teacher_of_record(&schedule.teacher_id) {
        return Err(GradeError::Unauthorized {
            action: "lock grades",
            role: actor.role.as_str().to_string(),
        });
    }

    let tx = conn.unchecked_transaction()?;

    let existing = records::list_by_class_term(&tx, class_id, term_id, Some(schedule_id))?;
    let counts = Tally::of(existing.iter().map(|r| r.lifecycle_status));
    if counts.locked + counts.published > 0 {
        return Err(GradeError::AlreadyLocked {
            scope,
            already_locked: counts.locked + counts.published,
            total: counts.total(),
        });
    }

    let mut outcome = LockOutcome::default();
    for student_id in schedules::list_roster(&tx, class_id, term_id)? {
        let key = GradeKey::new(&student_id, class_id, term_id, schedule_id);
        if records::ensure_placeholder(&tx, &key, now)? {
            outcome.placeholders_created += 1;
        }
    }

    let in_scope = records::list_by_class_term(&tx, class_id, term_id, Some(schedule_id))?;
    if in_scope.is_empty() {
        return Err(GradeError::EmptyScope { scope });
    }

    let ts = timestamp(now);
    let floor = grade_scale::derive(Some(cfg.lock_floor_score));
    for rec in in_scope.iter().filter(|r| r.numeric_score.is_none()) {
        tx.execute(
            "UPDATE grade_records
             SET numeric_score = ?, letter_grade = ?, descriptive_label = ?, pass_status = ?,
                 updated_at = ?, updated_by = ?
             WHERE id = ?",
            (
                cfg.lock_floor_score,
                floor.letter,
                floor.label,
                floor.pass_status.as_str(),
                &ts,
                &actor.user_id,
                &rec.id,
            ),
        )?;
        outcome.backfilled += 1;
    }

    outcome.locked = tx.execute(
        "UPDATE grade_records
         SET lifecycle_status = 'locked', locked_at = ?, locked_by = ?
         WHERE class_id = ? AND term_id = ? AND schedule_id = ? AND lifecycle_status = 'draft'",
        (&ts, &actor.user_id, class_id, term_id, schedule_id),
    )?;
    tx.commit()?;

    info!(
        scope = %Scope::schedule(class_id, term_id, schedule_id),
        by = %actor.user_id,
        locked = outcome.locked,
        backfilled = outcome.backfilled,
        "grades locked"
    );
    Ok(outcome)
}

fn require_admin_or_staff(actor: &Actor) -> GradeResult<()> {
    if actor.role.is_admin_or_staff() {
        Ok(())
    } else {
        Err(GradeError::Unauthorized {
            action: "publish grades",
            role: actor.role.as_str().to_string(),
        })
    }
}

/// Releases one schedule's grades to students. Admin or staff only, and
/// every record in scope must be Locked.
pub fn publish(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> GradeResult<PublishOutcome> {
    require_admin_or_staff(actor)?;
    let scope = Scope::schedule(class_id, term_id, schedule_id);
    schedules::require_schedule(conn, class_id, term_id, schedule_id)?;

    let tx = conn.unchecked_transaction()?;
    let in_scope = records::list_by_class_term(&tx, class_id, term_id, Some(schedule_id))?;
    let counts = Tally::of(in_scope.iter().map(|r| r.lifecycle_status));
    if counts.total() == 0 || counts.locked != counts.total() {
        return Err(GradeError::NotLocked {
            scope,
            draft: counts.draft,
            published: counts.published,
            total: counts.total(),
        });
    }

    let ts = timestamp(now);
    let published = tx.execute(
        "UPDATE grade_records
         SET lifecycle_status = 'published', published_at = ?, published_by = ?
         WHERE class_id = ? AND term_id = ? AND schedule_id = ? AND lifecycle_status = 'locked'",
        (&ts, &actor.user_id, class_id, term_id, schedule_id),
    )?;
    tx.commit()?;

    info!(scope = %scope, by = %actor.user_id, published, "grades published");
    Ok(PublishOutcome { published })
}

/// Bulk publish for a whole class+term: every schedule whose records are all
/// Locked is published in one transaction; the rest are reported as skipped.
pub fn publish_class_term(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> GradeResult<ClassTermPublishOutcome> {
    require_admin_or_staff(actor)?;
    let scope = Scope::class_term(class_id, term_id);

    let tx = conn.unchecked_transaction()?;
    let all = records::list_by_class_term(&tx, class_id, term_id, None)?;
    let mut by_schedule: BTreeMap<&str, Vec<&GradeRecord>> = BTreeMap::new();
    for r in &all {
        by_schedule.entry(r.schedule_id.as_str()).or_default().push(r);
    }

    let ts = timestamp(now);
    let mut outcome = ClassTermPublishOutcome::default();
    for (schedule_id, recs) in &by_schedule {
        let counts = Tally::of(recs.iter().map(|r| r.lifecycle_status));
        if counts.locked != counts.total() {
            outcome.skipped.push(SkippedSchedule {
                schedule_id: schedule_id.to_string(),
                draft: counts.draft,
                already_published: counts.published,
            });
            continue;
        }
        outcome.records_published += tx.execute(
            "UPDATE grade_records
             SET lifecycle_status = 'published', published_at = ?, published_by = ?
             WHERE class_id = ? AND term_id = ? AND schedule_id = ? AND lifecycle_status = 'locked'",
            (&ts, &actor.user_id, class_id, term_id, schedule_id),
        )?;
        outcome.published_schedules.push(schedule_id.to_string());
    }

    if outcome.published_schedules.is_empty() {
        let counts = Tally::of(all.iter().map(|r| r.lifecycle_status));
        return Err(GradeError::NotLocked {
            scope,
            draft: counts.draft,
            published: counts.published,
            total: counts.total(),
        });
    }
    tx.commit()?;

    info!(
        scope = %scope,
        by = %actor.user_id,
        schedules = outcome.published_schedules.len(),
        skipped = outcome.skipped.len(),
        "class term published"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{record_session, AttendanceMark, SessionInput};
    use crate::db;
    use crate::eligibility::enter_grade;
    use crate::records::LifecycleStatus;
    use crate::roles::Role;
    use crate::schedules::{set_roster, upsert_schedule, Schedule};
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, day, 10, 0, 0).single().expect("ts")
    }

    fn guru() -> Actor {
        Actor::new("guru1", Role::Teacher)
    }

    fn admin() -> Actor {
        Actor::new("admin1", Role::Admin)
    }

    fn add_schedule(conn: &Connection, id: &str) {
        upsert_schedule(
            conn,
            &Schedule {
                id: id.to_string(),
                class_id: "C".to_string(),
                term_id: "T".to_string(),
                teacher_id: "guru1".to_string(),
                subject: "Aqidah".to_string(),
            },
        )
        .expect("schedule");
    }

    /// `present` of 10 sessions on schedule M for the student.
    fn attend(conn: &Connection, student: &str, present: usize) {
        for i in 0..10 {
            let mark = if i < present {
                AttendanceMark::Present
            } else {
                AttendanceMark::Absent
            };
            record_session(
                conn,
                &SessionInput {
                    session_id: Some(format!("sess-{i}")),
                    schedule_id: "M".to_string(),
                    session_date: format!("2026-09-{:02}", i + 1),
                    entries: vec![(student.to_string(), mark)],
                },
            )
            .expect("session");
        }
    }

    fn setup() -> Connection {
        let conn = db::open_in_memory().expect("db");
        add_schedule(&conn, "M");
        conn
    }

    fn statuses(conn: &Connection, schedule: Option<&str>) -> Vec<LifecycleStatus> {
        records::list_by_class_term(conn, "C", "T", schedule)
            .expect("list")
            .into_iter()
            .map(|r| r.lifecycle_status)
            .collect()
    }

    #[test]
    fn full_flow_good_attendance() {
        let conn = setup();
        attend(&conn, "S", 8);
        let cfg = EngineConfig::default();
        let key = GradeKey::new("S", "C", "T", "M");

        let draft = enter_grade(&conn, &key, Some(92.0), None, &guru(), &cfg, t(1)).expect("enter");
        assert_eq!(draft.lifecycle_status, LifecycleStatus::Draft);
        assert_eq!(draft.letter_grade.as_deref(), Some("A"));
        assert_eq!(draft.descriptive_label.as_deref(), Some("Sangat Baik"));

        let out = lock(&conn, "C", "T", "M", &guru(), &cfg, t(2)).expect("lock");
        assert_eq!(out.locked, 1);
        assert_eq!(out.backfilled, 0);
        let locked = records::get(&conn, &key).expect("get").expect("rec");
        assert_eq!(locked.lifecycle_status, LifecycleStatus::Locked);
        assert_eq!(locked.numeric_score, Some(92.0));
        assert_eq!(locked.locked_at.as_deref(), Some(timestamp(t(2)).as_str()));
        assert_eq!(locked.locked_by.as_deref(), Some("guru1"));

        publish(&conn, "C", "T", "M", &admin(), t(3)).expect("publish");
        let visible = records::list_published_for_student(&conn, "S", Some("T")).expect("pub");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].numeric_score, Some(92.0));
        assert_eq!(visible[0].letter_grade.as_deref(), Some("A"));
        assert_eq!(visible[0].published_by.as_deref(), Some("admin1"));
        assert_eq!(visible[0].published_at.as_deref(), Some(timestamp(t(3)).as_str()));
    }

    #[test]
    fn low_attendance_student_is_backfilled_to_floor_on_lock() {
        let conn = setup();
        attend(&conn, "S2", 5);
        set_roster(&conn, "C", "T", &["S2".to_string()], t(1)).expect("roster");

        let out = lock(&conn, "C", "T", "M", &guru(), &EngineConfig::default(), t(2)).expect("lock");
        assert_eq!(out.backfilled, 1);

        let rec = records::get(&conn, &GradeKey::new("S2", "C", "T", "M"))
            .expect("get")
            .expect("rec");
        assert_eq!(rec.lifecycle_status, LifecycleStatus::Locked);
        assert_eq!(rec.numeric_score, Some(60.0));
        assert_eq!(rec.letter_grade.as_deref(), Some("D"));
        assert_eq!(rec.descriptive_label.as_deref(), Some("Kurang"));

        publish(&conn, "C", "T", "M", &admin(), t(3)).expect("publish");
        let visible = records::list_published_for_student(&conn, "S2", None).expect("pub");
        assert_eq!(visible[0].numeric_score, Some(60.0));
        assert_eq!(visible[0].letter_grade.as_deref(), Some("D"));
    }

    #[test]
    fn lock_materializes_roster_members_added_after_schedule() {
        let conn = setup();
        // Roster set before the second schedule existed: no placeholder for M2 yet.
        set_roster(&conn, "C", "T", &["S".to_string()], t(1)).expect("roster");
        add_schedule(&conn, "M2");
        let out = lock(&conn, "C", "T", "M2", &guru(), &EngineConfig::default(), t(2))
            .expect("lock");
        assert_eq!(out.placeholders_created, 1);
        assert_eq!(out.locked, 1);
    }

    #[test]
    fn second_lock_is_refused_and_changes_nothing() {
        let conn = setup();
        attend(&conn, "S", 10);
        let cfg = EngineConfig::default();
        enter_grade(&conn, &GradeKey::new("S", "C", "T", "M"), Some(77.0), None, &guru(), &cfg, t(1))
            .expect("enter");
        lock(&conn, "C", "T", "M", &guru(), &cfg, t(2)).expect("first lock");
        let before = records::list_by_class_term(&conn, "C", "T", None).expect("before");

        let err = lock(&conn, "C", "T", "M", &guru(), &cfg, t(5)).expect_err("second lock");
        assert!(matches!(
            err,
            GradeError::AlreadyLocked {
                already_locked: 1,
                total: 1,
                ..
            }
        ));
        let after = records::list_by_class_term(&conn, "C", "T", None).expect("after");
        assert_eq!(before, after);
    }

    #[test]
    fn lock_with_one_locked_record_leaves_drafts_untouched() {
        let conn = setup();
        set_roster(&conn, "C", "T", &["A".to_string(), "B".to_string()], t(1)).expect("roster");
        conn.execute(
            "UPDATE grade_records SET lifecycle_status = 'locked' WHERE student_id = 'A'",
            [],
        )
        .expect("force");
        let err = lock(&conn, "C", "T", "M", &guru(), &EngineConfig::default(), t(2))
            .expect_err("partially locked");
        assert_eq!(err.code(), "already_locked");
        let b = records::get(&conn, &GradeKey::new("B", "C", "T", "M"))
            .expect("get")
            .expect("rec");
        assert_eq!(b.lifecycle_status, LifecycleStatus::Draft);
        assert_eq!(b.numeric_score, None);
    }

    #[test]
    fn only_teacher_of_record_may_lock() {
        let conn = setup();
        set_roster(&conn, "C", "T", &["S".to_string()], t(1)).expect("roster");
        let cfg = EngineConfig::default();
        for actor in [admin(), Actor::new("guru9", Role::Teacher), Actor::new("tu", Role::Staff)] {
            let err = lock(&conn, "C", "T", "M", &actor, &cfg, t(2)).expect_err("unauthorized");
            assert_eq!(err.code(), "unauthorized");
        }
        assert_eq!(statuses(&conn, None), vec![LifecycleStatus::Draft]);
    }

    #[test]
    fn lock_on_empty_scope() {
        let conn = setup();
        let err = lock(&conn, "C", "T", "M", &guru(), &EngineConfig::default(), t(1))
            .expect_err("empty");
        assert_eq!(err.code(), "empty_scope");
    }

    #[test]
    fn lock_unknown_schedule_is_not_found() {
        let conn = setup();
        let err = lock(&conn, "C", "T", "nope", &guru(), &EngineConfig::default(), t(1))
            .expect_err("missing");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn publish_requires_every_record_locked() {
        let conn = setup();
        set_roster(&conn, "C", "T", &["A".to_string(), "B".to_string()], t(1)).expect("roster");
        conn.execute(
            "UPDATE grade_records SET lifecycle_status = 'locked' WHERE student_id = 'A'",
            [],
        )
        .expect("force");

        let err = publish(&conn, "C", "T", "M", &admin(), t(2)).expect_err("one draft");
        assert!(matches!(err, GradeError::NotLocked { draft: 1, total: 2, .. }));
        assert_eq!(
            statuses(&conn, Some("M")),
            vec![LifecycleStatus::Locked, LifecycleStatus::Draft]
        );
    }

    #[test]
    fn publish_is_admin_or_staff_only_and_not_repeatable() {
        let conn = setup();
        set_roster(&conn, "C", "T", &["S".to_string()], t(1)).expect("roster");
        lock(&conn, "C", "T", "M", &guru(), &EngineConfig::default(), t(2)).expect("lock");

        let err = publish(&conn, "C", "T", "M", &guru(), t(3)).expect_err("teacher");
        assert_eq!(err.code(), "unauthorized");

        let out = publish(&conn, "C", "T", "M", &Actor::new("tu", Role::Staff), t(3))
            .expect("staff publish");
        assert_eq!(out.published, 1);

        let err = publish(&conn, "C", "T", "M", &admin(), t(4)).expect_err("again");
        assert!(matches!(err, GradeError::NotLocked { published: 1, .. }));
    }

    #[test]
    fn publish_on_empty_scope_is_not_locked() {
        let conn = setup();
        let err = publish(&conn, "C", "T", "M", &admin(), t(1)).expect_err("empty");
        assert_eq!(err.code(), "not_locked");
    }

    #[test]
    fn class_term_publish_skips_unlocked_schedules() {
        let conn = setup();
        add_schedule(&conn, "M2");
        add_schedule(&conn, "M3");
        set_roster(&conn, "C", "T", &["S".to_string()], t(1)).expect("roster");
        let cfg = EngineConfig::default();
        lock(&conn, "C", "T", "M", &guru(), &cfg, t(2)).expect("lock m");
        lock(&conn, "C", "T", "M3", &guru(), &cfg, t(2)).expect("lock m3");
        publish(&conn, "C", "T", "M3", &admin(), t(3)).expect("publish m3");

        let out = publish_class_term(&conn, "C", "T", &admin(), t(4)).expect("bulk");
        assert_eq!(out.published_schedules, vec!["M".to_string()]);
        assert_eq!(out.records_published, 1);
        assert_eq!(out.skipped.len(), 2);
        assert_eq!(out.skipped[0].schedule_id, "M2");
        assert_eq!(out.skipped[0].draft, 1);
        assert_eq!(out.skipped[1].already_published, 1);

        let err = publish_class_term(&conn, "C", "T", &admin(), t(5)).expect_err("nothing left");
        assert_eq!(err.code(), "not_locked");
    }
}
