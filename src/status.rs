use rusqlite::Connection;
use serde::Serialize;

use crate::error::GradeResult;
use crate::records::{self, LifecycleStatus};
use crate::schedules;

/// Dashboard rollup of record statuses. `Partial` only ever comes out of
/// [`display_rollup`]; it is never stored on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RollupStatus {
    #[serde(rename = "none")]
    NoRecords,
    Draft,
    Locked,
    Published,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub draft: usize,
    pub locked: usize,
    pub published: usize,
}

impl Tally {
    pub fn of<I>(statuses: I) -> Tally
    where
        I: IntoIterator<Item = LifecycleStatus>,
    {
        let mut t = Tally::default();
        for s in statuses {
            match s {
                LifecycleStatus::Draft => t.draft += 1,
                LifecycleStatus::Locked => t.locked += 1,
                LifecycleStatus::Published => t.published += 1,
            }
        }
        t
    }

    pub fn total(&self) -> usize {
        self.draft + self.locked + self.published
    }
}

/// none / Published / Locked / Draft, strictly from the records.
pub fn rollup(t: &Tally) -> RollupStatus {
    if t.total() == 0 {
        RollupStatus::NoRecords
    } else if t.published == t.total() {
        RollupStatus::Published
    } else if t.draft == 0 {
        RollupStatus::Locked
    } else {
        RollupStatus::Draft
    }
}

/// Same as [`rollup`] except Draft mixed with anything already frozen shows as Partial.
pub fn display_rollup(t: &Tally) -> RollupStatus {
    match rollup(t) {
        RollupStatus::Draft if t.locked + t.published > 0 => RollupStatus::Partial,
        other => other,
    }
}

fn tally_scope(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: Option<&str>,
) -> GradeResult<Tally> {
    let recs = records::list_by_class_term(conn, class_id, term_id, schedule_id)?;
    Ok(Tally::of(recs.iter().map(|r| r.lifecycle_status)))
}

pub fn compute_scope_status(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    schedule_id: Option<&str>,
) -> GradeResult<RollupStatus> {
    Ok(rollup(&tally_scope(conn, class_id, term_id, schedule_id)?))
}

pub fn compute_class_term_status(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
) -> GradeResult<RollupStatus> {
    compute_scope_status(conn, class_id, term_id, None)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    pub schedule_id: String,
    pub subject: String,
    pub status: RollupStatus,
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTermOverview {
    pub status: RollupStatus,
    pub display_status: RollupStatus,
    pub tally: Tally,
    pub schedules: Vec<ScheduleStatus>,
}

pub fn class_term_overview(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
) -> GradeResult<ClassTermOverview> {
    let recs = records::list_by_class_term(conn, class_id, term_id, None)?;
    let tally = Tally::of(recs.iter().map(|r| r.lifecycle_status));

    let mut per_schedule = Vec::new();
    for s in schedules::list_schedules(conn, class_id, term_id)? {
        let t = Tally::of(
            recs.iter()
                .filter(|r| r.schedule_id == s.id)
                .map(|r| r.lifecycle_status),
        );
        per_schedule.push(ScheduleStatus {
            schedule_id: s.id,
            subject: s.subject,
            status: rollup(&t),
            tally: t,
        });
    }

    Ok(ClassTermOverview {
        status: rollup(&tally),
        display_status: display_rollup(&tally),
        tally,
        schedules: per_schedule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::records::GradeKey;
    use crate::schedules::{upsert_schedule, Schedule};
    use chrono::{TimeZone, Utc};
    use LifecycleStatus::*;

    fn tally(statuses: &[LifecycleStatus]) -> Tally {
        Tally::of(statuses.iter().copied())
    }

    #[test]
    fn strict_rollup_rules() {
        assert_eq!(rollup(&tally(&[])), RollupStatus::NoRecords);
        assert_eq!(rollup(&tally(&[Published, Published])), RollupStatus::Published);
        assert_eq!(rollup(&tally(&[Locked, Published])), RollupStatus::Locked);
        assert_eq!(rollup(&tally(&[Locked, Locked])), RollupStatus::Locked);
        assert_eq!(rollup(&tally(&[Draft, Locked, Published])), RollupStatus::Draft);
        assert_eq!(rollup(&tally(&[Draft])), RollupStatus::Draft);
    }

    #[test]
    fn partial_only_for_draft_mixed_with_frozen() {
        assert_eq!(display_rollup(&tally(&[Draft, Locked])), RollupStatus::Partial);
        assert_eq!(display_rollup(&tally(&[Draft, Published])), RollupStatus::Partial);
        assert_eq!(display_rollup(&tally(&[Draft, Draft])), RollupStatus::Draft);
        assert_eq!(display_rollup(&tally(&[Locked, Published])), RollupStatus::Locked);
        assert_eq!(display_rollup(&tally(&[])), RollupStatus::NoRecords);
    }

    #[test]
    fn none_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RollupStatus::NoRecords).expect("json"),
            serde_json::json!("none")
        );
        assert_eq!(
            serde_json::to_value(RollupStatus::Partial).expect("json"),
            serde_json::json!("Partial")
        );
    }

    #[test]
    fn overview_lists_every_registered_schedule() {
        let conn = db::open_in_memory().expect("db");
        for id in ["M1", "M2", "M3"] {
            upsert_schedule(
                &conn,
                &Schedule {
                    id: id.to_string(),
                    class_id: "C".to_string(),
                    term_id: "T".to_string(),
                    teacher_id: "guru1".to_string(),
                    subject: format!("subject {id}"),
                },
            )
            .expect("schedule");
        }
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).single().expect("ts");
        for (sched, student) in [("M1", "A"), ("M1", "B"), ("M2", "A")] {
            records::ensure_placeholder(&conn, &GradeKey::new(student, "C", "T", sched), now)
                .expect("placeholder");
        }
        conn.execute(
            "UPDATE grade_records SET lifecycle_status = 'locked' WHERE schedule_id = 'M1'",
            [],
        )
        .expect("lock m1");

        let ov = class_term_overview(&conn, "C", "T").expect("overview");
        assert_eq!(ov.status, RollupStatus::Draft);
        assert_eq!(ov.display_status, RollupStatus::Partial);
        assert_eq!(ov.tally.total(), 3);
        let by_id: Vec<(&str, RollupStatus)> = ov
            .schedules
            .iter()
            .map(|s| (s.schedule_id.as_str(), s.status))
            .collect();
        assert_eq!(
            by_id,
            vec![
                ("M1", RollupStatus::Locked),
                ("M2", RollupStatus::Draft),
                ("M3", RollupStatus::NoRecords),
            ]
        );

        assert_eq!(
            compute_scope_status(&conn, "C", "T", Some("M1")).expect("m1"),
            RollupStatus::Locked
        );
        assert_eq!(
            compute_class_term_status(&conn, "C", "other").expect("empty"),
            RollupStatus::NoRecords
        );
    }
}
