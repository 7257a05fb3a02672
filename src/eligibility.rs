use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::attendance::{self, AttendanceSummary};
use crate::config::{EngineConfig, ZeroSessionPolicy};
use crate::error::{GradeError, GradeResult};
use crate::records::{self, GradeKey, GradeRecord};
use crate::roles::Actor;
use crate::schedules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    AlreadyLocked,
    InsufficientAttendance,
    /// No session has been recorded yet and the policy is `block`.
    NoSessionsYet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub threshold: f64,
    pub attendance: AttendanceSummary,
}

/// The attendance/lock gate. Lock state wins over attendance: a Locked or
/// Published record is read-only whatever the ratio.
pub fn evaluate(
    existing: Option<&GradeRecord>,
    attendance: &AttendanceSummary,
    cfg: &EngineConfig,
) -> Eligibility {
    let deny = |reason| Eligibility {
        allowed: false,
        reason: Some(reason),
        threshold: cfg.attendance_threshold,
        attendance: attendance.clone(),
    };

    if existing.is_some_and(|r| r.lifecycle_status.is_past_draft()) {
        return deny(DenyReason::AlreadyLocked);
    }
    if attendance.sessions_total == 0 && cfg.zero_session_policy == ZeroSessionPolicy::Block {
        return deny(DenyReason::NoSessionsYet);
    }
    if attendance.ratio < cfg.attendance_threshold {
        return deny(DenyReason::InsufficientAttendance);
    }
    Eligibility {
        allowed: true,
        reason: None,
        threshold: cfg.attendance_threshold,
        attendance: attendance.clone(),
    }
}

pub fn can_enter_grade(
    conn: &Connection,
    key: &GradeKey,
    existing: Option<&GradeRecord>,
    cfg: &EngineConfig,
) -> GradeResult<Eligibility> {
    let summary = attendance::compute_attendance(conn, &key.student_id, &key.class_id, &key.term_id)?;
    Ok(evaluate(existing, &summary, cfg))
}

fn denial_error(key: &GradeKey, existing: Option<&GradeRecord>, e: &Eligibility) -> GradeError {
    match e.reason {
        Some(DenyReason::AlreadyLocked) => GradeError::RecordLocked {
            key: key.clone(),
            status: existing
                .map(|r| r.lifecycle_status)
                .unwrap_or(crate::records::LifecycleStatus::Locked),
        },
        Some(DenyReason::NoSessionsYet) => GradeError::InsufficientAttendance {
            student_id: key.student_id.clone(),
            ratio: 0.0,
            threshold: e.threshold,
            sessions_present: 0,
            sessions_total: 0,
        },
        _ => GradeError::InsufficientAttendance {
            student_id: key.student_id.clone(),
            ratio: e.attendance.ratio,
            threshold: e.threshold,
            sessions_present: e.attendance.sessions_present,
            sessions_total: e.attendance.sessions_total,
        },
    }
}

/// The only path for score writes: authorize, gate on attendance and lock
/// state, then store.
pub fn enter_grade(
    conn: &Connection,
    key: &GradeKey,
    numeric_score: Option<f64>,
    notes: Option<&str>,
    actor: &Actor,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
) -> GradeResult<GradeRecord> {
    let schedule = schedules::require_schedule(conn, &key.class_id, &key.term_id, &key.schedule_id)?;
    if !actor.is_teacher_of_record(&schedule.teacher_id) && !actor.role.is_admin_or_staff() {
        return Err(GradeError::Unauthorized {
            action: "enter grades",
            role: actor.role.as_str().to_string(),
        });
    }

    let existing = records::get(conn, key)?;
    let gate = can_enter_grade(conn, key, existing.as_ref(), cfg)?;
    if !gate.allowed {
        debug!(
            student = %key.student_id,
            schedule = %key.schedule_id,
            reason = ?gate.reason,
            ratio = gate.attendance.ratio,
            "grade entry refused"
        );
        return Err(denial_error(key, existing.as_ref(), &gate));
    }
    records::upsert(conn, key, numeric_score, notes, actor, now)
}
