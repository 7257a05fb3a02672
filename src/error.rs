use serde_json::json;
use thiserror::Error;

use crate::records::{GradeKey, LifecycleStatus};

/// Identifies the (class, term, schedule?) slice a transition or rollup acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub class_id: String,
    pub term_id: String,
    pub schedule_id: Option<String>,
}

impl Scope {
    pub fn schedule(class_id: &str, term_id: &str, schedule_id: &str) -> Self {
        Scope {
            class_id: class_id.to_string(),
            term_id: term_id.to_string(),
            schedule_id: Some(schedule_id.to_string()),
        }
    }

    pub fn class_term(class_id: &str, term_id: &str) -> Self {
        Scope {
            class_id: class_id.to_string(),
            term_id: term_id.to_string(),
            schedule_id: None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "classId": self.class_id,
            "termId": self.term_id,
            "scheduleId": self.schedule_id,
        })
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schedule_id {
            Some(s) => write!(f, "{}/{}/{}", self.class_id, self.term_id, s),
            None => write!(f, "{}/{}", self.class_id, self.term_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("score {score} is outside the allowed range 0-100")]
    InvalidScoreRange { score: f64 },

    #[error("grade for student {} is {status} and can no longer be edited", .key.student_id)]
    RecordLocked {
        key: GradeKey,
        status: LifecycleStatus,
    },

    #[error(
        "attendance is {:.0}%, minimum {:.0}% required ({sessions_present}/{sessions_total} sessions)",
        .ratio * 100.0,
        .threshold * 100.0
    )]
    InsufficientAttendance {
        student_id: String,
        ratio: f64,
        threshold: f64,
        sessions_present: u32,
        sessions_total: u32,
    },

    #[error("{already_locked} of {total} records in {scope} are already past Draft")]
    AlreadyLocked {
        scope: Scope,
        already_locked: usize,
        total: usize,
    },

    #[error("role {role} may not {action}")]
    Unauthorized { action: &'static str, role: String },

    #[error("{scope} is not fully locked: {draft} draft, {published} published of {total}")]
    NotLocked {
        scope: Scope,
        draft: usize,
        published: usize,
        total: usize,
    },

    #[error("no grade records or roster members in {scope}")]
    EmptyScope { scope: Scope },

    #[error(
        "session {session_id} was recorded on schedule {recorded_schedule_id}, not {requested_schedule_id}"
    )]
    SessionMismatch {
        session_id: String,
        recorded_schedule_id: String,
        requested_schedule_id: String,
    },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl GradeError {
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::InvalidScoreRange { .. } => "invalid_score_range",
            GradeError::RecordLocked { .. } => "record_locked",
            GradeError::InsufficientAttendance { .. } => "insufficient_attendance",
            GradeError::AlreadyLocked { .. } => "already_locked",
            GradeError::Unauthorized { .. } => "unauthorized",
            GradeError::NotLocked { .. } => "not_locked",
            GradeError::EmptyScope { .. } => "empty_scope",
            GradeError::SessionMismatch { .. } => "session_schedule_mismatch",
            GradeError::NotFound { .. } => "not_found",
            GradeError::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GradeError::InvalidScoreRange { score } => Some(json!({
                "score": score,
                "min": 0.0,
                "max": 100.0,
            })),
            GradeError::RecordLocked { key, status } => Some(json!({
                "studentId": key.student_id,
                "classId": key.class_id,
                "termId": key.term_id,
                "scheduleId": key.schedule_id,
                "status": status.as_str(),
            })),
            GradeError::InsufficientAttendance {
                student_id,
                ratio,
                threshold,
                sessions_present,
                sessions_total,
            } => Some(json!({
                "studentId": student_id,
                "ratio": ratio,
                "threshold": threshold,
                "sessionsPresent": sessions_present,
                "sessionsTotal": sessions_total,
            })),
            GradeError::AlreadyLocked {
                scope,
                already_locked,
                total,
            } => Some(json!({
                "scope": scope.to_json(),
                "alreadyLocked": already_locked,
                "total": total,
            })),
            GradeError::Unauthorized { action, role } => Some(json!({
                "action": action,
                "role": role,
            })),
            GradeError::NotLocked {
                scope,
                draft,
                published,
                total,
            } => Some(json!({
                "scope": scope.to_json(),
                "draft": draft,
                "published": published,
                "total": total,
            })),
            GradeError::EmptyScope { scope } => Some(json!({ "scope": scope.to_json() })),
            GradeError::SessionMismatch {
                session_id,
                recorded_schedule_id,
                requested_schedule_id,
            } => Some(json!({
                "sessionId": session_id,
                "recordedScheduleId": recorded_schedule_id,
                "requestedScheduleId": requested_schedule_id,
            })),
            GradeError::NotFound { what, id } => Some(json!({ "what": what, "id": id })),
            GradeError::Db(_) => None,
        }
    }
}

pub type GradeResult<T> = Result<T, GradeError>;
