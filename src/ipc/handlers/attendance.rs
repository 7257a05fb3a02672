use rusqlite::Connection;
use serde_json::json;

use crate::attendance::{self, AttendanceMark, SessionInput};
use crate::config::EngineConfig;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_str, to_json, with_db};
use crate::ipc::types::{AppState, Request};

fn parse_entries(params: &serde_json::Value) -> Result<Vec<(String, AttendanceMark)>, HandlerErr> {
    let Some(arr) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries[]"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, entry) in arr.iter().enumerate() {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| HandlerErr::bad_params(format!("entries[{}] missing studentId", i)))?;
        let raw_status = entry.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let Some(mark) = AttendanceMark::parse(raw_status) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: "status must be one of: present, excused, sick, absent".to_string(),
                details: Some(json!({ "index": i, "status": raw_status })),
            });
        };
        out.push((student_id.trim().to_string(), mark));
    }
    Ok(out)
}

fn attendance_record_session(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let input = SessionInput {
        session_id: get_optional_str(params, "sessionId")?,
        schedule_id: get_required_str(params, "scheduleId")?,
        session_date: get_required_str(params, "sessionDate")?,
        entries: parse_entries(params)?,
    };
    let session_id = attendance::record_session(conn, &input)?;
    Ok(json!({ "sessionId": session_id, "entries": input.entries.len() }))
}

fn attendance_summary(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let summary = attendance::compute_attendance(conn, &student_id, &class_id, &term_id)?;
    to_json(&summary)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.recordSession" => Some(with_db(state, req, attendance_record_session)),
        "attendance.summary" => Some(with_db(state, req, attendance_summary)),
        _ => None,
    }
}
