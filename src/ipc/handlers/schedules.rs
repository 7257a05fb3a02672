use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

use crate::config::EngineConfig;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, to_json, with_db};
use crate::ipc::types::{AppState, Request};
use crate::schedules::{self, Schedule};

fn schedules_upsert(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let input = Schedule {
        id: get_required_str(params, "scheduleId")?,
        class_id: get_required_str(params, "classId")?,
        term_id: get_required_str(params, "termId")?,
        teacher_id: get_required_str(params, "teacherId")?,
        subject: params
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
    };
    if let Some(existing) = schedules::get_schedule(conn, &input.id)? {
        if existing.class_id != input.class_id || existing.term_id != input.term_id {
            return Err(HandlerErr {
                code: "bad_params",
                message: "schedule already belongs to another class/term".to_string(),
                details: Some(json!({
                    "scheduleId": existing.id,
                    "classId": existing.class_id,
                    "termId": existing.term_id,
                })),
            });
        }
    }
    schedules::upsert_schedule(conn, &input)?;
    Ok(json!({ "scheduleId": input.id }))
}

fn schedules_list(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let list = schedules::list_schedules(conn, &class_id, &term_id)?;
    Ok(json!({ "schedules": to_json(&list)? }))
}

fn roster_set(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let Some(ids_json) = params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds[]"));
    };
    let mut student_ids = Vec::with_capacity(ids_json.len());
    for (i, v) in ids_json.iter().enumerate() {
        match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => student_ids.push(s.to_string()),
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "studentIds[{}] must be a non-empty string",
                    i
                )))
            }
        }
    }
    let outcome = schedules::set_roster(conn, &class_id, &term_id, &student_ids, Utc::now())?;
    to_json(&outcome)
}

fn roster_list(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let ids = schedules::list_roster(conn, &class_id, &term_id)?;
    Ok(json!({ "studentIds": ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.upsert" => Some(with_db(state, req, schedules_upsert)),
        "schedules.list" => Some(with_db(state, req, schedules_list)),
        "roster.set" => Some(with_db(state, req, roster_set)),
        "roster.list" => Some(with_db(state, req, roster_list)),
        _ => None,
    }
}
