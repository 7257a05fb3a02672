use chrono::Utc;
use rusqlite::Connection;

use crate::config::EngineConfig;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_actor, get_required_str, to_json, with_db};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;

fn grades_lock(
    conn: &Connection,
    cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let schedule_id = get_required_str(params, "scheduleId")?;
    let actor = get_actor(params)?;
    let out = lifecycle::lock(conn, &class_id, &term_id, &schedule_id, &actor, cfg, Utc::now())?;
    to_json(&out)
}

fn grades_publish(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let schedule_id = get_required_str(params, "scheduleId")?;
    let actor = get_actor(params)?;
    let out = lifecycle::publish(conn, &class_id, &term_id, &schedule_id, &actor, Utc::now())?;
    to_json(&out)
}

fn grades_publish_class_term(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let actor = get_actor(params)?;
    let out = lifecycle::publish_class_term(conn, &class_id, &term_id, &actor, Utc::now())?;
    to_json(&out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.lock" => Some(with_db(state, req, grades_lock)),
        "grades.publish" => Some(with_db(state, req, grades_publish)),
        "grades.publishClassTerm" => Some(with_db(state, req, grades_publish_class_term)),
        _ => None,
    }
}
