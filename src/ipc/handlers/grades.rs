use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

use crate::config::EngineConfig;
use crate::eligibility;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_actor, get_grade_key, get_optional_score, get_optional_str, get_required_str, to_json,
    with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::records;
use crate::status;

fn grades_get(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let key = get_grade_key(params)?;
    let rec = records::get(conn, &key)?;
    Ok(json!({ "record": to_json(&rec)? }))
}

fn grades_list(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let schedule_id = get_optional_str(params, "scheduleId")?;
    let recs = records::list_by_class_term(conn, &class_id, &term_id, schedule_id.as_deref())?;
    Ok(json!({ "records": to_json(&recs)? }))
}

fn grades_check_eligibility(
    conn: &Connection,
    cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let key = get_grade_key(params)?;
    let existing = records::get(conn, &key)?;
    let gate = eligibility::can_enter_grade(conn, &key, existing.as_ref(), cfg)?;
    to_json(&gate)
}

fn grades_enter(
    conn: &Connection,
    cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let key = get_grade_key(params)?;
    let actor = get_actor(params)?;
    let score = get_optional_score(params, "numericScore")?;
    let notes = get_optional_str(params, "notes")?;
    let rec = eligibility::enter_grade(
        conn,
        &key,
        score,
        notes.as_deref(),
        &actor,
        cfg,
        Utc::now(),
    )?;
    Ok(json!({ "record": to_json(&rec)? }))
}

fn grades_scope_status(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let schedule_id = get_optional_str(params, "scheduleId")?;
    let s = match schedule_id.as_deref() {
        Some(sched) => status::compute_scope_status(conn, &class_id, &term_id, Some(sched))?,
        None => status::compute_class_term_status(conn, &class_id, &term_id)?,
    };
    Ok(json!({ "status": to_json(&s)? }))
}

fn grades_class_term_status(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let term_id = get_required_str(params, "termId")?;
    let overview = status::class_term_overview(conn, &class_id, &term_id)?;
    to_json(&overview)
}

fn grades_published(
    conn: &Connection,
    _cfg: &EngineConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term_id = get_optional_str(params, "termId")?;
    let recs = records::list_published_for_student(conn, &student_id, term_id.as_deref())?;
    let rows: Vec<serde_json::Value> = recs
        .iter()
        .map(|r| {
            json!({
                "classId": r.class_id,
                "termId": r.term_id,
                "scheduleId": r.schedule_id,
                "numericScore": r.numeric_score,
                "letterGrade": r.letter_grade,
                "descriptiveLabel": r.descriptive_label,
                "passStatus": r.pass_status,
                "notes": r.notes,
                "publishedAt": r.published_at,
            })
        })
        .collect();
    Ok(json!({ "grades": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.get" => Some(with_db(state, req, grades_get)),
        "grades.list" => Some(with_db(state, req, grades_list)),
        "grades.checkEligibility" => Some(with_db(state, req, grades_check_eligibility)),
        "grades.enter" => Some(with_db(state, req, grades_enter)),
        "grades.scopeStatus" => Some(with_db(state, req, grades_scope_status)),
        "grades.classTermStatus" => Some(with_db(state, req, grades_class_term_status)),
        "grades.published" => Some(with_db(state, req, grades_published)),
        _ => None,
    }
}
