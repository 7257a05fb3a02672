use crate::config;
use crate::error::GradeError;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_actor, to_json};
use crate::ipc::types::{AppState, Request};
use tracing::{info, warn};

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    match to_json(&state.config) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let actor = match get_actor(&req.params) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    if !actor.role.is_admin_or_staff() {
        warn!(by = %actor.user_id, role = actor.role.as_str(), "config update refused");
        return HandlerErr::from(GradeError::Unauthorized {
            action: "change engine config",
            role: actor.role.as_str().to_string(),
        })
        .response(&req.id);
    }
    let mut patch = req.params.clone();
    if let Some(obj) = patch.as_object_mut() {
        obj.remove("actor");
    }
    let next = match state.config.merged(&patch) {
        Ok(v) => v,
        Err(message) => return HandlerErr::bad_params(message).response(&req.id),
    };
    if let Err(e) = config::save(conn, &next) {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }
    info!(by = %actor.user_id, ?next, "engine config updated");
    state.config = next;
    match to_json(&state.config) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
