use serde_json::json;

use super::{get_required_str, require_db, HandlerErr};
use crate::db;
use crate::filter::{evaluate, FacetKey, FacetSet};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};

fn parse_facet_key(params: &serde_json::Value) -> Result<FacetKey, HandlerErr> {
    let raw = get_required_str(params, "facet")?;
    raw.parse::<FacetKey>().map_err(|_| {
        HandlerErr::new(
            "bad_params",
            format!("unknown facet: {raw} (expected number|name|gender|class)"),
        )
    })
}

fn facets_json(facets: &FacetSet) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = facets
        .iter()
        .map(|(key, st)| {
            json!({
                "key": key.as_str(),
                "active": st.active,
                "value": st.value,
            })
        })
        .collect();
    json!(entries)
}

// Every evaluation re-reads roster and classes in full. No cached subset
// survives between calls, so results never depend on which facet changed
// last.
fn evaluation_json(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let roster =
        db::load_students(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let classes =
        db::load_classes(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let result = evaluate(&roster, &classes, &state.facets);
    Ok(json!({
        "facets": facets_json(&state.facets),
        "students": result.students,
        "matchCount": result.students.len(),
        "filtered": result.filtered,
    }))
}

fn handle_state(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    Ok(ok(&req.id, json!({ "facets": facets_json(&state.facets) })))
}

fn handle_toggle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let key = parse_facet_key(&req.params)?;
    // An explicit flag makes the request idempotent; without one, flip.
    let active = match req.params.get("active").and_then(|v| v.as_bool()) {
        Some(wanted) => state.facets.set_active(key, wanted),
        None => state.facets.toggle(key),
    };
    let mut result = evaluation_json(state)?;
    result["active"] = json!(active);
    Ok(ok(&req.id, result))
}

fn handle_set_value(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    let key = parse_facet_key(&req.params)?;
    let value = get_required_str(&req.params, "value")?;
    // A rejected value leaves the session untouched: the caller keeps
    // showing the last valid result and surfaces the message.
    state
        .facets
        .set_value(key, &value)
        .map_err(|e| HandlerErr::new("invalid_facet_value", e.to_string()))?;
    Ok(ok(&req.id, evaluation_json(state)?))
}

fn handle_evaluate(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(ok(&req.id, evaluation_json(state)?))
}

fn handle_reset(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    state.facets.reset();
    Ok(ok(&req.id, evaluation_json(state)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "filter.state" => handle_state(state, req),
        "filter.toggle" => handle_toggle(state, req),
        "filter.setValue" => handle_set_value(state, req),
        "filter.evaluate" => handle_evaluate(state, req),
        "filter.reset" => handle_reset(state, req),
        _ => return None,
    };
    Some(resp.unwrap_or_else(|e| e.response(&req.id)))
}
