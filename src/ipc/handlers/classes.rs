use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::{get_optional_str, get_required_str, require_db, HandlerErr};
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};

pub(super) fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn handle_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let classes =
        db::load_classes(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(ok(&req.id, json!({ "classes": classes })))
}

fn handle_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_name = get_required_str(&req.params, "className")?;
    let class_name = class_name.trim().to_string();
    if class_name.is_empty() {
        return Err(HandlerErr::new("bad_params", "className must not be empty"));
    }
    let explanation = get_optional_str(&req.params, "explanation")?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, class_name, explanation) VALUES (?, ?, ?)",
        rusqlite::params![id, class_name, explanation],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(ok(
        &req.id,
        json!({ "class": { "id": id, "className": class_name, "explanation": explanation } }),
    ))
}

// Validate every field before touching the database, then apply inside one
// transaction: a multi-field update lands entirely or not at all.
fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(&req.params, "id")?;
    let class_name = match get_optional_str(&req.params, "className")? {
        Some(raw) => {
            let t = raw.trim().to_string();
            if t.is_empty() {
                return Err(HandlerErr::new("bad_params", "className must not be empty"));
            }
            Some(t)
        }
        None => None,
    };
    let set_explanation = req.params.get("explanation").is_some();
    let explanation = get_optional_str(&req.params, "explanation")?;

    let conn = state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    if !class_exists(conn, &id)? {
        return Err(HandlerErr::new("not_found", format!("no class with id {id}")));
    }

    let tx = conn
        .transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if let Some(class_name) = class_name {
        tx.execute(
            "UPDATE classes SET class_name = ? WHERE id = ?",
            rusqlite::params![class_name, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if set_explanation {
        tx.execute(
            "UPDATE classes SET explanation = ? WHERE id = ?",
            rusqlite::params![explanation, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(ok(&req.id, json!({ "ok": true })))
}

// Removing a class takes its students with it, in one transaction, so the
// roster never holds students pointing at a missing class.
fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(&req.params, "id")?;
    let conn = state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    if !class_exists(conn, &id)? {
        return Err(HandlerErr::new("not_found", format!("no class with id {id}")));
    }

    let tx = conn
        .transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM students WHERE class_id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "classes.list" => handle_list(state, req),
        "classes.create" => handle_create(state, req),
        "classes.update" => handle_update(state, req),
        "classes.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(resp.unwrap_or_else(|e| e.response(&req.id)))
}
