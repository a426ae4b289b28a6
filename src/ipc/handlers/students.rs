use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::classes::class_exists;
use super::{get_optional_str, get_required_str, require_db, HandlerErr};
use crate::db;
use crate::filter::Gender;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn parse_gender(raw: &str) -> Result<Gender, HandlerErr> {
    raw.parse::<Gender>()
        .map_err(|_| HandlerErr::new("bad_params", "gender must be \"Male\" or \"Female\""))
}

fn parse_number(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    let Some(v) = params.get("number") else {
        return Ok(None);
    };
    let n = v
        .as_i64()
        .ok_or_else(|| HandlerErr::new("bad_params", "number must be an integer"))?;
    if n < 0 {
        return Err(HandlerErr::new("bad_params", "number must not be negative"));
    }
    Ok(Some(n))
}

fn parse_birthdate(params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = get_optional_str(params, "birthdate")? else {
        return Ok(None);
    };
    let t = raw.trim().to_string();
    if t.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(&t, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "birthdate must be YYYY-MM-DD"))?;
    Ok(Some(t))
}

// The full roster, never a filtered view. Filtering goes through the
// filter.* methods so there is exactly one place computing subsets.
fn handle_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let students =
        db::load_students(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(ok(&req.id, json!({ "students": students })))
}

fn handle_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::new(
            "not_found",
            format!("no class with id {class_id}"),
        ));
    }

    let firstname = get_required_str(&req.params, "firstname")?.trim().to_string();
    let lastname = get_required_str(&req.params, "lastname")?.trim().to_string();
    if firstname.is_empty() || lastname.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            "firstname/lastname must not be empty",
        ));
    }
    let number = parse_number(&req.params)?
        .ok_or_else(|| HandlerErr::new("bad_params", "missing number"))?;
    let gender = parse_gender(&get_required_str(&req.params, "gender")?)?;
    let birthdate = parse_birthdate(&req.params)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, firstname, lastname, number, gender, birthdate)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![id, class_id, firstname, lastname, number, gender.as_str(), birthdate],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(ok(
        &req.id,
        json!({ "student": {
            "id": id,
            "classId": class_id,
            "firstname": firstname,
            "lastname": lastname,
            "number": number,
            "gender": gender.as_str(),
            "birthdate": birthdate,
        }}),
    ))
}

// Validate every field before touching the database, then apply inside one
// transaction: a multi-field update lands entirely or not at all.
fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(&req.params, "id")?;
    let class_id = get_optional_str(&req.params, "classId")?;
    let firstname = match get_optional_str(&req.params, "firstname")? {
        Some(raw) => {
            let t = raw.trim().to_string();
            if t.is_empty() {
                return Err(HandlerErr::new("bad_params", "firstname must not be empty"));
            }
            Some(t)
        }
        None => None,
    };
    let lastname = match get_optional_str(&req.params, "lastname")? {
        Some(raw) => {
            let t = raw.trim().to_string();
            if t.is_empty() {
                return Err(HandlerErr::new("bad_params", "lastname must not be empty"));
            }
            Some(t)
        }
        None => None,
    };
    let number = parse_number(&req.params)?;
    let gender = match get_optional_str(&req.params, "gender")? {
        Some(raw) => Some(parse_gender(&raw)?),
        None => None,
    };
    let set_birthdate = req.params.get("birthdate").is_some();
    let birthdate = parse_birthdate(&req.params)?;

    let conn = state
        .db
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    if !student_exists(conn, &id)? {
        return Err(HandlerErr::new(
            "not_found",
            format!("no student with id {id}"),
        ));
    }

    let tx = conn
        .transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if let Some(class_id) = class_id {
        // An early return drops the transaction, rolling back anything
        // already applied.
        if !class_exists(&tx, &class_id)? {
            return Err(HandlerErr::new(
                "not_found",
                format!("no class with id {class_id}"),
            ));
        }
        tx.execute(
            "UPDATE students SET class_id = ? WHERE id = ?",
            rusqlite::params![class_id, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(firstname) = firstname {
        tx.execute(
            "UPDATE students SET firstname = ? WHERE id = ?",
            rusqlite::params![firstname, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(lastname) = lastname {
        tx.execute(
            "UPDATE students SET lastname = ? WHERE id = ?",
            rusqlite::params![lastname, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(number) = number {
        tx.execute(
            "UPDATE students SET number = ? WHERE id = ?",
            rusqlite::params![number, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(gender) = gender {
        tx.execute(
            "UPDATE students SET gender = ? WHERE id = ?",
            rusqlite::params![gender.as_str(), id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if set_birthdate {
        tx.execute(
            "UPDATE students SET birthdate = ? WHERE id = ?",
            rusqlite::params![birthdate, id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(ok(&req.id, json!({ "ok": true })))
}

fn handle_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "id")?;
    let n = conn
        .execute("DELETE FROM students WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if n == 0 {
        return Err(HandlerErr::new(
            "not_found",
            format!("no student with id {id}"),
        ));
    }
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.create" => handle_create(state, req),
        "students.update" => handle_update(state, req),
        "students.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(resp.unwrap_or_else(|e| e.response(&req.id)))
}
