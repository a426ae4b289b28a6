use crate::filter::{Class, Gender, Student};
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("roster.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            explanation TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            firstname TEXT NOT NULL,
            lastname TEXT NOT NULL,
            number INTEGER NOT NULL,
            gender TEXT NOT NULL,
            birthdate TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    Ok(conn)
}

/// Fetches the full roster. Callers re-read after every mutation instead of
/// patching cached subsets, so the filter engine always sees authoritative
/// data.
pub fn load_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, firstname, lastname, number, gender, birthdate
         FROM students
         ORDER BY lastname, firstname",
    )?;
    let rows = stmt.query_map([], |row| {
        let gender_raw: String = row.get(5)?;
        let gender = gender_raw.parse::<Gender>().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("unknown gender value: {gender_raw}").into(),
            )
        })?;
        let birthdate: Option<String> = row.get(6)?;
        Ok(Student {
            id: row.get(0)?,
            class_id: row.get(1)?,
            firstname: row.get(2)?,
            lastname: row.get(3)?,
            number: row.get(4)?,
            gender,
            birthdate: birthdate.and_then(|s| {
                let t = s.trim().to_string();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            }),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_classes(conn: &Connection) -> anyhow::Result<Vec<Class>> {
    let mut stmt =
        conn.prepare("SELECT id, class_name, explanation FROM classes ORDER BY class_name")?;
    let rows = stmt.query_map([], |row| {
        let explanation: Option<String> = row.get(2)?;
        Ok(Class {
            id: row.get(0)?,
            class_name: row.get(1)?,
            explanation: explanation.and_then(|s| {
                let t = s.trim().to_string();
                if t.is_empty() {
                    None
                } else {
                    Some(t)
                }
            }),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
