use crate::directory::LessonDirectory;
use crate::error::LessonError;
use crate::gateway::LessonStore;
use crate::ipc::error::err;
use crate::ipc::types::Request;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

pub fn db_conn<'a>(
    db: &'a Option<Connection>,
    req: &Request,
) -> Result<&'a Connection, JsonValue> {
    db.as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn lesson_err(req: &Request, e: LessonError) -> JsonValue {
    err(&req.id, e.code(), e.to_string(), e.details())
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

/// Non-negative integer given either as a JSON number or a numeric string
/// (select widgets hand values back as strings).
pub fn parse_u32(v: &JsonValue) -> Result<u32, &'static str> {
    if let Some(n) = v.as_u64() {
        return u32::try_from(n).map_err(|_| "is out of range");
    }
    if let Some(s) = v.as_str() {
        let s = s.trim();
        if s.is_empty() {
            return Ok(0);
        }
        return s.parse::<u32>().map_err(|_| "must be a non-negative integer");
    }
    Err("must be a non-negative integer")
}

pub fn parse_opt_u32(v: Option<&JsonValue>) -> Result<Option<u32>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => parse_u32(v).map(Some),
    }
}

/// Trimmed, non-empty strings.
pub fn parse_string_array(v: Option<&JsonValue>) -> Result<Vec<String>, &'static str> {
    match v {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of strings")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item
                    .as_str()
                    .ok_or("must be array of strings")?
                    .trim()
                    .to_string();
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            Ok(out)
        }
    }
}

/// Strings kept exactly as sent.
pub fn parse_verbatim_string_array(v: &JsonValue) -> Result<Vec<String>, &'static str> {
    let arr = v.as_array().ok_or("must be array of strings")?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or("must be array of strings")
        })
        .collect()
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?");
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

/// Re-fetches every open directory (except `skip`) after a lesson write. A failed
/// fetch is logged and that directory keeps its previous records.
pub fn refresh_directories(
    directories: &mut HashMap<String, LessonDirectory>,
    skip: Option<&str>,
    store: &dyn LessonStore,
) {
    for (directory_id, directory) in directories.iter_mut() {
        if skip == Some(directory_id.as_str()) {
            continue;
        }
        if let Err(e) = directory.refresh(store) {
            tracing::error!(directory = %directory_id, "refresh after lesson write failed: {e}");
        }
    }
}
