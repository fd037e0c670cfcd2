use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_opt_string, required_str, row_exists};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

fn check_course(
    conn: &rusqlite::Connection,
    req: &Request,
    course_id: Option<&str>,
) -> Result<(), JsonValue> {
    let Some(course_id) = course_id else {
        return Ok(());
    };
    match row_exists(conn, "courses", course_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(
            &req.id,
            "not_found",
            "course not found",
            Some(json!({ "courseId": course_id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn material_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "title": row.get::<_, String>(1)?,
        "content": row.get::<_, String>(2)?,
        "courseId": row.get::<_, Option<String>>(3)?,
    }))
}

fn handle_materials_list(state: &mut AppState, req: &Request) -> JsonValue {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "materials": [] }));
    };
    let course_id = match parse_opt_string(req.params.get("courseId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("courseId {m}"), None),
    };

    let rows = match course_id.as_deref() {
        Some(course_id) => conn
            .prepare(
                "SELECT id, title, content, course_id
                 FROM materials
                 WHERE course_id = ?
                 ORDER BY title, id",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([course_id], material_json)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }),
        None => conn
            .prepare("SELECT id, title, content, course_id FROM materials ORDER BY title, id")
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([], material_json)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            }),
    };

    match rows {
        Ok(materials) => ok(&req.id, json!({ "materials": materials })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_materials_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Content is free text or a file path.
    let content = req
        .params
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let course_id = match parse_opt_string(req.params.get("courseId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("courseId {m}"), None),
    };
    if let Err(e) = check_course(conn, req, course_id.as_deref()) {
        return e;
    }

    let material_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO materials(id, title, content, course_id) VALUES(?, ?, ?, ?)",
        (&material_id, &title, &content, &course_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "materials" })),
        );
    }
    ok(&req.id, json!({ "materialId": material_id, "title": title }))
}

fn handle_materials_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let material_id = match required_str(req, "materialId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Option<String>> = Vec::new();
    for (key, v) in patch {
        match key.as_str() {
            "title" => match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => {
                    set_parts.push("title = ?");
                    bind_values.push(Some(s.to_string()));
                }
                None => {
                    return err(&req.id, "bad_params", "patch.title must not be empty", None)
                }
            },
            "content" => match v.as_str() {
                Some(s) => {
                    set_parts.push("content = ?");
                    bind_values.push(Some(s.to_string()));
                }
                None => return err(&req.id, "bad_params", "patch.content must be string", None),
            },
            "courseId" => {
                let course_id = match parse_opt_string(Some(v)) {
                    Ok(c) => c,
                    Err(m) => {
                        return err(&req.id, "bad_params", format!("patch.courseId {m}"), None)
                    }
                };
                if let Err(e) = check_course(conn, req, course_id.as_deref()) {
                    return e;
                }
                set_parts.push("course_id = ?");
                bind_values.push(course_id);
            }
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown patch field: {key}"),
                    Some(json!({ "field": key })),
                )
            }
        }
    }
    if set_parts.is_empty() {
        return ok(&req.id, json!({ "ok": true }));
    }

    let sql = format!("UPDATE materials SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Some(material_id));
    match conn.execute(&sql, rusqlite::params_from_iter(bind_values.iter())) {
        Ok(0) => err(&req.id, "not_found", "material not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "materials" })),
        ),
    }
}

fn handle_materials_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let material_id = match required_str(req, "materialId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM materials WHERE id = ?", [&material_id]) {
        Ok(0) => err(&req.id, "not_found", "material not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "materials" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "materials.list" => Some(handle_materials_list(state, req)),
        "materials.create" => Some(handle_materials_create(state, req)),
        "materials.update" => Some(handle_materials_update(state, req)),
        "materials.delete" => Some(handle_materials_delete(state, req)),
        _ => None,
    }
}
