use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, parse_opt_string, parse_string_array, required_str, row_exists,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

fn check_teacher(
    conn: &rusqlite::Connection,
    req: &Request,
    teacher_id: Option<&str>,
) -> Result<(), JsonValue> {
    let Some(teacher_id) = teacher_id else {
        return Ok(());
    };
    match row_exists(conn, "users", teacher_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(
            &req.id,
            "not_found",
            "teacher not found",
            Some(json!({ "teacherId": teacher_id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> JsonValue {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    // Correlated subqueries keep the counts independent of each other.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.title,
           c.description,
           c.teacher_id,
           (SELECT COUNT(*) FROM course_students cs WHERE cs.course_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM materials m WHERE m.course_id = c.id) AS material_count
         FROM courses c
         ORDER BY c.title, c.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let description: String = row.get(2)?;
            let teacher_id: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let material_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "title": title,
                "description": description,
                "teacherId": teacher_id,
                "studentCount": student_count,
                "materialCount": material_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_open(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let course = match conn
        .query_row(
            "SELECT c.id, c.title, c.description, c.teacher_id, u.username
             FROM courses c
             LEFT JOIN users u ON u.id = c.teacher_id
             WHERE c.id = ?",
            [&course_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, String>(2)?,
                    "teacherId": r.get::<_, Option<String>>(3)?,
                    "teacherName": r.get::<_, Option<String>>(4)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let students = conn
        .prepare(
            "SELECT u.id, u.username
             FROM course_students cs
             JOIN users u ON u.id = cs.user_id
             WHERE cs.course_id = ?
             ORDER BY u.username",
        )
        .and_then(|mut stmt| {
            let rows = stmt
                .query_map([&course_id], |r| {
                    Ok(json!({ "id": r.get::<_, String>(0)?, "username": r.get::<_, String>(1)? }))
                })?
                .collect::<Result<Vec<_>, _>>();
            rows
        });
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let materials = conn
        .prepare("SELECT id, title FROM materials WHERE course_id = ? ORDER BY title, id")
        .and_then(|mut stmt| {
            let rows = stmt
                .query_map([&course_id], |r| {
                    Ok(json!({ "id": r.get::<_, String>(0)?, "title": r.get::<_, String>(1)? }))
                })?
                .collect::<Result<Vec<_>, _>>();
            rows
        });
    let materials = match materials {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({ "course": course, "students": students, "materials": materials }),
    )
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = req
        .params
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let teacher_id = match parse_opt_string(req.params.get("teacherId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("teacherId {m}"), None),
    };
    if let Err(e) = check_teacher(conn, req, teacher_id.as_deref()) {
        return e;
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, title, description, teacher_id) VALUES(?, ?, ?, ?)",
        (&course_id, &title, &description, &teacher_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }
    ok(&req.id, json!({ "courseId": course_id, "title": title }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
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
            "description" => match v.as_str() {
                Some(s) => {
                    set_parts.push("description = ?");
                    bind_values.push(Some(s.to_string()));
                }
                None => {
                    return err(&req.id, "bad_params", "patch.description must be string", None)
                }
            },
            "teacherId" => {
                let teacher_id = match parse_opt_string(Some(v)) {
                    Ok(t) => t,
                    Err(m) => {
                        return err(&req.id, "bad_params", format!("patch.teacherId {m}"), None)
                    }
                };
                if let Err(e) = check_teacher(conn, req, teacher_id.as_deref()) {
                    return e;
                }
                set_parts.push("teacher_id = ?");
                bind_values.push(teacher_id);
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

    let sql = format!("UPDATE courses SET {} WHERE id = ?", set_parts.join(", "));
    bind_values.push(Some(course_id));
    match conn.execute(&sql, rusqlite::params_from_iter(bind_values.iter())) {
        Ok(0) => err(&req.id, "not_found", "course not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        ),
    }
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match row_exists(conn, "courses", &course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // Dependency order; the schema has no ON DELETE CASCADE.
    for (table, sql) in [
        ("materials", "DELETE FROM materials WHERE course_id = ?"),
        ("course_students", "DELETE FROM course_students WHERE course_id = ?"),
        ("courses", "DELETE FROM courses WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&course_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(course = %course_id, "course deleted");
    ok(&req.id, json!({ "ok": true }))
}

fn handle_courses_set_students(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_ids = match parse_string_array(req.params.get("userIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("userIds {m}"), None),
    };
    match row_exists(conn, "courses", &course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    for user_id in &user_ids {
        match row_exists(conn, "users", user_id) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "not_found",
                    "user not found",
                    Some(json!({ "userId": user_id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM course_students WHERE course_id = ?", [&course_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "course_students" })),
        );
    }
    for user_id in &user_ids {
        if let Err(e) = tx.execute(
            "INSERT INTO course_students(course_id, user_id) VALUES(?, ?)",
            (&course_id, user_id),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "course_students" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "courseId": course_id, "studentCount": user_ids.len() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.open" => Some(handle_courses_open(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        "courses.setStudents" => Some(handle_courses_set_students(state, req)),
        _ => None,
    }
}
