use crate::directory::{LessonDirectory, Role};
use crate::gateway::SqliteLessonStore;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, lesson_err, new_session_id, parse_opt_string, parse_opt_u32, refresh_directories,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

fn directory_view(directory_id: &str, d: &LessonDirectory) -> JsonValue {
    let specialities: Vec<JsonValue> = d
        .specialities()
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "gradeCount": s.grades.len(),
                "lessonCount": s.lesson_count(),
            })
        })
        .collect();
    let grades: Vec<JsonValue> = d
        .grades()
        .iter()
        .map(|g| {
            json!({
                "gradeNumber": g.grade_number,
                "label": format!("Grade {}", g.grade_number),
                "lessonCount": g.lessons.len(),
            })
        })
        .collect();
    json!({
        "directoryId": directory_id,
        "language": d.language(),
        "role": d.role(),
        "canEdit": d.can_edit(),
        "loaded": d.records().is_some(),
        "specialities": specialities,
        "selectedSpeciality": d.selected_speciality().map(|s| s.name.as_str()),
        "grades": grades,
        "selectedGrade": d.selected_grade(),
        "entries": d.entries(),
        "selectedLesson": d.selected_lesson(),
        "deleteMode": d.delete_mode(),
        "marked": d.marked(),
    })
}

fn session<'a>(
    directories: &'a mut HashMap<String, LessonDirectory>,
    req: &Request,
) -> Result<(String, &'a mut LessonDirectory), JsonValue> {
    let directory_id = required_str(req, "directoryId")?;
    match directories.get_mut(&directory_id) {
        Some(d) => Ok((directory_id, d)),
        None => Err(err(
            &req.id,
            "not_found",
            "directory not found",
            Some(json!({ "directoryId": directory_id })),
        )),
    }
}

/// Highest-ranked role held by the user. The outer `None` means no such user.
fn resolve_user_role(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<Option<Role>>> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT r.name
         FROM user_roles ur
         JOIN roles r ON r.id = ur.role_id
         WHERE ur.user_id = ?",
    )?;
    let names = stmt
        .query_map([user_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let roles: Vec<Role> = names.iter().filter_map(|n| Role::parse(n)).collect();
    let best = [Role::Admin, Role::Teacher, Role::Student]
        .into_iter()
        .find(|r| roles.contains(r));
    Ok(Some(best))
}

fn handle_directory_open(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let language = match parse_opt_string(req.params.get("language")) {
        Ok(v) => v.unwrap_or_else(|| state.default_language.clone()),
        Err(m) => return err(&req.id, "bad_params", format!("language {m}"), None),
    };
    let role_name = match parse_opt_string(req.params.get("role")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("role {m}"), None),
    };
    let user_id = match parse_opt_string(req.params.get("userId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("userId {m}"), None),
    };

    let role = match (role_name, user_id) {
        (Some(name), _) => match Role::parse(&name) {
            Some(r) => Some(r),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown role: {name}"),
                    Some(json!({ "role": name })),
                )
            }
        },
        (None, Some(user_id)) => match resolve_user_role(conn, &user_id) {
            Ok(Some(r)) => r,
            Ok(None) => return err(&req.id, "not_found", "user not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        (None, None) => None,
    };

    let mut directory = LessonDirectory::new(state.curriculum.clone(), &language, role);
    if let Err(e) = directory.refresh(&SqliteLessonStore::new(conn)) {
        return lesson_err(req, e);
    }
    let directory_id = new_session_id();
    let view = directory_view(&directory_id, &directory);
    state.directories.insert(directory_id, directory);
    ok(&req.id, view)
}

fn handle_directory_view(state: &mut AppState, req: &Request) -> JsonValue {
    match session(&mut state.directories, req) {
        Ok((id, d)) => ok(&req.id, directory_view(&id, d)),
        Err(e) => e,
    }
}

fn handle_directory_refresh(state: &mut AppState, req: &Request) -> JsonValue {
    let AppState { db, directories, .. } = state;
    let (id, d) = match session(directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match d.refresh(&SqliteLessonStore::new(conn)) {
        Ok(_) => ok(&req.id, directory_view(&id, d)),
        Err(e) => lesson_err(req, e),
    }
}

fn handle_directory_set_language(state: &mut AppState, req: &Request) -> JsonValue {
    let AppState { db, directories, .. } = state;
    let (id, d) = match session(directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let language = match required_str(req, "language") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match d.set_language(&language, &SqliteLessonStore::new(conn)) {
        Ok(_) => ok(&req.id, directory_view(&id, d)),
        Err(e) => lesson_err(req, e),
    }
}

fn handle_directory_select_speciality(state: &mut AppState, req: &Request) -> JsonValue {
    let (id, d) = match session(&mut state.directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "specialityName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !d.select_speciality(&name) {
        return err(
            &req.id,
            "not_found",
            "speciality not found",
            Some(json!({ "language": d.language(), "specialityName": name })),
        );
    }
    ok(&req.id, directory_view(&id, d))
}

fn handle_directory_select_grade(state: &mut AppState, req: &Request) -> JsonValue {
    let (id, d) = match session(&mut state.directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_number = match parse_opt_u32(req.params.get("gradeNumber")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("gradeNumber {m}"), None),
    };
    if !d.select_grade(grade_number) {
        return err(
            &req.id,
            "not_found",
            "grade not found",
            Some(json!({
                "specialityName": d.selected_speciality().map(|s| s.name.as_str()),
                "gradeNumber": grade_number,
            })),
        );
    }
    ok(&req.id, directory_view(&id, d))
}

fn handle_directory_select_lesson(state: &mut AppState, req: &Request) -> JsonValue {
    let (id, d) = match session(&mut state.directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_id = match parse_opt_string(req.params.get("lessonId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("lessonId {m}"), None),
    };
    if !d.select_lesson(lesson_id.as_deref()) {
        return err(
            &req.id,
            "not_found",
            "lesson not found",
            Some(json!({ "lessonId": lesson_id })),
        );
    }
    ok(&req.id, directory_view(&id, d))
}

fn handle_directory_set_delete_mode(state: &mut AppState, req: &Request) -> JsonValue {
    let (id, d) = match session(&mut state.directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(enabled) = req.params.get("enabled").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing enabled", None);
    };
    d.set_delete_mode(enabled);
    ok(&req.id, directory_view(&id, d))
}

fn handle_directory_toggle_mark(state: &mut AppState, req: &Request) -> JsonValue {
    let (id, d) = match session(&mut state.directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now_marked = d.toggle_mark(&lesson_id);
    let mut view = directory_view(&id, d);
    view["nowMarked"] = json!(now_marked);
    ok(&req.id, view)
}

fn handle_directory_commit_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let AppState { db, directories, .. } = state;
    let (id, d) = match session(directories, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let store = SqliteLessonStore::new(conn);
    match d.commit_delete(&store) {
        Ok(deleted) => {
            let mut view = directory_view(&id, d);
            view["deleted"] = json!(deleted);
            if deleted > 0 {
                refresh_directories(directories, Some(&id), &store);
            }
            ok(&req.id, view)
        }
        Err(e) => {
            let mut details = e.details().unwrap_or_else(|| json!({}));
            details["marked"] = json!(d.marked());
            err(&req.id, e.code(), e.to_string(), Some(details))
        }
    }
}

fn handle_directory_close(state: &mut AppState, req: &Request) -> JsonValue {
    let directory_id = match required_str(req, "directoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let closed = state.directories.remove(&directory_id).is_some();
    ok(&req.id, json!({ "directoryId": directory_id, "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "directory.open" => Some(handle_directory_open(state, req)),
        "directory.view" => Some(handle_directory_view(state, req)),
        "directory.refresh" => Some(handle_directory_refresh(state, req)),
        "directory.setLanguage" => Some(handle_directory_set_language(state, req)),
        "directory.selectSpeciality" => Some(handle_directory_select_speciality(state, req)),
        "directory.selectGrade" => Some(handle_directory_select_grade(state, req)),
        "directory.selectLesson" => Some(handle_directory_select_lesson(state, req)),
        "directory.setDeleteMode" => Some(handle_directory_set_delete_mode(state, req)),
        "directory.toggleMark" => Some(handle_directory_toggle_mark(state, req)),
        "directory.commitDelete" => Some(handle_directory_commit_delete(state, req)),
        "directory.close" => Some(handle_directory_close(state, req)),
        _ => None,
    }
}
