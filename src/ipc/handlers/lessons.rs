use crate::error::LessonError;
use crate::gateway::{encode_string_array, LessonPayload, LessonStore, SqliteLessonStore};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, lesson_err, parse_opt_string, parse_string_array, parse_u32,
    parse_verbatim_string_array, refresh_directories, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;

/// Builds a payload from `params.input`. Array fields arrive as JSON arrays and
/// are serialized here; unknown keys are rejected.
fn parse_lesson_input(req: &Request) -> Result<LessonPayload, JsonValue> {
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing input", None));
    };
    let bad = |key: &str, msg: &str| {
        err(
            &req.id,
            "bad_params",
            format!("input.{key} {msg}"),
            Some(json!({ "field": key })),
        )
    };
    let text = |key: &str, v: &JsonValue| -> Result<String, JsonValue> {
        v.as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| bad(key, "must be string"))
    };
    let array = |key: &str, v: &JsonValue| -> Result<String, JsonValue> {
        parse_verbatim_string_array(v)
            .map(|items| encode_string_array(&items))
            .map_err(|m| bad(key, m))
    };
    let number = |key: &str, v: &JsonValue| parse_u32(v).map_err(|m| bad(key, m));

    let mut p = LessonPayload::default();
    for (key, v) in input {
        match key.as_str() {
            "language" => p.language = text(key, v)?.trim().to_string(),
            "speciality" => p.speciality = parse_opt_string(Some(v)).map_err(|m| bad(key, m))?,
            "grade" => p.grade = number(key, v)?,
            "chapterQueue" => p.chapter_queue = number(key, v)?,
            "chapter" => p.chapter = text(key, v)?,
            "topicTitle" => p.topic_title = text(key, v)?,
            "topicQueue" => p.topic_queue = number(key, v)?,
            "lessonType" => p.lesson_type = text(key, v)?,
            "lessonObjectives" => p.lesson_objectives = text(key, v)?,
            "lessonEquipment" => p.lesson_equipment = array(key, v)?,
            "priorKnowledge" => p.prior_knowledge = text(key, v)?,
            "lessonStart" => p.lesson_start = text(key, v)?,
            "lessonMiddle" => p.lesson_middle = text(key, v)?,
            "lessonEnd" => p.lesson_end = text(key, v)?,
            "videoLinks" => p.video_links = array(key, v)?,
            "presentationLinks" => p.presentation_links = array(key, v)?,
            "linkForDoc" => p.link_for_doc = text(key, v)?,
            "additionalResources" => p.additional_resources = array(key, v)?,
            _ => return Err(bad(key, "is not a lesson field")),
        }
    }

    let mut missing = Vec::new();
    if p.language.is_empty() {
        missing.push("language");
    }
    if p.grade == 0 {
        missing.push("grade");
    }
    if p.chapter_queue == 0 {
        missing.push("chapterQueue");
    }
    if p.chapter.trim().is_empty() {
        missing.push("chapter");
    }
    if !missing.is_empty() {
        return Err(lesson_err(req, LessonError::Validation(missing)));
    }
    Ok(p)
}

fn handle_lessons_list(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let language = match parse_opt_string(req.params.get("language")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("language {m}"), None),
    };
    match SqliteLessonStore::new(conn).list() {
        Ok(records) => {
            let lessons: Vec<_> = records
                .into_iter()
                .filter(|r| language.as_deref().map_or(true, |l| r.language == l))
                .collect();
            ok(&req.id, json!({ "lessons": lessons }))
        }
        Err(e) => lesson_err(req, e),
    }
}

fn handle_lessons_open(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteLessonStore::new(conn).get(&lesson_id) {
        Ok(Some(lesson)) => ok(&req.id, json!({ "lesson": lesson })),
        Ok(None) => lesson_err(req, LessonError::NotFound(lesson_id)),
        Err(e) => lesson_err(req, e),
    }
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let payload = match parse_lesson_input(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let store = SqliteLessonStore::new(conn);
    match store.create(&payload) {
        Ok(lesson_id) => {
            refresh_directories(&mut state.directories, None, &store);
            ok(&req.id, json!({ "lessonId": lesson_id }))
        }
        Err(e) => lesson_err(req, e),
    }
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let payload = match parse_lesson_input(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let store = SqliteLessonStore::new(conn);
    match store.update(&lesson_id, &payload) {
        Ok(()) => {
            refresh_directories(&mut state.directories, None, &store);
            ok(&req.id, json!({ "lessonId": lesson_id }))
        }
        Err(e) => lesson_err(req, e),
    }
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(&state.db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let ids: BTreeSet<String> = match parse_string_array(req.params.get("lessonIds")) {
        Ok(v) => v.into_iter().collect(),
        Err(m) => return err(&req.id, "bad_params", format!("lessonIds {m}"), None),
    };
    let store = SqliteLessonStore::new(conn);
    match store.delete(&ids) {
        Ok(deleted) => {
            if deleted > 0 {
                refresh_directories(&mut state.directories, None, &store);
            }
            ok(&req.id, json!({ "deleted": deleted }))
        }
        Err(e) => lesson_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "lessons.list" => Some(handle_lessons_list(state, req)),
        "lessons.open" => Some(handle_lessons_open(state, req)),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.update" => Some(handle_lessons_update(state, req)),
        "lessons.delete" => Some(handle_lessons_delete(state, req)),
        _ => None,
    }
}
