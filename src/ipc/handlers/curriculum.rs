use crate::config::LANGUAGES;
use crate::ipc::error::ok;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_languages(state: &mut AppState, req: &Request) -> serde_json::Value {
    let picker: Vec<serde_json::Value> = LANGUAGES
        .iter()
        .map(|(code, label)| json!({ "code": code, "label": label }))
        .collect();
    ok(
        &req.id,
        json!({
            "languages": picker,
            "configured": state.curriculum.languages(),
            "defaultLanguage": state.default_language,
        }),
    )
}

fn handle_specialities(state: &mut AppState, req: &Request) -> serde_json::Value {
    let language = match required_str(req, "language") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "language": language,
            "specialities": state.curriculum.specialities_for(&language),
        }),
    )
}

fn handle_lesson_types(state: &mut AppState, req: &Request) -> serde_json::Value {
    let language = match required_str(req, "language") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "language": language,
            "lessonTypes": state.curriculum.lesson_types_for(&language),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.languages" => Some(handle_languages(state, req)),
        "curriculum.specialities" => Some(handle_specialities(state, req)),
        "curriculum.lessonTypes" => Some(handle_lesson_types(state, req)),
        _ => None,
    }
}
