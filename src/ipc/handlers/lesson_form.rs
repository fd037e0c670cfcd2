use crate::error::LessonError;
use crate::form::{FormStage, LessonForm, MetadataField};
use crate::gateway::{LessonStore, SqliteLessonStore};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, lesson_err, new_session_id, parse_opt_string, parse_opt_u32, parse_u32,
    parse_verbatim_string_array, refresh_directories, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

fn form_view(form_id: &str, form: &LessonForm) -> JsonValue {
    let specialities: Vec<&str> = form
        .available_specialities()
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    let grades: Vec<JsonValue> = form
        .available_grades()
        .iter()
        .map(|g| {
            json!({
                "value": g.grade_number,
                "label": format!("Grade {}", g.grade_number),
            })
        })
        .collect();
    let lessons: Vec<JsonValue> = form
        .available_lesson_slots()
        .iter()
        .map(|s| {
            json!({
                "value": s.queue,
                "label": format!("[{}] - {}", s.queue, s.title),
            })
        })
        .collect();
    json!({
        "formId": form_id,
        "stage": form.stage(),
        "editingLessonId": form.editing_id(),
        "draft": form.draft(),
        "options": {
            "specialities": specialities,
            "grades": grades,
            "lessons": lessons,
            "lessonTypes": form.lesson_types(),
        }
    })
}

fn session<'a>(
    forms: &'a mut HashMap<String, LessonForm>,
    req: &Request,
) -> Result<(String, &'a mut LessonForm), JsonValue> {
    let form_id = required_str(req, "formId")?;
    match forms.get_mut(&form_id) {
        Some(form) => Ok((form_id, form)),
        None => Err(err(
            &req.id,
            "not_found",
            "form not found",
            Some(json!({ "formId": form_id })),
        )),
    }
}

/// Parses every key of `params.patch` before touching the draft, so a bad
/// patch changes nothing.
fn parse_patch(req: &Request) -> Result<Vec<MetadataField>, JsonValue> {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing patch", None));
    };
    let bad = |key: &str, msg: &str| {
        err(
            &req.id,
            "bad_params",
            format!("patch.{key} {msg}"),
            Some(json!({ "field": key })),
        )
    };
    let text = |key: &str, v: &JsonValue| -> Result<String, JsonValue> {
        v.as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| bad(key, "must be string"))
    };
    let list = |key: &str, v: &JsonValue| -> Result<Vec<String>, JsonValue> {
        parse_verbatim_string_array(v).map_err(|m| bad(key, m))
    };

    let mut fields = Vec::with_capacity(patch.len());
    for (key, v) in patch {
        let field = match key.as_str() {
            "topicTitle" => MetadataField::TopicTitle(text(key, v)?),
            "topicQueue" => MetadataField::TopicQueue(parse_u32(v).map_err(|m| bad(key, m))?),
            "lessonType" => MetadataField::LessonType(text(key, v)?),
            "lessonObjectives" => MetadataField::LessonObjectives(text(key, v)?),
            "lessonEquipment" => MetadataField::LessonEquipment(list(key, v)?),
            "priorKnowledge" => MetadataField::PriorKnowledge(text(key, v)?),
            "lessonStart" => MetadataField::LessonStart(text(key, v)?),
            "lessonMiddle" => MetadataField::LessonMiddle(text(key, v)?),
            "lessonEnd" => MetadataField::LessonEnd(text(key, v)?),
            "videoLinks" => MetadataField::VideoLinks(list(key, v)?),
            "presentationLinks" => MetadataField::PresentationLinks(list(key, v)?),
            "linkForDoc" => MetadataField::LinkForDoc(text(key, v)?),
            "additionalResources" => MetadataField::AdditionalResources(list(key, v)?),
            _ => return Err(bad(key, "is not an editable field")),
        };
        fields.push(field);
    }
    Ok(fields)
}

fn handle_form_open(state: &mut AppState, req: &Request) -> JsonValue {
    let language = match parse_opt_string(req.params.get("language")) {
        Ok(v) => v.unwrap_or_else(|| state.default_language.clone()),
        Err(m) => return err(&req.id, "bad_params", format!("language {m}"), None),
    };
    let lesson_id = match parse_opt_string(req.params.get("lessonId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("lessonId {m}"), None),
    };

    let form = match lesson_id {
        None => LessonForm::new(state.curriculum.clone(), &language),
        Some(lesson_id) => {
            let conn = match db_conn(&state.db, req) {
                Ok(c) => c,
                Err(e) => return e,
            };
            match SqliteLessonStore::new(conn).get(&lesson_id) {
                Ok(Some(record)) => LessonForm::for_record(state.curriculum.clone(), &record),
                Ok(None) => return lesson_err(req, LessonError::NotFound(lesson_id)),
                Err(e) => return lesson_err(req, e),
            }
        }
    };

    let form_id = new_session_id();
    let view = form_view(&form_id, &form);
    state.forms.insert(form_id, form);
    ok(&req.id, view)
}

fn handle_form_get(state: &mut AppState, req: &Request) -> JsonValue {
    match session(&mut state.forms, req) {
        Ok((form_id, form)) => ok(&req.id, form_view(&form_id, form)),
        Err(e) => e,
    }
}

fn handle_form_select_language(state: &mut AppState, req: &Request) -> JsonValue {
    let (form_id, form) = match session(&mut state.forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let language = match required_str(req, "language") {
        Ok(v) => v,
        Err(e) => return e,
    };
    form.select_language(&language);
    ok(&req.id, form_view(&form_id, form))
}

fn handle_form_select_speciality(state: &mut AppState, req: &Request) -> JsonValue {
    let (form_id, form) = match session(&mut state.forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    // An empty name clears the selection.
    let Some(name) = req.params.get("specialityName").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing specialityName", None);
    };
    form.select_speciality(name.trim());
    ok(&req.id, form_view(&form_id, form))
}

fn handle_form_select_grade(state: &mut AppState, req: &Request) -> JsonValue {
    let (form_id, form) = match session(&mut state.forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_number = match parse_opt_u32(req.params.get("gradeNumber")) {
        Ok(v) => v.unwrap_or(0),
        Err(m) => return err(&req.id, "bad_params", format!("gradeNumber {m}"), None),
    };
    form.select_grade(grade_number);
    ok(&req.id, form_view(&form_id, form))
}

fn handle_form_select_lesson_slot(state: &mut AppState, req: &Request) -> JsonValue {
    let (form_id, form) = match session(&mut state.forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let queue = match parse_opt_u32(req.params.get("lessonQueue")) {
        Ok(v) => v.unwrap_or(0),
        Err(m) => return err(&req.id, "bad_params", format!("lessonQueue {m}"), None),
    };
    let matched = form.select_lesson_slot(queue);
    let mut view = form_view(&form_id, form);
    view["slotMatched"] = json!(matched);
    ok(&req.id, view)
}

fn handle_form_set_fields(state: &mut AppState, req: &Request) -> JsonValue {
    let fields = match parse_patch(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (form_id, form) = match session(&mut state.forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Metadata opens up once a lesson slot is chosen.
    let stage = form.stage();
    if stage != FormStage::Metadata {
        return err(
            &req.id,
            "bad_params",
            "select a lesson slot before editing lesson fields",
            Some(json!({ "stage": stage })),
        );
    }
    for field in fields {
        form.set_metadata(field);
    }
    ok(&req.id, form_view(&form_id, form))
}

fn handle_form_preview(state: &mut AppState, req: &Request) -> JsonValue {
    match session(&mut state.forms, req) {
        Ok((form_id, form)) => ok(
            &req.id,
            json!({ "formId": form_id, "preview": form.preview() }),
        ),
        Err(e) => e,
    }
}

fn handle_form_submit(state: &mut AppState, req: &Request) -> JsonValue {
    let AppState {
        db,
        forms,
        directories,
        ..
    } = state;
    let (form_id, form) = match session(forms, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = form.validate_required() {
        return lesson_err(req, e);
    }
    let conn = match db_conn(db, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let created = form.editing_id().is_none();
    let store = SqliteLessonStore::new(conn);
    let lesson_id = match form.submit(&store) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(form = %form_id, "lesson submit failed: {e}");
            return lesson_err(req, e);
        }
    };
    forms.remove(&form_id);
    refresh_directories(directories, None, &store);
    ok(
        &req.id,
        json!({ "formId": form_id, "lessonId": lesson_id, "created": created }),
    )
}

fn handle_form_close(state: &mut AppState, req: &Request) -> JsonValue {
    let form_id = match required_str(req, "formId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let closed = state.forms.remove(&form_id).is_some();
    ok(&req.id, json!({ "formId": form_id, "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "lessonForm.open" => Some(handle_form_open(state, req)),
        "lessonForm.get" => Some(handle_form_get(state, req)),
        "lessonForm.selectLanguage" => Some(handle_form_select_language(state, req)),
        "lessonForm.selectSpeciality" => Some(handle_form_select_speciality(state, req)),
        "lessonForm.selectGrade" => Some(handle_form_select_grade(state, req)),
        "lessonForm.selectLessonSlot" => Some(handle_form_select_lesson_slot(state, req)),
        "lessonForm.setFields" => Some(handle_form_set_fields(state, req)),
        "lessonForm.preview" => Some(handle_form_preview(state, req)),
        "lessonForm.submit" => Some(handle_form_submit(state, req)),
        "lessonForm.close" => Some(handle_form_close(state, req)),
        _ => None,
    }
}
