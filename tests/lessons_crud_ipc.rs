mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn lessons_create_list_update_delete() {
    let workspace = temp_dir("curriculumd-lessons-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err_code(&mut stdin, &mut reader, "0", "lessons.list", json!({}));
    assert_eq!(code, "no_workspace");

    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.create",
        json!({ "input": {
            "language": "us",
            "speciality": "Software Engineering",
            "grade": 1,
            "chapterQueue": 2,
            "chapter": "Algorithms and Flowcharts",
            "topicTitle": "Flowcharts",
            "lessonEquipment": ["Whiteboard", "Markers, assorted \"colors\""],
            "videoLinks": []
        }}),
    );
    let lesson_id = created["lessonId"].as_str().expect("lessonId").to_string();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.open",
        json!({ "lessonId": lesson_id }),
    );
    let lesson = &opened["lesson"];
    assert_eq!(lesson["chapter"], json!("Algorithms and Flowcharts"));
    assert_eq!(lesson["speciality"], json!("Software Engineering"));
    assert_eq!(
        lesson["lessonEquipment"],
        json!(["Whiteboard", "Markers, assorted \"colors\""])
    );
    assert_eq!(lesson["videoLinks"], json!([]));
    assert_eq!(lesson["additionalResources"], json!([]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lessons.update",
        json!({ "lessonId": lesson_id, "input": {
            "language": "us",
            "grade": 1,
            "chapterQueue": 2,
            "chapter": "Algorithms and Flowcharts",
            "videoLinks": ["https://example.com/v1"]
        }}),
    );
    let listed = request_ok(&mut stdin, &mut reader, "4", "lessons.list", json!({}));
    let lessons = listed["lessons"].as_array().expect("lessons");
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0]["videoLinks"], json!(["https://example.com/v1"]));
    assert_eq!(lessons[0]["lessonEquipment"], json!([]));

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.list",
        json!({ "language": "ua" }),
    );
    assert_eq!(filtered["lessons"], json!([]));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lessons.delete",
        json!({ "lessonIds": [lesson_id] }),
    );
    assert_eq!(deleted["deleted"], json!(1));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "7",
        "lessons.open",
        json!({ "lessonId": lesson_id }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn lessons_reject_incomplete_or_unknown_input() {
    let workspace = temp_dir("curriculumd-lessons-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let resp = test_support::request(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.create",
        json!({ "input": { "language": "us", "grade": 1 } }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("validation_failed"));
    assert_eq!(resp["error"]["details"]["missing"], json!(["chapterQueue", "chapter"]));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.create",
        json!({ "input": { "language": "us", "grade": 1, "chapterQueue": 1, "chapter": "Intro", "colour": "red" } }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "lessons.update",
        json!({ "lessonId": "missing", "input": { "language": "us", "grade": 1, "chapterQueue": 1, "chapter": "Intro" } }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_stored_array_is_a_parse_error() {
    let workspace = temp_dir("curriculumd-lessons-malformed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.create",
        json!({ "input": { "language": "us", "grade": 1, "chapterQueue": 1, "chapter": "Intro" } }),
    );
    let lesson_id = created["lessonId"].as_str().expect("lessonId").to_string();

    {
        let conn = rusqlite::Connection::open(workspace.join("curriculum.sqlite3")).expect("open db");
        conn.execute(
            "UPDATE lessons SET video_links = 'not json' WHERE id = ?",
            [&lesson_id],
        )
        .expect("corrupt row");
    }

    let resp = test_support::request(&mut stdin, &mut reader, "2", "lessons.list", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("parse_failed"));
    assert_eq!(resp["error"]["details"]["lessonId"], json!(lesson_id));
    assert_eq!(resp["error"]["details"]["field"], json!("videoLinks"));
    assert_eq!(resp["error"]["details"]["raw"], json!("not json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
