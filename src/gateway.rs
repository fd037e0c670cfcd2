use crate::error::LessonError;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

pub const EMPTY_ARRAY: &str = "[]";

pub const FIELD_LESSON_EQUIPMENT: &str = "lessonEquipment";
pub const FIELD_VIDEO_LINKS: &str = "videoLinks";
pub const FIELD_PRESENTATION_LINKS: &str = "presentationLinks";
pub const FIELD_ADDITIONAL_RESOURCES: &str = "additionalResources";

const LESSON_COLUMNS: &str = "id, language, speciality, grade, chapter_queue, chapter, topic_title, topic_queue, lesson_type, lesson_objectives, lesson_equipment, prior_knowledge, lesson_start, lesson_middle, lesson_end, video_links, presentation_links, link_for_doc, additional_resources, created_at, updated_at";

pub fn encode_string_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| EMPTY_ARRAY.to_string())
}

/// Reads a stored array column. An empty column reads as an empty sequence.
pub fn decode_string_array(
    lesson_id: &str,
    field: &'static str,
    raw: &str,
) -> Result<Vec<String>, LessonError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<String>>(raw).map_err(|source| LessonError::Parse {
        lesson_id: lesson_id.to_string(),
        field,
        raw: raw.to_string(),
        source,
    })
}

/// Persistence-shaped lesson: column names, array fields already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonPayload {
    pub language: String,
    pub speciality: Option<String>,
    pub grade: u32,
    pub chapter_queue: u32,
    pub chapter: String,
    pub topic_title: String,
    pub topic_queue: u32,
    pub lesson_type: String,
    pub lesson_objectives: String,
    pub lesson_equipment: String,
    pub prior_knowledge: String,
    pub lesson_start: String,
    pub lesson_middle: String,
    pub lesson_end: String,
    pub video_links: String,
    pub presentation_links: String,
    pub link_for_doc: String,
    pub additional_resources: String,
}

impl Default for LessonPayload {
    fn default() -> Self {
        LessonPayload {
            language: String::new(),
            speciality: None,
            grade: 0,
            chapter_queue: 0,
            chapter: String::new(),
            topic_title: String::new(),
            topic_queue: 0,
            lesson_type: String::new(),
            lesson_objectives: String::new(),
            lesson_equipment: EMPTY_ARRAY.to_string(),
            prior_knowledge: String::new(),
            lesson_start: String::new(),
            lesson_middle: String::new(),
            lesson_end: String::new(),
            video_links: EMPTY_ARRAY.to_string(),
            presentation_links: EMPTY_ARRAY.to_string(),
            link_for_doc: String::new(),
            additional_resources: EMPTY_ARRAY.to_string(),
        }
    }
}

/// A persisted lesson as read back, array fields deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub id: String,
    pub language: String,
    pub speciality: Option<String>,
    pub grade: u32,
    pub chapter_queue: u32,
    pub chapter: String,
    pub topic_title: String,
    pub topic_queue: u32,
    pub lesson_type: String,
    pub lesson_objectives: String,
    pub lesson_equipment: Vec<String>,
    pub prior_knowledge: String,
    pub lesson_start: String,
    pub lesson_middle: String,
    pub lesson_end: String,
    pub video_links: Vec<String>,
    pub presentation_links: Vec<String>,
    pub link_for_doc: String,
    pub additional_resources: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub trait LessonStore {
    fn create(&self, payload: &LessonPayload) -> Result<String, LessonError>;
    fn update(&self, id: &str, payload: &LessonPayload) -> Result<(), LessonError>;
    fn delete(&self, ids: &BTreeSet<String>) -> Result<usize, LessonError>;
    fn list(&self) -> Result<Vec<LessonRecord>, LessonError>;
    fn get(&self, id: &str) -> Result<Option<LessonRecord>, LessonError>;
}

pub struct SqliteLessonStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteLessonStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

struct StoredLesson {
    id: String,
    language: String,
    speciality: Option<String>,
    grade: u32,
    chapter_queue: u32,
    chapter: String,
    topic_title: String,
    topic_queue: u32,
    lesson_type: String,
    lesson_objectives: String,
    lesson_equipment: String,
    prior_knowledge: String,
    lesson_start: String,
    lesson_middle: String,
    lesson_end: String,
    video_links: String,
    presentation_links: String,
    link_for_doc: String,
    additional_resources: String,
    created_at: String,
    updated_at: String,
}

impl StoredLesson {
    fn from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredLesson {
            id: r.get(0)?,
            language: r.get(1)?,
            speciality: r.get(2)?,
            grade: r.get(3)?,
            chapter_queue: r.get(4)?,
            chapter: r.get(5)?,
            topic_title: r.get(6)?,
            topic_queue: r.get(7)?,
            lesson_type: r.get(8)?,
            lesson_objectives: r.get(9)?,
            lesson_equipment: r.get(10)?,
            prior_knowledge: r.get(11)?,
            lesson_start: r.get(12)?,
            lesson_middle: r.get(13)?,
            lesson_end: r.get(14)?,
            video_links: r.get(15)?,
            presentation_links: r.get(16)?,
            link_for_doc: r.get(17)?,
            additional_resources: r.get(18)?,
            created_at: r.get(19)?,
            updated_at: r.get(20)?,
        })
    }

    fn decode(self) -> Result<LessonRecord, LessonError> {
        let lesson_equipment =
            decode_string_array(&self.id, FIELD_LESSON_EQUIPMENT, &self.lesson_equipment)?;
        let video_links = decode_string_array(&self.id, FIELD_VIDEO_LINKS, &self.video_links)?;
        let presentation_links = decode_string_array(
            &self.id,
            FIELD_PRESENTATION_LINKS,
            &self.presentation_links,
        )?;
        let additional_resources = decode_string_array(
            &self.id,
            FIELD_ADDITIONAL_RESOURCES,
            &self.additional_resources,
        )?;
        Ok(LessonRecord {
            id: self.id,
            language: self.language,
            speciality: self.speciality,
            grade: self.grade,
            chapter_queue: self.chapter_queue,
            chapter: self.chapter,
            topic_title: self.topic_title,
            topic_queue: self.topic_queue,
            lesson_type: self.lesson_type,
            lesson_objectives: self.lesson_objectives,
            lesson_equipment,
            prior_knowledge: self.prior_knowledge,
            lesson_start: self.lesson_start,
            lesson_middle: self.lesson_middle,
            lesson_end: self.lesson_end,
            video_links,
            presentation_links,
            link_for_doc: self.link_for_doc,
            additional_resources,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl LessonStore for SqliteLessonStore<'_> {
    fn create(&self, payload: &LessonPayload) -> Result<String, LessonError> {
        let id = Uuid::new_v4().to_string();
        let ts = now_ts();
        self.conn.execute(
            "INSERT INTO lessons(
                id, language, speciality, grade, chapter_queue, chapter, topic_title, topic_queue,
                lesson_type, lesson_objectives, lesson_equipment, prior_knowledge, lesson_start,
                lesson_middle, lesson_end, video_links, presentation_links, link_for_doc,
                additional_resources, created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                payload.language,
                payload.speciality,
                payload.grade,
                payload.chapter_queue,
                payload.chapter,
                payload.topic_title,
                payload.topic_queue,
                payload.lesson_type,
                payload.lesson_objectives,
                payload.lesson_equipment,
                payload.prior_knowledge,
                payload.lesson_start,
                payload.lesson_middle,
                payload.lesson_end,
                payload.video_links,
                payload.presentation_links,
                payload.link_for_doc,
                payload.additional_resources,
                ts,
                ts
            ],
        )?;
        tracing::info!(lesson_id = %id, language = %payload.language, grade = payload.grade, "lesson created");
        Ok(id)
    }

    fn update(&self, id: &str, payload: &LessonPayload) -> Result<(), LessonError> {
        let changed = self.conn.execute(
            "UPDATE lessons SET
                language = ?, speciality = ?, grade = ?, chapter_queue = ?, chapter = ?,
                topic_title = ?, topic_queue = ?, lesson_type = ?, lesson_objectives = ?,
                lesson_equipment = ?, prior_knowledge = ?, lesson_start = ?, lesson_middle = ?,
                lesson_end = ?, video_links = ?, presentation_links = ?, link_for_doc = ?,
                additional_resources = ?, updated_at = ?
             WHERE id = ?",
            params![
                payload.language,
                payload.speciality,
                payload.grade,
                payload.chapter_queue,
                payload.chapter,
                payload.topic_title,
                payload.topic_queue,
                payload.lesson_type,
                payload.lesson_objectives,
                payload.lesson_equipment,
                payload.prior_knowledge,
                payload.lesson_start,
                payload.lesson_middle,
                payload.lesson_end,
                payload.video_links,
                payload.presentation_links,
                payload.link_for_doc,
                payload.additional_resources,
                now_ts(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(LessonError::NotFound(id.to_string()));
        }
        tracing::info!(lesson_id = %id, "lesson updated");
        Ok(())
    }

    fn delete(&self, ids: &BTreeSet<String>) -> Result<usize, LessonError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM lessons WHERE id IN ({})", placeholders);
        let deleted = self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        tracing::info!(requested = ids.len(), deleted, "lessons deleted");
        Ok(deleted)
    }

    fn list(&self) -> Result<Vec<LessonRecord>, LessonError> {
        let sql = format!(
            "SELECT {} FROM lessons
             ORDER BY language, grade, chapter_queue, topic_queue, created_at, id",
            LESSON_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let stored = stmt
            .query_map([], StoredLesson::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        stored
            .into_iter()
            .map(|s| {
                s.decode().inspect_err(|e| {
                    tracing::error!("lesson list aborted: {e}");
                })
            })
            .collect()
    }

    fn get(&self, id: &str) -> Result<Option<LessonRecord>, LessonError> {
        let sql = format!("SELECT {} FROM lessons WHERE id = ?", LESSON_COLUMNS);
        let stored = self
            .conn
            .query_row(&sql, [id], StoredLesson::from_row)
            .optional()?;
        stored
            .map(StoredLesson::decode)
            .transpose()
            .inspect_err(|e| {
                tracing::error!("lesson get failed: {e}");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        crate::db::create_schema(&conn).expect("schema");
        conn
    }

    fn payload(language: &str, grade: u32, queue: u32, chapter: &str) -> LessonPayload {
        LessonPayload {
            language: language.to_string(),
            grade,
            chapter_queue: queue,
            chapter: chapter.to_string(),
            ..LessonPayload::default()
        }
    }

    #[test]
    fn arrays_survive_encode_and_decode() {
        let cases: Vec<Vec<String>> = vec![
            vec![],
            vec!["projector".to_string()],
            vec![
                "say \"hi\"".to_string(),
                "back\\slash".to_string(),
                "comma, bracket ] [".to_string(),
                "line\nbreak\ttab".to_string(),
                "юнікод ✓".to_string(),
                String::new(),
            ],
        ];
        for values in cases {
            let raw = encode_string_array(&values);
            let back = decode_string_array("x", FIELD_VIDEO_LINKS, &raw).expect("decode");
            assert_eq!(back, values);
        }
        assert_eq!(encode_string_array(&[]), EMPTY_ARRAY);
    }

    #[test]
    fn blank_column_reads_as_empty_and_garbage_fails() {
        assert!(decode_string_array("x", FIELD_LESSON_EQUIPMENT, "")
            .expect("blank")
            .is_empty());
        let e = decode_string_array("lesson-1", FIELD_LESSON_EQUIPMENT, "projector, board")
            .expect_err("malformed");
        assert_eq!(e.code(), "parse_failed");
        match e {
            LessonError::Parse {
                lesson_id, field, ..
            } => {
                assert_eq!(lesson_id, "lesson-1");
                assert_eq!(field, FIELD_LESSON_EQUIPMENT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // A JSON value that is not an array of strings is malformed too.
        assert!(decode_string_array("x", FIELD_VIDEO_LINKS, "{\"a\":1}").is_err());
        assert!(decode_string_array("x", FIELD_VIDEO_LINKS, "[1,2]").is_err());
    }

    #[test]
    fn create_update_list_delete() {
        let conn = store_conn();
        let store = SqliteLessonStore::new(&conn);

        let mut p = payload("us", 1, 1, "Intro");
        p.lesson_equipment = encode_string_array(&["laptop".to_string(), "board".to_string()]);
        let a = store.create(&p).expect("create a");
        let b = store.create(&payload("us", 2, 1, "Functions")).expect("create b");

        let listed = store.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a);
        assert_eq!(listed[0].lesson_equipment, vec!["laptop", "board"]);
        assert!(listed[0].video_links.is_empty());

        let mut changed = payload("us", 1, 2, "Loops");
        changed.topic_title = "While loops".to_string();
        store.update(&a, &changed).expect("update");
        let got = store.get(&a).expect("get").expect("present");
        assert_eq!(got.chapter, "Loops");
        assert_eq!(got.chapter_queue, 2);
        assert_eq!(got.topic_title, "While loops");
        assert!(got.lesson_equipment.is_empty());

        let missing = store.update("nope", &changed).expect_err("unknown id");
        assert_eq!(missing.code(), "not_found");

        let ids: BTreeSet<String> = [a.clone(), b.clone(), "ghost".to_string()]
            .into_iter()
            .collect();
        assert_eq!(store.delete(&ids).expect("delete"), 2);
        assert!(store.list().expect("list after delete").is_empty());
        assert_eq!(store.delete(&BTreeSet::new()).expect("noop delete"), 0);
    }

    #[test]
    fn list_and_get_propagate_malformed_array() {
        let conn = store_conn();
        let store = SqliteLessonStore::new(&conn);
        let mut p = payload("us", 1, 1, "Intro");
        p.presentation_links = "not json".to_string();
        let id = store.create(&p).expect("create");

        let e = store.list().expect_err("malformed column");
        match e {
            LessonError::Parse {
                lesson_id,
                field,
                raw,
                ..
            } => {
                assert_eq!(lesson_id, id);
                assert_eq!(field, FIELD_PRESENTATION_LINKS);
                assert_eq!(raw, "not json");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let e = store.get(&id).expect_err("malformed column on get");
        assert_eq!(e.code(), "parse_failed");
    }
}
