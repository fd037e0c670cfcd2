use thiserror::Error;

#[derive(Debug, Error)]
pub enum LessonError {
    /// Required selections missing from a lesson draft, in form order.
    #[error("missing required selection: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("lesson not found: {0}")]
    NotFound(String),

    #[error("lesson store rejected the call: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("lesson {lesson_id} has malformed {field}: {source}")]
    Parse {
        lesson_id: String,
        field: &'static str,
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LessonError {
    /// Wire code used in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            LessonError::Validation(_) => "validation_failed",
            LessonError::NotFound(_) => "not_found",
            LessonError::Store(_) => "store_failed",
            LessonError::Parse { .. } => "parse_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            LessonError::Validation(missing) => Some(serde_json::json!({ "missing": missing })),
            LessonError::Parse {
                lesson_id,
                field,
                raw,
                ..
            } => Some(serde_json::json!({
                "lessonId": lesson_id,
                "field": field,
                "raw": raw,
            })),
            _ => None,
        }
    }
}
