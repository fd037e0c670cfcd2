use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::curriculum::CurriculumTree;
use crate::db;
use crate::directory::LessonDirectory;
use crate::form::LessonForm;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub curriculum: Arc<CurriculumTree>,
    pub default_language: String,
    /// Open lesson forms by form id.
    pub forms: HashMap<String, LessonForm>,
    /// Open lesson directories by directory id.
    pub directories: HashMap<String, LessonDirectory>,
}

impl AppState {
    pub fn new(curriculum: Arc<CurriculumTree>, default_language: String) -> Self {
        AppState {
            workspace: None,
            db: None,
            curriculum,
            default_language,
            forms: HashMap::new(),
            directories: HashMap::new(),
        }
    }

    /// Opens (or creates) the workspace database. Sessions bound to the previous
    /// workspace are dropped.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        self.forms.clear();
        self.directories.clear();
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
        Ok(())
    }
}
