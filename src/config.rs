use std::env;
use std::path::PathBuf;

/// Language picker entries, in picker order. The first one is the default.
pub const LANGUAGES: [(&str, &str); 2] = [("ua", "Ukrainian"), ("us", "English")];

pub struct Config {
    /// Curriculum document path; the built-in document is used when unset.
    pub curriculum_path: Option<PathBuf>,
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub default_language: String,
    /// Log filter directive, used when RUST_LOG is not set.
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        let curriculum_path = env::var("CURRICULUMD_CURRICULUM")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let workspace = env::var("CURRICULUMD_WORKSPACE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let default_language = env::var("CURRICULUMD_DEFAULT_LANGUAGE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| LANGUAGES[0].0.to_string());

        let log_filter = env::var("CURRICULUMD_LOG").unwrap_or_else(|_| "info".to_string());

        Config {
            curriculum_path,
            workspace,
            default_language,
            log_filter,
        }
    }
}
