use crate::curriculum::{CurriculumTree, Grade, Speciality};
use crate::error::LessonError;
use crate::gateway::{LessonRecord, LessonStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Display variant only. Nothing here gates the store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryAccess {
    Actionable,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: String,
    pub primary_text: String,
    pub secondary_text: String,
    pub category_text: String,
    pub access: EntryAccess,
    pub marked: bool,
}

/// Browsing state for persisted lessons: speciality -> grade -> lesson.
pub struct LessonDirectory {
    curriculum: Arc<CurriculumTree>,
    language: String,
    role: Option<Role>,
    records: Option<Vec<LessonRecord>>,
    selected_speciality: Option<String>,
    selected_grade: Option<u32>,
    selected_lesson: Option<String>,
    delete_mode: bool,
    marked: BTreeSet<String>,
}

impl LessonDirectory {
    pub fn new(curriculum: Arc<CurriculumTree>, language: &str, role: Option<Role>) -> Self {
        LessonDirectory {
            curriculum,
            language: language.to_string(),
            role,
            records: None,
            selected_speciality: None,
            selected_grade: None,
            selected_lesson: None,
            delete_mode: false,
            marked: BTreeSet::new(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn can_edit(&self) -> bool {
        self.role.map(Role::is_elevated).unwrap_or(false)
    }

    /// `None` until the first successful fetch.
    pub fn records(&self) -> Option<&[LessonRecord]> {
        self.records.as_deref()
    }

    /// Re-fetches every record. Previously fetched records are kept on failure.
    pub fn refresh(&mut self, store: &dyn LessonStore) -> Result<usize, LessonError> {
        let records = store.list()?;
        let count = records.len();
        if let Some(id) = self.selected_lesson.as_deref() {
            if !records.iter().any(|r| r.id == id) {
                self.selected_lesson = None;
            }
        }
        self.records = Some(records);
        Ok(count)
    }

    pub fn set_language(&mut self, language: &str, store: &dyn LessonStore) -> Result<usize, LessonError> {
        self.language = language.to_string();
        self.selected_speciality = None;
        self.selected_grade = None;
        self.selected_lesson = None;
        self.refresh(store)
    }

    pub fn specialities(&self) -> &[Speciality] {
        self.curriculum.specialities_for(&self.language)
    }

    pub fn selected_speciality(&self) -> Option<&Speciality> {
        let name = self.selected_speciality.as_deref()?;
        self.curriculum.speciality(&self.language, name)
    }

    /// Returns false (and changes nothing) when the name is not a speciality of
    /// the current language.
    pub fn select_speciality(&mut self, name: &str) -> bool {
        if self.curriculum.speciality(&self.language, name).is_none() {
            return false;
        }
        self.selected_speciality = Some(name.to_string());
        self.selected_grade = None;
        self.selected_lesson = None;
        true
    }

    pub fn grades(&self) -> &[Grade] {
        self.selected_speciality()
            .map(|s| s.grades.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_grade(&self) -> Option<u32> {
        self.selected_grade
    }

    /// `None` (or 0) goes back to the grade cards. Returns false (and changes
    /// nothing) when the grade is not offered by the selected speciality.
    pub fn select_grade(&mut self, grade_number: Option<u32>) -> bool {
        let grade_number = grade_number.filter(|g| *g != 0);
        if let Some(g) = grade_number {
            if !self.grades().iter().any(|grade| grade.grade_number == g) {
                return false;
            }
        }
        self.selected_grade = grade_number;
        self.selected_lesson = None;
        true
    }

    pub fn selected_lesson(&self) -> Option<&LessonRecord> {
        let id = self.selected_lesson.as_deref()?;
        self.records.as_ref()?.iter().find(|r| r.id == id)
    }

    pub fn select_lesson(&mut self, lesson_id: Option<&str>) -> bool {
        match lesson_id {
            None => {
                self.selected_lesson = None;
                true
            }
            Some(id) => {
                let known = self
                    .records
                    .as_ref()
                    .map(|rs| rs.iter().any(|r| r.id == id))
                    .unwrap_or(false);
                if known {
                    self.selected_lesson = Some(id.to_string());
                }
                known
            }
        }
    }

    /// Records in the current language at the current grade.
    pub fn visible(&self) -> Vec<&LessonRecord> {
        let (Some(records), Some(grade)) = (self.records.as_ref(), self.selected_grade) else {
            return Vec::new();
        };
        records
            .iter()
            .filter(|r| r.language == self.language && r.grade == grade)
            .collect()
    }

    pub fn entries(&self) -> Vec<DirectoryEntry> {
        let access = if self.can_edit() {
            EntryAccess::Actionable
        } else {
            EntryAccess::Locked
        };
        self.visible()
            .into_iter()
            .map(|r| DirectoryEntry {
                id: r.id.clone(),
                primary_text: r.chapter.clone(),
                secondary_text: match access {
                    EntryAccess::Actionable => format!("Topic: {}", r.topic_title),
                    EntryAccess::Locked => "Locked or limited...".to_string(),
                },
                category_text: format!("Queue {}", r.chapter_queue),
                access,
                marked: self.marked.contains(&r.id),
            })
            .collect()
    }

    pub fn delete_mode(&self) -> bool {
        self.delete_mode
    }

    pub fn set_delete_mode(&mut self, enabled: bool) {
        self.delete_mode = enabled;
    }

    pub fn marked(&self) -> &BTreeSet<String> {
        &self.marked
    }

    /// Adds the id if absent, removes it if present. Returns whether it is now marked.
    pub fn toggle_mark(&mut self, lesson_id: &str) -> bool {
        if self.marked.remove(lesson_id) {
            false
        } else {
            self.marked.insert(lesson_id.to_string());
            true
        }
    }

    /// Deletes every marked id in one store call.
    ///
    /// On success the marks are cleared and the list is re-fetched afterwards; a
    /// failed re-fetch is logged and leaves the old records in place. On failure
    /// the marks are kept and no re-fetch is issued.
    pub fn commit_delete(&mut self, store: &dyn LessonStore) -> Result<usize, LessonError> {
        if self.marked.is_empty() {
            return Ok(0);
        }
        let deleted = match store.delete(&self.marked) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(marked = self.marked.len(), "batch delete failed: {e}");
                return Err(e);
            }
        };
        self.marked.clear();
        if let Err(e) = self.refresh(store) {
            tracing::error!("refresh after delete failed: {e}");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::sample_tree;
    use crate::gateway::LessonPayload;
    use std::cell::{Cell, RefCell};

    fn record(id: &str, language: &str, grade: u32) -> LessonRecord {
        LessonRecord {
            id: id.into(),
            language: language.into(),
            speciality: None,
            grade,
            chapter_queue: 1,
            chapter: format!("Chapter {id}"),
            topic_title: format!("Topic {id}"),
            topic_queue: 1,
            lesson_type: String::new(),
            lesson_objectives: String::new(),
            lesson_equipment: vec![],
            prior_knowledge: String::new(),
            lesson_start: String::new(),
            lesson_middle: String::new(),
            lesson_end: String::new(),
            video_links: vec![],
            presentation_links: vec![],
            link_for_doc: String::new(),
            additional_resources: vec![],
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    struct StubStore {
        records: RefCell<Vec<LessonRecord>>,
        fail_delete: bool,
        fail_list: Cell<bool>,
        list_calls: Cell<usize>,
        delete_calls: RefCell<Vec<BTreeSet<String>>>,
    }

    impl StubStore {
        fn new(records: Vec<LessonRecord>) -> Self {
            StubStore {
                records: RefCell::new(records),
                fail_delete: false,
                fail_list: Cell::new(false),
                list_calls: Cell::new(0),
                delete_calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl LessonStore for StubStore {
        fn create(&self, _payload: &LessonPayload) -> Result<String, LessonError> {
            unreachable!("directory never creates")
        }
        fn update(&self, _id: &str, _payload: &LessonPayload) -> Result<(), LessonError> {
            unreachable!("directory never updates")
        }
        fn delete(&self, ids: &BTreeSet<String>) -> Result<usize, LessonError> {
            self.delete_calls.borrow_mut().push(ids.clone());
            if self.fail_delete {
                return Err(LessonError::Store(rusqlite::Error::QueryReturnedNoRows));
            }
            let mut records = self.records.borrow_mut();
            let before = records.len();
            records.retain(|r| !ids.contains(&r.id));
            Ok(before - records.len())
        }
        fn list(&self) -> Result<Vec<LessonRecord>, LessonError> {
            self.list_calls.set(self.list_calls.get() + 1);
            if self.fail_list.get() {
                return Err(LessonError::Store(rusqlite::Error::QueryReturnedNoRows));
            }
            Ok(self.records.borrow().clone())
        }
        fn get(&self, id: &str) -> Result<Option<LessonRecord>, LessonError> {
            Ok(self.records.borrow().iter().find(|r| r.id == id).cloned())
        }
    }

    fn abc_store() -> StubStore {
        StubStore::new(vec![
            record("a", "us", 1),
            record("b", "us", 2),
            record("c", "ua", 1),
        ])
    }

    fn directory(role: Option<Role>) -> LessonDirectory {
        LessonDirectory::new(Arc::new(sample_tree()), "us", role)
    }

    #[test]
    fn visible_filters_by_language_and_grade() {
        let store = abc_store();
        let mut dir = directory(Some(Role::Admin));
        dir.refresh(&store).expect("refresh");
        assert!(dir.visible().is_empty());

        assert!(dir.select_speciality("Software Engineering"));
        assert!(dir.select_grade(Some(1)));
        let ids: Vec<&str> = dir.visible().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        assert!(dir.select_grade(Some(2)));
        let ids: Vec<&str> = dir.visible().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);

        dir.set_language("ua", &store).expect("language");
        assert_eq!(dir.selected_grade(), None);
        assert!(dir.select_speciality("Програмна інженерія"));
        assert!(dir.select_grade(Some(1)));
        let ids: Vec<&str> = dir.visible().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn nested_selection_resets_children() {
        let store = abc_store();
        let mut dir = directory(None);
        dir.refresh(&store).expect("refresh");
        assert!(dir.select_speciality("Software Engineering"));
        assert_eq!(dir.grades().len(), 2);
        assert!(dir.select_grade(Some(1)));
        assert!(dir.select_lesson(Some("a")));
        assert_eq!(dir.selected_lesson().map(|r| r.id.as_str()), Some("a"));

        assert!(dir.select_speciality("Robotics"));
        assert_eq!(dir.selected_grade(), None);
        assert!(dir.selected_lesson().is_none());

        assert!(!dir.select_speciality("Unknown"));
        assert_eq!(dir.selected_speciality().map(|s| s.name.as_str()), Some("Robotics"));
        assert!(!dir.select_lesson(Some("zzz")));
    }

    #[test]
    fn roles_only_change_rendering() {
        let store = abc_store();
        for (role, access) in [
            (Some(Role::Admin), EntryAccess::Actionable),
            (Some(Role::Teacher), EntryAccess::Locked),
            (Some(Role::Student), EntryAccess::Locked),
            (None, EntryAccess::Locked),
        ] {
            let mut dir = directory(role);
            dir.refresh(&store).expect("refresh");
            assert!(dir.select_speciality("Software Engineering"));
            assert!(dir.select_grade(Some(1)));
            let entries = dir.entries();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].access, access);
            assert_eq!(entries[0].primary_text, "Chapter a");
            assert_eq!(entries[0].category_text, "Queue 1");
        }
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }

    #[test]
    fn grade_must_belong_to_selected_speciality() {
        let store = abc_store();
        let mut dir = directory(Some(Role::Admin));
        dir.refresh(&store).expect("refresh");

        // No speciality yet: no grade is on offer.
        assert!(!dir.select_grade(Some(1)));
        assert_eq!(dir.selected_grade(), None);

        assert!(dir.select_speciality("Robotics"));
        assert!(!dir.select_grade(Some(1)));
        assert!(dir.select_grade(Some(3)));
        assert!(!dir.select_grade(Some(9)));
        assert_eq!(dir.selected_grade(), Some(3));

        assert!(dir.select_grade(None));
        assert_eq!(dir.selected_grade(), None);
        assert!(dir.select_grade(Some(0)));
    }

    #[test]
    fn toggle_mark_adds_then_removes() {
        let mut dir = directory(Some(Role::Admin));
        assert!(dir.toggle_mark("a"));
        assert!(dir.toggle_mark("b"));
        assert!(!dir.toggle_mark("a"));
        assert_eq!(dir.marked().iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn commit_delete_clears_marks_and_refetches() {
        let store = abc_store();
        let mut dir = directory(Some(Role::Admin));
        dir.refresh(&store).expect("refresh");
        dir.toggle_mark("a");
        dir.toggle_mark("b");

        assert_eq!(dir.commit_delete(&store).expect("delete"), 2);
        assert!(dir.marked().is_empty());
        assert_eq!(store.list_calls.get(), 2);
        assert_eq!(store.delete_calls.borrow().len(), 1);
        assert_eq!(dir.records().map(|r| r.len()), Some(1));
    }

    #[test]
    fn failed_commit_keeps_marks_and_skips_refetch() {
        let mut store = abc_store();
        store.fail_delete = true;
        let mut dir = directory(Some(Role::Admin));
        dir.refresh(&store).expect("refresh");
        dir.toggle_mark("a");
        dir.toggle_mark("b");

        let e = dir.commit_delete(&store).expect_err("delete fails");
        assert_eq!(e.code(), "store_failed");
        let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dir.marked(), &expected);
        assert_eq!(store.list_calls.get(), 1);
        assert_eq!(dir.records().map(|r| r.len()), Some(3));
    }

    #[test]
    fn failed_refetch_after_delete_keeps_old_records() {
        let store = abc_store();
        let mut dir = directory(Some(Role::Admin));
        dir.refresh(&store).expect("refresh");
        dir.toggle_mark("c");
        store.fail_list.set(true);

        assert_eq!(dir.commit_delete(&store).expect("delete"), 1);
        assert!(dir.marked().is_empty());
        assert_eq!(dir.records().map(|r| r.len()), Some(3));
    }

    #[test]
    fn empty_commit_is_a_noop() {
        let store = abc_store();
        let mut dir = directory(Some(Role::Admin));
        assert_eq!(dir.commit_delete(&store).expect("noop"), 0);
        assert!(store.delete_calls.borrow().is_empty());
        assert_eq!(store.list_calls.get(), 0);
    }
}
