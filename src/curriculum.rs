use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Curriculum document compiled into the binary, used when no path is configured.
const BUILTIN_CURRICULUM: &str = include_str!("../data/curriculum.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSlot {
    pub queue: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub grade_number: u32,
    #[serde(default)]
    pub lessons: Vec<LessonSlot>,
}

impl Grade {
    pub fn slot(&self, queue: u32) -> Option<&LessonSlot> {
        self.lessons.iter().find(|l| l.queue == queue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speciality {
    pub name: String,
    #[serde(default)]
    pub grades: Vec<Grade>,
}

impl Speciality {
    pub fn grade(&self, grade_number: u32) -> Option<&Grade> {
        self.grades.iter().find(|g| g.grade_number == grade_number)
    }

    pub fn lesson_count(&self) -> usize {
        self.grades.iter().map(|g| g.lessons.len()).sum()
    }
}

/// Language-partitioned {speciality -> grade -> lesson slot} hierarchy.
///
/// Read-only once loaded. Sequence order inside a language is the order of the
/// source document and is what the UI shows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumTree {
    #[serde(default)]
    specialities: BTreeMap<String, Vec<Speciality>>,
    #[serde(default)]
    lesson_types: BTreeMap<String, Vec<String>>,
}

impl CurriculumTree {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let tree: CurriculumTree =
            serde_json::from_str(raw).context("curriculum document is not valid JSON")?;
        tree.check()?;
        Ok(tree)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read curriculum {}", path.to_string_lossy()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to load curriculum {}", path.to_string_lossy()))
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_json_str(BUILTIN_CURRICULUM).context("built-in curriculum is invalid")
    }

    pub fn specialities_for(&self, language: &str) -> &[Speciality] {
        self.specialities
            .get(language)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn lesson_types_for(&self, language: &str) -> &[String] {
        self.lesson_types
            .get(language)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn speciality(&self, language: &str, name: &str) -> Option<&Speciality> {
        self.specialities_for(language)
            .iter()
            .find(|s| s.name == name)
    }

    /// Every language code either section of the document mentions.
    pub fn languages(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .specialities
            .keys()
            .chain(self.lesson_types.keys())
            .map(|k| k.as_str())
            .collect();
        set.into_iter().collect()
    }

    fn check(&self) -> anyhow::Result<()> {
        for (language, specialities) in &self.specialities {
            let mut names = HashSet::new();
            for spec in specialities {
                if spec.name.trim().is_empty() {
                    return Err(anyhow!("{}: speciality with empty name", language));
                }
                if !names.insert(spec.name.as_str()) {
                    return Err(anyhow!(
                        "{}: duplicate speciality {:?}",
                        language,
                        spec.name
                    ));
                }
                let mut grade_numbers = HashSet::new();
                for grade in &spec.grades {
                    if grade.grade_number == 0 {
                        return Err(anyhow!(
                            "{}/{}: gradeNumber must be positive",
                            language,
                            spec.name
                        ));
                    }
                    if !grade_numbers.insert(grade.grade_number) {
                        return Err(anyhow!(
                            "{}/{}: duplicate grade {}",
                            language,
                            spec.name,
                            grade.grade_number
                        ));
                    }
                    let mut queues = HashSet::new();
                    for slot in &grade.lessons {
                        if slot.queue == 0 {
                            return Err(anyhow!(
                                "{}/{}/grade {}: lesson queue must be positive",
                                language,
                                spec.name,
                                grade.grade_number
                            ));
                        }
                        if !queues.insert(slot.queue) {
                            return Err(anyhow!(
                                "{}/{}/grade {}: duplicate lesson queue {}",
                                language,
                                spec.name,
                                grade.grade_number,
                                slot.queue
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_tree() -> CurriculumTree {
    CurriculumTree::from_json_str(
        r#"{
            "specialities": {
                "us": [
                    { "name": "Software Engineering", "grades": [
                        { "gradeNumber": 1, "lessons": [
                            { "queue": 1, "title": "Intro" },
                            { "queue": 2, "title": "Loops" }
                        ] },
                        { "gradeNumber": 2, "lessons": [
                            { "queue": 1, "title": "Functions" }
                        ] }
                    ] },
                    { "name": "Robotics", "grades": [
                        { "gradeNumber": 3, "lessons": [
                            { "queue": 5, "title": "Sensors" }
                        ] }
                    ] }
                ],
                "ua": [
                    { "name": "Програмна інженерія", "grades": [
                        { "gradeNumber": 1, "lessons": [
                            { "queue": 1, "title": "Вступ" }
                        ] }
                    ] }
                ]
            },
            "lessonTypes": {
                "us": ["Lecture", "Lab"],
                "ua": ["Лекція"]
            }
        }"#,
    )
    .expect("sample curriculum")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_yields_empty_sequences() {
        let tree = sample_tree();
        for lang in ["fr", "", "US", "xx-yy"] {
            assert!(tree.specialities_for(lang).is_empty());
            assert!(tree.lesson_types_for(lang).is_empty());
        }
    }

    #[test]
    fn declaration_order_is_preserved() {
        let tree = sample_tree();
        let names: Vec<&str> = tree
            .specialities_for("us")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Software Engineering", "Robotics"]);

        let se = tree.speciality("us", "Software Engineering").expect("speciality");
        let grades: Vec<u32> = se.grades.iter().map(|g| g.grade_number).collect();
        assert_eq!(grades, vec![1, 2]);
        let titles: Vec<&str> = se.grades[0].lessons.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Loops"]);
        assert_eq!(
            tree.lesson_types_for("us").to_vec(),
            vec!["Lecture".to_string(), "Lab".to_string()]
        );
    }

    #[test]
    fn nested_lookups_return_none_when_absent() {
        let tree = sample_tree();
        assert!(tree.speciality("us", "Art").is_none());
        assert!(tree.speciality("ua", "Software Engineering").is_none());
        let se = tree.speciality("us", "Software Engineering").expect("speciality");
        assert!(se.grade(9).is_none());
        assert!(se.grade(1).and_then(|g| g.slot(99)).is_none());
        assert_eq!(
            se.grade(1).and_then(|g| g.slot(2)).map(|s| s.title.as_str()),
            Some("Loops")
        );
    }

    #[test]
    fn rejects_duplicate_and_zero_keys() {
        let dup_grade = r#"{"specialities":{"us":[{"name":"A","grades":[
            {"gradeNumber":1,"lessons":[]},{"gradeNumber":1,"lessons":[]}]}]}}"#;
        assert!(CurriculumTree::from_json_str(dup_grade).is_err());

        let zero_queue = r#"{"specialities":{"us":[{"name":"A","grades":[
            {"gradeNumber":1,"lessons":[{"queue":0,"title":"x"}]}]}]}}"#;
        assert!(CurriculumTree::from_json_str(zero_queue).is_err());

        let dup_name = r#"{"specialities":{"us":[{"name":"A","grades":[]},{"name":"A","grades":[]}]}}"#;
        assert!(CurriculumTree::from_json_str(dup_name).is_err());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let tree = CurriculumTree::from_json_str("{}").expect("empty document");
        assert!(tree.languages().is_empty());
        assert!(tree.specialities_for("us").is_empty());
    }

    #[test]
    fn builtin_document_loads() {
        let tree = CurriculumTree::builtin().expect("builtin");
        assert_eq!(tree.languages(), vec!["ua", "us"]);
        let se = tree.speciality("us", "Software Engineering").expect("speciality");
        assert_eq!(
            se.grade(1).and_then(|g| g.slot(1)).map(|s| s.title.as_str()),
            Some("Intro")
        );
    }
}
