use crate::curriculum::{CurriculumTree, Grade, LessonSlot, Speciality};
use crate::error::LessonError;
use crate::gateway::{encode_string_array, LessonPayload, LessonRecord, LessonStore};
use serde::Serialize;
use std::sync::Arc;

/// Draft in the shape the form edits it (UI names, arrays unserialized).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDraft {
    pub language: String,
    pub speciality_name: String,
    pub grade_number: Option<u32>,
    pub lesson_queue: Option<u32>,
    pub lesson_title: String,

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
}

/// One editable metadata field. Selection fields are not settable this way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataField {
    TopicTitle(String),
    TopicQueue(u32),
    LessonType(String),
    LessonObjectives(String),
    LessonEquipment(Vec<String>),
    PriorKnowledge(String),
    LessonStart(String),
    LessonMiddle(String),
    LessonEnd(String),
    VideoLinks(Vec<String>),
    PresentationLinks(Vec<String>),
    LinkForDoc(String),
    AdditionalResources(Vec<String>),
}

/// How far down the selection chain the draft has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormStage {
    Speciality,
    Grade,
    LessonSlot,
    Metadata,
}

/// Lesson page as the preview shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPreview {
    pub language: String,
    pub speciality: String,
    pub grade: Option<u32>,
    pub chapter_queue: Option<u32>,
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
}

pub struct LessonForm {
    curriculum: Arc<CurriculumTree>,
    draft: LessonDraft,
    editing: Option<String>,
}

impl LessonForm {
    pub fn new(curriculum: Arc<CurriculumTree>, language: &str) -> Self {
        LessonForm {
            curriculum,
            draft: LessonDraft {
                language: language.to_string(),
                ..LessonDraft::default()
            },
            editing: None,
        }
    }

    /// Form pre-filled from a persisted record; submitting it updates that record.
    pub fn for_record(curriculum: Arc<CurriculumTree>, record: &LessonRecord) -> Self {
        let draft = LessonDraft {
            language: record.language.clone(),
            speciality_name: record.speciality.clone().unwrap_or_default(),
            grade_number: non_zero(record.grade),
            lesson_queue: non_zero(record.chapter_queue),
            lesson_title: record.chapter.clone(),
            topic_title: record.topic_title.clone(),
            topic_queue: record.topic_queue,
            lesson_type: record.lesson_type.clone(),
            lesson_objectives: record.lesson_objectives.clone(),
            lesson_equipment: record.lesson_equipment.clone(),
            prior_knowledge: record.prior_knowledge.clone(),
            lesson_start: record.lesson_start.clone(),
            lesson_middle: record.lesson_middle.clone(),
            lesson_end: record.lesson_end.clone(),
            video_links: record.video_links.clone(),
            presentation_links: record.presentation_links.clone(),
            link_for_doc: record.link_for_doc.clone(),
            additional_resources: record.additional_resources.clone(),
        };
        LessonForm {
            curriculum,
            draft,
            editing: Some(record.id.clone()),
        }
    }

    pub fn draft(&self) -> &LessonDraft {
        &self.draft
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn select_language(&mut self, language: &str) {
        // Downstream options are keyed by language; metadata is kept.
        self.draft.language = language.to_string();
        self.draft.speciality_name.clear();
        self.draft.grade_number = None;
        self.draft.lesson_queue = None;
        self.draft.lesson_title.clear();
    }

    /// Grade and lesson stay as they were, even if the new speciality lacks them.
    pub fn select_speciality(&mut self, name: &str) {
        self.draft.speciality_name = name.to_string();
    }

    pub fn select_grade(&mut self, grade_number: u32) {
        self.draft.grade_number = non_zero(grade_number);
    }

    /// Returns whether a slot matched; the title is only copied on a match.
    pub fn select_lesson_slot(&mut self, queue: u32) -> bool {
        self.draft.lesson_queue = non_zero(queue);
        let title = self.current_grade().and_then(|g| g.slot(queue)).map(|s| s.title.clone());
        match title {
            Some(title) => {
                self.draft.lesson_title = title;
                true
            }
            None => false,
        }
    }

    pub fn set_metadata(&mut self, field: MetadataField) {
        let d = &mut self.draft;
        match field {
            MetadataField::TopicTitle(v) => d.topic_title = v,
            MetadataField::TopicQueue(v) => d.topic_queue = v,
            MetadataField::LessonType(v) => d.lesson_type = v,
            MetadataField::LessonObjectives(v) => d.lesson_objectives = v,
            MetadataField::LessonEquipment(v) => d.lesson_equipment = v,
            MetadataField::PriorKnowledge(v) => d.prior_knowledge = v,
            MetadataField::LessonStart(v) => d.lesson_start = v,
            MetadataField::LessonMiddle(v) => d.lesson_middle = v,
            MetadataField::LessonEnd(v) => d.lesson_end = v,
            MetadataField::VideoLinks(v) => d.video_links = v,
            MetadataField::PresentationLinks(v) => d.presentation_links = v,
            MetadataField::LinkForDoc(v) => d.link_for_doc = v,
            MetadataField::AdditionalResources(v) => d.additional_resources = v,
        }
    }

    pub fn available_specialities(&self) -> &[Speciality] {
        self.curriculum.specialities_for(&self.draft.language)
    }

    pub fn available_grades(&self) -> &[Grade] {
        self.current_speciality()
            .map(|s| s.grades.as_slice())
            .unwrap_or(&[])
    }

    pub fn available_lesson_slots(&self) -> &[LessonSlot] {
        self.current_grade()
            .map(|g| g.lessons.as_slice())
            .unwrap_or(&[])
    }

    pub fn lesson_types(&self) -> &[String] {
        self.curriculum.lesson_types_for(&self.draft.language)
    }

    pub fn stage(&self) -> FormStage {
        let d = &self.draft;
        if d.speciality_name.is_empty() {
            FormStage::Speciality
        } else if d.grade_number.is_none() {
            FormStage::Grade
        } else if d.lesson_queue.is_none() {
            FormStage::LessonSlot
        } else {
            FormStage::Metadata
        }
    }

    pub fn validate_required(&self) -> Result<(), LessonError> {
        let d = &self.draft;
        let mut missing = Vec::new();
        if d.speciality_name.is_empty() {
            missing.push("specialityName");
        }
        if d.grade_number.is_none() {
            missing.push("gradeNumber");
        }
        if d.lesson_queue.is_none() {
            missing.push("lessonQueue");
        }
        if d.lesson_title.is_empty() {
            missing.push("lessonTitle");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LessonError::Validation(missing))
        }
    }

    pub fn to_persistence_payload(&self) -> LessonPayload {
        let d = &self.draft;
        LessonPayload {
            language: d.language.clone(),
            speciality: Some(d.speciality_name.clone()).filter(|s| !s.is_empty()),
            grade: d.grade_number.unwrap_or(0),
            chapter_queue: d.lesson_queue.unwrap_or(0),
            chapter: d.lesson_title.clone(),
            topic_title: d.topic_title.clone(),
            topic_queue: d.topic_queue,
            lesson_type: d.lesson_type.clone(),
            lesson_objectives: d.lesson_objectives.clone(),
            lesson_equipment: encode_string_array(&d.lesson_equipment),
            prior_knowledge: d.prior_knowledge.clone(),
            lesson_start: d.lesson_start.clone(),
            lesson_middle: d.lesson_middle.clone(),
            lesson_end: d.lesson_end.clone(),
            video_links: encode_string_array(&d.video_links),
            presentation_links: encode_string_array(&d.presentation_links),
            link_for_doc: d.link_for_doc.clone(),
            additional_resources: encode_string_array(&d.additional_resources),
        }
    }

    pub fn preview(&self) -> LessonPreview {
        let d = self.draft.clone();
        LessonPreview {
            language: d.language,
            speciality: d.speciality_name,
            grade: d.grade_number,
            chapter_queue: d.lesson_queue,
            chapter: d.lesson_title,
            topic_title: d.topic_title,
            topic_queue: d.topic_queue,
            lesson_type: d.lesson_type,
            lesson_objectives: d.lesson_objectives,
            lesson_equipment: d.lesson_equipment,
            prior_knowledge: d.prior_knowledge,
            lesson_start: d.lesson_start,
            lesson_middle: d.lesson_middle,
            lesson_end: d.lesson_end,
            video_links: d.video_links,
            presentation_links: d.presentation_links,
            link_for_doc: d.link_for_doc,
            additional_resources: d.additional_resources,
        }
    }

    /// Validates, then creates or updates through the store. Returns the lesson id.
    ///
    /// The draft is left untouched on any failure so the caller can retry.
    pub fn submit(&self, store: &dyn LessonStore) -> Result<String, LessonError> {
        self.validate_required()?;
        let payload = self.to_persistence_payload();
        match self.editing.as_deref() {
            Some(id) => {
                store.update(id, &payload)?;
                Ok(id.to_string())
            }
            None => store.create(&payload),
        }
    }

    fn current_speciality(&self) -> Option<&Speciality> {
        self.curriculum
            .speciality(&self.draft.language, &self.draft.speciality_name)
    }

    fn current_grade(&self) -> Option<&Grade> {
        let grade_number = self.draft.grade_number?;
        self.current_speciality()?.grade(grade_number)
    }
}

fn non_zero(v: u32) -> Option<u32> {
    (v != 0).then_some(v)
}
