//! Typed field accessors on [`SettingsStore`].
//!
//! Each setter dispatches a single transformation, so it goes through the
//! same notification and persistence path as a direct `dispatch`.

use crate::settings::{FieldValue, Language, SettingsPatch, Transformation, UserSettings};
use crate::store::SettingsStore;

impl SettingsStore {
    /// Project a value out of the current snapshot.
    pub fn select<T>(&self, f: impl FnOnce(&UserSettings) -> T) -> T {
        f(&self.snapshot())
    }

    pub fn language(&self) -> Language {
        self.select(|s| s.language)
    }

    pub fn set_language(&self, language: Language) -> UserSettings {
        self.dispatch(FieldValue::Language(language))
    }

    pub fn degree_id(&self) -> Option<String> {
        self.select(|s| s.degree_id.clone())
    }

    pub fn set_degree_id(&self, degree_id: Option<String>) -> UserSettings {
        self.dispatch(FieldValue::DegreeId(degree_id))
    }

    pub fn institution_id(&self) -> Option<String> {
        self.select(|s| s.institution_id.clone())
    }

    pub fn set_institution_id(&self, institution_id: Option<String>) -> UserSettings {
        self.dispatch(FieldValue::InstitutionId(institution_id))
    }

    pub fn degree_title(&self) -> Option<String> {
        self.select(|s| s.degree_title.clone())
    }

    pub fn set_degree_title(&self, degree_title: Option<String>) -> UserSettings {
        self.dispatch(FieldValue::DegreeTitle(degree_title))
    }

    pub fn font_family(&self) -> Option<String> {
        self.select(|s| s.font_family.clone())
    }

    pub fn set_font_family(&self, font_family: Option<String>) -> UserSettings {
        self.dispatch(FieldValue::FontFamily(font_family))
    }

    pub fn shuffle_questions(&self) -> bool {
        self.select(|s| s.shuffle_questions)
    }

    pub fn set_shuffle_questions(&self, shuffle_questions: bool) -> UserSettings {
        self.dispatch(FieldValue::ShuffleQuestions(shuffle_questions))
    }

    pub fn dev_mode(&self) -> bool {
        self.select(|s| s.dev_mode)
    }

    pub fn set_dev_mode(&self, dev_mode: bool) -> UserSettings {
        self.dispatch(FieldValue::DevMode(dev_mode))
    }

    /// Shallow-merge `patch` into the snapshot.
    pub fn update(&self, patch: SettingsPatch) -> UserSettings {
        self.dispatch(Transformation::Merge(patch))
    }

    /// Replace the whole snapshot.
    pub fn set_all(&self, settings: UserSettings) -> UserSettings {
        self.dispatch(Transformation::SetAll(settings))
    }

    /// Return to the default snapshot.
    pub fn reset(&self) -> UserSettings {
        self.dispatch(Transformation::Reset)
    }
}
