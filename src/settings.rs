//! The settings snapshot and the transformations applied to it.
//!
//! Every transformation is a total function from one snapshot to the next.
//! Invalid values cannot be expressed, so nothing here can fail.

use serde::{Deserialize, Serialize};

/// Prefix shared by the tags of every settings transformation.
pub const SETTINGS_DOMAIN: &str = "userSettings/";

/// Supported interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English (default).
    #[default]
    En,
    /// Hebrew.
    He,
}

impl Language {
    /// Locale code as persisted.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::He => "he",
        }
    }
}

/// Complete user settings snapshot.
///
/// Records missing fields (written by older clients) deserialize with the
/// default value for each missing field, so a snapshot is always complete.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub language: Language,
    pub degree_id: Option<String>,
    pub institution_id: Option<String>,
    pub degree_title: Option<String>,
    pub font_family: Option<String>,
    pub shuffle_questions: bool,
    pub dev_mode: bool,
}

/// A single field assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Language(Language),
    DegreeId(Option<String>),
    InstitutionId(Option<String>),
    DegreeTitle(Option<String>),
    FontFamily(Option<String>),
    ShuffleQuestions(bool),
    DevMode(bool),
}

/// Partial settings update.
///
/// `None` leaves a field untouched. For nullable fields, `Some(None)`
/// clears the field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub degree_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub institution_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub degree_title: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub font_family: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle_questions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<bool>,
}

impl SettingsPatch {
    /// Patch that touches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn degree_id(mut self, degree_id: Option<String>) -> Self {
        self.degree_id = Some(degree_id);
        self
    }

    pub fn institution_id(mut self, institution_id: Option<String>) -> Self {
        self.institution_id = Some(institution_id);
        self
    }

    pub fn degree_title(mut self, degree_title: Option<String>) -> Self {
        self.degree_title = Some(degree_title);
        self
    }

    pub fn font_family(mut self, font_family: Option<String>) -> Self {
        self.font_family = Some(font_family);
        self
    }

    pub fn shuffle_questions(mut self, shuffle_questions: bool) -> Self {
        self.shuffle_questions = Some(shuffle_questions);
        self
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = Some(dev_mode);
        self
    }

    /// Returns true if the patch sets no field.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow-merge the provided fields over `base`.
    pub fn apply_to(&self, base: &UserSettings) -> UserSettings {
        let mut next = base.clone();
        if let Some(language) = self.language {
            next.language = language;
        }
        if let Some(degree_id) = &self.degree_id {
            next.degree_id = degree_id.clone();
        }
        if let Some(institution_id) = &self.institution_id {
            next.institution_id = institution_id.clone();
        }
        if let Some(degree_title) = &self.degree_title {
            next.degree_title = degree_title.clone();
        }
        if let Some(font_family) = &self.font_family {
            next.font_family = font_family.clone();
        }
        if let Some(shuffle_questions) = self.shuffle_questions {
            next.shuffle_questions = shuffle_questions;
        }
        if let Some(dev_mode) = self.dev_mode {
            next.dev_mode = dev_mode;
        }
        next
    }
}

/// Distinguishes an explicit `null` from an absent field.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// A named, pure update request applied by the settings store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformation {
    /// Replace the whole snapshot verbatim.
    SetAll(UserSettings),
    /// Replace one field.
    SetField(FieldValue),
    /// Shallow-merge the provided fields.
    Merge(SettingsPatch),
    /// Return to the compiled-in default snapshot.
    Reset,
}

impl Transformation {
    /// Identifying tag, namespaced under [`SETTINGS_DOMAIN`].
    pub fn tag(&self) -> &'static str {
        match self {
            Transformation::SetAll(_) => "userSettings/setUserSettings",
            Transformation::SetField(field) => match field {
                FieldValue::Language(_) => "userSettings/setLanguage",
                FieldValue::DegreeId(_) => "userSettings/setDegreeId",
                FieldValue::InstitutionId(_) => "userSettings/setInstitutionId",
                FieldValue::DegreeTitle(_) => "userSettings/setDegreeTitle",
                FieldValue::FontFamily(_) => "userSettings/setFontFamily",
                FieldValue::ShuffleQuestions(_) => "userSettings/setShuffleQuestions",
                FieldValue::DevMode(_) => "userSettings/setDevMode",
            },
            Transformation::Merge(_) => "userSettings/updateUserSettings",
            Transformation::Reset => "userSettings/resetUserSettings",
        }
    }

    /// Produce the next snapshot from `current`.
    pub fn apply(&self, current: &UserSettings) -> UserSettings {
        match self {
            Transformation::SetAll(snapshot) => snapshot.clone(),
            Transformation::SetField(field) => {
                let mut next = current.clone();
                match field {
                    FieldValue::Language(v) => next.language = *v,
                    FieldValue::DegreeId(v) => next.degree_id = v.clone(),
                    FieldValue::InstitutionId(v) => next.institution_id = v.clone(),
                    FieldValue::DegreeTitle(v) => next.degree_title = v.clone(),
                    FieldValue::FontFamily(v) => next.font_family = v.clone(),
                    FieldValue::ShuffleQuestions(v) => next.shuffle_questions = *v,
                    FieldValue::DevMode(v) => next.dev_mode = *v,
                }
                next
            }
            Transformation::Merge(patch) => patch.apply_to(current),
            Transformation::Reset => UserSettings::default(),
        }
    }
}

impl From<FieldValue> for Transformation {
    fn from(field: FieldValue) -> Self {
        Transformation::SetField(field)
    }
}

impl From<SettingsPatch> for Transformation {
    fn from(patch: SettingsPatch) -> Self {
        Transformation::Merge(patch)
    }
}
