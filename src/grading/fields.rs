use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::extract::JsonObject;

/// Logical fields of a scoring answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Comment,
    ContentScore,
    LanguageScore,
    OrganizationScore,
    GradeBand,
}

impl Field {
    pub fn canonical(self) -> &'static str {
        FIELD_ALIASES
            .iter()
            .find(|(field, _, _)| *field == self)
            .map(|(_, canonical, _)| *canonical)
            .unwrap_or("")
    }
}

/// Accepted spellings per field, matched case-insensitively. Earlier
/// spellings take precedence when a response carries more than one.
pub const FIELD_ALIASES: &[(Field, &str, &[&str])] = &[
    (Field::Comment, "comment", &["comment", "comments", "评语"]),
    (
        Field::ContentScore,
        "contentScore",
        &["contentscore", "content_score", "content", "内容分数"],
    ),
    (
        Field::LanguageScore,
        "languageScore",
        &["languagescore", "language_score", "language", "语言分数"],
    ),
    (
        Field::OrganizationScore,
        "organizationScore",
        &[
            "organizationscore",
            "organization_score",
            "organisationscore",
            "organisation_score",
            "organization",
            "组织分数",
        ],
    ),
    (
        Field::GradeBand,
        "gradeBand",
        &["gradeband", "grade_band", "level", "grade", "等级"],
    ),
];

/// Look up the field a raw key names, with its precedence rank.
pub fn lookup(key: &str) -> Option<(Field, usize)> {
    let key = key.trim().to_lowercase();
    FIELD_ALIASES.iter().find_map(|(field, _, spellings)| {
        spellings
            .iter()
            .position(|s| *s == key)
            .map(|rank| (*field, rank))
    })
}

/// A model object split into recognised fields and pass-through keys.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub fields: HashMap<Field, Value>,
    pub extra: JsonObject,
}

impl Reconciled {
    pub fn get(&self, field: Field) -> Option<&Value> {
        self.fields.get(&field)
    }
}

/// Map every key of `obj` onto its canonical field. Unrecognised keys are
/// kept verbatim in `extra`.
pub fn reconcile(obj: JsonObject) -> Reconciled {
    let mut ranked: HashMap<Field, (usize, Value)> = HashMap::new();
    let mut extra = JsonObject::new();

    for (key, value) in obj {
        match lookup(&key) {
            Some((field, rank)) => match ranked.get(&field) {
                Some((held, _)) if *held <= rank => {
                    debug!("Ignoring '{}': {} already supplied", key, field.canonical());
                }
                _ => {
                    ranked.insert(field, (rank, value));
                }
            },
            None => {
                extra.insert(key, value);
            }
        }
    }

    Reconciled {
        fields: ranked.into_iter().map(|(f, (_, v))| (f, v)).collect(),
        extra,
    }
}
