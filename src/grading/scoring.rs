use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::band::GradeBand;
use super::extract::{extract_object, JsonObject};
use super::fields::{reconcile, Field};
use super::rubrics::RubricEntry;
use super::text::{preview, truncate_with_marker};
use crate::gateway::{ChatBackend, ChatMessage, ModelGateway};

/// Characters of the submission sent for scoring.
pub const SCORING_CHAR_LIMIT: usize = 2500;
pub const MAX_SCORE: f64 = 6.0;

const MALFORMED_COMMENT: &str = "The feedback returned for this answer was malformed.";

/// Keys a serialized grade result carries besides the scoring fields.
/// They are set by the grader, never taken from the model.
const RESULT_KEYS: &[&str] = &["category", "authenticity", "degraded", "rawresponse", "raw_response"];

/// Validated scoring answer. Every score is in `[0, MAX_SCORE]` and the
/// band is always legal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSheet {
    pub comment: String,
    pub content_score: f64,
    pub language_score: f64,
    pub organization_score: f64,
    pub grade_band: GradeBand,
    /// Band was recomputed from the scores rather than taken from the model.
    #[serde(skip)]
    pub band_inferred: bool,
    /// Some field had to be replaced by a default.
    #[serde(skip)]
    pub degraded: bool,
    #[serde(flatten)]
    pub extra: JsonObject,
}

// ── Prompt ──────────────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading student writing.

1. Dimensions, each scored from 0 to 6 (decimals allowed):
   - contentScore: depth, accuracy, relevance and completeness of the content.
   - languageScore: accuracy, fluency, range of vocabulary and expression.
   - organizationScore: soundness of structure, clarity of logic, paragraph cohesion.

2. The comment must read like a senior teacher: professional, constructive and specific to this answer. Avoid filler summaries and chatty or internet-style phrasing.

3. Respond with ONLY a JSON object containing every field below:
{"comment": "your comment", "contentScore": 0-6, "languageScore": 0-6, "organizationScore": 0-6, "gradeBand": "LEVEL 1 to LEVEL 5, or Unclassified"}
All scores must be numbers. gradeBand must be a string."#;

fn render(value: &Value) -> String {
    match value {
        Value::Null => "[]".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "[]".to_string()),
    }
}

pub fn build_messages(
    question: &str,
    submission: &str,
    category: &str,
    entry: &RubricEntry,
) -> Vec<ChatMessage> {
    let keywords = |list: &[String]| serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string());
    let user = format!(
        r#"Grade the student answer below.

Question: {question}
Student answer (may be truncated; judge the overall performance):
{answer}

Question type: "{category}"
Content criteria: {content}
Language criteria: {language}
Organization criteria: {organization}

Grade band logic (infer the most suitable band from the three scores you give):
{bands}

Common strengths (use where they genuinely apply):
{strengths}

Common weaknesses (point out where they genuinely apply):
{weaknesses}

Comment templates (for tone and structure only; do not copy placeholders):
{templates}

Special bands:
- Unclassified: normally only when all three scores are 0.
- LEVEL 5: all three scores at or near the full 6 points.

Return your grading strictly in the JSON format specified."#,
        question = question,
        answer = truncate_with_marker(submission, SCORING_CHAR_LIMIT),
        category = category,
        content = render(&entry.criteria.content),
        language = render(&entry.criteria.language),
        organization = render(&entry.criteria.organization),
        bands = render(&entry.grade_band_logic),
        strengths = keywords(entry.strength_keywords.as_slice()),
        weaknesses = keywords(entry.weakness_keywords.as_slice()),
        templates = render(&entry.comment_templates),
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

// ── Validation ──────────────────────────────────────────────────────────

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Coerce one score into range. Missing scores are 0; unparseable ones
/// are 0 and mark the sheet degraded.
fn score_field(field: Field, value: Option<&Value>, degraded: &mut bool) -> f64 {
    let Some(value) = value else {
        warn!("Score '{}' missing from response, using 0", field.canonical());
        return 0.0;
    };
    match coerce_number(value) {
        Some(score) if (0.0..=MAX_SCORE).contains(&score) => score,
        Some(score) => {
            let clamped = score.clamp(0.0, MAX_SCORE);
            warn!("Score '{}' = {} out of range, clamped to {}", field.canonical(), score, clamped);
            clamped
        }
        None => {
            warn!("Score '{}' = {} is not a number, using 0", field.canonical(), value);
            *degraded = true;
            0.0
        }
    }
}

/// Reconcile, coerce and clamp a parsed scoring object.
pub fn normalize(mut obj: JsonObject) -> ScoreSheet {
    obj.retain(|key, _| {
        let keep = !RESULT_KEYS.contains(&key.to_lowercase().as_str());
        if !keep {
            debug!("Dropping result key '{}' from scoring response", key);
        }
        keep
    });
    let reconciled = reconcile(obj);
    let mut degraded = false;

    let content_score = score_field(Field::ContentScore, reconciled.get(Field::ContentScore), &mut degraded);
    let language_score = score_field(Field::LanguageScore, reconciled.get(Field::LanguageScore), &mut degraded);
    let organization_score = score_field(
        Field::OrganizationScore,
        reconciled.get(Field::OrganizationScore),
        &mut degraded,
    );

    let comment = match reconciled.get(Field::Comment) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            warn!("Comment is not a string: {}", other);
            degraded = true;
            MALFORMED_COMMENT.to_string()
        }
        None => String::new(),
    };

    let claimed = reconciled
        .get(Field::GradeBand)
        .and_then(Value::as_str)
        .and_then(GradeBand::from_label);
    let (grade_band, band_inferred) = match claimed {
        Some(band) => {
            info!("Using grade band from response: {}", band);
            (band, false)
        }
        None => {
            let band = GradeBand::infer(content_score, language_score, organization_score);
            if let Some(raw) = reconciled.get(Field::GradeBand) {
                warn!("Grade band {} is not a legal band", raw);
            }
            info!(
                "Inferred grade band {} from scores ({}, {}, {})",
                band, content_score, language_score, organization_score
            );
            (band, true)
        }
    };

    if degraded {
        warn!("Scoring response had invalid fields; result may be inaccurate");
    }

    ScoreSheet {
        comment,
        content_score,
        language_score,
        organization_score,
        grade_band,
        band_inferred,
        degraded,
        extra: reconciled.extra,
    }
}

/// Extract and validate the model's scoring answer. `None` when no JSON
/// object can be recovered from the response.
pub fn parse_score_sheet(response: &str) -> Option<ScoreSheet> {
    match extract_object(response) {
        Some((obj, from)) => {
            info!("Scoring JSON parsed ({:?})", from);
            Some(normalize(obj))
        }
        None => {
            warn!("No JSON object in scoring response: {}", preview(response, 200));
            None
        }
    }
}

/// Ask the model to score a submission. On structural failure the raw
/// response text is returned for inspection.
pub async fn score<B: ChatBackend>(
    gateway: &ModelGateway<B>,
    temperature: f32,
    question: &str,
    submission: &str,
    category: &str,
    entry: &RubricEntry,
) -> Result<ScoreSheet, String> {
    let messages = build_messages(question, submission, category, entry);
    let reply = gateway.invoke(messages, temperature).await;
    let text = reply.text();
    info!("Scoring response: {}", preview(&text, 100));
    parse_score_sheet(&text).ok_or(text)
}
