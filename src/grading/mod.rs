pub mod band;
pub mod classifier;
pub mod extract;
pub mod fields;
pub mod rubrics;
pub mod scoring;
pub mod screener;
pub mod text;

use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::{ChatBackend, ModelGateway};
use band::GradeBand;
use classifier::{match_known, UNKNOWN_CATEGORY};
use extract::JsonObject;
use rubrics::RubricLibrary;
use scoring::ScoreSheet;
use screener::AuthenticityVerdict;

/// A flagged verdict at or above this confidence skips scoring entirely.
pub const FLAG_CONFIDENCE_THRESHOLD: f64 = 0.85;

const AI_GENERATED_ADVICE: &str = "1. Please try to write this yourself so you can practise the techniques and sentence patterns from class. You may study a model answer, but never copy AI-generated text.\n\
     2. No content comment given. Your work cannot be graded as it appears to be largely AI-generated.";

const INCOHERENT_ADVICE: &str = "1. Read the task requirements carefully first and make sure you understand what the question is asking. Outline your ideas, then express them in your own words.\n\
     2. No content comment given. Your work cannot be graded due to its nature.";

const SCORING_FAILED_COMMENT: &str = "Scoring failed: the model's response could not be parsed.";

// ── Result ──────────────────────────────────────────────────────────────

/// Final, immutable outcome of one grading call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub content_score: f64,
    pub language_score: f64,
    pub organization_score: f64,
    pub grade_band: GradeBand,
    pub comment: String,
    pub category: String,
    pub authenticity: AuthenticityVerdict,
    /// Some part of the result was filled in by a fallback.
    pub degraded: bool,
    /// Verbatim model output when the scoring answer could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Keys from the scoring answer that matched no known field, written
    /// alongside the known ones.
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl GradeResult {
    fn from_sheet(sheet: ScoreSheet, category: String, authenticity: AuthenticityVerdict) -> Self {
        Self {
            content_score: sheet.content_score,
            language_score: sheet.language_score,
            organization_score: sheet.organization_score,
            grade_band: sheet.grade_band,
            comment: sheet.comment,
            category,
            authenticity,
            degraded: sheet.degraded,
            raw_response: None,
            extra: sheet.extra,
        }
    }

    fn zeroed(comment: String, category: String, authenticity: AuthenticityVerdict, degraded: bool) -> Self {
        Self {
            content_score: 0.0,
            language_score: 0.0,
            organization_score: 0.0,
            grade_band: GradeBand::Unclassified,
            comment,
            category,
            authenticity,
            degraded,
            raw_response: None,
            extra: JsonObject::new(),
        }
    }
}

fn short_circuit_comment(verdict: &AuthenticityVerdict) -> String {
    let advice = if verdict.is_incoherent {
        INCOHERENT_ADVICE
    } else {
        AI_GENERATED_ADVICE
    };
    format!("AI Detection: {}\n{}", verdict.reason, advice)
}

// ── Grader ──────────────────────────────────────────────────────────────

/// Sequences screening, classification and scoring for one submission at
/// a time. The rubric library is read-only; nothing else is shared between
/// calls.
pub struct Grader<B> {
    gateway: ModelGateway<B>,
    library: RubricLibrary,
    temperature: f32,
}

impl<B: ChatBackend> Grader<B> {
    pub fn new(gateway: ModelGateway<B>, library: RubricLibrary, temperature: f32) -> Self {
        Self {
            gateway,
            library,
            temperature,
        }
    }

    pub fn library(&self) -> &RubricLibrary {
        &self.library
    }

    pub fn gateway(&self) -> &ModelGateway<B> {
        &self.gateway
    }

    /// Map a question to one known category (or `"unknown"`).
    pub async fn classify_category(&self, question: &str) -> String {
        classifier::classify(&self.gateway, self.temperature, question, &self.library).await
    }

    pub async fn check_authenticity(&self, submission: &str) -> AuthenticityVerdict {
        screener::screen(&self.gateway, self.temperature, submission).await
    }

    /// Grade one submission. Always returns a complete result.
    pub async fn grade_submission(
        &self,
        question: &str,
        submission: &str,
        category: Option<&str>,
    ) -> GradeResult {
        info!("Grading answer to \"{}\"", text::preview(question, 50));

        let verdict = self.check_authenticity(submission).await;

        if verdict.is_flagged && verdict.confidence >= FLAG_CONFIDENCE_THRESHOLD {
            let category = self.resolve_category(question, category).await;
            info!(
                "Submission flagged as {} (confidence {:.2}), skipping scoring",
                if verdict.is_incoherent { "incoherent" } else { "AI-generated" },
                verdict.confidence
            );
            return GradeResult::zeroed(short_circuit_comment(&verdict), category, verdict, false);
        }

        let category = self.resolve_category(question, category).await;
        info!("Scoring as category: {}", category);

        let Some(entry) = self.library.get(&category) else {
            warn!("No rubric found for category '{}'", category);
            let comment = format!(
                "Cannot grade a question of type '{}': no rubric is configured for it.",
                category
            );
            return GradeResult::zeroed(comment, category, verdict, true);
        };

        match scoring::score(&self.gateway, self.temperature, question, submission, &category, entry).await {
            Ok(sheet) => GradeResult::from_sheet(sheet, category, verdict),
            Err(raw) => {
                let mut result =
                    GradeResult::zeroed(SCORING_FAILED_COMMENT.to_string(), category, verdict, true);
                result.raw_response = Some(raw);
                result
            }
        }
    }

    /// Use the caller's category when given (normalised against the
    /// library), otherwise ask the model.
    async fn resolve_category(&self, question: &str, requested: Option<&str>) -> String {
        match requested {
            Some(name) => match_known(name, &self.library).unwrap_or_else(|| {
                warn!("Requested category '{}' is not configured", name);
                UNKNOWN_CATEGORY.to_string()
            }),
            None => self.classify_category(question).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedBackend;
    use crate::gateway::{GatewayError, RetryPolicy, FAILURE_PREFIX};
    use rubrics::sample_library;
    use std::time::Duration;

    const GENUINE: &str = r#"{"isAiOrNonsense": false, "isNonsense": false, "confidence": 0.1, "reason": "personal voice", "feedback": "keep going"}"#;
    const AI_FLAG: &str = r#"{"isAiOrNonsense": true, "isNonsense": false, "confidence": 0.92, "reason": "uniformly polished", "feedback": "write it yourself"}"#;
    const NONSENSE_FLAG: &str = r#"{"isAiOrNonsense": true, "isNonsense": true, "confidence": 0.95, "reason": "random characters", "feedback": "answer the question"}"#;
    const WEAK_FLAG: &str = r#"{"isAiOrNonsense": true, "isNonsense": false, "confidence": 0.84, "reason": "maybe", "feedback": "f"}"#;

    fn grader(backend: ScriptedBackend) -> Grader<ScriptedBackend> {
        grader_with(backend, sample_library())
    }

    fn grader_with(backend: ScriptedBackend, library: RubricLibrary) -> Grader<ScriptedBackend> {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };
        Grader::new(ModelGateway::new(backend, policy), library, 0.2)
    }

    fn assert_zeroed(result: &GradeResult) {
        assert_eq!(result.content_score, 0.0);
        assert_eq!(result.language_score, 0.0);
        assert_eq!(result.organization_score, 0.0);
        assert_eq!(result.grade_band, GradeBand::Unclassified);
    }

    #[tokio::test]
    async fn confident_ai_flag_skips_scoring() {
        let g = grader(ScriptedBackend::texts(&[
            AI_FLAG,
            r#"{"category": "speech"}"#,
            r#"{"contentScore": 6, "languageScore": 6, "organizationScore": 6}"#,
        ]));
        let result = g.grade_submission("Give a speech at assembly.", "Ladies and gentlemen...", None).await;

        assert_zeroed(&result);
        assert_eq!(g.gateway().backend().calls(), 2);
        assert!(g.gateway().backend().prompt_text(1).contains("Identify the type"));
        assert_eq!(result.category, "speech");
        assert!(result.comment.starts_with("AI Detection: uniformly polished"));
        assert!(result.comment.contains("largely AI-generated"));
        assert!(result.authenticity.is_flagged);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn confident_flag_with_given_category_makes_one_call() {
        let g = grader(ScriptedBackend::texts(&[NONSENSE_FLAG, "unused", "unused"]));
        let result = g.grade_submission("Write a speech.", "asdf qwer zxcv", Some("speech")).await;

        assert_zeroed(&result);
        assert_eq!(g.gateway().backend().calls(), 1);
        assert_eq!(result.category, "speech");
        assert!(result.comment.contains("cannot be graded due to its nature"));
        assert!(result.authenticity.is_incoherent);
    }

    #[tokio::test]
    async fn flag_below_threshold_is_scored() {
        let g = grader(ScriptedBackend::texts(&[
            WEAK_FLAG,
            r#"{"comment": "Fine.", "contentScore": 3, "languageScore": 3, "organizationScore": 3}"#,
        ]));
        let result = g.grade_submission("Write a speech.", "Dear classmates...", Some("speech")).await;

        assert_eq!(g.gateway().backend().calls(), 2);
        assert_eq!(result.content_score, 3.0);
        assert_eq!(result.grade_band, GradeBand::Level3);
        assert_eq!(result.authenticity.confidence, 0.84);
    }

    #[tokio::test]
    async fn application_letter_end_to_end() {
        let submission = "z".repeat(3000);
        let g = grader(ScriptedBackend::texts(&[
            GENUINE,
            "```json\n{\"comment\": \"Clear purpose, formal tone.\", \"contentScore\": 4, \"languageScore\": 5, \"organizationScore\": 4}\n```",
        ]));
        let result = g
            .grade_submission("Apply for the library assistant post.", &submission, Some("application letter"))
            .await;

        assert_eq!(g.gateway().backend().calls(), 2);
        assert_eq!(result.content_score, 4.0);
        assert_eq!(result.language_score, 5.0);
        assert_eq!(result.organization_score, 4.0);
        // Every dimension is at least 4.0, so the conjunctive rule gives LEVEL 4.
        assert_eq!(result.grade_band, GradeBand::Level4);
        assert_eq!(result.category, "application letter");
        assert_eq!(result.comment, "Clear purpose, formal tone.");
        assert!(!result.degraded);

        let scoring_prompt = g.gateway().backend().prompt_text(1);
        assert!(scoring_prompt.contains(&format!("{}...", "z".repeat(2500))));
        assert!(!scoring_prompt.contains(&"z".repeat(2501)));
        let screening_prompt = g.gateway().backend().prompt_text(0);
        assert!(screening_prompt.contains(&format!("{}...", "z".repeat(2000))));
        assert!(!screening_prompt.contains(&"z".repeat(2001)));
    }

    #[tokio::test]
    async fn classification_runs_when_category_not_given() {
        let g = grader(ScriptedBackend::texts(&[
            GENUINE,
            "This looks like an Argumentative Essay to me.",
            r#"{"contentScore": 5, "languageScore": 2, "organizationScore": 4, "gradeBand": "LEVEL 3"}"#,
        ]));
        let result = g.grade_submission("Should homework be banned?", "I believe...", None).await;

        assert_eq!(g.gateway().backend().calls(), 3);
        assert_eq!(result.category, "argumentative essay");
        assert_eq!(result.grade_band, GradeBand::Level3);
        assert!(g.gateway().backend().prompt_text(2).contains("Clear thesis"));
    }

    #[tokio::test]
    async fn unparseable_scoring_keeps_raw_response() {
        let g = grader(ScriptedBackend::texts(&[GENUINE, "What a lovely essay! I'd give it full marks."]));
        let result = g.grade_submission("Tell a story.", "Once upon a time", Some("narrative essay")).await;

        assert_zeroed(&result);
        assert!(result.degraded);
        assert_eq!(result.comment, SCORING_FAILED_COMMENT);
        assert_eq!(
            result.raw_response.as_deref(),
            Some("What a lovely essay! I'd give it full marks.")
        );
    }

    #[tokio::test]
    async fn total_transport_failure_still_yields_result() {
        let backend = ScriptedBackend::new(vec![
            Err(GatewayError::MissingApiKey),
            Err(GatewayError::MissingApiKey),
            Err(GatewayError::MissingApiKey),
        ]);
        let g = grader(backend);
        let result = g.grade_submission("Write something.", "Some text.", None).await;

        assert_zeroed(&result);
        assert_eq!(result.authenticity, AuthenticityVerdict::default());
        assert_eq!(result.category, "application letter");
        assert!(result.raw_response.unwrap().starts_with(FAILURE_PREFIX));
        assert_eq!(g.gateway().backend().calls(), 3);
    }

    #[tokio::test]
    async fn category_without_rubric_is_not_scored() {
        let mut library = sample_library();
        library.categories.push("poem".to_string());
        let g = grader_with(ScriptedBackend::texts(&[GENUINE, "unused"]), library);
        let result = g.grade_submission("Write a poem.", "Roses are red", Some("Poem")).await;

        assert_zeroed(&result);
        assert_eq!(result.category, "poem");
        assert!(result.degraded);
        assert!(result.comment.contains("no rubric"));
        assert_eq!(g.gateway().backend().calls(), 1);
    }

    #[tokio::test]
    async fn unconfigured_requested_category_is_unknown() {
        let g = grader(ScriptedBackend::texts(&[GENUINE, "unused"]));
        let result = g.grade_submission("Write a haiku.", "Autumn moonlight", Some("haiku")).await;

        assert_eq!(result.category, UNKNOWN_CATEGORY);
        assert_zeroed(&result);
        assert_eq!(g.gateway().backend().calls(), 1);
    }

    #[tokio::test]
    async fn result_serializes_with_camel_case_keys() {
        let g = grader(ScriptedBackend::texts(&[
            GENUINE,
            r#"{"comment": "ok", "contentScore": 2, "languageScore": 2, "organizationScore": 2, "rubricVersion": "v2"}"#,
        ]));
        let result = g.grade_submission("Write a speech.", "Hello all", Some("speech")).await;
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["gradeBand"], "LEVEL 2");
        assert_eq!(json["contentScore"], 2.0);
        assert_eq!(json["authenticity"]["isFlagged"], false);
        assert_eq!(json["rubricVersion"], "v2");
        assert!(json.get("extra").is_none());
        assert!(json.get("rawResponse").is_none());
    }

    #[tokio::test]
    async fn serialized_result_fed_back_as_scoring_answer_is_unchanged() {
        let g = grader(ScriptedBackend::texts(&[
            GENUINE,
            r#"{"comment": "Good.", "contentScore": 5, "languageScore": "4.5", "organizationScore": 3, "note": "x"}"#,
        ]));
        let first = g.grade_submission("Write a speech.", "Friends...", Some("speech")).await;
        let reply = serde_json::to_string(&first).unwrap();

        let g = grader(ScriptedBackend::texts(&[GENUINE, reply.as_str()]));
        let second = g.grade_submission("Write a speech.", "Friends...", Some("speech")).await;

        assert_eq!(second, first);
        assert_eq!(second.extra.len(), 1);
        assert_eq!(second.extra["note"], "x");
        assert_eq!(serde_json::to_value(&second).unwrap(), serde_json::to_value(&first).unwrap());
    }
}
