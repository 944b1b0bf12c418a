use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::extract::extract_object;
use super::text::{preview, truncate_with_marker};
use crate::gateway::{ChatBackend, ChatMessage, ModelGateway};

/// Characters of the submission sent for screening.
pub const SCREENING_CHAR_LIMIT: usize = 2000;

pub const PARSE_FAILURE_REASON: &str = "parse failure";
pub const DEFAULT_FEEDBACK: &str =
    "The authenticity check could not be completed. Keep writing in your own words and voice.";

/// Outcome of the authenticity screen for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticityVerdict {
    /// Machine-generated or nonsensical.
    pub is_flagged: bool,
    /// Flagged because it is incoherent rather than machine-generated.
    pub is_incoherent: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    pub feedback: String,
}

impl Default for AuthenticityVerdict {
    /// The verdict used whenever the model's answer cannot be trusted:
    /// treat the submission as genuine.
    fn default() -> Self {
        Self {
            is_flagged: false,
            is_incoherent: false,
            confidence: 0.0,
            reason: PARSE_FAILURE_REASON.to_string(),
            feedback: DEFAULT_FEEDBACK.to_string(),
        }
    }
}

/// Exact shape the model must return. Every field is required and typed;
/// serde rejects strings where booleans or numbers belong.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(rename = "isAiOrNonsense", alias = "is_ai_or_nonsense")]
    is_ai_or_nonsense: bool,
    #[serde(rename = "isNonsense", alias = "is_nonsense")]
    is_nonsense: bool,
    confidence: f64,
    reason: String,
    feedback: String,
}

const SYSTEM_PROMPT: &str = r#"You are an expert at judging whether a student's written work is AI-generated or nonsense. Be careful and avoid being overly strict.

Weigh several independent signals together. Never flag on a single signal.

1. Signs of AI-generated text (several must be present at once):
   - No grammatical slips or unnatural phrasing anywhere
   - Long passages that are uniformly polished and fluent
   - Vocabulary well beyond the expected student level
   - Exhaustive coverage with no concrete personal experience
   - Formulaic, template-like structure with no personal style

2. Signs of nonsense (several must be clearly present):
   - Structure is completely incoherent
   - Content is entirely unrelated to the task
   - Repeated logical contradictions
   - Long stretches of repeated or meaningless text
   - The writer's meaning cannot be understood at all

3. Signs of genuine student work (enough to judge the work genuine):
   - Personal views and real examples
   - Reasonable grammatical mistakes
   - A visible line of thought developing
   - Vocabulary that fits a student

Important: wrongly accusing a student is far worse than missing a case. When in doubt, judge the work genuine. A student who has adapted a model answer in their own words is not using AI.

Respond with ONLY a JSON object in exactly this format:
{"isAiOrNonsense": false, "isNonsense": false, "confidence": 0.85, "reason": "why", "feedback": "advice for the student"}

isAiOrNonsense and isNonsense must be booleans without quotes. confidence must be a number between 0 and 1 without quotes. reason and feedback must be strings."#;

pub fn build_messages(submission: &str) -> Vec<ChatMessage> {
    let user = format!(
        "Analyse the following student answer and return the JSON result:\n\n{}\n",
        truncate_with_marker(submission, SCREENING_CHAR_LIMIT)
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Validate the model's answer. Any missing field, wrong type, or
/// out-of-range confidence yields [`AuthenticityVerdict::default`].
pub fn parse_verdict(response: &str) -> AuthenticityVerdict {
    match validate(response) {
        Ok(verdict) => {
            info!(
                "Authenticity check: flagged={} incoherent={} confidence={:.2}",
                verdict.is_flagged, verdict.is_incoherent, verdict.confidence
            );
            verdict
        }
        Err(e) => {
            warn!(
                "Authenticity check unusable ({}), treating as genuine. Response: {}",
                e,
                preview(response, 200)
            );
            AuthenticityVerdict::default()
        }
    }
}

/// Screen a submission for machine-generated or incoherent content.
pub async fn screen<B: ChatBackend>(
    gateway: &ModelGateway<B>,
    temperature: f32,
    submission: &str,
) -> AuthenticityVerdict {
    let reply = gateway.invoke(build_messages(submission), temperature).await;
    parse_verdict(&reply.text())
}

fn validate(response: &str) -> Result<AuthenticityVerdict, String> {
    let (obj, _) = extract_object(response).ok_or_else(|| "no JSON object found".to_string())?;
    let raw: RawVerdict = serde_json::from_value(serde_json::Value::Object(obj))
        .map_err(|e| format!("invalid verdict shape: {}", e))?;

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(format!("confidence {} outside [0, 1]", raw.confidence));
    }

    Ok(AuthenticityVerdict {
        is_flagged: raw.is_ai_or_nonsense,
        is_incoherent: raw.is_nonsense,
        confidence: raw.confidence,
        reason: raw.reason,
        feedback: raw.feedback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_verdict_is_passed_through() {
        let response = r#"{"isAiOrNonsense": true, "isNonsense": false, "confidence": 0.9, "reason": "too polished", "feedback": "use your own words"}"#;
        let verdict = parse_verdict(response);
        assert!(verdict.is_flagged);
        assert!(!verdict.is_incoherent);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.reason, "too polished");
        assert_eq!(verdict.feedback, "use your own words");
    }

    #[test]
    fn snake_case_and_fences_are_accepted() {
        let response = "```json\n{\"is_ai_or_nonsense\": false, \"is_nonsense\": false, \"confidence\": 1, \"reason\": \"r\", \"feedback\": \"f\"}\n```";
        let verdict = parse_verdict(response);
        assert!(!verdict.is_flagged);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.reason, "r");
    }

    #[test]
    fn quoted_boolean_is_rejected() {
        let response = r#"{"isAiOrNonsense": "true", "isNonsense": false, "confidence": 0.9, "reason": "r", "feedback": "f"}"#;
        assert_eq!(parse_verdict(response), AuthenticityVerdict::default());
    }

    #[test]
    fn quoted_confidence_is_rejected() {
        let response = r#"{"isAiOrNonsense": true, "isNonsense": false, "confidence": "0.9", "reason": "r", "feedback": "f"}"#;
        assert_eq!(parse_verdict(response), AuthenticityVerdict::default());
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        for confidence in ["1.5", "-0.1"] {
            let response = format!(
                r#"{{"isAiOrNonsense": true, "isNonsense": true, "confidence": {}, "reason": "r", "feedback": "f"}}"#,
                confidence
            );
            assert_eq!(parse_verdict(&response), AuthenticityVerdict::default());
        }
    }

    #[test]
    fn missing_field_is_rejected() {
        let response = r#"{"isAiOrNonsense": true, "isNonsense": false, "confidence": 0.9, "reason": "r"}"#;
        assert_eq!(parse_verdict(response), AuthenticityVerdict::default());
    }

    #[test]
    fn garbage_and_failures_default_to_genuine() {
        for response in ["", "not json at all", "{\"isAiOrNonsense\": tru", "API call failed: timeout"] {
            let verdict = parse_verdict(response);
            assert!(!verdict.is_flagged);
            assert_eq!(verdict.confidence, 0.0);
            assert_eq!(verdict.reason, PARSE_FAILURE_REASON);
        }
    }

    #[test]
    fn long_submissions_are_truncated_for_screening() {
        let submission = "x".repeat(SCREENING_CHAR_LIMIT + 500);
        let messages = build_messages(&submission);
        let sent = &messages[1].content;
        assert!(sent.contains(&format!("{}...", "x".repeat(SCREENING_CHAR_LIMIT))));
        assert!(!sent.contains(&"x".repeat(SCREENING_CHAR_LIMIT + 1)));
    }
}
