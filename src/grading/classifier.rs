use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};

use super::extract::extract_object;
use super::rubrics::RubricLibrary;
use super::text::preview;
use crate::gateway::{ChatBackend, ChatMessage, ModelGateway};

/// Returned when the library has no categories to choose from.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Keys the model may use for its answer, in precedence order.
const CATEGORY_KEYS: &[&str] = &["category", "question_type", "questionType", "题目类型"];

// ── Script normalisation ────────────────────────────────────────────────

/// Traditional glyphs the model tends to answer with, mapped to the
/// simplified forms category names are configured in.
const VARIANT_GLYPHS: &[(char, char)] = &[
    ('題', '题'), ('類', '类'), ('創', '创'), ('寫', '写'), ('應', '应'),
    ('報', '报'), ('聞', '闻'), ('講', '讲'), ('評', '评'), ('論', '论'),
    ('記', '记'), ('敘', '叙'), ('說', '说'), ('書', '书'), ('議', '议'),
    ('讀', '读'), ('後', '后'), ('與', '与'), ('發', '发'), ('請', '请'),
    ('詞', '词'), ('話', '话'), ('對', '对'), ('學', '学'), ('習', '习'),
    ('實', '实'), ('驗', '验'), ('會', '会'), ('電', '电'), ('郵', '邮'),
    ('廣', '广'), ('簡', '简'), ('歷', '历'), ('計', '计'), ('劃', '划'),
    ('總', '总'), ('結', '结'), ('紹', '绍'), ('調', '调'), ('傳', '传'),
    ('遊', '游'), ('這', '这'), ('範', '范'), ('誌', '志'), ('閱', '阅'),
];

static VARIANT_TABLE: OnceLock<HashMap<char, char>> = OnceLock::new();

fn variant_table() -> &'static HashMap<char, char> {
    VARIANT_TABLE.get_or_init(|| VARIANT_GLYPHS.iter().copied().collect())
}

/// Map legacy-script glyphs to the canonical script and fold case, so
/// model output and configured names compare equal.
pub fn normalize_script(text: &str) -> String {
    let table = variant_table();
    text.chars()
        .map(|c| *table.get(&c).unwrap_or(&c))
        .collect::<String>()
        .to_lowercase()
}

/// Resolve a free-form name to the configured spelling, if it names a
/// known category.
pub fn match_known(name: &str, library: &RubricLibrary) -> Option<String> {
    let wanted = normalize_script(name.trim());
    if wanted.is_empty() {
        return None;
    }
    library
        .categories()
        .iter()
        .find(|c| normalize_script(c) == wanted)
        .cloned()
}

// ── Prompt ──────────────────────────────────────────────────────────────

pub fn build_messages(question: &str, library: &RubricLibrary) -> Vec<ChatMessage> {
    let choices = serde_json::to_string(library.categories()).unwrap_or_else(|_| "[]".to_string());
    let system = "You are an experienced education assessment specialist who identifies \
                  the type of writing task a question asks for. Answer in JSON only.";
    let user = format!(
        r#"Identify the type of the following question.

Question: {}

Choose exactly one type from this list and copy it verbatim:
{}

Respond with ONLY a JSON object in this exact format, no other text:
{{"category": "one of the types above"}}"#,
        question, choices
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

// ── Parsing ─────────────────────────────────────────────────────────────

/// Turn the model's answer into exactly one category. Never fails: falls
/// back to a substring scan of the raw text, then to the first configured
/// category, then to [`UNKNOWN_CATEGORY`] for an empty library.
pub fn resolve_category(response: &str, library: &RubricLibrary) -> String {
    let Some(default) = library.first_category() else {
        warn!("No categories configured, classifying as {}", UNKNOWN_CATEGORY);
        return UNKNOWN_CATEGORY.to_string();
    };

    let claimed = extract_object(response).and_then(|(obj, _)| {
        CATEGORY_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(|v| v.as_str()).map(str::to_string))
    });

    if let Some(name) = &claimed {
        if let Some(category) = match_known(name, library) {
            info!("Category from structured answer: {}", category);
            return category;
        }
        warn!("Structured answer named unknown category '{}'", name);
    } else {
        warn!(
            "No structured category in response, scanning text: {}",
            preview(response, 200)
        );
    }

    let haystack = normalize_script(response);
    if let Some(category) = library
        .categories()
        .iter()
        .find(|c| !c.is_empty() && haystack.contains(&normalize_script(c)))
    {
        info!("Category from text match: {}", category);
        return category.clone();
    }

    warn!("Could not identify category, defaulting to {}", default);
    default.to_string()
}

/// Ask the model which known category `question` belongs to.
pub async fn classify<B: ChatBackend>(
    gateway: &ModelGateway<B>,
    temperature: f32,
    question: &str,
    library: &RubricLibrary,
) -> String {
    if library.is_empty() {
        warn!("No categories configured, skipping classification");
        return UNKNOWN_CATEGORY.to_string();
    }
    let reply = gateway.invoke(build_messages(question, library), temperature).await;
    resolve_category(reply.text().trim(), library)
}
