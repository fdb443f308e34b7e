use super::category::{Category, ClassificationResult};

const KEYWORD_HIT_CONFIDENCE: f32 = 0.6;
const NO_MATCH_CONFIDENCE: f32 = 0.3;

/// Keyword table for rule-based classification, checked in order
pub const FALLBACK_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Urgent,
        &["urgent", "asap", "due today", "deadline", "immediately", "due tonight"],
    ),
    (
        Category::Academic,
        &["assignment", "exam", "grade", "lecture", "professor", "syllabus", "homework"],
    ),
    (
        Category::Administrative,
        &["registration", "enroll", "tuition", "form", "bursar", "registrar"],
    ),
    (
        Category::Social,
        &["meeting", "event", "rsvp", "join us", "party", "gathering"],
    ),
    (
        Category::Promotional,
        &["unsubscribe", "discount", "offer", "newsletter", "limited time"],
    ),
];

/// Classify by case-insensitive substring match on subject and body.
/// The first category in table order with a matching keyword wins.
pub fn classify_by_keywords(subject: &str, body: &str) -> ClassificationResult {
    let text = format!("{} {}", subject, body).to_lowercase();

    FALLBACK_KEYWORDS
        .iter()
        .find_map(|(category, keywords)| {
            keywords
                .iter()
                .find(|keyword| text.contains(*keyword))
                .map(|keyword| {
                    ClassificationResult::new(
                        *category,
                        KEYWORD_HIT_CONFIDENCE,
                        format!("Keyword match: '{}'", keyword),
                    )
                })
        })
        .unwrap_or_else(|| {
            ClassificationResult::new(
                Category::CATCH_ALL,
                NO_MATCH_CONFIDENCE,
                "No keyword matches found",
            )
        })
}
