use regex::Regex;
use tracing::debug;

use crate::cache::SkillTerms;

/// An expert-search intent extracted from a natural-language question.
#[derive(Debug, Clone)]
pub struct ExpertIntent {
    pub skills: Vec<String>,
    pub query_type: &'static str,
    pub confidence: f64,
}

/// Pattern types that almost always mean "find me a person".
const HIGH_CONFIDENCE_TYPES: &[&str] = &["who_knows", "expert_in", "find_expert"];

const STOP_WORDS: &[&str] = &[
    "and", "or", "with", "in", "on", "at", "the", "a", "an", "stuff", "things",
];

/// Extracts skills and intent from questions like "who knows react?".
///
/// An ordered pattern list captures the skill phrase; the phrase is then
/// resolved against the cached taxonomy vocabulary (exact tokens, then
/// multi-word terms, then partial token containment).
pub struct QueryParser {
    patterns: Vec<(Regex, &'static str)>,
}

impl QueryParser {
    pub fn new() -> Self {
        let specs: &[(&str, &str)] = &[
            (r"(?i)who knows?\s+(?:about\s+)?(.+?)(?:\?|$)", "who_knows"),
            (
                r"(?i)who is\s+(?:an?\s+)?expert\s+(?:in|on|with|at)\s+(.+?)(?:\?|$)",
                "expert_in",
            ),
            (
                r"(?i)who can help\s+(?:me\s+)?(?:with\s+)?(.+?)(?:\?|$)",
                "help_with",
            ),
            (
                r"(?i)who has experience\s+(?:with\s+)?(.+?)(?:\?|$)",
                "experience_with",
            ),
            (
                r"(?i)find\s+(?:me\s+)?(?:an?\s+)?expert\s+(?:in|on|with|for)\s+(.+?)(?:\?|$)",
                "find_expert",
            ),
            (
                r"(?i)need\s+(?:an?\s+)?expert\s+(?:in|on|with|for)\s+(.+?)(?:\?|$)",
                "need_expert",
            ),
            (
                r"(?i)anyone know\s+(?:about\s+)?(.+?)(?:\?|$)",
                "anyone_know",
            ),
            (r"(?i)who should I ask about\s+(.+?)(?:\?|$)", "who_ask"),
            (
                r"(?i)(?:I\s+)?need help\s+(?:with\s+)?(.+?)(?:\?|$)",
                "need_help",
            ),
            (r"(?i)advice\s+(?:on\s+)?(.+?)(?:\?|$)", "advice_on"),
        ];
        Self {
            patterns: specs
                .iter()
                .map(|(pattern, query_type)| (Regex::new(pattern).unwrap(), *query_type))
                .collect(),
        }
    }

    pub fn parse(&self, text: &str, vocabulary: &SkillTerms) -> Option<ExpertIntent> {
        for &(ref pattern, query_type) in &self.patterns {
            if let Some(captures) = pattern.captures(text) {
                let skill_text = captures.get(1)?.as_str().trim();
                debug!(query_type, skill_text, "question pattern matched");
                let (skills, partial) = extract_skills(skill_text, vocabulary);
                if !skills.is_empty() {
                    return Some(ExpertIntent {
                        confidence: confidence(text, &skills, query_type, partial),
                        skills,
                        query_type,
                    });
                }
            }
        }

        // Fallback: any skill mention at all, at low confidence
        let (skills, partial) = extract_skills(text, vocabulary);
        if skills.is_empty() {
            return None;
        }
        Some(ExpertIntent {
            confidence: if partial { 0.2 } else { 0.3 },
            skills,
            query_type: "general_mention",
        })
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a free-text skill phrase against the vocabulary. Returns the
/// matched keys and whether partial matching was needed.
fn extract_skills(text: &str, vocabulary: &SkillTerms) -> (Vec<String>, bool) {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '/' | '&' | '+' | '-'))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut found: Vec<String> = Vec::new();

    // Exact single-token matches
    for token in &tokens {
        if STOP_WORDS.contains(token) {
            continue;
        }
        if let Some(key) = vocabulary.key_for(token) {
            if !found.contains(key) {
                found.push(key.clone());
            }
        }
    }

    // Multi-word terms contained in the phrase
    for term in vocabulary.terms.iter().filter(|t| t.contains(' ')) {
        if lowered.contains(term.as_str()) {
            if let Some(key) = vocabulary.key_for(term) {
                if !found.contains(key) {
                    found.push(key.clone());
                }
            }
        }
    }

    if !found.is_empty() {
        return (found, false);
    }

    // Partial: meaningful tokens contained inside longer terms
    for token in tokens {
        if STOP_WORDS.contains(&token) || token.len() <= 2 {
            continue;
        }
        for term in vocabulary.terms.iter() {
            if term.contains(token) {
                if let Some(key) = vocabulary.key_for(term) {
                    if !found.contains(key) {
                        found.push(key.clone());
                    }
                }
            }
        }
    }

    let partial = !found.is_empty();
    (found, partial)
}

fn confidence(text: &str, skills: &[String], query_type: &str, partial: bool) -> f64 {
    let mut confidence: f64 = if HIGH_CONFIDENCE_TYPES.contains(&query_type) {
        if partial {
            0.7
        } else {
            0.9
        }
    } else if partial {
        0.5
    } else {
        0.7
    };

    if skills.len() > 1 {
        confidence += 0.1;
    }
    if !skills.is_empty() {
        confidence += 0.1;
    }
    if skills.len() > 3 {
        confidence -= 0.1;
    }
    if text.contains('?') {
        confidence += 0.05;
    }
    confidence.min(1.0)
}
