use std::collections::{HashMap, HashSet};

use crate::types::Skill;

/// Alias-based skill matcher.
///
/// Compiles the taxonomy into an ordered alias list once; matching is a
/// pure function of the input text afterwards. A hit requires the alias to
/// occur as a whole token: the characters on either side must not be word
/// characters, `-`, `/`, `#`, or `.`. Matching is case-insensitive and
/// whitespace runs in the input collapse to single spaces first, so
/// multi-word aliases match across line breaks and double spaces.
pub struct SkillMatcher {
    /// (alias, skill key) in compile order; first-match order defines the
    /// result order. When two skills claim the same alias the later skill
    /// wins the binding but the alias keeps its original position.
    aliases: Vec<(String, String)>,
    by_key: HashMap<String, Skill>,
}

impl SkillMatcher {
    pub fn new(skills: Vec<Skill>) -> Self {
        let mut aliases: Vec<(String, String)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for skill in &skills {
            let name_alias = skill.name.to_lowercase();
            for alias in std::iter::once(&name_alias).chain(skill.aliases.iter()) {
                let alias = alias.trim().to_lowercase();
                if alias.is_empty() {
                    continue;
                }
                match positions.get(&alias) {
                    Some(&idx) => aliases[idx].1 = skill.key.clone(),
                    None => {
                        positions.insert(alias.clone(), aliases.len());
                        aliases.push((alias, skill.key.clone()));
                    }
                }
            }
        }

        let by_key = skills.into_iter().map(|s| (s.key.clone(), s)).collect();
        Self { aliases, by_key }
    }

    /// Ordered, deduplicated skill keys whose alias occurs in `text` as a
    /// whole token.
    pub fn match_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let normalized = normalize(text);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut matched = Vec::new();
        for (alias, key) in &self.aliases {
            if seen.contains(key.as_str()) {
                continue;
            }
            if contains_token(&normalized, alias) {
                seen.insert(key.as_str());
                matched.push(key.clone());
            }
        }
        matched
    }

    pub fn describe(&self, key: &str) -> Option<&Skill> {
        self.by_key.get(key)
    }

    pub fn skill_count(&self) -> usize {
        self.by_key.len()
    }
}

/// Collapse whitespace runs and lowercase, so alias scans work on a
/// canonical form.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Characters that glue a candidate hit to surrounding text. A match
/// touching one of these on either side is part of a larger token
/// ("reactive", "my/react", "#react", "react.js") and does not count.
fn is_boundary_glue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '#' | '.')
}

fn contains_token(text: &str, alias: &str) -> bool {
    for (start, _) in text.match_indices(alias) {
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map(|c| !is_boundary_glue(c))
            .unwrap_or(true);
        let after_ok = text[start + alias.len()..]
            .chars()
            .next()
            .map(|c| !is_boundary_glue(c))
            .unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
    }
    false
}
