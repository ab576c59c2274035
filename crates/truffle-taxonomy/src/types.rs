use serde::{Deserialize, Serialize};

/// A canonical skill with its matching aliases.
///
/// `key` is the stable lowercase identifier; `aliases` are lowercase and
/// include the forms the matcher should recognise in free text (the
/// lowercased display name is added by the matcher itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub key: String,
    pub name: String,
    pub domain: String,
    pub aliases: Vec<String>,
}

/// On-disk taxonomy file: one domain, many skills.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyFile {
    pub domain: String,
    pub skills: Vec<TaxonomyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyEntry {
    pub key: String,
    pub name: String,
    pub aliases: Vec<String>,
}

impl TaxonomyFile {
    /// Flatten into [`Skill`] records, normalising aliases to trimmed
    /// lowercase and dropping empties.
    pub fn into_skills(self) -> Vec<Skill> {
        let domain = self.domain;
        self.skills
            .into_iter()
            .map(|entry| {
                let mut aliases: Vec<String> = entry
                    .aliases
                    .iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect();
                aliases.dedup();
                Skill {
                    key: entry.key,
                    name: entry.name,
                    domain: domain.clone(),
                    aliases,
                }
            })
            .collect()
    }
}
