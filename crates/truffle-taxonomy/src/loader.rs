use std::path::Path;

use tracing::{info, warn};

use crate::error::{Result, TaxonomyError};
use crate::types::{Skill, TaxonomyFile};

/// Parse and validate one taxonomy JSON document.
///
/// Rejects missing fields, a non-list `skills`, non-list `aliases`, and
/// empty or non-string keys.
pub fn parse_file(content: &str, file_name: &str) -> Result<TaxonomyFile> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| TaxonomyError::Invalid {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;

    validate(&value, file_name)?;

    serde_json::from_value(value).map_err(|e| TaxonomyError::Invalid {
        file: file_name.to_string(),
        reason: e.to_string(),
    })
}

fn validate(value: &serde_json::Value, file_name: &str) -> Result<()> {
    let invalid = |reason: String| TaxonomyError::Invalid {
        file: file_name.to_string(),
        reason,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| invalid("document must be an object".into()))?;

    for field in ["domain", "skills"] {
        if !obj.contains_key(field) {
            return Err(invalid(format!("missing required field '{field}'")));
        }
    }

    let skills = obj["skills"]
        .as_array()
        .ok_or_else(|| invalid("'skills' must be a list".into()))?;

    for (i, skill) in skills.iter().enumerate() {
        let entry = skill
            .as_object()
            .ok_or_else(|| invalid(format!("skill {i} must be an object")))?;
        for field in ["key", "name", "aliases"] {
            if !entry.contains_key(field) {
                return Err(invalid(format!("skill {i} missing required field '{field}'")));
            }
        }
        if !entry["aliases"].is_array() {
            return Err(invalid(format!("skill {i} 'aliases' must be a list")));
        }
        match entry["key"].as_str() {
            Some(key) if !key.is_empty() => {}
            _ => return Err(invalid(format!("skill {i} 'key' must be a non-empty string"))),
        }
    }

    Ok(())
}

/// Load every `*.json` file in `dir` into a flat skill list.
///
/// Files that fail validation are logged and skipped so one bad domain
/// file does not block the rest of the import.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Skill>> {
    let dir = dir.as_ref();
    let mut skills = Vec::new();
    let mut files = 0usize;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unknown>")
            .to_string();

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(file = %name, "failed to read taxonomy file: {e}");
                continue;
            }
        };

        match parse_file(&content, &name) {
            Ok(file) => {
                let domain_skills = file.into_skills();
                info!(file = %name, count = domain_skills.len(), "loaded taxonomy file");
                skills.extend(domain_skills);
                files += 1;
            }
            Err(e) => warn!(file = %name, "skipping taxonomy file: {e}"),
        }
    }

    info!(files, skills = skills.len(), "taxonomy load complete");
    Ok(skills)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{
        "domain": "engineering",
        "skills": [
            {"key": "python", "name": "Python", "aliases": ["python", "django", " Flask "]},
            {"key": "react", "name": "React", "aliases": ["react", "reactjs"]}
        ]
    }"#;

    #[test]
    fn parses_and_normalises() {
        let skills = parse_file(GOOD, "engineering.json").unwrap().into_skills();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].domain, "engineering");
        assert_eq!(skills[0].aliases, vec!["python", "django", "flask"]);
    }

    #[test]
    fn rejects_missing_domain() {
        let err = parse_file(r#"{"skills": []}"#, "bad.json").unwrap_err();
        assert!(err.to_string().contains("domain"));
    }

    #[test]
    fn rejects_non_list_skills() {
        let err = parse_file(r#"{"domain": "x", "skills": {}}"#, "bad.json").unwrap_err();
        assert!(err.to_string().contains("'skills' must be a list"));
    }

    #[test]
    fn rejects_non_list_aliases() {
        let doc = r#"{"domain": "x", "skills": [{"key": "a", "name": "A", "aliases": "a"}]}"#;
        let err = parse_file(doc, "bad.json").unwrap_err();
        assert!(err.to_string().contains("aliases"));
    }

    #[test]
    fn rejects_empty_key() {
        let doc = r#"{"domain": "x", "skills": [{"key": "", "name": "A", "aliases": []}]}"#;
        let err = parse_file(doc, "bad.json").unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }
}
