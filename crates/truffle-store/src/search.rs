use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;

use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::{confidence_level, ExpertHit, ExpertQuery, SortBy};

impl Store {
    /// Ranked expert query shared with the Expert API.
    ///
    /// One parameterized SQL statement: evidence joined to users and
    /// skills, filtered by skill key / time window / label, grouped per
    /// (user, skill) with per-row time decay folded into the average.
    pub fn search_experts(&self, query: &ExpertQuery) -> Result<Vec<ExpertHit>> {
        if query.skill_keys.is_empty() {
            return Err(StoreError::EmptySkillKeys);
        }

        let today = Utc::now().date_naive();
        let sql = build_expert_sql(query);
        let params = build_expert_params(query, today);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                let score: f64 = row.get(5)?;
                let last: Option<String> = row.get(10)?;
                Ok(ExpertHit {
                    external_id: row.get(0)?,
                    display_name: row.get(1)?,
                    timezone: row.get(2)?,
                    skill_name: row.get(3)?,
                    skill_key: row.get(4)?,
                    expertise_score: score,
                    confidence_level: confidence_level(score),
                    evidence_count: row.get(6)?,
                    positive_count: row.get(7)?,
                    negative_count: row.get(8)?,
                    neutral_count: row.get(9)?,
                    last_activity: last
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }
}

/// Fixed parameter slots (?1–?8), then the skill keys from ?9 on. The
/// decay expression is repeated in HAVING because SQLite resolves the
/// select-list alias there but we keep the original query's shape of
/// filtering on the same aggregate it reports.
fn build_expert_sql(query: &ExpertQuery) -> String {
    let decay_case = "AVG(CASE
            WHEN ee.label = 'positive_expertise' THEN
                ee.confidence * pow(?2, julianday(?1) - julianday(ee.evidence_date))
            WHEN ee.label = 'negative_expertise' THEN
                -ee.confidence * ?3 * pow(?2, julianday(?1) - julianday(ee.evidence_date))
            ELSE 0
        END)";

    let mut where_clauses = vec![format!(
        "s.skill_key IN ({})",
        (0..query.skill_keys.len())
            .map(|i| format!("?{}", 9 + i))
            .collect::<Vec<_>>()
            .join(", ")
    )];
    where_clauses.push("ee.evidence_date >= ?4".to_string());
    if query.exclude_neutral {
        where_clauses.push("ee.label != 'neutral'".to_string());
    }
    if !query.include_negative {
        where_clauses.push("ee.label != 'negative_expertise'".to_string());
    }

    let order_by = match query.sort_by {
        SortBy::Score => "expertise_score DESC",
        SortBy::Recent => "last_activity_date DESC NULLS LAST",
        SortBy::EvidenceCount => "evidence_count DESC",
        SortBy::Alphabetical => "u.display_name ASC",
    };

    format!(
        "SELECT
            u.external_id,
            u.display_name,
            u.timezone,
            s.name AS skill_name,
            s.skill_key,
            {decay_case} AS expertise_score,
            COUNT(*) AS evidence_count,
            COUNT(*) FILTER (WHERE ee.label = 'positive_expertise') AS positive_count,
            COUNT(*) FILTER (WHERE ee.label = 'negative_expertise') AS negative_count,
            COUNT(*) FILTER (WHERE ee.label = 'neutral') AS neutral_count,
            MAX(ee.evidence_date) AS last_activity_date
        FROM expertise_evidence ee
        JOIN users u ON ee.user_id = u.user_id
        JOIN skills s ON ee.skill_id = s.skill_id
        WHERE {where_clause}
        GROUP BY u.user_id, s.skill_id
        HAVING
            COUNT(*) >= ?5
            AND {decay_case} >= ?6
        ORDER BY {order_by}
        LIMIT ?7 OFFSET ?8",
        decay_case = decay_case,
        where_clause = where_clauses.join(" AND "),
        order_by = order_by,
    )
}

fn build_expert_params(query: &ExpertQuery, today: NaiveDate) -> Vec<Value> {
    // window_days = 0 disables the window: bind a cutoff older than any row
    let cutoff = if query.window_days > 0 {
        (today - chrono::Duration::days(query.window_days))
            .format("%Y-%m-%d")
            .to_string()
    } else {
        "0001-01-01".to_string()
    };

    let mut params: Vec<Value> = vec![
        Value::Text(today.format("%Y-%m-%d").to_string()),
        Value::Real(query.time_decay_factor),
        Value::Real(query.negative_weight),
        Value::Text(cutoff),
        Value::Integer(query.min_evidence_count),
        Value::Real(query.min_confidence),
        Value::Integer(query.limit),
        Value::Integer(query.offset),
    ];
    params.extend(query.skill_keys.iter().map(|k| Value::Text(k.clone())));
    params
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rusqlite::Connection;
    use truffle_core::types::{ChatUser, ExpertiseLabel, SkillEvaluation};
    use truffle_taxonomy::Skill;

    use super::*;

    fn seeded() -> Store {
        let store = Store::new(Connection::open_in_memory().unwrap()).unwrap();
        let users: HashMap<String, ChatUser> = ["U1", "U2", "U3"]
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    ChatUser {
                        external_id: id.to_string(),
                        display_name: format!("User {id}"),
                        handle: id.to_lowercase(),
                        timezone: None,
                    },
                )
            })
            .collect();
        store.upsert_users(&users).unwrap();
        store
            .upsert_skills(&[Skill {
                key: "python".into(),
                name: "Python".into(),
                domain: "engineering".into(),
                aliases: vec!["python".into()],
            }])
            .unwrap();
        store
    }

    fn add_evidence(
        store: &Store,
        user: &str,
        label: ExpertiseLabel,
        confidence: f64,
        days_ago: i64,
        hash: &str,
    ) {
        let date = Utc::now().date_naive() - chrono::Duration::days(days_ago);
        store
            .store_evidence(
                user,
                &[SkillEvaluation {
                    skill_key: "python".into(),
                    label,
                    confidence,
                    rationale: String::new(),
                }],
                date,
                Some(hash),
            )
            .unwrap();
    }

    fn search(store: &Store, query: ExpertQuery) -> Vec<ExpertHit> {
        store.search_experts(&query).unwrap()
    }

    fn python_query() -> ExpertQuery {
        ExpertQuery {
            skill_keys: vec!["python".into()],
            min_confidence: 0.0,
            ..ExpertQuery::default()
        }
    }

    #[test]
    fn empty_skill_keys_is_an_error() {
        let store = seeded();
        assert!(matches!(
            store.search_experts(&ExpertQuery::default()),
            Err(StoreError::EmptySkillKeys)
        ));
    }

    #[test]
    fn fresher_evidence_outranks_stale_evidence() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 10, "a");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.9, 100, "b");

        let hits = search(&store, python_query());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].external_id, "U1");
        assert_eq!(hits[1].external_id, "U2");
        // 0.9 * 0.95^10 ≈ 0.539, 0.9 * 0.95^100 ≈ 0.0053
        assert!((hits[0].expertise_score - 0.539).abs() < 0.01);
        assert!(hits[1].expertise_score < 0.01);
        assert_eq!(hits[0].confidence_level, "medium");
        assert_eq!(hits[1].confidence_level, "low");
    }

    #[test]
    fn window_excludes_old_evidence() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 200, "a");
        let hits = search(&store, python_query());
        assert!(hits.is_empty());

        let hits = search(
            &store,
            ExpertQuery {
                window_days: 0,
                ..python_query()
            },
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn negative_evidence_excluded_unless_requested() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 1, "a");
        add_evidence(&store, "U1", ExpertiseLabel::NegativeExpertise, 0.9, 1, "b");

        let without = search(&store, python_query());
        assert_eq!(without[0].evidence_count, 1);
        assert_eq!(without[0].negative_count, 0);

        let with = search(
            &store,
            ExpertQuery {
                include_negative: true,
                min_confidence: -1.0,
                ..python_query()
            },
        );
        assert_eq!(with[0].evidence_count, 2);
        assert_eq!(with[0].positive_count, 1);
        assert_eq!(with[0].negative_count, 1);
        assert!(with[0].expertise_score < without[0].expertise_score);
    }

    #[test]
    fn adding_fresh_positive_evidence_never_lowers_the_score() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.4, 30, "a");
        let before = search(&store, python_query())[0].expertise_score;

        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 0, "b");
        let after = search(&store, python_query())[0].expertise_score;
        assert!(after >= before);
    }

    #[test]
    fn min_evidence_count_filters_thin_profiles() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 1, "a");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.9, 1, "b");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.8, 2, "c");

        let hits = search(
            &store,
            ExpertQuery {
                min_evidence_count: 2,
                ..python_query()
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].external_id, "U2");
    }

    #[test]
    fn sort_orders() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 1, "a");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.5, 0, "b");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.5, 3, "c");

        let by_recent = search(
            &store,
            ExpertQuery {
                sort_by: SortBy::Recent,
                ..python_query()
            },
        );
        assert_eq!(by_recent[0].external_id, "U2");

        let by_count = search(
            &store,
            ExpertQuery {
                sort_by: SortBy::EvidenceCount,
                ..python_query()
            },
        );
        assert_eq!(by_count[0].external_id, "U2");

        let by_name = search(
            &store,
            ExpertQuery {
                sort_by: SortBy::Alphabetical,
                ..python_query()
            },
        );
        assert_eq!(by_name[0].external_id, "U1");
    }

    #[test]
    fn limit_and_offset_paginate() {
        let store = seeded();
        add_evidence(&store, "U1", ExpertiseLabel::PositiveExpertise, 0.9, 1, "a");
        add_evidence(&store, "U2", ExpertiseLabel::PositiveExpertise, 0.8, 1, "b");
        add_evidence(&store, "U3", ExpertiseLabel::PositiveExpertise, 0.7, 1, "c");

        let page = search(
            &store,
            ExpertQuery {
                limit: 2,
                offset: 1,
                ..python_query()
            },
        );
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].external_id, "U2");
        assert_eq!(page[1].external_id, "U3");
    }
}
