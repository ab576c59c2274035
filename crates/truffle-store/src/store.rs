use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use truffle_core::types::{ChatUser, ExpertiseLabel, SkillEvaluation};
use truffle_taxonomy::Skill;

use crate::db::{drop_tables, init_db};
use crate::error::Result;
use crate::types::{AggregationStats, HealthTotals, InsertedEvidence, StoredSkill};

/// Evidence window for the full score rebuild.
const AGGREGATION_WINDOW_DAYS: i64 = 180;
/// Minimum average score for a rebuilt row to be kept.
const SCORE_FLOOR: f64 = 0.1;
/// Learning rate for the incremental EMA update.
const EMA_ALPHA: f64 = 0.1;

/// Relational persistence for users, skills, evidence, and aggregated
/// scores.
///
/// Thread-safe: wraps the SQLite connection in a Mutex. Every public
/// method is one short lock-scoped transaction; the lock is never held
/// across network I/O.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    /// True iff no evidence rows exist — the first-run signal for the
    /// ingestion scheduler.
    pub fn is_database_empty(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT 1 FROM expertise_evidence LIMIT 1)",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 0)
    }

    /// Insert or update workspace members keyed by external id. Never
    /// deletes.
    pub fn upsert_users(&self, users: &HashMap<String, ChatUser>) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO users (external_id, display_name, timezone, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(external_id) DO UPDATE SET
                     display_name = excluded.display_name,
                     timezone = excluded.timezone,
                     updated_at = excluded.updated_at",
            )?;
            for user in users.values() {
                stmt.execute(rusqlite::params![
                    user.external_id,
                    user.display_name,
                    user.timezone,
                    now
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = users.len(), "upserted users");
        Ok(users.len())
    }

    /// Idempotent skill import; aliases serialised as a JSON array.
    pub fn upsert_skills(&self, skills: &[Skill]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO skills (skill_key, name, domain, aliases, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(skill_key) DO UPDATE SET
                     name = excluded.name,
                     domain = excluded.domain,
                     aliases = excluded.aliases,
                     updated_at = excluded.updated_at",
            )?;
            for skill in skills {
                let aliases = serde_json::to_string(&skill.aliases)?;
                stmt.execute(rusqlite::params![
                    skill.key,
                    skill.name,
                    skill.domain,
                    aliases,
                    now
                ])?;
            }
        }
        tx.commit()?;
        info!(count = skills.len(), "upserted skills");
        Ok(skills.len())
    }

    pub fn all_skills(&self) -> Result<Vec<StoredSkill>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT skill_id, skill_key, name, domain, aliases FROM skills ORDER BY skill_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let skills = rows
            .filter_map(|r| r.ok())
            .map(|(skill_id, skill_key, name, domain, aliases)| StoredSkill {
                skill_id,
                skill_key,
                name,
                domain,
                aliases: aliases
                    .and_then(|a| serde_json::from_str(&a).ok())
                    .unwrap_or_default(),
            })
            .collect();
        Ok(skills)
    }

    /// Skill records in the shape the matcher consumes.
    pub fn taxonomy_skills(&self) -> Result<Vec<Skill>> {
        Ok(self
            .all_skills()?
            .into_iter()
            .map(|s| Skill {
                key: s.skill_key,
                name: s.name,
                domain: s.domain,
                aliases: s.aliases,
            })
            .collect())
    }

    pub fn skill_domains(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT domain FROM skills ORDER BY domain")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Append evidence rows for one author, skipping evaluations whose
    /// user or skill is unknown and duplicates of an already-stored
    /// (user, skill, message_hash) triple. Confidence is clamped to
    /// [0, 1] on the way in. Returns the rows actually inserted.
    pub fn store_evidence(
        &self,
        user_external_id: &str,
        evaluations: &[SkillEvaluation],
        evidence_date: NaiveDate,
        message_hash: Option<&str>,
    ) -> Result<Vec<InsertedEvidence>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let user_id: Option<i64> = tx
            .query_row(
                "SELECT user_id FROM users WHERE external_id = ?1",
                [user_external_id],
                |row| row.get(0),
            )
            .optional()?;
        let user_id = match user_id {
            Some(id) => id,
            None => {
                debug!(external_id = %user_external_id, "skipping evidence for unknown user");
                return Ok(Vec::new());
            }
        };

        let now = Utc::now().to_rfc3339();
        let date = evidence_date.format("%Y-%m-%d").to_string();
        let mut inserted = Vec::new();
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO expertise_evidence
                 (user_id, skill_id, label, confidence, evidence_date, message_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for eval in evaluations {
                let skill_id: Option<i64> = tx
                    .query_row(
                        "SELECT skill_id FROM skills WHERE skill_key = ?1",
                        [&eval.skill_key],
                        |row| row.get(0),
                    )
                    .optional()?;
                let skill_id = match skill_id {
                    Some(id) => id,
                    None => {
                        debug!(skill = %eval.skill_key, "skipping evidence for unknown skill");
                        continue;
                    }
                };

                let confidence = eval.confidence.clamp(0.0, 1.0);
                let n = insert.execute(rusqlite::params![
                    user_id,
                    skill_id,
                    eval.label.to_string(),
                    confidence,
                    date,
                    message_hash,
                    now
                ])?;
                if n > 0 {
                    inserted.push(InsertedEvidence {
                        user_id,
                        skill_id,
                        label: eval.label,
                        confidence,
                    });
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Full rebuild of `user_skill_scores` from evidence in the last 180
    /// days. Rows with an average contribution at or below the floor are
    /// dropped. Returns the number of score rows written.
    pub fn aggregate_all_scores(&self) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM user_skill_scores", [])?;

        let cutoff = (Utc::now().date_naive() - chrono::Duration::days(AGGREGATION_WINDOW_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let written = tx.execute(
            "INSERT INTO user_skill_scores
                 (user_id, skill_id, score, evidence_count, last_evidence_date)
             SELECT
                 ee.user_id,
                 ee.skill_id,
                 AVG(CASE
                         WHEN ee.label = 'positive_expertise' THEN ee.confidence
                         WHEN ee.label = 'negative_expertise' THEN -ee.confidence * 0.5
                         ELSE 0
                     END) AS avg_score,
                 COUNT(*),
                 MAX(ee.evidence_date)
             FROM expertise_evidence ee
             WHERE ee.evidence_date >= ?1
             GROUP BY ee.user_id, ee.skill_id
             HAVING avg_score > ?2",
            rusqlite::params![cutoff, SCORE_FLOOR],
        )?;
        tx.commit()?;
        info!(scores = written, "score aggregation complete");
        Ok(written)
    }

    /// Incremental EMA update applied as new evidence lands. Low-score
    /// rows are not pruned here; the next full rebuild cleans them.
    pub fn update_skill_score(
        &self,
        user_id: i64,
        skill_id: i64,
        label: ExpertiseLabel,
        confidence: f64,
        evidence_date: NaiveDate,
    ) -> Result<()> {
        let value = evidence_value(label, confidence);
        let date = evidence_date.format("%Y-%m-%d").to_string();

        let conn = self.conn.lock().unwrap();
        let existing: Option<(f64, i64, String)> = conn
            .query_row(
                "SELECT score, evidence_count, last_evidence_date
                 FROM user_skill_scores WHERE user_id = ?1 AND skill_id = ?2",
                [user_id, skill_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match existing {
            Some((score, count, last_date)) => {
                let new_score = (1.0 - EMA_ALPHA) * score + EMA_ALPHA * value;
                // ISO dates compare correctly as text
                let last = if date > last_date { &date } else { &last_date };
                conn.execute(
                    "UPDATE user_skill_scores
                     SET score = ?3, evidence_count = ?4, last_evidence_date = ?5
                     WHERE user_id = ?1 AND skill_id = ?2",
                    rusqlite::params![user_id, skill_id, new_score, count + 1, last],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO user_skill_scores
                     (user_id, skill_id, score, evidence_count, last_evidence_date)
                     VALUES (?1, ?2, ?3, 1, ?4)",
                    rusqlite::params![user_id, skill_id, value, date],
                )?;
            }
        }
        Ok(())
    }

    /// Skill keys whose display name or key equals `name`
    /// (case-insensitive).
    pub fn find_skill_keys_by_name(&self, name: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT skill_key FROM skills
             WHERE lower(name) = lower(?1) OR skill_key = lower(?1)",
        )?;
        let rows = stmt.query_map([name], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Skill keys whose key, name, or aliases contain `term`
    /// (case-insensitive substring).
    pub fn find_skill_keys_fuzzy(&self, term: &str) -> Result<Vec<String>> {
        let pattern = format!("%{}%", term.to_lowercase());
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT skill_key FROM skills
             WHERE lower(name) LIKE ?1
                OR lower(skill_key) LIKE ?1
                OR lower(coalesce(aliases, '')) LIKE ?1",
        )?;
        let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Number of users holding a score row, per skill key. Powers the
    /// `expert_count` field of the skills listing.
    pub fn expert_counts_by_skill(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.skill_key, COUNT(uss.user_id)
             FROM user_skill_scores uss
             JOIN skills s ON uss.skill_id = s.skill_id
             GROUP BY s.skill_key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn aggregation_stats(&self) -> Result<AggregationStats> {
        let conn = self.conn.lock().unwrap();
        let total_evidence: i64 =
            conn.query_row("SELECT COUNT(*) FROM expertise_evidence", [], |r| r.get(0))?;
        let total_scores: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_skill_scores", [], |r| r.get(0))?;
        let users_with_scores: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM user_skill_scores",
            [],
            |r| r.get(0),
        )?;
        Ok(AggregationStats {
            total_evidence,
            total_scores,
            users_with_scores,
        })
    }

    pub fn health_totals(&self) -> Result<HealthTotals> {
        let conn = self.conn.lock().unwrap();
        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
        let skills: i64 = conn.query_row("SELECT COUNT(*) FROM skills", [], |r| r.get(0))?;
        let evidence: i64 =
            conn.query_row("SELECT COUNT(*) FROM expertise_evidence", [], |r| r.get(0))?;
        let scores: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_skill_scores", [], |r| r.get(0))?;
        Ok(HealthTotals {
            users,
            skills,
            evidence,
            scores,
        })
    }

    /// Drop and recreate every table.
    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        drop_tables(&conn)?;
        init_db(&conn)?;
        info!("database reset");
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        Ok(f(&conn)?)
    }
}

/// Contribution of one evidence row to an undecayed score.
pub fn evidence_value(label: ExpertiseLabel, confidence: f64) -> f64 {
    match label {
        ExpertiseLabel::PositiveExpertise => confidence,
        ExpertiseLabel::NegativeExpertise => -confidence * 0.5,
        ExpertiseLabel::Neutral => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> Store {
        Store::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn user(external_id: &str, name: &str) -> ChatUser {
        ChatUser {
            external_id: external_id.to_string(),
            display_name: name.to_string(),
            handle: name.to_lowercase(),
            timezone: Some("UTC".to_string()),
        }
    }

    fn skill(key: &str, name: &str) -> Skill {
        Skill {
            key: key.to_string(),
            name: name.to_string(),
            domain: "engineering".to_string(),
            aliases: vec![key.to_string()],
        }
    }

    fn eval(key: &str, label: ExpertiseLabel, confidence: f64) -> SkillEvaluation {
        SkillEvaluation {
            skill_key: key.to_string(),
            label,
            confidence,
            rationale: String::new(),
        }
    }

    fn seeded() -> Store {
        let store = mem_store();
        let users = HashMap::from([
            ("U1".to_string(), user("U1", "Alice")),
            ("U2".to_string(), user("U2", "Bob")),
        ]);
        store.upsert_users(&users).unwrap();
        store
            .upsert_skills(&[skill("python", "Python"), skill("react", "React")])
            .unwrap();
        store
    }

    #[test]
    fn empty_database_flag_flips_on_first_evidence() {
        let store = seeded();
        assert!(store.is_database_empty().unwrap());
        store
            .store_evidence(
                "U1",
                &[eval("python", ExpertiseLabel::PositiveExpertise, 0.9)],
                Utc::now().date_naive(),
                Some("abc123"),
            )
            .unwrap();
        assert!(!store.is_database_empty().unwrap());
    }

    #[test]
    fn upsert_users_updates_in_place() {
        let store = seeded();
        let mut users = HashMap::new();
        users.insert("U1".to_string(), user("U1", "Alice Renamed"));
        store.upsert_users(&users).unwrap();

        let totals = store.health_totals().unwrap();
        assert_eq!(totals.users, 2);
        let name: String = store
            .with_conn(|c| {
                c.query_row(
                    "SELECT display_name FROM users WHERE external_id = 'U1'",
                    [],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(name, "Alice Renamed");
    }

    #[test]
    fn upsert_skills_is_idempotent_on_key() {
        let store = seeded();
        store
            .upsert_skills(&[Skill {
                aliases: vec!["python".into(), "py".into()],
                ..skill("python", "Python 3")
            }])
            .unwrap();
        let skills = store.all_skills().unwrap();
        assert_eq!(skills.len(), 2);
        let py = skills.iter().find(|s| s.skill_key == "python").unwrap();
        assert_eq!(py.name, "Python 3");
        assert_eq!(py.aliases, vec!["python", "py"]);
    }

    #[test]
    fn duplicate_message_hash_inserts_once() {
        let store = seeded();
        let today = Utc::now().date_naive();
        let evals = [eval("python", ExpertiseLabel::PositiveExpertise, 0.9)];
        let first = store
            .store_evidence("U1", &evals, today, Some("deadbeef"))
            .unwrap();
        let second = store
            .store_evidence("U1", &evals, today, Some("deadbeef"))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.health_totals().unwrap().evidence, 1);
    }

    #[test]
    fn unknown_user_and_skill_are_skipped_silently() {
        let store = seeded();
        let today = Utc::now().date_naive();
        let none = store
            .store_evidence(
                "UNKNOWN",
                &[eval("python", ExpertiseLabel::PositiveExpertise, 0.9)],
                today,
                None,
            )
            .unwrap();
        assert!(none.is_empty());

        let partial = store
            .store_evidence(
                "U1",
                &[
                    eval("cobol", ExpertiseLabel::PositiveExpertise, 0.9),
                    eval("python", ExpertiseLabel::PositiveExpertise, 0.9),
                ],
                today,
                None,
            )
            .unwrap();
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn confidence_is_clamped_at_ingest() {
        let store = seeded();
        let today = Utc::now().date_naive();
        let rows = store
            .store_evidence(
                "U1",
                &[eval("python", ExpertiseLabel::PositiveExpertise, 1.7)],
                today,
                None,
            )
            .unwrap();
        assert_eq!(rows[0].confidence, 1.0);
    }

    #[test]
    fn aggregation_builds_scores_above_floor() {
        let store = seeded();
        let today = Utc::now().date_naive();
        store
            .store_evidence(
                "U1",
                &[eval("python", ExpertiseLabel::PositiveExpertise, 0.9)],
                today,
                Some("h1"),
            )
            .unwrap();
        // Neutral-only users average 0 and stay below the floor
        store
            .store_evidence(
                "U2",
                &[eval("python", ExpertiseLabel::Neutral, 0.9)],
                today,
                Some("h2"),
            )
            .unwrap();

        let written = store.aggregate_all_scores().unwrap();
        assert_eq!(written, 1);

        let stats = store.aggregation_stats().unwrap();
        assert_eq!(stats.total_scores, 1);
        assert_eq!(stats.users_with_scores, 1);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let store = seeded();
        let today = Utc::now().date_naive();
        store
            .store_evidence(
                "U1",
                &[
                    eval("python", ExpertiseLabel::PositiveExpertise, 0.9),
                    eval("react", ExpertiseLabel::PositiveExpertise, 0.7),
                ],
                today,
                Some("h1"),
            )
            .unwrap();

        store.aggregate_all_scores().unwrap();
        let first: Vec<(i64, i64, f64, i64)> = store
            .with_conn(|c| {
                let mut stmt = c.prepare(
                    "SELECT user_id, skill_id, score, evidence_count
                     FROM user_skill_scores ORDER BY skill_id",
                )?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                    .filter_map(|r| r.ok())
                    .collect();
                Ok(rows)
            })
            .unwrap();

        store.aggregate_all_scores().unwrap();
        let second: Vec<(i64, i64, f64, i64)> = store
            .with_conn(|c| {
                let mut stmt = c.prepare(
                    "SELECT user_id, skill_id, score, evidence_count
                     FROM user_skill_scores ORDER BY skill_id",
                )?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                    .filter_map(|r| r.ok())
                    .collect();
                Ok(rows)
            })
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn ema_update_moves_score_toward_new_value() {
        let store = seeded();
        let today = Utc::now().date_naive();
        let inserted = store
            .store_evidence(
                "U1",
                &[eval("python", ExpertiseLabel::PositiveExpertise, 0.8)],
                today,
                Some("h1"),
            )
            .unwrap();
        let row = &inserted[0];

        store
            .update_skill_score(row.user_id, row.skill_id, row.label, row.confidence, today)
            .unwrap();
        store
            .update_skill_score(
                row.user_id,
                row.skill_id,
                ExpertiseLabel::NegativeExpertise,
                1.0,
                today,
            )
            .unwrap();

        let (score, count): (f64, i64) = store
            .with_conn(|c| {
                c.query_row(
                    "SELECT score, evidence_count FROM user_skill_scores
                     WHERE user_id = ?1 AND skill_id = ?2",
                    [row.user_id, row.skill_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
            })
            .unwrap();
        // 0.8 then EMA toward -0.5: 0.9*0.8 + 0.1*(-0.5) = 0.67
        assert!((score - 0.67).abs() < 1e-9);
        assert_eq!(count, 2);
    }

    #[test]
    fn evidence_value_contributions() {
        assert_eq!(evidence_value(ExpertiseLabel::PositiveExpertise, 0.9), 0.9);
        assert_eq!(evidence_value(ExpertiseLabel::NegativeExpertise, 0.8), -0.4);
        assert_eq!(evidence_value(ExpertiseLabel::Neutral, 0.9), 0.0);
    }

    #[test]
    fn fuzzy_and_exact_skill_lookup() {
        let store = seeded();
        assert_eq!(store.find_skill_keys_by_name("Python").unwrap(), vec!["python"]);
        assert_eq!(store.find_skill_keys_by_name("react").unwrap(), vec!["react"]);
        assert!(store.find_skill_keys_by_name("golang").unwrap().is_empty());
        assert_eq!(store.find_skill_keys_fuzzy("pyth").unwrap(), vec!["python"]);
    }

    #[test]
    fn reset_recreates_empty_tables() {
        let store = seeded();
        store.reset().unwrap();
        let totals = store.health_totals().unwrap();
        assert_eq!((totals.users, totals.skills, totals.evidence), (0, 0, 0));
    }
}
