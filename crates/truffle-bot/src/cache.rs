use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::ExpertApiClient;

/// Cache entries expire after an hour; queries tolerate slightly stale
/// taxonomies.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Snapshot of the skill vocabulary the query parser matches against.
#[derive(Debug, Clone, Default)]
pub struct SkillTerms {
    /// Lowercased names and aliases.
    pub terms: HashSet<String>,
    /// term -> canonical skill key.
    pub term_to_key: HashMap<String, String>,
    pub domains: Vec<String>,
}

impl SkillTerms {
    pub fn key_for(&self, term: &str) -> Option<&String> {
        self.term_to_key.get(&term.to_lowercase())
    }
}

struct CacheState {
    snapshot: Arc<SkillTerms>,
    skill_count: usize,
    refreshed_at: Option<Instant>,
}

/// TTL cache of the Expert API's skill list, with a single-flight refresh
/// lock so concurrent events do not stampede the API.
pub struct SkillCache {
    api: Arc<ExpertApiClient>,
    state: Mutex<CacheState>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SkillCache {
    pub fn new(api: Arc<ExpertApiClient>) -> Self {
        Self {
            api,
            state: Mutex::new(CacheState {
                snapshot: Arc::new(SkillTerms::default()),
                skill_count: 0,
                refreshed_at: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current vocabulary, refreshed from the Expert API if stale. A
    /// failed refresh serves the previous snapshot.
    pub async fn terms(&self) -> Arc<SkillTerms> {
        if self.is_fresh() {
            return self.state.lock().unwrap().snapshot.clone();
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if self.is_fresh() {
            return self.state.lock().unwrap().snapshot.clone();
        }

        match self.refresh().await {
            Ok(()) => {}
            Err(e) => warn!("skill cache refresh failed, serving stale data: {e}"),
        }
        self.state.lock().unwrap().snapshot.clone()
    }

    async fn refresh(&self) -> Result<(), crate::client::ApiError> {
        let response = self.api.list_skills().await?;

        let mut terms = HashSet::new();
        let mut term_to_key = HashMap::new();
        for skill in &response.skills {
            let name = skill.name.to_lowercase();
            terms.insert(name.clone());
            term_to_key.insert(name, skill.key.clone());
            for alias in &skill.aliases {
                let alias = alias.to_lowercase();
                terms.insert(alias.clone());
                term_to_key.insert(alias, skill.key.clone());
            }
        }

        let snapshot = SkillTerms {
            terms,
            term_to_key,
            domains: response.domains,
        };
        info!(
            skills = response.skills.len(),
            terms = snapshot.terms.len(),
            "skill cache refreshed"
        );

        let mut state = self.state.lock().unwrap();
        state.snapshot = Arc::new(snapshot);
        state.skill_count = response.skills.len();
        state.refreshed_at = Some(Instant::now());
        Ok(())
    }

    fn is_fresh(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .refreshed_at
            .map(|at| at.elapsed() < CACHE_TTL)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> Value {
        let state = self.state.lock().unwrap();
        json!({
            "skills_count": state.skill_count,
            "terms_count": state.snapshot.terms.len(),
            "domains_count": state.snapshot.domains.len(),
            "cache_age_secs": state.refreshed_at.map(|at| at.elapsed().as_secs()),
        })
    }
}
