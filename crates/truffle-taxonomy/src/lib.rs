pub mod error;
pub mod loader;
pub mod matcher;
pub mod types;

pub use error::TaxonomyError;
pub use matcher::SkillMatcher;
pub use types::Skill;
