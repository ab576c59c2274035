use rusqlite::{Connection, Result};

/// Initialise all tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_skills_table(conn)?;
    create_evidence_table(conn)?;
    create_scores_table(conn)?;
    Ok(())
}

/// Drop everything. Used by the operational reset endpoint.
pub fn drop_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS user_skill_scores;
         DROP TABLE IF EXISTS expertise_evidence;
         DROP TABLE IF EXISTS skills;
         DROP TABLE IF EXISTS users;",
    )
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            user_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id  TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            timezone     TEXT,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );",
    )
}

fn create_skills_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS skills (
            skill_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            skill_key  TEXT NOT NULL UNIQUE,
            name       TEXT NOT NULL,
            domain     TEXT NOT NULL,
            aliases    TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
}

/// Evidence rows are append-only. The partial unique index makes the
/// (user, skill, message_hash) dedup a database guarantee, not just a
/// read-then-write convention.
fn create_evidence_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS expertise_evidence (
            evidence_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL REFERENCES users(user_id),
            skill_id      INTEGER NOT NULL REFERENCES skills(skill_id),
            label         TEXT NOT NULL,
            confidence    REAL NOT NULL,
            evidence_date TEXT NOT NULL,
            message_hash  TEXT,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_evidence_user_skill
            ON expertise_evidence(user_id, skill_id);
        CREATE INDEX IF NOT EXISTS idx_evidence_date
            ON expertise_evidence(evidence_date);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_evidence_dedup
            ON expertise_evidence(user_id, skill_id, message_hash)
            WHERE message_hash IS NOT NULL;",
    )
}

fn create_scores_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_skill_scores (
            user_id            INTEGER NOT NULL REFERENCES users(user_id),
            skill_id           INTEGER NOT NULL REFERENCES skills(skill_id),
            score              REAL NOT NULL,
            evidence_count     INTEGER NOT NULL,
            last_evidence_date TEXT NOT NULL,
            PRIMARY KEY (user_id, skill_id)
        );",
    )
}
