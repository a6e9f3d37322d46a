use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::{Rule, SourceFile, TransactionRecord};

/// Write-time schema: spending is derived once at insert and the structural
/// invariants are CHECK constraints, not post-hoc diagnostics. The UNIQUE
/// index on `source_files.file_hash` is the duplicate gate of record; the
/// application-level pre-check is only a shortcut. Rows carrying an import
/// error are review placeholders with no parsed amount, so the derived-amount
/// checks exempt them.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS source_files (
    id INTEGER PRIMARY KEY,
    file_hash TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    uploaded_at TEXT DEFAULT (datetime('now')),
    amount_convention TEXT NOT NULL CHECK (amount_convention IN ('negative', 'positive'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    source_file_hash TEXT NOT NULL REFERENCES source_files(file_hash),
    date TEXT,
    merchant_raw TEXT NOT NULL DEFAULT '',
    merchant TEXT NOT NULL,
    amount_raw REAL,
    amount_spending REAL NOT NULL DEFAULT 0 CHECK (amount_spending >= 0),
    amount_convention TEXT NOT NULL CHECK (amount_convention IN ('negative', 'positive')),
    is_credit INTEGER NOT NULL DEFAULT 0,
    is_payment INTEGER NOT NULL DEFAULT 0,
    category TEXT,
    confidence REAL,
    status TEXT NOT NULL CHECK (status IN ('approved', 'pending_review')),
    import_error_reason TEXT,
    import_error_message TEXT,
    notes TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    CHECK (import_error_reason IS NOT NULL
           OR (amount_spending > 0) = (is_credit = 0 AND is_payment = 0)),
    CHECK (import_error_reason IS NOT NULL OR length(merchant) > 0)
);

CREATE INDEX IF NOT EXISTS idx_transactions_file ON transactions(source_file_hash);
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT NOT NULL DEFAULT 'contains',
    category TEXT NOT NULL,
    institution TEXT,
    priority INTEGER DEFAULT 0,
    hit_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn source_file_exists(conn: &Connection, file_hash: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM source_files WHERE file_hash = ?1")?;
    Ok(stmt.exists([file_hash])?)
}

/// True only for UNIQUE/PRIMARY KEY failures. The primary
/// ConstraintViolation code also covers CHECK, NOT NULL and FK failures,
/// which must not be mistaken for a duplicate upload.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Commit one upload batch atomically: the source file row, every
/// transaction record and the rule hit counts, or nothing. A concurrent
/// upload of the same file loses on the UNIQUE file_hash index here,
/// regardless of any earlier application-level check.
pub fn insert_batch(
    conn: &Connection,
    source_file: &SourceFile,
    records: &[TransactionRecord],
    rule_hits: &[(i64, usize)],
) -> std::result::Result<usize, rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO source_files (file_hash, user_id, filename, amount_convention) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            source_file.file_hash,
            source_file.user_id,
            source_file.filename,
            source_file.amount_convention.as_str(),
        ],
    )?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO transactions (user_id, source_file_hash, date, merchant_raw, merchant, \
             amount_raw, amount_spending, amount_convention, is_credit, is_payment, category, \
             confidence, status, import_error_reason, import_error_message, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;
        for r in records {
            stmt.execute(rusqlite::params![
                r.user_id,
                r.source_file_hash,
                r.date,
                r.merchant_raw,
                r.merchant,
                r.amount_raw,
                r.amount_spending,
                r.amount_convention.as_str(),
                r.is_credit,
                r.is_payment,
                r.category,
                r.confidence,
                r.status.as_str(),
                r.import_error_reason,
                r.import_error_message,
                r.notes,
            ])?;
            inserted += 1;
        }
    }
    for (rule_id, hits) in rule_hits {
        tx.execute(
            "UPDATE rules SET hit_count = hit_count + ?1 WHERE id = ?2",
            rusqlite::params![*hits as i64, rule_id],
        )?;
    }
    tx.commit()?;
    Ok(inserted)
}

/// Re-read what actually landed for a file: row count and spending sum.
pub fn verify_batch(conn: &Connection, file_hash: &str) -> Result<(usize, f64)> {
    let (count, sum): (i64, f64) = conn.query_row(
        "SELECT count(*), COALESCE(SUM(amount_spending), 0) FROM transactions \
         WHERE source_file_hash = ?1",
        [file_hash],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((count as usize, sum))
}

/// Remove source files that own zero transactions, the known failure mode
/// left behind by aborted uploads.
pub fn delete_orphaned_source_files(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM source_files WHERE file_hash NOT IN \
         (SELECT DISTINCT source_file_hash FROM transactions)",
        [],
    )?;
    Ok(deleted)
}

pub fn load_rules(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category, institution, priority, hit_count, is_active \
         FROM rules WHERE is_active = 1 ORDER BY priority DESC, id ASC",
    )?;
    let rules = stmt
        .query_map([], |row| {
            Ok(Rule {
                id: row.get(0)?,
                pattern: row.get(1)?,
                match_type: row.get(2)?,
                category: row.get(3)?,
                institution: row.get(4)?,
                priority: row.get(5)?,
                hit_count: row.get(6)?,
                is_active: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

pub fn add_rule(conn: &Connection, rule: &Rule) -> Result<i64> {
    conn.execute(
        "INSERT INTO rules (pattern, match_type, category, institution, priority, is_active) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            rule.pattern,
            rule.match_type,
            rule.category,
            rule.institution,
            rule.priority,
            rule.is_active,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Copy)]
pub struct DbStats {
    pub file_count: usize,
    pub transaction_count: usize,
    pub approved: usize,
    pub pending_review: usize,
    pub total_spending: f64,
}

pub fn stats(conn: &Connection) -> Result<DbStats> {
    let file_count: i64 = conn.query_row("SELECT count(*) FROM source_files", [], |r| r.get(0))?;
    let (transaction_count, approved, pending_review, total_spending): (i64, i64, i64, f64) =
        conn.query_row(
            "SELECT count(*), \
             COALESCE(SUM(status = 'approved'), 0), \
             COALESCE(SUM(status = 'pending_review'), 0), \
             COALESCE(SUM(amount_spending), 0) FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
    Ok(DbStats {
        file_count: file_count as usize,
        transaction_count: transaction_count as usize,
        approved: approved as usize,
        pending_review: pending_review as usize,
        total_spending,
    })
}
