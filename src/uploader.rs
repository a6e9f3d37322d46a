use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::categorizer;
use crate::columns::detect_columns;
use crate::convention::detect_convention;
use crate::db;
use crate::error::{Result, SiftError};
use crate::models::{
    AmountConvention, ColumnMapping, ConventionDetection, ErrorReason, FileUploadResult,
    NormalizedTransaction, RowError, Sheet, SourceFile, Status, TransactionRecord, UploadResult,
};
use crate::normalizer::{self, normalize_row};
use crate::settings::Settings;

/// One file in an upload request. The convention override, when present,
/// replaces the heuristic detection entirely.
pub struct UploadFile {
    pub filename: String,
    pub content: Vec<u8>,
    pub convention: Option<AmountConvention>,
}

/// Post-commit integrity comparison: strict on row count, within epsilon on
/// the spending sum.
pub fn integrity_ok(expected: (usize, f64), actual: (usize, f64), epsilon: f64) -> bool {
    expected.0 == actual.0 && (actual.1 - expected.1).abs() <= epsilon
}

/// Deterministic batch fingerprint: user, filename and content bytes.
/// Byte-identical re-uploads by the same user always collide.
pub fn fingerprint(user_id: &str, filename: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Upload several files. Files are processed independently and sequentially;
/// one file's failure never aborts its siblings, and every file gets a
/// complete report. Nothing escapes this boundary as an error.
pub fn upload_files(
    conn: &Connection,
    settings: &Settings,
    user_id: &str,
    files: &[UploadFile],
) -> UploadResult {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let result = match upload_file(conn, settings, user_id, file) {
            Ok(r) => r,
            Err(e) => FileUploadResult::failed(&file.filename, e.to_string()),
        };
        results.push(result);
    }
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    UploadResult {
        files: results,
        succeeded,
        failed,
    }
}

/// State machine for one file:
/// Received -> FingerprintChecked -> Parsed -> Normalized -> Categorized
///          -> Committed -> Verified -> Succeeded | Failed.
pub fn upload_file(
    conn: &Connection,
    settings: &Settings,
    user_id: &str,
    file: &UploadFile,
) -> Result<FileUploadResult> {
    // FingerprintChecked: duplicate short-circuit before any parsing work.
    // This check is only a shortcut; the UNIQUE index at commit is the gate.
    let file_hash = fingerprint(user_id, &file.filename, &file.content);
    if db::source_file_exists(conn, &file_hash)? {
        let mut result = FileUploadResult::failed(
            &file.filename,
            "duplicate upload: this file has already been ingested".to_string(),
        );
        result.duplicate = true;
        return Ok(result);
    }

    // Parsed: all sheets, then columns + convention from the first sheet
    // that has usable headers and rows.
    let sheets = crate::sheets::read_sheets(&file.content, &file.filename)?;
    let mut sheet_errors: Vec<RowError> = Vec::new();
    let mut mapped: Vec<(&Sheet, ColumnMapping)> = Vec::new();
    for sheet in sheets.iter().filter(|s| !s.is_empty()) {
        match detect_columns(sheet) {
            Ok(mapping) => mapped.push((sheet, mapping)),
            Err(e) => sheet_errors.push(RowError {
                sheet: sheet.name.clone(),
                row: 0,
                reason: ErrorReason::Other,
                message: format!("sheet skipped: {e}"),
            }),
        }
    }
    let Some(&(first_sheet, first_mapping)) = mapped.first() else {
        let mut result = FileUploadResult::failed(
            &file.filename,
            SiftError::EmptyFile.to_string(),
        );
        result.errors = sheet_errors;
        return Ok(result);
    };

    let ConventionDetection { convention, source } = detect_convention(
        first_sheet,
        first_mapping,
        &file.filename,
        settings,
        file.convention,
    );

    // Normalized: every row of every mapped sheet, errors partitioned into
    // benign exclusions and fixable failures.
    let mut valid: Vec<NormalizedTransaction> = Vec::new();
    let mut benign: Vec<(NormalizedTransaction, ErrorReason)> = Vec::new();
    let mut fixable: Vec<(RowError, String, Option<String>)> = Vec::new();
    let mut reported: Vec<RowError> = sheet_errors;
    for (sheet, mapping) in &mapped {
        for (i, row) in sheet.rows.iter().enumerate() {
            match normalize_row(&sheet.name, i + 1, row, *mapping, settings) {
                Ok(tx) => valid.push(tx),
                Err(err) if err.reason.is_benign() => {
                    // Date and amount parsed cleanly (classification runs
                    // last), so the row is recoverable for persistence.
                    let date = row
                        .get(mapping.date)
                        .and_then(|c| normalizer::parse_date(c))
                        .unwrap_or_default();
                    let amount_raw = row
                        .get(mapping.amount)
                        .and_then(|c| normalizer::parse_amount(c))
                        .unwrap_or(0.0);
                    let merchant_raw = row
                        .get(mapping.merchant)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default();
                    let merchant = crate::merchant::normalize(&merchant_raw, settings);
                    benign.push((
                        NormalizedTransaction {
                            date,
                            merchant_raw,
                            merchant,
                            amount_raw,
                        },
                        err.reason,
                    ));
                    reported.push(err);
                }
                Err(err) => {
                    let merchant_raw = row
                        .get(mapping.merchant)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default();
                    // Whatever parsed before the failing step is kept on the
                    // placeholder for manual reconciliation.
                    let date = row
                        .get(mapping.date)
                        .and_then(|c| normalizer::parse_date(c));
                    fixable.push((err.clone(), merchant_raw, date));
                    reported.push(err);
                }
            }
        }
    }

    // Categorized: rules applied to the valid set only.
    let rules = db::load_rules(conn)?;
    let assignments: Vec<_> = valid
        .iter()
        .map(|tx| categorizer::categorize(&tx.merchant, &rules, settings))
        .collect();

    // Assemble the batch: spending rows, credits, benign payment rows with
    // zero spending, and pending_review placeholders for fixable errors.
    let mut records: Vec<TransactionRecord> = Vec::new();
    for (tx, assignment) in valid.iter().zip(&assignments) {
        let amount_spending = convention.spending(tx.amount_raw);
        records.push(TransactionRecord {
            id: None,
            user_id: user_id.to_string(),
            source_file_hash: file_hash.clone(),
            date: Some(tx.date.clone()),
            merchant_raw: tx.merchant_raw.clone(),
            merchant: tx.merchant.clone(),
            amount_raw: Some(tx.amount_raw),
            amount_spending,
            amount_convention: convention,
            is_credit: amount_spending == 0.0,
            is_payment: false,
            category: assignment.category.clone(),
            confidence: Some(assignment.confidence),
            status: assignment.status,
            import_error_reason: None,
            import_error_message: None,
            notes: None,
        });
    }
    for (tx, reason) in &benign {
        records.push(TransactionRecord {
            id: None,
            user_id: user_id.to_string(),
            source_file_hash: file_hash.clone(),
            date: Some(tx.date.clone()),
            merchant_raw: tx.merchant_raw.clone(),
            merchant: tx.merchant.clone(),
            amount_raw: Some(tx.amount_raw),
            amount_spending: 0.0,
            amount_convention: convention,
            is_credit: convention.is_credit(tx.amount_raw),
            is_payment: true,
            category: None,
            confidence: None,
            status: Status::Approved,
            import_error_reason: Some(reason.as_str().to_string()),
            import_error_message: None,
            notes: None,
        });
    }
    for (err, merchant_raw, date) in &fixable {
        records.push(TransactionRecord {
            id: None,
            user_id: user_id.to_string(),
            source_file_hash: file_hash.clone(),
            date: date.clone(),
            merchant_raw: merchant_raw.clone(),
            merchant: crate::merchant::normalize(merchant_raw, settings),
            amount_raw: None,
            amount_spending: 0.0,
            amount_convention: convention,
            is_credit: false,
            is_payment: false,
            category: None,
            confidence: None,
            status: Status::PendingReview,
            import_error_reason: Some(err.reason.as_str().to_string()),
            import_error_message: Some(err.message.clone()),
            notes: None,
        });
    }

    // Expected aggregate, computed before commit.
    let expected_count = records.len();
    let expected_sum: f64 = records.iter().map(|r| r.amount_spending).sum();

    // Hit counts for rules that matched directly, committed with the batch.
    let mut hits: Vec<(i64, usize)> = Vec::new();
    for assignment in &assignments {
        if let Some(rule_id) = assignment.rule_id {
            match hits.iter_mut().find(|(id, _)| *id == rule_id) {
                Some((_, n)) => *n += 1,
                None => hits.push((rule_id, 1)),
            }
        }
    }

    // Committed: one batch, all or nothing for this file.
    let source_file = SourceFile {
        id: None,
        file_hash: file_hash.clone(),
        user_id: user_id.to_string(),
        filename: file.filename.clone(),
        uploaded_at: None,
        amount_convention: convention,
    };
    if let Err(e) = db::insert_batch(conn, &source_file, &records, &hits) {
        let mut result = if db::is_unique_violation(&e) {
            let mut r = FileUploadResult::failed(
                &file.filename,
                "duplicate upload: this file has already been ingested".to_string(),
            );
            r.duplicate = true;
            r
        } else {
            FileUploadResult::failed(&file.filename, format!("insert failed: {e}"))
        };
        result.convention = Some(convention);
        result.convention_source = Some(source);
        result.errors = reported;
        return Ok(result);
    }

    // Verified: re-read what actually landed and compare against the
    // expectation. A mismatch is reported loudly; the data stays committed.
    let (actual_count, actual_sum) = db::verify_batch(conn, &file_hash)?;
    let integrity_ok = integrity_ok(
        (expected_count, expected_sum),
        (actual_count, actual_sum),
        settings.integrity_epsilon,
    );

    let spending_count = records
        .iter()
        .filter(|r| r.amount_spending > 0.0)
        .count();
    let credit_count = records
        .iter()
        .filter(|r| r.is_credit && !r.is_payment && r.import_error_reason.is_none())
        .count();
    let payment_count = records.iter().filter(|r| r.is_payment).count();

    let message = if integrity_ok {
        format!(
            "imported {expected_count} records ({spending_count} spending, \
             {credit_count} credits, {payment_count} payments, {} flagged for review)",
            fixable.len()
        )
    } else {
        format!(
            "integrity mismatch: expected {expected_count} records summing to \
             {expected_sum:.2}, found {actual_count} summing to {actual_sum:.2}; \
             data committed, manual review required"
        )
    };

    Ok(FileUploadResult {
        filename: file.filename.clone(),
        success: integrity_ok,
        duplicate: false,
        integrity_mismatch: !integrity_ok,
        message,
        transaction_count: actual_count,
        spending_count,
        credit_count,
        payment_count,
        error_count: fixable.len(),
        total_spending: actual_sum,
        convention: Some(convention),
        convention_source: Some(source),
        errors: reported,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::{ConventionSource, Rule};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn upload(
        conn: &Connection,
        filename: &str,
        content: &[u8],
        convention: Option<AmountConvention>,
    ) -> FileUploadResult {
        let file = UploadFile {
            filename: filename.to_string(),
            content: content.to_vec(),
            convention,
        };
        upload_file(conn, &Settings::default(), "u1", &file).unwrap()
    }

    const FIVE_ROW_FILE: &[u8] = b"\
Date,Description,Amount
01/15/2025,WHOLE FOODS MARKET,-45.99
01/16/2025,COFFEE SHOP,-5.50
01/17/2025,MERCHANDISE RETURN,25.00
01/18/2025,AUTOMATIC PAYMENT THANK YOU,-500.00
01/19/2025,HARDWARE STORE,-89.32
";

    #[test]
    fn test_end_to_end_counts_and_totals() {
        let (_dir, conn) = test_db();
        let result = upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.transaction_count, 5);
        assert_eq!(result.spending_count, 3);
        assert_eq!(result.credit_count, 1);
        assert_eq!(result.payment_count, 1);
        assert!((result.total_spending - 140.81).abs() < 0.01);
        assert!(!result.integrity_mismatch);
        assert_eq!(result.convention, Some(AmountConvention::Negative));
        assert_eq!(result.convention_source, Some(ConventionSource::Override));
    }

    #[test]
    fn test_duplicate_upload_rejected_totals_unchanged() {
        let (_dir, conn) = test_db();
        let first = upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        assert!(first.success);
        let second = upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        assert!(!second.success);
        assert!(second.duplicate);
        assert!(!second.integrity_mismatch);
        assert_eq!(second.transaction_count, 0);

        let stats = db::stats(&conn).unwrap();
        assert_eq!(stats.transaction_count, 5);
        assert!((stats.total_spending - 140.81).abs() < 0.01);
    }

    #[test]
    fn test_same_content_different_filename_is_not_duplicate() {
        let (_dir, conn) = test_db();
        upload(&conn, "jan.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        let second = upload(&conn, "feb.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        assert!(second.success);
    }

    #[test]
    fn test_unparseable_amount_becomes_review_placeholder() {
        let (_dir, conn) = test_db();
        let content = b"\
Date,Description,Amount
01/15/2025,GOOD SHOP,-10.00
01/16/2025,BAD SHOP,oops
";
        let result = upload(&conn, "stmt.csv", content, Some(AmountConvention::Negative));
        assert!(result.success);
        assert_eq!(result.transaction_count, 2);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].reason, ErrorReason::AmountParse);

        let (reason, status, date): (String, String, Option<String>) = conn
            .query_row(
                "SELECT import_error_reason, status, date FROM transactions \
                 WHERE merchant_raw = 'BAD SHOP'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(reason, "amount_parse");
        assert_eq!(status, "pending_review");
        // The date parsed before the amount failed; it is kept for review.
        assert_eq!(date.as_deref(), Some("2025-01-16"));
    }

    #[test]
    fn test_unparseable_date_placeholder_has_no_date() {
        let (_dir, conn) = test_db();
        let content = b"\
Date,Description,Amount
not-a-date,ODD SHOP,-10.00
";
        let result = upload(&conn, "stmt.csv", content, Some(AmountConvention::Negative));
        assert!(result.success);
        let date: Option<String> = conn
            .query_row("SELECT date FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(date, None);
    }

    #[test]
    fn test_payment_excluded_regardless_of_sign() {
        let (_dir, conn) = test_db();
        let content = b"\
Date,Description,Amount
01/15/2025,AUTOPAY RECEIVED,250.00
01/16/2025,SHOP,-10.00
";
        let result = upload(&conn, "stmt.csv", content, Some(AmountConvention::Negative));
        assert!(result.success);
        assert_eq!(result.payment_count, 1);
        assert!((result.total_spending - 10.0).abs() < 1e-9);

        let (is_payment, spending): (bool, f64) = conn
            .query_row(
                "SELECT is_payment, amount_spending FROM transactions \
                 WHERE merchant_raw = 'AUTOPAY RECEIVED'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!(is_payment);
        assert_eq!(spending, 0.0);
    }

    #[test]
    fn test_amount_raw_stored_verbatim_and_roundtrips() {
        let (_dir, conn) = test_db();
        upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        let rows: Vec<(f64, f64, String)> = conn
            .prepare(
                "SELECT amount_raw, amount_spending, amount_convention FROM transactions \
                 WHERE import_error_reason IS NULL",
            )
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 4);
        for (raw, spending, convention) in rows {
            let convention = AmountConvention::from_str(&convention).unwrap();
            assert_eq!(convention.spending(raw), spending);
        }
    }

    #[test]
    fn test_categorization_and_approval() {
        let (_dir, conn) = test_db();
        db::add_rule(
            &conn,
            &Rule {
                id: None,
                pattern: "WHOLE FOODS".to_string(),
                match_type: "contains".to_string(),
                category: "Groceries".to_string(),
                institution: None,
                priority: 0,
                hit_count: 0,
                is_active: true,
            },
        )
        .unwrap();
        upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));

        let (category, status): (String, String) = conn
            .query_row(
                "SELECT category, status FROM transactions WHERE merchant = 'WHOLE FOODS MARKET'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(category, "Groceries");
        assert_eq!(status, "approved");

        let hits: i64 = conn
            .query_row("SELECT hit_count FROM rules", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hits, 1);

        // Unmatched merchants stay pending with no category.
        let status: String = conn
            .query_row(
                "SELECT status FROM transactions WHERE merchant = 'HARDWARE STORE'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "pending_review");
    }

    #[test]
    fn test_convention_detected_from_filename() {
        let (_dir, conn) = test_db();
        let result = upload(&conn, "chase_jan_2025.csv", FIVE_ROW_FILE, None);
        assert!(result.success);
        assert_eq!(result.convention, Some(AmountConvention::Negative));
        assert!(matches!(
            result.convention_source,
            Some(ConventionSource::FilenameKeyword { .. })
        ));
    }

    #[test]
    fn test_convention_inferred_from_sign_majority() {
        let (_dir, conn) = test_db();
        let result = upload(&conn, "mystery.csv", FIVE_ROW_FILE, None);
        assert_eq!(result.convention, Some(AmountConvention::Negative));
        assert!(matches!(
            result.convention_source,
            Some(ConventionSource::SignMajority { .. })
        ));
    }

    #[test]
    fn test_file_without_detectable_columns_fails_alone() {
        let (_dir, conn) = test_db();
        let content = b"Date,Description\n01/15/2025,NO AMOUNT COLUMN\n";
        let result = upload(&conn, "broken.csv", content, None);
        assert!(!result.success);
        assert!(!result.duplicate);
        assert_eq!(result.errors.len(), 1);
        // Nothing committed, so a later corrected upload is not a duplicate.
        assert_eq!(db::stats(&conn).unwrap().file_count, 0);
    }

    #[test]
    fn test_multi_file_isolation() {
        let (_dir, conn) = test_db();
        let files = vec![
            UploadFile {
                filename: "good.csv".to_string(),
                content: FIVE_ROW_FILE.to_vec(),
                convention: Some(AmountConvention::Negative),
            },
            UploadFile {
                filename: "broken.csv".to_string(),
                content: b"no,usable,headers\n1,2,3\n".to_vec(),
                convention: None,
            },
        ];
        let result = upload_files(&conn, &Settings::default(), "u1", &files);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert!(result.files[0].success);
        assert!(!result.files[1].success);
        assert_eq!(db::stats(&conn).unwrap().transaction_count, 5);
    }

    #[test]
    fn test_fingerprint_deterministic_and_user_scoped() {
        let a = fingerprint("u1", "stmt.csv", b"data");
        let b = fingerprint("u1", "stmt.csv", b"data");
        let c = fingerprint("u2", "stmt.csv", b"data");
        let d = fingerprint("u1", "stmt.csv", b"other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_integrity_comparison() {
        assert!(integrity_ok((5, 140.81), (5, 140.81), 0.01));
        assert!(integrity_ok((5, 140.81), (5, 140.815), 0.01));
        // Count is strict even when the sum agrees.
        assert!(!integrity_ok((5, 140.81), (4, 140.81), 0.01));
        // Sum drift beyond epsilon is a mismatch.
        assert!(!integrity_ok((5, 140.81), (5, 140.83), 0.01));
    }

    #[test]
    fn test_result_serializes_to_json() {
        let (_dir, conn) = test_db();
        let result = upload(&conn, "stmt.csv", FIVE_ROW_FILE, Some(AmountConvention::Negative));
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"transaction_count\":5"));
        assert!(json.contains("\"integrity_mismatch\":false"));
        assert!(json.contains("\"convention\":\"negative\""));
    }
}
