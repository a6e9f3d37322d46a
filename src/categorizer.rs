use rusqlite::Connection;

use crate::error::Result;
use crate::models::{CategoryAssignment, CategoryPreview, Rule, Status};
use crate::settings::Settings;

fn rule_matches(merchant: &str, rule: &Rule) -> Option<f64> {
    let pattern = rule.pattern.to_uppercase();
    match rule.match_type.as_str() {
        "exact" => (merchant == pattern).then_some(1.0),
        _ => merchant.contains(&pattern).then_some(0.95),
    }
}

/// Graded fallback for merchants no rule matches directly: the fraction of
/// the pattern's tokens present in the merchant, capped below direct-match
/// confidence so a similarity hit never outranks a real rule hit.
fn similarity(merchant: &str, pattern: &str) -> f64 {
    let merchant_tokens: Vec<String> = merchant
        .split_whitespace()
        .map(|t| t.to_uppercase())
        .collect();
    let pattern_tokens: Vec<String> = pattern
        .split_whitespace()
        .map(|t| t.to_uppercase())
        .collect();
    if pattern_tokens.is_empty() {
        return 0.0;
    }
    let hits = pattern_tokens
        .iter()
        .filter(|t| merchant_tokens.contains(t))
        .count();
    0.9 * hits as f64 / pattern_tokens.len() as f64
}

fn status_for(category: Option<&String>, confidence: f64, settings: &Settings) -> Status {
    if category.is_some() && confidence >= settings.approval_threshold {
        Status::Approved
    } else {
        Status::PendingReview
    }
}

/// Assign a category and confidence to one normalized merchant. Direct rule
/// matches run first in priority order; unmatched merchants fall back to the
/// similarity scorer. Approval is a pure function of confidence and the
/// configured threshold.
pub fn categorize(merchant: &str, rules: &[Rule], settings: &Settings) -> CategoryAssignment {
    for rule in rules.iter().filter(|r| r.is_active) {
        if let Some(confidence) = rule_matches(merchant, rule) {
            return CategoryAssignment {
                category: Some(rule.category.clone()),
                confidence,
                status: status_for(Some(&rule.category), confidence, settings),
                rule_id: rule.id,
            };
        }
    }

    let mut best: Option<(&Rule, f64)> = None;
    for rule in rules.iter().filter(|r| r.is_active) {
        let score = similarity(merchant, &rule.pattern);
        if score > 0.0 && best.map_or(true, |(_, b)| score > b) {
            best = Some((rule, score));
        }
    }

    match best {
        Some((rule, confidence)) => CategoryAssignment {
            category: Some(rule.category.clone()),
            confidence,
            status: status_for(Some(&rule.category), confidence, settings),
            rule_id: None,
        },
        None => CategoryAssignment {
            category: None,
            confidence: 0.0,
            status: Status::PendingReview,
            rule_id: None,
        },
    }
}

/// Propose categories for a user's uncategorized transactions using rules
/// learned from *other* institutions, at the preview threshold. Output is a
/// preview only; nothing is written until `apply_previews` is called.
pub fn preview_cross_institution(
    conn: &Connection,
    user_id: &str,
    institution: &str,
    settings: &Settings,
) -> Result<Vec<CategoryPreview>> {
    let rules: Vec<Rule> = crate::db::load_rules(conn)?
        .into_iter()
        .filter(|r| r.institution.as_deref().map_or(false, |i| i != institution))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT id, merchant FROM transactions \
         WHERE user_id = ?1 AND category IS NULL AND import_error_reason IS NULL",
    )?;
    let pending: Vec<(i64, String)> = stmt
        .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut previews = Vec::new();
    for (id, merchant) in pending {
        let assignment = categorize(&merchant, &rules, settings);
        if let Some(category) = assignment.category {
            if assignment.confidence >= settings.preview_threshold {
                previews.push(CategoryPreview {
                    transaction_id: id,
                    merchant,
                    category,
                    confidence: assignment.confidence,
                });
            }
        }
    }
    Ok(previews)
}

/// Explicitly commit previewed categories. Updates category and status only;
/// amounts, flags and provenance are immutable after ingest.
pub fn apply_previews(
    conn: &Connection,
    previews: &[CategoryPreview],
    settings: &Settings,
) -> Result<usize> {
    let mut applied = 0;
    for preview in previews {
        let status = status_for(Some(&preview.category), preview.confidence, settings);
        applied += conn.execute(
            "UPDATE transactions SET category = ?1, confidence = ?2, status = ?3 WHERE id = ?4",
            rusqlite::params![
                preview.category,
                preview.confidence,
                status.as_str(),
                preview.transaction_id
            ],
        )?;
    }
    Ok(applied)
}
