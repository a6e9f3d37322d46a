use regex::Regex;

use crate::error::{Result, SiftError};
use crate::models::{ColumnMapping, Sheet};

const ROLES: &[(&str, &str)] = &[
    ("date", r"(?i)date"),
    ("amount", r"(?i)amount|debit|credit"),
    ("merchant", r"(?i)description|merchant|payee"),
];

/// Map a sheet's headers to semantic roles. Each role takes the first
/// (lowest-index) matching header not already claimed by an earlier role;
/// a missing required role fails the whole sheet.
pub fn detect_columns(sheet: &Sheet) -> Result<ColumnMapping> {
    let mut claimed: Vec<usize> = Vec::new();
    let mut resolved: Vec<usize> = Vec::new();

    for (role, pattern) in ROLES {
        let re = Regex::new(pattern).unwrap();
        let found = sheet
            .headers
            .iter()
            .enumerate()
            .find(|(i, h)| !claimed.contains(i) && re.is_match(h))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                claimed.push(i);
                resolved.push(i);
            }
            None => {
                return Err(SiftError::ColumnDetection {
                    sheet: sheet.name.clone(),
                    role,
                })
            }
        }
    }

    Ok(ColumnMapping {
        date: resolved[0],
        amount: resolved[1],
        merchant: resolved[2],
    })
}
