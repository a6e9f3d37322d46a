use crate::merchant;
use crate::models::{ColumnMapping, ErrorReason, NormalizedTransaction, RowError};
use crate::settings::Settings;

/// Parse a raw amount cell into a signed decimal. Strips currency symbols,
/// thousands separators and stray quotes; accounting-style parentheses mean
/// negative. Unparseable input is an error, never silently zero.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

/// Parse a date cell into ISO format. Accepts M/D/Y, ISO Y-M-D and bare
/// Excel serial numbers (how calamine renders untyped date cells).
pub fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() == 3 {
        let m: u32 = parts[0].parse().ok()?;
        let d: u32 = parts[1].parse().ok()?;
        let y: i32 = parts[2].parse().ok()?;
        return chrono::NaiveDate::from_ymd_opt(y, m, d)
            .map(|dt| dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    if let Ok(serial) = raw.parse::<f64>() {
        // Plausible statement dates only; rejects amounts that leaked into
        // the date column.
        if (20000.0..60000.0).contains(&serial) {
            return Some(crate::sheets::excel_serial_to_date(serial));
        }
    }
    None
}

/// Convert one raw row into a valid transaction or exactly one classified
/// error. Steps run in a fixed order: date, amount, merchant, payment
/// classification. The amount sign is preserved exactly as the source wrote
/// it; the file convention is applied later, at persist time.
pub fn normalize_row(
    sheet_name: &str,
    row_index: usize,
    row: &[String],
    mapping: ColumnMapping,
    settings: &Settings,
) -> Result<NormalizedTransaction, RowError> {
    let err = |reason: ErrorReason, message: String| RowError {
        sheet: sheet_name.to_string(),
        row: row_index,
        reason,
        message,
    };

    let date_cell = row.get(mapping.date).map(String::as_str).unwrap_or("");
    let Some(date) = parse_date(date_cell) else {
        return Err(err(
            ErrorReason::DateParse,
            format!("unparseable date '{date_cell}'"),
        ));
    };

    let amount_cell = row.get(mapping.amount).map(String::as_str).unwrap_or("");
    let Some(amount_raw) = parse_amount(amount_cell) else {
        return Err(err(
            ErrorReason::AmountParse,
            format!("unparseable amount '{amount_cell}'"),
        ));
    };

    let merchant_raw = row
        .get(mapping.merchant)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let merchant = merchant::normalize(&merchant_raw, settings);
    if merchant.is_empty() {
        return Err(err(ErrorReason::Other, "empty merchant".to_string()));
    }

    if let Some(reason) = merchant::payment_kind(&merchant, settings) {
        return Err(err(reason, format!("payment-like merchant '{merchant}'")));
    }

    Ok(NormalizedTransaction {
        date,
        merchant_raw,
        merchant,
        amount_raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING: ColumnMapping = ColumnMapping {
        date: 0,
        merchant: 1,
        amount: 2,
    };

    fn row(date: &str, merchant: &str, amount: &str) -> Vec<String> {
        vec![date.to_string(), merchant.to_string(), amount.to_string()]
    }

    fn normalize(r: &[String]) -> Result<NormalizedTransaction, RowError> {
        normalize_row("test", 1, r, MAPPING, &Settings::default())
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"500.00\""), Some(500.0));
        assert_eq!(parse_amount("  -42.50  "), Some(-42.5));
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("(500.00)"), Some(-500.0));
        assert_eq!(parse_amount("not_a_number"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("01/15/2025"), Some("2025-01-15".to_string()));
        assert_eq!(parse_date("2025-01-15"), Some("2025-01-15".to_string()));
        assert_eq!(parse_date("45667"), Some("2025-01-10".to_string()));
        assert_eq!(parse_date("13/01/2025"), None);
        assert_eq!(parse_date("02/30/2025"), None);
        assert_eq!(parse_date("invalid"), None);
        assert_eq!(parse_date("12.50"), None);
    }

    #[test]
    fn test_valid_row_preserves_sign() {
        let tx = normalize(&row("01/15/2025", "Whole Foods", "-45.99")).unwrap();
        assert_eq!(tx.amount_raw, -45.99);
        assert_eq!(tx.date, "2025-01-15");
        assert_eq!(tx.merchant, "WHOLE FOODS");
        assert_eq!(tx.merchant_raw, "Whole Foods");
    }

    #[test]
    fn test_positive_amount_preserved_verbatim() {
        let tx = normalize(&row("01/15/2025", "REFUND CO", "25.00")).unwrap();
        assert_eq!(tx.amount_raw, 25.0);
    }

    #[test]
    fn test_bad_date_classified() {
        let e = normalize(&row("nope", "SHOP", "-1.00")).unwrap_err();
        assert_eq!(e.reason, ErrorReason::DateParse);
        assert_eq!(e.row, 1);
    }

    #[test]
    fn test_bad_amount_classified() {
        let e = normalize(&row("01/15/2025", "SHOP", "abc")).unwrap_err();
        assert_eq!(e.reason, ErrorReason::AmountParse);
        assert!(e.message.contains("abc"));
    }

    #[test]
    fn test_date_checked_before_amount() {
        let e = normalize(&row("nope", "SHOP", "abc")).unwrap_err();
        assert_eq!(e.reason, ErrorReason::DateParse);
    }

    #[test]
    fn test_payment_merchant_excluded() {
        let e = normalize(&row("01/15/2025", "AUTOMATIC PAYMENT THANK YOU", "-500.00"))
            .unwrap_err();
        assert_eq!(e.reason, ErrorReason::Payment);
        assert!(e.reason.is_benign());
    }

    #[test]
    fn test_credit_card_payment_sub_pattern() {
        let e = normalize(&row("01/15/2025", "Credit Card Payment 0423", "-500.00"))
            .unwrap_err();
        assert_eq!(e.reason, ErrorReason::CreditCardPayment);
    }

    #[test]
    fn test_empty_merchant_is_other() {
        let e = normalize(&row("01/15/2025", "  ", "-1.00")).unwrap_err();
        assert_eq!(e.reason, ErrorReason::Other);
    }
}
