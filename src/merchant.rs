use crate::models::ErrorReason;
use crate::settings::Settings;

/// Canonicalize merchant text: trim, collapse internal whitespace, uppercase,
/// truncate to the configured maximum. The caller keeps the raw string
/// alongside whenever the two differ; the original is never discarded.
pub fn normalize(raw: &str, settings: &Settings) -> String {
    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = collapsed.to_uppercase();
    if upper.len() > settings.merchant_max_len {
        let mut end = settings.merchant_max_len;
        while !upper.is_char_boundary(end) {
            end -= 1;
        }
        upper[..end].trim_end().to_string()
    } else {
        upper
    }
}

/// Classify a normalized merchant against the payment keyword lists.
/// Credit-card patterns are checked first since they are the more specific
/// sub-pattern; returns None for ordinary merchants.
pub fn payment_kind(normalized: &str, settings: &Settings) -> Option<ErrorReason> {
    for keyword in &settings.credit_card_payment_keywords {
        if normalized.contains(keyword.as_str()) {
            return Some(ErrorReason::CreditCardPayment);
        }
    }
    for keyword in &settings.payment_keywords {
        if normalized.contains(keyword.as_str()) {
            return Some(ErrorReason::Payment);
        }
    }
    None
}

pub fn is_payment_merchant(normalized: &str, settings: &Settings) -> bool {
    payment_kind(normalized, settings).is_some()
}
