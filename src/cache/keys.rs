//! Cache key conventions.
//!
//! The key namespaces are part of the external contract (dashboards and the
//! mobile clients read some of them), so the literal formats here must not
//! change.

use chrono::NaiveDate;

/// Key for a card's cached status summary.
pub fn card_status(card_uuid: &str) -> String {
    format!("cardStatus:{}", card_uuid)
}

/// Key for the daily spending accumulator of a card on a given date.
pub fn daily_spending(card_uuid: &str, date: NaiveDate) -> String {
    format!("dailySpending:{}:{}", card_uuid, date.format("%Y-%m-%d"))
}

/// Prefix matching every daily accumulator of a card, regardless of date.
pub fn daily_spending_prefix(card_uuid: &str) -> String {
    format!("dailySpending:{}:", card_uuid)
}

/// Key for a cached fast-validation result.
pub fn fast_validation(card_uuid: &str, amount: u64) -> String {
    format!("fastValidation:{}:{}", card_uuid, amount)
}

/// Prefix matching every fast-validation entry of a card.
pub fn fast_validation_prefix(card_uuid: &str) -> String {
    format!("fastValidation:{}:", card_uuid)
}

/// Key for a user's notification feed.
pub fn user_notifications(user_id: &str) -> String {
    format!("user:notifications:{}", user_id)
}

/// Key for an issued authorization code.
pub fn auth_code(code: &str) -> String {
    format!("authCode:{}", code)
}

/// Key for the admin manual-review alert list.
pub const ADMIN_FAILED_TRANSACTIONS: &str = "admin:failed_transactions";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats_are_stable() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(card_status("abc"), "cardStatus:abc");
        assert_eq!(daily_spending("abc", date), "dailySpending:abc:2024-03-07");
        assert_eq!(fast_validation("abc", 100_000), "fastValidation:abc:100000");
        assert_eq!(user_notifications("u1"), "user:notifications:u1");
    }

    #[test]
    fn test_prefixes_cover_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(daily_spending("abc", date).starts_with(&daily_spending_prefix("abc")));
        assert!(fast_validation("abc", 5).starts_with(&fast_validation_prefix("abc")));
    }
}
