//! Ledger domain types
//!
//! The schema enforces the same invariants through CHECK constraints and a
//! trigger; these types let callers reject bad records before a round trip.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

static CURRENCY_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").ok());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("currency code '{0}' must be three uppercase letters")]
    InvalidCurrency(String),
    #[error("transaction amount must not be zero")]
    ZeroAmount,
    #[error("transaction {0} cannot be its own parent")]
    SelfParent(Uuid),
    #[error("transaction {child} splits {parent}, which is itself a split")]
    NestedSplit { parent: Uuid, child: Uuid },
    #[error("transaction {child} does not reference {parent} as its parent")]
    ParentMismatch { parent: Uuid, child: Uuid },
    #[error("split {child} is in {child_currency}, parent {parent} is in {parent_currency}")]
    CurrencyMismatch {
        parent: Uuid,
        child: Uuid,
        parent_currency: CurrencyCode,
        child_currency: CurrencyCode,
    },
    #[error("unknown review status '{0}'")]
    UnknownReviewStatus(String),
}

/// ISO-4217 style currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidCurrency` unless `code` is three uppercase ASCII letters.
    pub fn parse(code: &str) -> Result<Self, LedgerError> {
        if CURRENCY_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(code))
        {
            Ok(Self(code.to_string()))
        } else {
            Err(LedgerError::InvalidCurrency(code.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed, nonzero amount in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MoneyParts")]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

#[derive(Deserialize)]
struct MoneyParts {
    amount: Decimal,
    currency: CurrencyCode,
}

impl TryFrom<MoneyParts> for Money {
    type Error = LedgerError;

    fn try_from(parts: MoneyParts) -> Result<Self, Self::Error> {
        Self::new(parts.amount, parts.currency)
    }
}

impl Money {
    /// # Errors
    ///
    /// Returns `LedgerError::ZeroAmount` for a zero amount.
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        Ok(Self { amount, currency })
    }
}

/// Review state of a ledger record, as in the final `review_status` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Reviewed,
    NeedsReceipt,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 3] = [
        ReviewStatus::Pending,
        ReviewStatus::Reviewed,
        ReviewStatus::NeedsReceipt,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::NeedsReceipt => "needs_receipt",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LedgerError::UnknownReviewStatus(s.to_string()))
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entity type marks rows as no longer in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    /// Boolean `is_active` column
    ActiveFlag,
    /// Nullable `deleted_at` timestamp
    SoftDelete,
}

/// Reference-data entities with a single liveness signal each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupEntity {
    AccountType,
    FinancialInstitution,
}

impl LookupEntity {
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            LookupEntity::AccountType => "account_types",
            LookupEntity::FinancialInstitution => "financial_institutions",
        }
    }

    /// Liveness signal of the entity once the whole chain is applied
    #[must_use]
    pub fn liveness(self) -> Liveness {
        Liveness::SoftDelete
    }
}

/// A financial transaction (or one split of it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Set on splits; a split's parent is always a top-level record
    pub parent_id: Option<Uuid>,
    pub money: Money,
    pub date: NaiveDate,
    pub description: String,
    pub notes: Option<String>,
    pub review_status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

impl LedgerRecord {
    /// Checks that hold for a record on its own
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.money.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if self.parent_id == Some(self.id) {
            return Err(LedgerError::SelfParent(self.id));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        self.parent_id.is_some()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Check that `child` is a valid split of `parent`
///
/// # Errors
///
/// Returns an error if `child` does not point at `parent`, if `parent` is
/// itself a split, or if the currencies differ.
pub fn validate_split(parent: &LedgerRecord, child: &LedgerRecord) -> Result<(), LedgerError> {
    parent.validate()?;
    child.validate()?;
    if child.parent_id != Some(parent.id) {
        return Err(LedgerError::ParentMismatch {
            parent: parent.id,
            child: child.id,
        });
    }
    if parent.is_split() {
        return Err(LedgerError::NestedSplit {
            parent: parent.id,
            child: child.id,
        });
    }
    if parent.money.currency != child.money.currency {
        return Err(LedgerError::CurrencyMismatch {
            parent: parent.id,
            child: child.id,
            parent_currency: parent.money.currency.clone(),
            child_currency: child.money.currency.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("USD").unwrap()
    }

    fn record(amount: i64, parent_id: Option<Uuid>) -> LedgerRecord {
        let now = Utc::now();
        LedgerRecord {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            parent_id,
            money: Money {
                amount: Decimal::new(amount, 2),
                currency: usd(),
            },
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Groceries".to_string(),
            notes: None,
            review_status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: None,
            updated_by: None,
        }
    }

    #[test]
    fn test_currency_code_validation() {
        assert!(CurrencyCode::parse("EUR").is_ok());
        assert!(CurrencyCode::parse("eur").is_err());
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("E1R").is_err());
    }

    #[test]
    fn test_currency_code_deserialize_is_validated() {
        let ok: CurrencyCode = serde_json::from_str("\"GBP\"").unwrap();
        assert_eq!(ok.as_str(), "GBP");
        assert!(serde_json::from_str::<CurrencyCode>("\"gbp\"").is_err());
    }

    #[test]
    fn test_money_rejects_zero() {
        assert_eq!(Money::new(Decimal::ZERO, usd()), Err(LedgerError::ZeroAmount));
        assert!(Money::new(Decimal::new(-1250, 2), usd()).is_ok());
    }

    #[test]
    fn test_money_deserialize_is_validated() {
        let ok: Money = serde_json::from_str(r#"{"amount":"-12.50","currency":"USD"}"#).unwrap();
        assert_eq!(ok.amount, Decimal::new(-1250, 2));
        assert!(serde_json::from_str::<Money>(r#"{"amount":"0","currency":"USD"}"#).is_err());
        assert!(serde_json::from_str::<Money>(r#"{"amount":"5","currency":"usd"}"#).is_err());
    }

    #[test]
    fn test_record_cannot_parent_itself() {
        let mut r = record(1000, None);
        r.parent_id = Some(r.id);
        assert_eq!(r.validate(), Err(LedgerError::SelfParent(r.id)));
    }

    #[test]
    fn test_split_hierarchy_is_single_level() {
        let parent = record(-5000, None);
        let child = record(-2000, Some(parent.id));
        assert!(validate_split(&parent, &child).is_ok());

        let grandchild = record(-500, Some(child.id));
        assert!(matches!(
            validate_split(&child, &grandchild),
            Err(LedgerError::NestedSplit { .. })
        ));

        let stranger = record(-500, Some(Uuid::new_v4()));
        assert!(matches!(
            validate_split(&parent, &stranger),
            Err(LedgerError::ParentMismatch { .. })
        ));
    }

    #[test]
    fn test_split_currency_must_match() {
        let parent = record(-5000, None);
        let mut child = record(-2000, Some(parent.id));
        child.money.currency = CurrencyCode::parse("EUR").unwrap();
        assert!(matches!(
            validate_split(&parent, &child),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_review_status_round_trips_labels() {
        for status in ReviewStatus::ALL {
            assert_eq!(status.as_str().parse::<ReviewStatus>().unwrap(), status);
        }
        assert!("flagged".parse::<ReviewStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ReviewStatus::NeedsReceipt).unwrap(),
            "\"needs_receipt\""
        );
    }

    #[test]
    fn test_lookup_entities_use_soft_delete() {
        assert_eq!(LookupEntity::AccountType.liveness(), Liveness::SoftDelete);
        assert_eq!(
            LookupEntity::FinancialInstitution.table(),
            "financial_institutions"
        );
    }
}
