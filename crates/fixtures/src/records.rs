//! Synthetic domain records fed into the application forms

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::money::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub household_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub payee: String,
    pub amount: String,
    pub envelope: String,
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One envelope allocation inside a split transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub envelope: String,
    pub amount: String,
}

impl Split {
    pub fn new(envelope: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            envelope: envelope.into(),
            amount: amount.into(),
        }
    }
}

/// A purchase divided across envelopes.
///
/// The split amounts are not required to add up to `total_amount`; negative
/// scenarios build unbalanced splits on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitTransaction {
    pub payee: String,
    pub total_amount: String,
    pub splits: Vec<Split>,
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl SplitTransaction {
    /// Replace the split rows, keeping everything else
    pub fn with_splits(mut self, splits: Vec<Split>) -> Self {
        self.splits = splits;
        self
    }

    pub fn split_sum(&self) -> Result<Amount> {
        self.splits.iter().map(|s| s.amount.parse::<Amount>()).sum()
    }

    pub fn is_balanced(&self) -> Result<bool> {
        Ok(self.split_sum()? == self.total_amount.parse::<Amount>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_tx(total: &str, amounts: &[&str]) -> SplitTransaction {
        SplitTransaction {
            payee: "SplitPayee_1".into(),
            total_amount: total.into(),
            splits: amounts.iter().map(|a| Split::new("Groceries", *a)).collect(),
            account: "Checking".into(),
            date: None,
        }
    }

    #[test]
    fn test_unbalanced_split_is_reported() {
        let tx = split_tx("100.00", &["30.00", "80.00"]);
        assert_eq!(tx.split_sum().unwrap().to_string(), "110.00");
        assert!(!tx.is_balanced().unwrap());
    }

    #[test]
    fn test_split_with_bad_amount_errors() {
        let tx = split_tx("100.00", &["30.00", "eighty"]);
        assert!(tx.is_balanced().is_err());
    }

    #[test]
    fn test_serializes_camel_case_and_omits_missing_fields() {
        let user = TestUser {
            email: "a@example.com".into(),
            password: "x".into(),
            household_name: "H".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["householdName"], "H");

        let tx = split_tx("100.00", &["100.00"]);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["totalAmount"], "100.00");
        assert!(json.get("date").is_none());
    }
}
