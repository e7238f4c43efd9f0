// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named collections: the fixed key set the finance app persists.
//!
//! Each [`Collection`] maps to one opaque JSON document. The storage layer
//! does not look inside documents except to apply built-in defaults and a
//! shallow structural check when loading.
//!
//! # Example
//!
//! ```
//! use finance_sync::Collection;
//!
//! let c: Collection = "expense_plan".parse().unwrap();
//! assert_eq!(c, Collection::ExpensePlan);
//! assert_eq!(c.storage_key("finance_"), "finance_expense_plan");
//! assert_eq!(c.default_value(), serde_json::json!(0));
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One of the eight persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Accounts,
    Transactions,
    Currencies,
    ExpensePlan,
    ClosedMonths,
    BalanceChecks,
    ExpenseCategories,
    IncomeCategories,
}

/// A mapping from collection to its document.
pub type CollectionMap = BTreeMap<Collection, Value>;

impl Collection {
    /// Every collection, in wire order.
    pub const ALL: [Collection; 8] = [
        Collection::Accounts,
        Collection::Transactions,
        Collection::Currencies,
        Collection::ExpensePlan,
        Collection::ClosedMonths,
        Collection::BalanceChecks,
        Collection::ExpenseCategories,
        Collection::IncomeCategories,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Transactions => "transactions",
            Self::Currencies => "currencies",
            Self::ExpensePlan => "expense_plan",
            Self::ClosedMonths => "closed_months",
            Self::BalanceChecks => "balance_checks",
            Self::ExpenseCategories => "expense_categories",
            Self::IncomeCategories => "income_categories",
        }
    }

    /// Key used in the local cache and the cloud store.
    #[must_use]
    pub fn storage_key(self, prefix: &str) -> String {
        format!("{}{}", prefix, self.as_str())
    }

    /// Whether the document is expected to be a JSON array.
    #[must_use]
    pub const fn is_list(self) -> bool {
        !matches!(self, Self::ExpensePlan)
    }

    /// Built-in value used when nothing valid is stored.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Accounts => json!([
                {"id": 1, "name": "Main account", "currency": "RUB", "balance": 0, "color": "#2481cc"}
            ]),
            Self::Currencies => json!([
                {"code": "RUB", "name": "Russian ruble", "rate": 1, "source": "manual"},
                {"code": "USD", "name": "US dollar", "rate": 100, "source": "manual"},
                {"code": "EUR", "name": "Euro", "rate": 110, "source": "manual"},
                kzt_currency()
            ]),
            Self::ExpensePlan => json!(0),
            Self::ExpenseCategories => json!([
                "Groceries", "Transport", "Housing", "Entertainment",
                "Health", "Education", "Clothing", "Gifts", "Other"
            ]),
            Self::IncomeCategories => json!(["Salary", "Gifts", "Investments", "Other"]),
            Self::Transactions | Self::ClosedMonths | Self::BalanceChecks => json!([]),
        }
    }

    /// Validate a loaded document, substituting the default where it is
    /// absent or structurally wrong.
    ///
    /// Returns the value to use and whether it differs from the input.
    #[must_use]
    pub fn sanitize(self, value: Option<Value>) -> (Value, bool) {
        let Some(value) = value else {
            return (self.default_value(), true);
        };

        match self {
            Self::ExpensePlan => match plan_amount(&value) {
                Some(_) if value.is_number() => (value, false),
                Some(amount) => (json!(amount), true),
                None => (self.default_value(), true),
            },
            Self::Currencies => match value {
                Value::Array(mut currencies) => {
                    let has_kzt = currencies
                        .iter()
                        .any(|c| c.get("code").and_then(Value::as_str) == Some("KZT"));
                    if has_kzt {
                        (Value::Array(currencies), false)
                    } else {
                        currencies.push(kzt_currency());
                        (Value::Array(currencies), true)
                    }
                }
                _ => (self.default_value(), true),
            },
            _ if value.is_array() => (value, false),
            _ => (self.default_value(), true),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The key does not name a collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection '{0}'")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

/// Sanitize every collection, filling gaps with defaults.
///
/// Returns the full set plus the collections whose value was replaced.
#[must_use]
pub fn sanitize_all(mut loaded: CollectionMap) -> (CollectionMap, Vec<Collection>) {
    let mut out = CollectionMap::new();
    let mut replaced = Vec::new();
    for collection in Collection::ALL {
        let (value, changed) = collection.sanitize(loaded.remove(&collection));
        if changed {
            replaced.push(collection);
        }
        out.insert(collection, value);
    }
    (out, replaced)
}

fn kzt_currency() -> Value {
    json!({"code": "KZT", "name": "Kazakhstani tenge", "rate": 0.15, "source": "manual"})
}

/// Non-negative finite plan amount; numeric strings are legacy plain-text storage.
fn plan_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for c in Collection::ALL {
            assert_eq!(c.as_str().parse::<Collection>().unwrap(), c);
            assert_eq!(serde_json::to_value(c).unwrap(), json!(c.as_str()));
        }
        assert!("budgets".parse::<Collection>().is_err());
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(Collection::BalanceChecks.storage_key("finance_"), "finance_balance_checks");
    }

    #[test]
    fn test_default_accounts_has_zero_balance() {
        let accounts = Collection::Accounts.default_value();
        let accounts = accounts.as_array().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0]["balance"], json!(0));
    }

    #[test]
    fn test_default_currencies_include_kzt() {
        let currencies = Collection::Currencies.default_value();
        let currencies = currencies.as_array().unwrap();
        assert_eq!(currencies.len(), 4);
        let kzt = currencies.iter().find(|c| c["code"] == "KZT").unwrap();
        assert_eq!(kzt["rate"], json!(0.15));
    }

    #[test]
    fn test_sanitize_missing_uses_default() {
        let (value, changed) = Collection::Transactions.sanitize(None);
        assert_eq!(value, json!([]));
        assert!(changed);
    }

    #[test]
    fn test_sanitize_keeps_valid_list() {
        let txs = json!([{"id": 7, "amount": 120}]);
        let (value, changed) = Collection::Transactions.sanitize(Some(txs.clone()));
        assert_eq!(value, txs);
        assert!(!changed);
    }

    #[test]
    fn test_sanitize_non_array_replaced() {
        let (value, changed) = Collection::ClosedMonths.sanitize(Some(json!({"2024-01": true})));
        assert_eq!(value, json!([]));
        assert!(changed);

        let (value, _) = Collection::Accounts.sanitize(Some(Value::Null));
        assert_eq!(value, Collection::Accounts.default_value());
    }

    #[test]
    fn test_sanitize_expense_plan() {
        assert_eq!(Collection::ExpensePlan.sanitize(Some(json!(1500.0))), (json!(1500.0), false));
        assert_eq!(Collection::ExpensePlan.sanitize(Some(json!("250"))).0, json!(250.0));
        assert_eq!(Collection::ExpensePlan.sanitize(Some(json!(-5))), (json!(0), true));
        assert_eq!(Collection::ExpensePlan.sanitize(Some(json!("lots"))), (json!(0), true));
        assert_eq!(Collection::ExpensePlan.sanitize(Some(json!([1]))), (json!(0), true));
    }

    #[test]
    fn test_sanitize_currencies_appends_kzt() {
        let stored = json!([{"code": "RUB", "rate": 1}]);
        let (value, changed) = Collection::Currencies.sanitize(Some(stored));
        assert!(changed);
        let codes: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["code"].as_str())
            .collect();
        assert_eq!(codes, vec!["RUB", "KZT"]);
    }

    #[test]
    fn test_sanitize_all_cold_start() {
        let (set, replaced) = sanitize_all(CollectionMap::new());
        assert_eq!(set.len(), 8);
        assert_eq!(replaced.len(), 8);
        assert_eq!(set[&Collection::ExpensePlan], json!(0));
        assert_eq!(set[&Collection::BalanceChecks], json!([]));
        assert_eq!(set[&Collection::IncomeCategories], Collection::IncomeCategories.default_value());
    }
}
