//! Display-currency preference.
//!
//! The selected currency code lives in storage under `selectedCurrency` and
//! every change is broadcast, so independent views stay in step without a
//! global event bus. Prices are not converted here.

use tokio::sync::broadcast;

use crate::storage::{Storage, StorageError};

pub const CURRENCY_KEY: &str = "selectedCurrency";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Currency {
    pub code: &'static str,
    pub symbol: &'static str,
    pub name: &'static str,
}

pub const CURRENCIES: [Currency; 13] = [
    Currency { code: "USD", symbol: "$", name: "US Dollar" },
    Currency { code: "EUR", symbol: "€", name: "Euro" },
    Currency { code: "GBP", symbol: "£", name: "British Pound" },
    Currency { code: "CAD", symbol: "C$", name: "Canadian Dollar" },
    Currency { code: "AUD", symbol: "A$", name: "Australian Dollar" },
    Currency { code: "JPY", symbol: "¥", name: "Japanese Yen" },
    Currency { code: "INR", symbol: "₹", name: "Indian Rupee" },
    Currency { code: "BRL", symbol: "R$", name: "Brazilian Real" },
    Currency { code: "MXN", symbol: "MX$", name: "Mexican Peso" },
    Currency { code: "CNY", symbol: "¥", name: "Chinese Yuan" },
    Currency { code: "KRW", symbol: "₩", name: "Korean Won" },
    Currency { code: "PHP", symbol: "₱", name: "Philippine Peso" },
    Currency { code: "SGD", symbol: "S$", name: "Singapore Dollar" },
];

/// USD, the fallback for anything unknown.
#[must_use]
pub fn default_currency() -> &'static Currency {
    &CURRENCIES[0]
}

/// Case-insensitive lookup by ISO code.
#[must_use]
pub fn find(code: &str) -> Option<&'static Currency> {
    CURRENCIES.iter().find(|c| c.code.eq_ignore_ascii_case(code.trim()))
}

#[derive(Debug, thiserror::Error)]
pub enum CurrencyError {
    #[error("unsupported currency: {0}")]
    Unknown(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Current selection plus its change feed.
pub struct CurrencyPreference {
    current: &'static Currency,
    changes: broadcast::Sender<&'static Currency>,
}

impl CurrencyPreference {
    /// Read the stored selection. Missing, unknown, or unreadable values
    /// fall back to USD.
    pub fn load<S: Storage + ?Sized>(storage: &S) -> Self {
        let current = match storage.get(CURRENCY_KEY) {
            Ok(Some(code)) => find(&code).unwrap_or_else(|| {
                tracing::warn!(%code, "stored currency not recognised; using default");
                default_currency()
            }),
            Ok(None) => default_currency(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read currency preference");
                default_currency()
            }
        };
        let (changes, _) = broadcast::channel(16);
        Self { current, changes }
    }

    #[must_use]
    pub fn current(&self) -> &'static Currency {
        self.current
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<&'static Currency> {
        self.changes.subscribe()
    }

    /// Persist and broadcast a new selection.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown code or a storage failure; in either
    /// case the current selection is unchanged.
    pub fn select<S: Storage + ?Sized>(&mut self, storage: &mut S, code: &str) -> Result<&'static Currency, CurrencyError> {
        let currency = find(code).ok_or_else(|| CurrencyError::Unknown(code.to_owned()))?;
        storage.set(CURRENCY_KEY, currency.code)?;
        self.current = currency;
        // No subscribers is fine.
        let _ = self.changes.send(currency);
        Ok(currency)
    }
}

#[cfg(test)]
#[path = "currency_test.rs"]
mod tests;
