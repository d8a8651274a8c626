//! Balance lookup seam.
//!
//! Reconciliation asks an external source how much each deposit
//! address has received. The source is queried in batches; one failed
//! batch is that batch's problem, not the run's.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use tollgate_types::{amount_from_decimal, PaymentMethod};

use crate::error::{PayError, Result};

/// Default number of addresses per balance query.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Source of on-chain received amounts.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// How many addresses one query may carry.
    fn batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Total received per address, base units, counting only funds
    /// with at least `min_confirmations` confirmations (zero means
    /// include unconfirmed funds). Addresses the source knows nothing
    /// about may be absent from the map.
    async fn received(
        &self,
        addresses: &[String],
        min_confirmations: u32,
    ) -> Result<HashMap<String, i64>>;
}

#[derive(Debug, Deserialize)]
struct AddressReceived {
    address: String,
    /// Decimal string in the method's display unit.
    received: String,
}

/// HTTP JSON balance client.
///
/// Queries `GET {base_url}/balances?active=<a1,a2,...>&confirmations=<n>`
/// and expects a JSON array of `{"address": "...", "received": "0.05"}`
/// objects with decimal string amounts.
pub struct HttpBalanceSource {
    client: reqwest::Client,
    base_url: String,
    method: PaymentMethod,
    batch_size: usize,
}

impl HttpBalanceSource {
    pub fn new(base_url: impl Into<String>, method: PaymentMethod) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            method,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the addresses-per-query limit.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn received(
        &self,
        addresses: &[String],
        min_confirmations: u32,
    ) -> Result<HashMap<String, i64>> {
        let url = format!(
            "{}/balances?active={}&confirmations={}",
            self.base_url,
            addresses.join(","),
            min_confirmations
        );
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let entries: Vec<AddressReceived> = response.json().await?;

        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            let units = amount_from_decimal(&entry.received, self.method)
                .map_err(|e| PayError::balance(format!("{}: {e}", entry.address)))?;
            map.insert(entry.address, units);
        }
        Ok(map)
    }
}

/// Table-backed source for tests.
#[derive(Debug, Default)]
pub struct StaticBalanceSource {
    received: HashMap<String, i64>,
    batch_size: usize,
}

impl StaticBalanceSource {
    pub fn new() -> Self {
        Self {
            received: HashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_received(mut self, address: &str, units: i64) -> Self {
        self.received.insert(address.to_string(), units);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl BalanceSource for StaticBalanceSource {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn received(
        &self,
        addresses: &[String],
        _min_confirmations: u32,
    ) -> Result<HashMap<String, i64>> {
        Ok(addresses
            .iter()
            .filter_map(|a| self.received.get(a).map(|v| (a.clone(), *v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_filters_to_queried() {
        let source = StaticBalanceSource::new()
            .with_received("addr-a", 100)
            .with_received("addr-b", 200);

        let map = source
            .received(&["addr-a".to_string(), "addr-c".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(map.get("addr-a"), Some(&100));
        assert!(!map.contains_key("addr-b"));
        assert!(!map.contains_key("addr-c"));
    }

    #[test]
    fn test_batch_size_floor() {
        let source = StaticBalanceSource::new().with_batch_size(0);
        assert_eq!(source.batch_size(), 1);
    }

    #[test]
    fn test_response_shape_parses() {
        let entries: Vec<AddressReceived> =
            serde_json::from_str(r#"[{"address": "1abc", "received": "0.05"}]"#).unwrap();
        assert_eq!(entries[0].address, "1abc");
        assert_eq!(
            amount_from_decimal(&entries[0].received, PaymentMethod::Bitcoin).unwrap(),
            5_000_000
        );
    }
}
