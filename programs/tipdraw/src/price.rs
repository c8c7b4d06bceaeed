use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anchor_lang::prelude::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::{
    constants::{PRICE_CACHE_TTL_SECS, STABLECOINS},
    parser::embedded_usd_estimate,
    tiers::BoxError,
};

/// One source of USD unit prices.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// USD price of one unit of `symbol`, `None` when the provider does not know it.
    async fn unit_price(&self, symbol: &str) -> std::result::Result<Option<f64>, BoxError>;
}

/// Dollar-pegged tokens are priced at exactly one dollar.
pub struct StablecoinProvider;

#[async_trait]
impl PriceProvider for StablecoinProvider {
    fn name(&self) -> &str {
        "stablecoin"
    }

    async fn unit_price(&self, symbol: &str) -> std::result::Result<Option<f64>, BoxError> {
        let pegged = STABLECOINS
            .iter()
            .any(|stable| stable.eq_ignore_ascii_case(symbol));
        Ok(pegged.then_some(1.0))
    }
}

/// Operator-supplied prices, e.g. from `TIPDRAW_FIXED_PRICES=SOL=150,DOGE=0.1`.
#[derive(Default)]
pub struct FixedPriceProvider {
    prices: HashMap<String, f64>,
}

impl FixedPriceProvider {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        let prices = prices
            .into_iter()
            .map(|(symbol, price)| (symbol.to_uppercase(), price))
            .collect();
        FixedPriceProvider { prices }
    }

    /// Parses `SYMBOL=price` pairs separated by commas, skipping malformed ones.
    pub fn parse(pairs: &str) -> Self {
        let prices = pairs
            .split(',')
            .filter_map(|pair| {
                let (symbol, price) = pair.split_once('=')?;
                let price: f64 = price.trim().parse().ok()?;
                (price.is_finite() && price > 0.0).then(|| (symbol.trim().to_string(), price))
            })
            .collect();
        FixedPriceProvider::new(prices)
    }
}

#[async_trait]
impl PriceProvider for FixedPriceProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn unit_price(&self, symbol: &str) -> std::result::Result<Option<f64>, BoxError> {
        Ok(self.prices.get(&symbol.to_uppercase()).copied())
    }
}

/// Converts crypto amounts to USD through a chain of providers.
///
/// A USD estimate quoted in the confirmation text wins outright. Otherwise
/// providers are asked in order, each bounded by a timeout, and the first
/// positive unit price is cached briefly per symbol.
pub struct PriceResolver {
    providers: Vec<Box<dyn PriceProvider>>,
    cache: Mutex<HashMap<String, (f64, DateTime<Utc>)>>,
    call_timeout: Duration,
    cache_ttl: chrono::Duration,
}

impl PriceResolver {
    pub fn new(providers: Vec<Box<dyn PriceProvider>>, call_timeout: Duration) -> Self {
        PriceResolver {
            providers,
            cache: Mutex::new(HashMap::new()),
            call_timeout,
            cache_ttl: chrono::Duration::seconds(PRICE_CACHE_TTL_SECS),
        }
    }

    fn cached(&self, symbol: &str, now: DateTime<Utc>) -> Option<f64> {
        let cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .get(symbol)
            .filter(|(_, fetched_at)| now.signed_duration_since(*fetched_at) < self.cache_ttl)
            .map(|(price, _)| *price)
    }

    fn remember(&self, symbol: &str, price: f64, now: DateTime<Utc>) {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.insert(symbol.to_string(), (price, now));
    }

    async fn unit_price(&self, symbol: &str) -> Option<f64> {
        let now = Utc::now();
        if let Some(price) = self.cached(symbol, now) {
            return Some(price);
        }
        for provider in &self.providers {
            match timeout(self.call_timeout, provider.unit_price(symbol)).await {
                Ok(Ok(Some(price))) if price.is_finite() && price > 0.0 => {
                    self.remember(symbol, price, now);
                    return Some(price);
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => msg!("price provider {} failed for {}: {}", provider.name(), symbol, err),
                Err(_) => msg!("price provider {} timed out for {}", provider.name(), symbol),
            }
        }
        None
    }

    /// USD value of `amount` units of `symbol`, or `None` when no price can be
    /// determined. Callers must not guess in that case.
    pub async fn resolve(&self, symbol: &str, amount: f64, context_text: Option<&str>) -> Option<f64> {
        if !amount.is_finite() || amount <= 0.0 {
            return None;
        }
        if let Some(estimate) = context_text
            .and_then(embedded_usd_estimate)
            .filter(|estimate| *estimate > 0.0)
        {
            return Some(estimate);
        }
        let symbol = symbol.to_uppercase();
        let usd = self.unit_price(&symbol).await? * amount;
        usd.is_finite().then_some(usd)
    }
}
