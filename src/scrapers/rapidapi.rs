use crate::errors::{DataHubError, Result};
use crate::metrics::select_entry;
use crate::scrapers::base::QuoteSource;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const API_HOST: &str = "yahoo-finance15.p.rapidapi.com";
const QUOTES_URL: &str = "https://yahoo-finance15.p.rapidapi.com/api/v1/markets/stock/quotes";

/// Yahoo Finance quotes via RapidAPI
pub struct RapidApiQuotes {
    client: Client,
    api_key: String,
}

impl RapidApiQuotes {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DataHubError::RequestError)?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for RapidApiQuotes {
    fn source_label(&self) -> &'static str {
        "Yahoo Finance (RapidAPI quotes)"
    }

    async fn quote(&self, symbol: &str) -> Result<Value> {
        let response = self
            .client
            .get(QUOTES_URL)
            .query(&[("ticker", symbol)])
            .header("x-rapidapi-key", self.api_key.as_str())
            .header("x-rapidapi-host", API_HOST)
            .header("accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let entry = select_entry(symbol, &payload);
        debug!("Quote payload for {}: {} keys", symbol, entry.as_object().map_or(0, |m| m.len()));
        Ok(entry)
    }
}
