//! Shared utilities for talking to Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {method} request"))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {method} response"))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        match error.get("code").and_then(Value::as_i64) {
            Some(code) => anyhow::bail!("{method} failed: {message} (code {code})"),
            None => anyhow::bail!("{method} failed: {message}"),
        }
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {method} response"))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {method} result"))
}

/// Deserialize a u64 from a hex quantity (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_quantity(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional u64 hex quantity; `null` maps to `None`.
pub fn deserialize_opt_u64_from_hex<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.as_deref()
        .map(parse_quantity)
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn parse_quantity(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}

/// Format a quantity as a JSON-RPC hex string.
pub fn quantity<T: std::fmt::LowerHex>(value: T) -> String {
    format!("0x{:x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Block {
        #[serde(deserialize_with = "deserialize_u64_from_hex")]
        number: u64,
        #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
        timestamp: Option<u64>,
    }

    #[test]
    fn test_deserialize_quantities() {
        let block: Block =
            serde_json::from_str(r#"{ "number": "0x1b4", "timestamp": null }"#).unwrap();
        assert_eq!(block.number, 436);
        assert_eq!(block.timestamp, None);

        let block: Block =
            serde_json::from_str(r#"{ "number": "0x0", "timestamp": "0x10" }"#).unwrap();
        assert_eq!(block.number, 0);
        assert_eq!(block.timestamp, Some(16));

        assert!(serde_json::from_str::<Block>(r#"{ "number": "0xzz" }"#).is_err());
    }

    #[test]
    fn test_quantity() {
        assert_eq!(quantity(0u64), "0x0");
        assert_eq!(quantity(210_000u64), "0x33450");
    }
}
