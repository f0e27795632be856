//! Chain client: the only surface the deployer needs from a blockchain node.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, Bytes, TxHash};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::rpc::{self, deserialize_opt_u64_from_hex, deserialize_u64_from_hex};

/// Node method verifying the source of a deployed contract.
pub const VERIFY_CONTRACT_METHOD: &str = "hardhat_verifyContract";

/// Default interval between two receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Optional gas settings applied to a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOverrides {
    /// Gas price in wei.
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

impl TxOverrides {
    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// The part of a transaction receipt the deployer looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    /// `1` on success, `0` on revert. Pre-Byzantium receipts carry no status.
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub status: Option<u64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub block_number: Option<u64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status != Some(0)
    }
}

/// Operations the deployer relies on.
///
/// Implementations submit transactions from a single sender; the deployer awaits every
/// receipt before moving on.
pub trait ChainClient: Send + Sync {
    /// Chain id of the connected network.
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// Submit a contract creation transaction.
    fn deploy_contract(
        &self,
        init_code: Bytes,
        overrides: TxOverrides,
    ) -> impl Future<Output = anyhow::Result<TxHash>> + Send;

    /// Submit a call to `to`.
    fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        overrides: TxOverrides,
    ) -> impl Future<Output = anyhow::Result<TxHash>> + Send;

    /// Wait until `tx_hash` is mined and return its receipt.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = anyhow::Result<TxReceipt>> + Send;
}

fn verify_params(address: Address, network: &str) -> Vec<Value> {
    vec![serde_json::json!(address), Value::String(network.to_string())]
}

#[derive(Deserialize)]
struct ChainId(#[serde(deserialize_with = "deserialize_u64_from_hex")] u64);

#[derive(Debug, thiserror::Error)]
#[error("transaction {0} is not mined yet")]
struct PendingReceipt(TxHash);

/// JSON-RPC client sending transactions from an account unlocked on the node.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
    from: Address,
    poll_interval: Duration,
}

impl JsonRpcClient {
    pub fn new(url: Url, from: Address) -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_TIMEOUT)?,
            url,
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn from_address(&self) -> Address {
        self.from
    }

    /// Ask the node to verify the contract at `address` on `network`, returning its answer as is.
    pub async fn verify_contract(&self, address: Address, network: &str) -> anyhow::Result<Value> {
        rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            VERIFY_CONTRACT_METHOD,
            verify_params(address, network),
        )
        .await
    }

    fn transaction(&self, to: Option<Address>, data: &Bytes, overrides: TxOverrides) -> Value {
        let mut tx = serde_json::json!({
            "from": self.from,
            "data": data,
        });
        if let Some(to) = to {
            tx["to"] = serde_json::json!(to);
        }
        if let Some(gas_price) = overrides.gas_price {
            tx["gasPrice"] = Value::String(rpc::quantity(gas_price));
        }
        if let Some(gas_limit) = overrides.gas_limit {
            tx["gas"] = Value::String(rpc::quantity(gas_limit));
        }
        tx
    }

    async fn submit(&self, tx: Value) -> anyhow::Result<TxHash> {
        let tx_hash: TxHash =
            rpc::json_rpc_call(&self.client, self.url.as_str(), "eth_sendTransaction", vec![tx])
                .await?;
        tracing::debug!(tx_hash = %tx_hash, "Transaction submitted");
        Ok(tx_hash)
    }

    async fn fetch_receipt(&self, tx_hash: TxHash) -> anyhow::Result<Option<TxReceipt>> {
        rpc::json_rpc_call(
            &self.client,
            self.url.as_str(),
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await
    }
}

impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let ChainId(chain_id) =
            rpc::json_rpc_call(&self.client, self.url.as_str(), "eth_chainId", vec![]).await?;
        Ok(chain_id)
    }

    async fn deploy_contract(
        &self,
        init_code: Bytes,
        overrides: TxOverrides,
    ) -> anyhow::Result<TxHash> {
        let tx = self.transaction(None, &init_code, overrides);
        self.submit(tx)
            .await
            .context("Failed to submit contract creation")
    }

    async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        overrides: TxOverrides,
    ) -> anyhow::Result<TxHash> {
        let tx = self.transaction(Some(to), &calldata, overrides);
        self.submit(tx)
            .await
            .with_context(|| format!("Failed to submit transaction to {to}"))
    }

    /// Polls at a constant interval for as long as the transaction is pending.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> anyhow::Result<TxReceipt> {
        let receipt = (move || async move {
            self.fetch_receipt(tx_hash)
                .await?
                .ok_or_else(|| anyhow::Error::new(PendingReceipt(tx_hash)))
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(self.poll_interval)
                .with_max_times(usize::MAX),
        )
        .when(|e: &anyhow::Error| e.is::<PendingReceipt>())
        .notify(|_, delay| {
            tracing::trace!(tx_hash = %tx_hash, ?delay, "Waiting for transaction receipt...");
        })
        .await
        .with_context(|| format!("Failed to fetch receipt of {tx_hash}"))?;

        tracing::debug!(
            tx_hash = %tx_hash,
            block_number = ?receipt.block_number,
            status = ?receipt.status,
            "Transaction mined"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_receipt() {
        let receipt: TxReceipt = serde_json::from_str(
            r#"{
                "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
                "blockNumber": "0x1b4",
                "status": "0x1",
                "contractAddress": "0x3d8cdcaba7d5bbe97549c5a1cb4158a832a34e15",
                "gasUsed": "0x5208"
            }"#,
        )
        .expect("Failed to parse receipt");

        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number, Some(436));
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TxReceipt = serde_json::from_str(
            r#"{
                "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
                "blockNumber": "0x1b4",
                "status": "0x0",
                "contractAddress": null
            }"#,
        )
        .expect("Failed to parse receipt");

        assert!(!receipt.succeeded());
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_transaction_payload() {
        let client = JsonRpcClient::new(
            Url::parse("http://localhost:8545").unwrap(),
            Address::repeat_byte(0x01),
        )
        .unwrap();

        let tx = client.transaction(
            Some(Address::repeat_byte(0x02)),
            &Bytes::from(vec![0xde, 0xad]),
            TxOverrides::default()
                .gas_price(100_000_000_000)
                .gas_limit(210_000),
        );

        assert_eq!(tx["data"], "0xdead");
        assert_eq!(tx["gasPrice"], "0x174876e800");
        assert_eq!(tx["gas"], "0x33450");
        assert!(tx.get("to").is_some());

        let creation = client.transaction(None, &Bytes::new(), TxOverrides::default());
        assert!(creation.get("to").is_none());
        assert!(creation.get("gas").is_none());
    }

    #[test]
    fn test_verify_params() {
        let address = Address::repeat_byte(0x3d);
        let params = verify_params(address, "goerli");

        assert_eq!(params.len(), 2);
        assert_eq!(params[0], serde_json::json!(address));
        assert_eq!(params[1], "goerli");
    }

    #[tokio::test]
    async fn test_verify_contract_reports_unreachable_node() {
        let client = JsonRpcClient::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            Address::repeat_byte(0x01),
        )
        .unwrap();

        let err = client
            .verify_contract(Address::repeat_byte(0x3d), "goerli")
            .await
            .expect_err("Nothing listens on port 1");
        assert!(
            format!("{err:#}").contains(VERIFY_CONTRACT_METHOD),
            "unexpected error: {err:#}"
        );
    }
}
