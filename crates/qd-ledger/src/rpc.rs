//! JSON-RPC treasury client.
//!
//! Talks to the chain node that holds the custodial treasury account:
//! `eth_getBalance` for the balance check, `eth_sendTransaction` for
//! payouts (the node manages the treasury signer), and
//! `eth_getTransactionByHash` + `eth_getTransactionReceipt` for deposit
//! verification. Quantities are `0x`-hex base units throughout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use qd_types::{wallets_match, Amount};

use crate::{within_variance, Ledger, LedgerError, DEPOSIT_VARIANCE_BPS};

pub const ENV_RPC_URL: &str = "QD_RPC_URL";
pub const ENV_TREASURY_ADDRESS: &str = "QD_TREASURY_ADDRESS";

/// Response envelope for a JSON-RPC 2.0 call.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

pub struct RpcTreasury {
    client: Client,
    rpc_url: String,
    treasury_address: String,
}

impl RpcTreasury {
    pub fn new(rpc_url: String, treasury_address: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            rpc_url,
            treasury_address,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let rpc_url = std::env::var(ENV_RPC_URL)
            .map_err(|_| anyhow::anyhow!("missing env var {ENV_RPC_URL}"))?;
        let treasury = std::env::var(ENV_TREASURY_ADDRESS)
            .map_err(|_| anyhow::anyhow!("missing env var {ENV_TREASURY_ADDRESS}"))?;
        Self::new(rpc_url, treasury)
    }

    pub fn treasury_address(&self) -> &str {
        &self.treasury_address
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let response: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method} request failed: {e}")))?
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method} response parse failed: {e}")))?;

        if let Some(err) = response.error {
            return Err(LedgerError::Rpc(format!("{method} returned error: {err}")));
        }

        response
            .result
            .ok_or_else(|| LedgerError::Rpc(format!("{method} returned no result")))
    }

    fn result_str(result: &Value, method: &str) -> Result<String, LedgerError> {
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Rpc(format!("{method} result is not a string")))
    }
}

#[async_trait]
impl Ledger for RpcTreasury {
    fn treasury_address(&self) -> &str {
        &self.treasury_address
    }

    async fn balance(&self) -> Result<Amount, LedgerError> {
        let result = self
            .call("eth_getBalance", json!([self.treasury_address, "latest"]))
            .await?;
        let hex = Self::result_str(&result, "eth_getBalance")?;
        Amount::from_hex(&hex).map_err(|e| LedgerError::Rpc(format!("bad balance quantity: {e}")))
    }

    async fn send_payout(&self, wallet: &str, amount: &Amount) -> Result<String, LedgerError> {
        // Fail fast on an underfunded treasury: a distinct error class so
        // callers don't retry it like a transient network fault.
        let have = self.balance().await?;
        if have < *amount {
            warn!(
                have = %have,
                need = %amount,
                "treasury underfunded; refusing payout submission"
            );
            return Err(LedgerError::InsufficientFunds {
                have,
                need: amount.clone(),
            });
        }

        let tx = json!([{
            "from": self.treasury_address,
            "to": wallet,
            "value": amount.to_hex(),
        }]);

        let result = self
            .call("eth_sendTransaction", tx)
            .await
            .map_err(|e| match e {
                LedgerError::Rpc(msg) => LedgerError::Submit(msg),
                other => other,
            })?;
        let tx_hash = Self::result_str(&result, "eth_sendTransaction")
            .map_err(|e| LedgerError::Submit(e.to_string()))?;

        debug!(%wallet, amount = %amount, %tx_hash, "payout submitted");
        Ok(tx_hash)
    }

    async fn verify_deposit(
        &self,
        tx_hash: &str,
        expected_amount: &Amount,
        expected_recipient: &str,
    ) -> Result<bool, LedgerError> {
        let tx = self
            .call("eth_getTransactionByHash", json!([tx_hash]))
            .await?;
        if tx.is_null() {
            debug!(%tx_hash, "deposit tx not found");
            return Ok(false);
        }

        let to = tx.get("to").and_then(Value::as_str).unwrap_or_default();
        if !wallets_match(to, expected_recipient) {
            debug!(%tx_hash, %to, "deposit recipient mismatch");
            return Ok(false);
        }

        let value_hex = tx.get("value").and_then(Value::as_str).unwrap_or("0x0");
        let value = Amount::from_hex(value_hex)
            .map_err(|e| LedgerError::Rpc(format!("bad deposit value quantity: {e}")))?;
        if !within_variance(&value, expected_amount, DEPOSIT_VARIANCE_BPS) {
            debug!(%tx_hash, value = %value, expected = %expected_amount, "deposit amount outside variance");
            return Ok(false);
        }

        let receipt = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if receipt.is_null() {
            // Known but unmined: not yet verifiable.
            return Ok(false);
        }
        let status = receipt
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Ok(status == "0x1")
    }
}
