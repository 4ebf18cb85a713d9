use crate::error::RpcError;
use crate::events::{decode_quantity, Log};
use chainrelay_types::{format_address, Address};
use num_bigint::BigUint;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

pub const DEFAULT_RPC_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(
                std::env::var("RPC_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RPC_TIMEOUT_SECONDS),
            ),
            max_retries: std::env::var("RPC_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// JSON-RPC client for one chain endpoint. Every request is bounded by
/// `settings.timeout`; transport failures and rate limiting are retried with
/// a linearly growing delay.
pub struct RpcClient {
    client: reqwest::Client,
    endpoint: String,
    settings: RpcSettings,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>, settings: RpcSettings) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            settings,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed)
        });

        let mut attempt = 0;
        loop {
            match self.try_call(&payload).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(method, attempt, "RPC call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = self.settings.retry_delay * attempt;
                    warn!(
                        method,
                        attempt,
                        max_retries = self.settings.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "RPC call failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(method, max_retries = self.settings.max_retries, "RPC call failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_call(&self, payload: &Value) -> Result<Value, RpcError> {
        let response: Value = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown RPC error")
                .to_string();
            let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);

            if code == -32005 || code == 429 {
                return Err(RpcError::RateLimited(message));
            }

            return Err(RpcError::Rpc { code, message });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))
    }

    pub async fn get_block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("block number is not a string".to_string()))?;
        decode_quantity(hex_str)
    }

    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: &Address,
        topic: &[u8; 32],
    ) -> Result<Vec<Log>, RpcError> {
        let params = serde_json::json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": format_address(address),
            "topics": [format!("0x{}", hex::encode(topic))]
        }]);

        let result = self.call("eth_getLogs", params).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| RpcError::InvalidResponse("logs are not an array".to_string()))?;

        let mut parsed = logs.iter().map(Log::from_json).collect::<Result<Vec<_>, _>>()?;
        parsed.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(parsed)
    }

    /// `eth_call` against the latest block.
    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let params = serde_json::json!([
            {
                "to": format_address(to),
                "data": format!("0x{}", hex::encode(data))
            },
            "latest"
        ]);

        let result = self.call("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("call result is not a string".to_string()))?;

        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| RpcError::InvalidResponse(format!("Failed to decode call result: {}", e)))
    }

    pub async fn gas_price(&self) -> Result<BigUint, RpcError> {
        let result = self.call("eth_gasPrice", serde_json::json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("gas price is not a string".to_string()))?;

        BigUint::parse_bytes(hex_str.trim_start_matches("0x").as_bytes(), 16)
            .ok_or_else(|| RpcError::InvalidResponse(format!("Failed to parse gas price {:?}", hex_str)))
    }
}

impl RpcError {
    /// Network failures and rate limiting are worth retrying; an RPC-level
    /// error such as a revert is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::RateLimited(_))
    }
}
