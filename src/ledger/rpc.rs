//! Minimal JSON-RPC client for the ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use solana_program::hash::Hash;
use solana_program::pubkey::Pubkey;

use super::error::{LedgerError, ProgramRejection};

pub const DEFAULT_COMMITMENT: &str = "confirmed";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// `{ context, value }` wrapper most account methods return.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<Value>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}

#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    commitment: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "rpc call");
        let resp = self
            .http
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&req)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(classify_rpc_error(err));
        }
        body.result
            .ok_or_else(|| LedgerError::decode("rpc response", format!("{method}: missing result")))
    }

    /// Raw account data, or `None` if the account does not exist.
    pub async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let resp: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), {"encoding": "base64", "commitment": self.commitment}]),
            )
            .await?;

        let Some(info) = resp.value else {
            return Ok(None);
        };
        let (payload, encoding) = info.data;
        if encoding != "base64" {
            return Err(LedgerError::decode(
                "account data",
                format!("unexpected encoding {encoding}"),
            ));
        }
        BASE64
            .decode(payload)
            .map(Some)
            .map_err(|e| LedgerError::decode("account data", e.to_string()))
    }

    pub async fn get_token_account_balance(&self, account: &Pubkey) -> Result<u64, LedgerError> {
        let resp: WithContext<TokenAmount> = self
            .call(
                "getTokenAccountBalance",
                json!([account.to_string(), {"commitment": self.commitment}]),
            )
            .await?;
        parse_amount(&resp.value.amount)
    }

    /// Sum of `owner`'s token accounts for `mint`.
    pub async fn get_token_balance_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<u64, LedgerError> {
        let resp: WithContext<Vec<Value>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    {"mint": mint.to_string()},
                    {"encoding": "jsonParsed", "commitment": self.commitment}
                ]),
            )
            .await?;

        resp.value.iter().try_fold(0u64, |acc, entry| -> Result<u64, LedgerError> {
            let raw = entry
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(Value::as_str)
                .ok_or_else(|| LedgerError::decode("token account", "missing tokenAmount"))?;
            Ok(acc.saturating_add(parse_amount(raw)?))
        })
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let resp: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{"commitment": self.commitment}]),
            )
            .await?;

        resp.value
            .blockhash
            .parse()
            .map_err(|e| LedgerError::decode("blockhash", format!("{e}")))
    }

    /// Submit a signed wire transaction; returns the signature the node reports.
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String, LedgerError> {
        self.call(
            "sendTransaction",
            json!([
                BASE64.encode(wire),
                {"encoding": "base64", "preflightCommitment": self.commitment}
            ]),
        )
        .await
    }

    pub async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let resp: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": false}]),
            )
            .await?;
        Ok(resp.value.into_iter().next().flatten())
    }
}

fn parse_amount(raw: &str) -> Result<u64, LedgerError> {
    raw.parse::<u64>()
        .map_err(|e| LedgerError::decode("token amount", format!("{raw}: {e}")))
}

/// Preflight failures carry the program's custom error either in the message
/// or in `data.err`; surface those as typed rejections.
fn classify_rpc_error(err: RpcErrorObject) -> LedgerError {
    let from_data = err
        .data
        .as_ref()
        .and_then(|d| d.get("err"))
        .and_then(ProgramRejection::from_transaction_error);

    match from_data.or_else(|| ProgramRejection::from_message(&err.message)) {
        Some(rejection) => LedgerError::Rejected(rejection),
        None => LedgerError::Rpc {
            code: err.code,
            message: err.message,
        },
    }
}
