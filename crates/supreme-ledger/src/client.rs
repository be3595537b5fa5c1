//! Access node client.
//!
//! [`LedgerClient`] is the seam between the submitter and the network.
//! [`RestLedgerClient`] talks to the Flow Access REST API; tests use
//! `MockLedger`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use supreme_core::cadence::to_plain;
use supreme_core::LedgerEvent;
use tracing::{debug, trace};

use crate::envelope::{FlowAddress, SignedTransaction, TxSignature};
use crate::error::{LedgerError, LedgerResult};

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Default timeout for access node requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One key registered on an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub index: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// Execution status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not yet sealed (pending, finalized or executed).
    Pending,
    Sealed,
    /// Reference block too old; the transaction will never execute.
    Expired,
}

/// Latest known state of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub status: TransactionStatus,
    pub status_code: u32,
    pub error_message: String,
    pub events: Vec<LedgerEvent>,
}

impl TransactionOutcome {
    pub fn pending() -> Self {
        Self {
            status: TransactionStatus::Pending,
            status_code: 0,
            error_message: String::new(),
            events: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status_code != 0 || !self.error_message.is_empty()
    }
}

/// Operations the keeper needs from the ledger.
pub trait LedgerClient: Send + Sync {
    /// Keys registered on `address` with their current sequence numbers.
    fn account_keys(&self, address: FlowAddress) -> BoxFuture<'_, LedgerResult<Vec<AccountKey>>>;

    /// Id of the latest sealed block, used as the reference block.
    fn latest_block_id(&self) -> BoxFuture<'_, LedgerResult<[u8; 32]>>;

    /// Submit a signed transaction; returns the transaction id.
    fn send_transaction(&self, tx: SignedTransaction) -> BoxFuture<'_, LedgerResult<String>>;

    fn transaction_result(&self, tx_id: String) -> BoxFuture<'_, LedgerResult<TransactionOutcome>>;

    /// Run a read-only script; returns the JSON-Cadence result value.
    fn execute_script(
        &self,
        script: String,
        arguments: Vec<Vec<u8>>,
    ) -> BoxFuture<'_, LedgerResult<Value>>;
}

/// Arc wrapper for LedgerClient trait objects.
pub type DynLedgerClient = Arc<dyn LedgerClient>;

// =============================================================================
// REST wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawAccount {
    #[serde(default)]
    keys: Vec<RawAccountKey>,
}

#[derive(Debug, Deserialize)]
struct RawAccountKey {
    index: String,
    sequence_number: String,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawBlockHeader,
}

#[derive(Debug, Deserialize)]
struct RawBlockHeader {
    id: String,
}

#[derive(Debug, Serialize)]
struct RawProposalKey {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize)]
struct RawSignature {
    address: String,
    key_index: String,
    signature: String,
}

impl From<&TxSignature> for RawSignature {
    fn from(sig: &TxSignature) -> Self {
        Self {
            address: sig.address.to_hex(),
            key_index: sig.key_index.to_string(),
            signature: BASE64.encode(sig.signature),
        }
    }
}

#[derive(Debug, Serialize)]
struct RawTransaction {
    script: String,
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: RawProposalKey,
    authorizers: Vec<String>,
    payload_signatures: Vec<RawSignature>,
    envelope_signatures: Vec<RawSignature>,
}

impl From<&SignedTransaction> for RawTransaction {
    fn from(tx: &SignedTransaction) -> Self {
        let body = &tx.body;
        Self {
            script: BASE64.encode(body.script.as_bytes()),
            arguments: body.arguments.iter().map(|a| BASE64.encode(a)).collect(),
            reference_block_id: hex::encode(body.reference_block_id),
            gas_limit: body.gas_limit.to_string(),
            payer: body.payer.to_hex(),
            proposal_key: RawProposalKey {
                address: body.proposal_key.address.to_hex(),
                key_index: body.proposal_key.key_index.to_string(),
                sequence_number: body.proposal_key.sequence_number.to_string(),
            },
            authorizers: body.authorizers.iter().map(FlowAddress::to_hex).collect(),
            payload_signatures: tx.payload_signatures.iter().map(RawSignature::from).collect(),
            envelope_signatures: tx.envelope_signatures.iter().map(RawSignature::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubmitted {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawTransactionResult {
    status: String,
    #[serde(default)]
    status_code: u32,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    payload: String,
}

#[derive(Debug, Serialize)]
struct RawScript {
    script: String,
    arguments: Vec<String>,
}

fn parse_u64(field: &str, value: &str) -> LedgerResult<u64> {
    value
        .parse()
        .map_err(|_| LedgerError::InvalidResponse(format!("{field} is not an integer: {value}")))
}

fn decode_base64_json(field: &str, encoded: &str) -> LedgerResult<Value> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| LedgerError::InvalidResponse(format!("{field} is not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| LedgerError::InvalidResponse(format!("{field} is not JSON-Cadence: {e}")))
}

fn convert_result(raw: RawTransactionResult) -> LedgerResult<TransactionOutcome> {
    let status = match raw.status.as_str() {
        "Sealed" => TransactionStatus::Sealed,
        "Expired" => TransactionStatus::Expired,
        _ => TransactionStatus::Pending,
    };
    let events = raw
        .events
        .into_iter()
        .map(|e| {
            let payload = decode_base64_json("event payload", &e.payload)?;
            Ok(LedgerEvent {
                event_type: e.event_type,
                data: to_plain(&payload),
            })
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    Ok(TransactionOutcome {
        status,
        status_code: raw.status_code,
        error_message: raw.error_message,
        events,
    })
}

// =============================================================================
// RestLedgerClient
// =============================================================================

/// Client for the Flow Access REST API.
pub struct RestLedgerClient {
    client: Client,
    base_url: String,
}

impl RestLedgerClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Access node root (e.g., "https://rest-testnet.onflow.org")
    pub fn new(base_url: impl Into<String>) -> LedgerResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> LedgerResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Http(format!("HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> LedgerResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| LedgerError::Http(format!("HTTP request failed: {e}")))?;
        Self::read_json(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> LedgerResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::Http(format!("HTTP request failed: {e}")))?;
        Self::read_json(response).await
    }
}

impl LedgerClient for RestLedgerClient {
    fn account_keys(&self, address: FlowAddress) -> BoxFuture<'_, LedgerResult<Vec<AccountKey>>> {
        Box::pin(async move {
            let raw: RawAccount = self
                .get(&format!("/v1/accounts/{}?expand=keys", address.to_hex()))
                .await?;
            raw.keys
                .into_iter()
                .map(|k| {
                    Ok(AccountKey {
                        index: parse_u64("key index", &k.index)? as u32,
                        sequence_number: parse_u64("sequence_number", &k.sequence_number)?,
                        revoked: k.revoked,
                    })
                })
                .collect()
        })
    }

    fn latest_block_id(&self) -> BoxFuture<'_, LedgerResult<[u8; 32]>> {
        Box::pin(async move {
            let blocks: Vec<RawBlock> = self.get("/v1/blocks?height=sealed").await?;
            let block = blocks
                .into_iter()
                .next()
                .ok_or_else(|| LedgerError::InvalidResponse("no sealed block returned".to_string()))?;
            let bytes = hex::decode(block.header.id.trim_start_matches("0x"))
                .map_err(|e| LedgerError::InvalidResponse(format!("block id: {e}")))?;
            bytes
                .try_into()
                .map_err(|_| LedgerError::InvalidResponse("block id is not 32 bytes".to_string()))
        })
    }

    fn send_transaction(&self, tx: SignedTransaction) -> BoxFuture<'_, LedgerResult<String>> {
        Box::pin(async move {
            let raw = RawTransaction::from(&tx);
            let submitted: RawSubmitted = self.post("/v1/transactions", &raw).await?;
            debug!(tx_id = %submitted.id, "Transaction submitted");
            Ok(submitted.id)
        })
    }

    fn transaction_result(&self, tx_id: String) -> BoxFuture<'_, LedgerResult<TransactionOutcome>> {
        Box::pin(async move {
            let raw: RawTransactionResult = self
                .get(&format!("/v1/transaction_results/{tx_id}"))
                .await?;
            trace!(tx_id = %tx_id, status = %raw.status, "Transaction status");
            convert_result(raw)
        })
    }

    fn execute_script(
        &self,
        script: String,
        arguments: Vec<Vec<u8>>,
    ) -> BoxFuture<'_, LedgerResult<Value>> {
        Box::pin(async move {
            let body = RawScript {
                script: BASE64.encode(script.as_bytes()),
                arguments: arguments.iter().map(|a| BASE64.encode(a)).collect(),
            };
            // The response body is a JSON string holding base64 JSON-Cadence.
            let encoded: String = self.post("/v1/scripts?block_height=sealed", &body).await?;
            decode_base64_json("script result", &encoded)
        })
    }
}
