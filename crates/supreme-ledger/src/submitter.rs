//! Key-rotated transaction submission.
//!
//! Every state-changing transaction goes through [`Submitter::submit`]:
//!
//! 1. Lease a key slot from the [`KeyPool`] (immediate or waiting)
//! 2. Read the slot's sequence number and the reference block
//! 3. Sign (payload signatures for external authorizers, then the envelope)
//! 4. Send and poll until sealed
//!
//! The lease is dropped on every exit path, so a failed broadcast never
//! leaves a key permanently busy. Read-only queries skip the pool.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use supreme_core::{CadenceValue, TransactionResult};
use supreme_telemetry::Metrics;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{AccountKey, DynLedgerClient, TransactionOutcome, TransactionStatus};
use crate::envelope::{FlowAddress, ProposalKey, SignedTransaction, TransactionBody, TxSignature};
use crate::error::{LedgerError, LedgerResult};
use crate::imports::ContractAddresses;
use crate::key_pool::{KeyLease, KeyPool};
use crate::signer::{KeyRing, PayloadSigner};

/// What a transaction is for; used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxKind {
    OraclePush,
    Settlement,
    HouseTopUp,
    AccountFunding,
    CoSigned,
    #[default]
    Other,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OraclePush => "oracle_push",
            Self::Settlement => "settlement",
            Self::HouseTopUp => "house_topup",
            Self::AccountFunding => "account_funding",
            Self::CoSigned => "co_signed",
            Self::Other => "other",
        }
    }
}

/// A second authorizer whose key is held elsewhere (e.g. a user wallet).
#[derive(Clone)]
pub struct ExternalAuthorizer {
    pub address: FlowAddress,
    pub key_index: u32,
    pub signer: Arc<dyn PayloadSigner>,
}

impl std::fmt::Debug for ExternalAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalAuthorizer")
            .field("address", &self.address)
            .field("key_index", &self.key_index)
            .finish()
    }
}

/// Per-call submission options.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Overrides the configured default gas limit.
    pub gas_limit: Option<u64>,
    /// Wait up to the acquire timeout for a free key instead of failing fast.
    pub wait_for_key: bool,
    pub kind: TxKind,
    /// Authorizers listed before the admin account.
    pub extra_authorizers: Vec<ExternalAuthorizer>,
}

impl SubmitOptions {
    pub fn new(kind: TxKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn waiting(mut self) -> Self {
        self.wait_for_key = true;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_authorizer(mut self, authorizer: ExternalAuthorizer) -> Self {
        self.extra_authorizers.push(authorizer);
        self
    }
}

/// Submitter configuration.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub admin_address: FlowAddress,
    pub default_gas_limit: u64,
    pub acquire_timeout: Duration,
    pub seal_poll_interval: Duration,
    pub seal_timeout: Duration,
}

impl SubmitterConfig {
    pub fn new(admin_address: FlowAddress) -> Self {
        Self {
            admin_address,
            default_gas_limit: 9999,
            acquire_timeout: crate::key_pool::DEFAULT_ACQUIRE_TIMEOUT,
            seal_poll_interval: Duration::from_millis(1_000),
            seal_timeout: Duration::from_millis(120_000),
        }
    }
}

/// Submits transactions as the admin account using rotating key slots.
pub struct Submitter {
    client: DynLedgerClient,
    pool: Arc<KeyPool>,
    keys: Arc<KeyRing>,
    contracts: ContractAddresses,
    config: SubmitterConfig,
}

impl Submitter {
    pub fn new(
        client: DynLedgerClient,
        pool: Arc<KeyPool>,
        keys: Arc<KeyRing>,
        contracts: ContractAddresses,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            client,
            pool,
            keys,
            contracts,
            config,
        }
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Current number of key slots.
    pub fn pool_size(&self) -> usize {
        self.pool.count()
    }

    pub fn admin_address(&self) -> FlowAddress {
        self.config.admin_address
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    /// Size the pool from the admin account's key list.
    ///
    /// Counts the contiguous run of non-revoked keys starting at index 0,
    /// capped by the number of private keys when one key per slot is
    /// configured. On lookup failure the pool is set to `fallback`.
    pub async fn discover_keys(&self, fallback: usize) -> usize {
        let count = match self.client.account_keys(self.config.admin_address).await {
            Ok(keys) => {
                let usable = usable_key_count(&keys);
                let revoked = keys.iter().filter(|k| k.revoked).count();
                if usable < keys.len() {
                    warn!(
                        total = keys.len(),
                        usable,
                        revoked,
                        "Some admin keys are revoked or out of order; only the leading run is used"
                    );
                }
                let capped = if self.keys.len() > 1 {
                    usable.min(self.keys.len())
                } else {
                    usable
                };
                if capped == 0 {
                    warn!(fallback, "No usable admin keys found; using fallback count");
                    fallback
                } else {
                    capped
                }
            }
            Err(e) => {
                warn!(error = %e, fallback, "Failed to detect admin key count");
                fallback
            }
        };

        self.pool.set_count(count);
        info!(key_count = self.pool.count(), address = %self.config.admin_address, "Admin key pool sized");
        self.pool.count()
    }

    /// Submit a transaction and wait for it to seal.
    ///
    /// # Errors
    /// - `PoolExhausted` if no key is free (immediately, or within the
    ///   acquire timeout when `wait_for_key` is set)
    /// - `SubmissionFailed` if the ledger rejects or reverts the transaction
    /// - `SealTimeout` if it does not seal within the configured budget
    pub async fn submit(
        &self,
        script: &str,
        arguments: Vec<CadenceValue>,
        options: SubmitOptions,
    ) -> LedgerResult<TransactionResult> {
        let kind = options.kind;
        let lease = if options.wait_for_key {
            self.pool.acquire_waiting(self.config.acquire_timeout).await
        } else {
            self.pool.lease_now()
        };
        let lease = match lease {
            Ok(lease) => lease,
            Err(e) => {
                Metrics::tx(kind.as_str(), "pool_exhausted");
                return Err(e);
            }
        };

        let started = Instant::now();
        let result = self.submit_with_lease(&lease, script, arguments, &options).await;
        drop(lease);

        match &result {
            Ok(tx) => {
                Metrics::tx(kind.as_str(), "sealed");
                Metrics::tx_seal_latency(kind.as_str(), started.elapsed().as_secs_f64() * 1000.0);
                debug!(kind = kind.as_str(), tx_id = %tx.short_id(), "Transaction sealed");
            }
            Err(e) => {
                Metrics::tx(kind.as_str(), "failed");
                debug!(kind = kind.as_str(), error = %e, "Transaction failed");
            }
        }
        result
    }

    async fn submit_with_lease(
        &self,
        lease: &KeyLease,
        script: &str,
        arguments: Vec<CadenceValue>,
        options: &SubmitOptions,
    ) -> LedgerResult<TransactionResult> {
        let key_index = lease.index() as u32;
        let admin = self.config.admin_address;

        let sequence_number = self.sequence_number(key_index).await?;
        let reference_block_id = self.client.latest_block_id().await?;

        let mut authorizers: Vec<FlowAddress> =
            options.extra_authorizers.iter().map(|a| a.address).collect();
        authorizers.push(admin);

        let body = TransactionBody {
            script: self.contracts.resolve(script),
            arguments: arguments.iter().map(CadenceValue::to_json_bytes).collect(),
            reference_block_id,
            gas_limit: options.gas_limit.unwrap_or(self.config.default_gas_limit),
            proposal_key: ProposalKey {
                address: admin,
                key_index,
                sequence_number,
            },
            payer: admin,
            authorizers,
        };

        let mut payload_signatures = Vec::with_capacity(options.extra_authorizers.len());
        if !options.extra_authorizers.is_empty() {
            let payload_message = body.payload_message();
            for authorizer in &options.extra_authorizers {
                payload_signatures.push(TxSignature {
                    address: authorizer.address,
                    key_index: authorizer.key_index,
                    signature: authorizer.signer.sign(&payload_message)?,
                });
            }
        }

        let envelope_message = body.envelope_message(&payload_signatures)?;
        let envelope_signature = TxSignature {
            address: admin,
            key_index,
            signature: self.keys.sign(key_index as usize, &envelope_message)?,
        };

        let tx = SignedTransaction {
            body,
            payload_signatures,
            envelope_signatures: vec![envelope_signature],
        };

        let tx_id = self
            .client
            .send_transaction(tx)
            .await
            .map_err(into_submission_failure)?;
        debug!(
            kind = options.kind.as_str(),
            key_index,
            sequence_number,
            tx_id = %tx_id,
            "Transaction sent"
        );

        let outcome = self.await_seal(&tx_id).await?;
        if outcome.is_failed() {
            return Err(LedgerError::SubmissionFailed(format!(
                "tx {tx_id} status {}: {}",
                outcome.status_code, outcome.error_message
            )));
        }

        Ok(TransactionResult {
            id: tx_id,
            status_code: outcome.status_code,
            events: outcome.events,
        })
    }

    async fn sequence_number(&self, key_index: u32) -> LedgerResult<u64> {
        let keys = self.client.account_keys(self.config.admin_address).await?;
        keys.into_iter()
            .find(|k| k.index == key_index && !k.revoked)
            .map(|k| k.sequence_number)
            .ok_or_else(|| LedgerError::KeyUnavailable {
                address: self.config.admin_address.to_string(),
                key_index,
            })
    }

    async fn await_seal(&self, tx_id: &str) -> LedgerResult<TransactionOutcome> {
        let start = Instant::now();
        loop {
            match self.client.transaction_result(tx_id.to_string()).await {
                Ok(outcome) => match outcome.status {
                    TransactionStatus::Sealed => return Ok(outcome),
                    TransactionStatus::Expired => {
                        return Err(LedgerError::SubmissionFailed(format!("tx {tx_id} expired")))
                    }
                    TransactionStatus::Pending if outcome.is_failed() => return Ok(outcome),
                    TransactionStatus::Pending => {}
                },
                // Result lookups can briefly 404 right after submission.
                Err(e) => debug!(tx_id, error = %e, "Transaction result not available yet"),
            }

            let waited = start.elapsed();
            if waited >= self.config.seal_timeout {
                return Err(LedgerError::SealTimeout {
                    tx_id: tx_id.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.seal_poll_interval).await;
        }
    }

    /// Run a read-only script. Never touches the key pool.
    pub async fn query(&self, script: &str, arguments: Vec<CadenceValue>) -> LedgerResult<Value> {
        self.client
            .execute_script(
                self.contracts.resolve(script),
                arguments.iter().map(CadenceValue::to_json_bytes).collect(),
            )
            .await
    }

    /// Co-sign an externally built message as the admin account.
    ///
    /// Uses key slot 0 without leasing it: the caller's transaction is
    /// proposed by another account, so no admin sequence number is consumed.
    pub fn co_sign(&self, message: &[u8]) -> LedgerResult<(FlowAddress, u32, [u8; 64])> {
        let signature = self.keys.sign(0, message)?;
        Ok((self.config.admin_address, 0, signature))
    }
}

fn into_submission_failure(e: LedgerError) -> LedgerError {
    match e {
        LedgerError::Http(msg) | LedgerError::InvalidResponse(msg) => {
            LedgerError::SubmissionFailed(msg)
        }
        other => other,
    }
}

/// Length of the run of non-revoked keys at indices 0, 1, 2, ...
pub fn usable_key_count(keys: &[AccountKey]) -> usize {
    let mut sorted: Vec<&AccountKey> = keys.iter().collect();
    sorted.sort_by_key(|k| k.index);
    sorted
        .iter()
        .enumerate()
        .take_while(|(i, k)| k.index as usize == *i && !k.revoked)
        .count()
}
