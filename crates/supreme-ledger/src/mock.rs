//! In-memory ledger for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use supreme_core::LedgerEvent;

use crate::client::{
    AccountKey, BoxFuture, LedgerClient, TransactionOutcome, TransactionStatus,
};
use crate::envelope::{FlowAddress, SignedTransaction};
use crate::error::{LedgerError, LedgerResult};

type EventFactory = Box<dyn Fn(&SignedTransaction) -> Vec<LedgerEvent> + Send + Sync>;

/// Mock ledger recording every submission.
///
/// Sequence numbers advance per key on each accepted transaction. Outcomes
/// default to sealed success; queue failures with [`MockLedger::push_outcome`].
pub struct MockLedger {
    keys: Mutex<Vec<AccountKey>>,
    fail_account_keys: std::sync::atomic::AtomicBool,
    sent: Mutex<Vec<SignedTransaction>>,
    outcomes: Mutex<VecDeque<TransactionOutcome>>,
    results: Mutex<HashMap<String, TransactionOutcome>>,
    send_errors: Mutex<VecDeque<LedgerError>>,
    scripts: Mutex<Vec<(String, Value)>>,
    script_calls: Mutex<Vec<(String, Vec<Vec<u8>>)>>,
    event_factory: Mutex<Option<EventFactory>>,
    send_delay: Mutex<Duration>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLedger")
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}

impl MockLedger {
    /// Mock with `key_count` healthy keys, all at sequence number 0.
    pub fn new(key_count: u32) -> Self {
        let keys = (0..key_count)
            .map(|index| AccountKey {
                index,
                sequence_number: 0,
                revoked: false,
            })
            .collect();
        Self {
            keys: Mutex::new(keys),
            fail_account_keys: std::sync::atomic::AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            results: Mutex::new(HashMap::new()),
            send_errors: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(Vec::new()),
            script_calls: Mutex::new(Vec::new()),
            event_factory: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replace the account's key list.
    pub fn set_keys(&self, keys: Vec<AccountKey>) {
        *self.keys.lock() = keys;
    }

    pub fn set_account_keys_failing(&self, failing: bool) {
        self.fail_account_keys.store(failing, Ordering::SeqCst);
    }

    /// Outcome for the next accepted transaction.
    pub fn push_outcome(&self, outcome: TransactionOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Make the next `send_transaction` call fail.
    pub fn push_send_error(&self, error: LedgerError) {
        self.send_errors.lock().push_back(error);
    }

    /// Result for any script whose source contains `marker`.
    pub fn set_script_result(&self, marker: impl Into<String>, result: Value) {
        let marker = marker.into();
        let mut scripts = self.scripts.lock();
        scripts.retain(|(m, _)| *m != marker);
        scripts.push((marker, result));
    }

    /// Events attached to each successful transaction.
    pub fn set_event_factory<F>(&self, factory: F)
    where
        F: Fn(&SignedTransaction) -> Vec<LedgerEvent> + Send + Sync + 'static,
    {
        *self.event_factory.lock() = Some(Box::new(factory));
    }

    /// Delay applied inside `send_transaction`, to hold keys busy.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    pub fn sent(&self) -> Vec<SignedTransaction> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn script_calls(&self) -> Vec<(String, Vec<Vec<u8>>)> {
        self.script_calls.lock().clone()
    }

    /// Highest number of `send_transaction` calls observed at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Arguments of a sent transaction decoded as JSON.
    pub fn decoded_arguments(tx: &SignedTransaction) -> Vec<Value> {
        tx.body
            .arguments
            .iter()
            .map(|a| serde_json::from_slice(a).unwrap_or(Value::Null))
            .collect()
    }

    fn sequence_number(&self, key_index: u32) -> Option<u64> {
        self.keys
            .lock()
            .iter()
            .find(|k| k.index == key_index)
            .map(|k| k.sequence_number)
    }

    fn bump_sequence(&self, key_index: u32) {
        if let Some(key) = self.keys.lock().iter_mut().find(|k| k.index == key_index) {
            key.sequence_number += 1;
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LedgerClient for MockLedger {
    fn account_keys(&self, _address: FlowAddress) -> BoxFuture<'_, LedgerResult<Vec<AccountKey>>> {
        Box::pin(async move {
            if self.fail_account_keys.load(Ordering::SeqCst) {
                return Err(LedgerError::Http("mock account lookup failure".to_string()));
            }
            Ok(self.keys.lock().clone())
        })
    }

    fn latest_block_id(&self) -> BoxFuture<'_, LedgerResult<[u8; 32]>> {
        Box::pin(async move { Ok([0x11; 32]) })
    }

    fn send_transaction(&self, tx: SignedTransaction) -> BoxFuture<'_, LedgerResult<String>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *self.send_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Some(err) = self.send_errors.lock().pop_front() {
                return Err(err);
            }

            let key_index = tx.body.proposal_key.key_index;
            match self.sequence_number(key_index) {
                Some(seq) if seq == tx.body.proposal_key.sequence_number => {}
                Some(seq) => {
                    return Err(LedgerError::SubmissionFailed(format!(
                        "invalid proposal key {key_index}: expected sequence number {seq}"
                    )))
                }
                None => {
                    return Err(LedgerError::SubmissionFailed(format!(
                        "unknown proposal key {key_index}"
                    )))
                }
            }

            let id = format!("{:064x}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut outcome = self.outcomes.lock().pop_front().unwrap_or(TransactionOutcome {
                status: TransactionStatus::Sealed,
                status_code: 0,
                error_message: String::new(),
                events: Vec::new(),
            });
            if !outcome.is_failed() && outcome.events.is_empty() {
                if let Some(factory) = self.event_factory.lock().as_ref() {
                    outcome.events = factory(&tx);
                }
            }

            self.bump_sequence(key_index);
            self.results.lock().insert(id.clone(), outcome);
            self.sent.lock().push(tx);
            Ok(id)
        })
    }

    fn transaction_result(&self, tx_id: String) -> BoxFuture<'_, LedgerResult<TransactionOutcome>> {
        Box::pin(async move {
            self.results
                .lock()
                .get(&tx_id)
                .cloned()
                .ok_or_else(|| LedgerError::InvalidResponse(format!("unknown transaction {tx_id}")))
        })
    }

    fn execute_script(
        &self,
        script: String,
        arguments: Vec<Vec<u8>>,
    ) -> BoxFuture<'_, LedgerResult<Value>> {
        Box::pin(async move {
            let result = self
                .scripts
                .lock()
                .iter()
                .find(|(marker, _)| script.contains(marker.as_str()))
                .map(|(_, v)| v.clone());
            self.script_calls.lock().push((script, arguments));
            result.ok_or_else(|| LedgerError::SubmissionFailed("no mock result for script".to_string()))
        })
    }
}
