//! Flow transaction encoding.
//!
//! A transaction is signed in two layers:
//! - payload: `[script, [args], ref_block, gas, proposer, key, seq, payer, [authorizers]]`
//! - envelope: `[payload, [[signer_index, key_index, signature], ...]]`
//!
//! Each layer is RLP-encoded and prefixed with the 32-byte transaction domain
//! tag before hashing. Signer indices follow the order proposer, payer,
//! authorizers with duplicates removed.

use std::fmt;
use std::str::FromStr;

use alloy::rlp::{Encodable, Header};

use crate::error::{LedgerError, LedgerResult};

/// `"FLOW-V0.0-transaction"` right-padded with zeros to 32 bytes.
pub const TRANSACTION_DOMAIN_TAG: [u8; 32] = domain_tag(b"FLOW-V0.0-transaction");

const fn domain_tag(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        out[i] = tag[i];
        i += 1;
    }
    out
}

/// 8-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowAddress(pub [u8; 8]);

impl FlowAddress {
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Hex without the `0x` prefix, as the REST API expects.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for FlowAddress {
    type Err = LedgerError;

    /// Accepts `0x`-prefixed or bare hex; short addresses are left-padded.
    fn from_str(s: &str) -> LedgerResult<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(LedgerError::InvalidAddress(s.to_string()));
        }
        let padded = format!("{trimmed:0>16}");
        let bytes = hex::decode(padded).map_err(|_| LedgerError::InvalidAddress(s.to_string()))?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for FlowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// The key that supplies the sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalKey {
    pub address: FlowAddress,
    pub key_index: u32,
    pub sequence_number: u64,
}

/// One signature entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSignature {
    pub address: FlowAddress,
    pub key_index: u32,
    pub signature: [u8; 64],
}

/// The unsigned part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBody {
    pub script: String,
    /// JSON-Cadence encoded arguments.
    pub arguments: Vec<Vec<u8>>,
    pub reference_block_id: [u8; 32],
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: FlowAddress,
    pub authorizers: Vec<FlowAddress>,
}

impl TransactionBody {
    /// Distinct signers in signer-index order.
    pub fn signers(&self) -> Vec<FlowAddress> {
        let mut out: Vec<FlowAddress> = Vec::with_capacity(2 + self.authorizers.len());
        let candidates = std::iter::once(self.proposal_key.address)
            .chain(std::iter::once(self.payer))
            .chain(self.authorizers.iter().copied());
        for address in candidates {
            if !out.contains(&address) {
                out.push(address);
            }
        }
        out
    }

    fn signer_index(&self, address: &FlowAddress) -> Option<usize> {
        self.signers().iter().position(|a| a == address)
    }

    /// RLP of the payload list.
    pub fn payload_rlp(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.script.as_bytes().encode(&mut body);
        encode_list(&mut body, |out| {
            for arg in &self.arguments {
                arg.as_slice().encode(out);
            }
        });
        self.reference_block_id.as_slice().encode(&mut body);
        self.gas_limit.encode(&mut body);
        self.proposal_key.address.as_bytes().as_slice().encode(&mut body);
        u64::from(self.proposal_key.key_index).encode(&mut body);
        self.proposal_key.sequence_number.encode(&mut body);
        self.payer.as_bytes().as_slice().encode(&mut body);
        encode_list(&mut body, |out| {
            for authorizer in &self.authorizers {
                authorizer.as_bytes().as_slice().encode(out);
            }
        });

        wrap_list(body)
    }

    /// Bytes a payload signer hashes and signs.
    pub fn payload_message(&self) -> Vec<u8> {
        tagged(self.payload_rlp())
    }

    /// Bytes the payer hashes and signs, covering any payload signatures.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if a payload signature comes from an account
    /// that is not a signer of this transaction.
    pub fn envelope_message(&self, payload_signatures: &[TxSignature]) -> LedgerResult<Vec<u8>> {
        let sigs = self.indexed_signatures(payload_signatures)?;
        let mut body = self.payload_rlp();
        encode_list(&mut body, |out| {
            for (signer_index, sig) in &sigs {
                encode_list(out, |entry| {
                    (*signer_index as u64).encode(entry);
                    u64::from(sig.key_index).encode(entry);
                    sig.signature.as_slice().encode(entry);
                });
            }
        });
        Ok(tagged(wrap_list(body)))
    }

    /// Pair signatures with signer indices, sorted by (signer, key).
    fn indexed_signatures<'a>(
        &self,
        signatures: &'a [TxSignature],
    ) -> LedgerResult<Vec<(usize, &'a TxSignature)>> {
        let mut out = signatures
            .iter()
            .map(|sig| {
                self.signer_index(&sig.address)
                    .map(|i| (i, sig))
                    .ok_or_else(|| LedgerError::InvalidAddress(sig.address.to_string()))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        out.sort_by_key(|(i, sig)| (*i, sig.key_index));
        Ok(out)
    }
}

/// A fully signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub body: TransactionBody,
    pub payload_signatures: Vec<TxSignature>,
    pub envelope_signatures: Vec<TxSignature>,
}

fn tagged(rlp: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(TRANSACTION_DOMAIN_TAG.len() + rlp.len());
    out.extend_from_slice(&TRANSACTION_DOMAIN_TAG);
    out.extend_from_slice(&rlp);
    out
}

fn wrap_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

fn encode_list(out: &mut Vec<u8>, items: impl FnOnce(&mut Vec<u8>)) {
    let mut payload = Vec::new();
    items(&mut payload);
    out.extend_from_slice(&wrap_list(payload));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> FlowAddress {
        s.parse().unwrap()
    }

    fn body() -> TransactionBody {
        TransactionBody {
            script: "transaction {}".to_string(),
            arguments: vec![br#"{"type":"UInt64","value":"7"}"#.to_vec()],
            reference_block_id: [0xab; 32],
            gas_limit: 9999,
            proposal_key: ProposalKey {
                address: addr("0x01cf0e2f2f715450"),
                key_index: 2,
                sequence_number: 15,
            },
            payer: addr("0x01cf0e2f2f715450"),
            authorizers: vec![addr("0x01cf0e2f2f715450")],
        }
    }

    #[test]
    fn test_rlp_primitives() {
        let mut out = Vec::new();
        0u64.encode(&mut out);
        assert_eq!(out, vec![0x80]);

        let mut out = Vec::new();
        15u64.encode(&mut out);
        assert_eq!(out, vec![0x0f]);

        let mut out = Vec::new();
        b"dog".as_slice().encode(&mut out);
        assert_eq!(out, vec![0x83, b'd', b'o', b'g']);

        let mut out = Vec::new();
        encode_list(&mut out, |l| {
            b"cat".as_slice().encode(l);
            b"dog".as_slice().encode(l);
        });
        assert_eq!(
            out,
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
    }

    #[test]
    fn test_domain_tag_is_padded() {
        assert_eq!(&TRANSACTION_DOMAIN_TAG[..21], b"FLOW-V0.0-transaction");
        assert!(TRANSACTION_DOMAIN_TAG[21..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(addr("0x01").0, [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(addr("01cf0e2f2f715450").to_string(), "0x01cf0e2f2f715450");
        assert!("0x".parse::<FlowAddress>().is_err());
        assert!("0x0102030405060708090a".parse::<FlowAddress>().is_err());
        assert!("0xzz".parse::<FlowAddress>().is_err());
    }

    #[test]
    fn test_signers_are_deduplicated_in_order() {
        let mut b = body();
        b.authorizers = vec![addr("0x02"), addr("0x01cf0e2f2f715450"), addr("0x02")];
        assert_eq!(b.signers(), vec![addr("0x01cf0e2f2f715450"), addr("0x02")]);
    }

    #[test]
    fn test_payload_message_layout() {
        let b = body();
        let message = b.payload_message();
        assert_eq!(&message[..32], &TRANSACTION_DOMAIN_TAG);

        let rlp = b.payload_rlp();
        assert_eq!(&message[32..], rlp.as_slice());
        // Long list header: 0xf8 + one length byte for payloads under 256 bytes.
        assert_eq!(rlp[0], 0xf8);
        assert_eq!(rlp[1] as usize, rlp.len() - 2);
        // First item is the script string.
        assert_eq!(rlp[2], 0x80 + b.script.len() as u8);
    }

    #[test]
    fn test_envelope_message_wraps_payload() {
        let b = body();
        let empty = b.envelope_message(&[]).unwrap();
        assert_eq!(&empty[..32], &TRANSACTION_DOMAIN_TAG);
        // [payload, []] ends with an empty list.
        assert_eq!(*empty.last().unwrap(), 0xc0);

        let sig = TxSignature {
            address: addr("0x01cf0e2f2f715450"),
            key_index: 2,
            signature: [7u8; 64],
        };
        let signed = b.envelope_message(std::slice::from_ref(&sig)).unwrap();
        assert!(signed.len() > empty.len() + 64);
        assert!(signed.windows(64).any(|w| w == [7u8; 64]));
    }

    #[test]
    fn test_envelope_rejects_foreign_payload_signer() {
        let sig = TxSignature {
            address: addr("0x99"),
            key_index: 0,
            signature: [0u8; 64],
        };
        assert!(matches!(
            body().envelope_message(&[sig]),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_payload_signatures_sorted_by_signer_index() {
        let mut b = body();
        let user = addr("0x02");
        b.authorizers = vec![user, addr("0x01cf0e2f2f715450")];
        let admin_sig = TxSignature {
            address: addr("0x01cf0e2f2f715450"),
            key_index: 0,
            signature: [1u8; 64],
        };
        let user_sig = TxSignature {
            address: user,
            key_index: 0,
            signature: [2u8; 64],
        };
        let forward = b.envelope_message(&[admin_sig.clone(), user_sig.clone()]).unwrap();
        let reverse = b.envelope_message(&[user_sig, admin_sig]).unwrap();
        assert_eq!(forward, reverse);
    }
}
