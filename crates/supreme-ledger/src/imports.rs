//! Contract import resolution.
//!
//! Scripts are written against named placeholders
//! (`import PredictionGame from 0xPredictionGame`); before submission every
//! placeholder with a configured address is rewritten to that address.

use std::collections::BTreeMap;

use supreme_core::cadence::with_prefix;

/// Contract name to deployed address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAddresses {
    addresses: BTreeMap<String, String>,
}

impl ContractAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: &str) {
        self.addresses.insert(name.into(), with_prefix(address));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.addresses.get(name).map(String::as_str)
    }

    /// Rewrite `0x<Name>` placeholders. Unknown names and real hex
    /// addresses are left untouched.
    pub fn resolve(&self, script: &str) -> String {
        let mut out = String::with_capacity(script.len());
        let mut rest = script;

        while let Some(pos) = rest.find("0x") {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let ident_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let ident = &after[..ident_len];

            match self.addresses.get(ident) {
                Some(address) => out.push_str(address),
                None => {
                    out.push_str("0x");
                    out.push_str(ident);
                }
            }
            rest = &after[ident_len..];
        }
        out.push_str(rest);
        out
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for ContractAddresses {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (name, address) in iter {
            out.insert(name, address.as_ref());
        }
        out
    }
}
