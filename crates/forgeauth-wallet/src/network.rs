//! Networks the app is willing to operate on.

use std::collections::BTreeSet;

/// Chains supported out of the box, grouped by family.
const DEFAULT_CHAINS: &[(&str, &[u64])] = &[
    ("ethereum", &[1, 5, 11_155_111]),
    ("bsc", &[56, 97]),
    ("polygon", &[137, 80_001]),
    ("avalanche", &[43_114, 43_113]),
    ("arbitrum", &[42_161, 421_613]),
];

/// Set of allowed chain ids.
///
/// Membership is all that matters; `is_correct_network` is computed from
/// it on every snapshot, so changes take effect immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAllowList {
    chains: BTreeSet<u64>,
}

impl Default for ChainAllowList {
    fn default() -> Self {
        Self {
            chains: DEFAULT_CHAINS
                .iter()
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect(),
        }
    }
}

impl ChainAllowList {
    pub fn empty() -> Self {
        Self {
            chains: BTreeSet::new(),
        }
    }

    pub fn allows(&self, chain_id: u64) -> bool {
        self.chains.contains(&chain_id)
    }

    /// Returns `true` if the chain was newly added.
    pub fn allow(&mut self, chain_id: u64) -> bool {
        self.chains.insert(chain_id)
    }

    /// Returns `true` if the chain was present.
    pub fn disallow(&mut self, chain_id: u64) -> bool {
        self.chains.remove(&chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Family name of a well-known chain, for logs.
    pub fn family(chain_id: u64) -> Option<&'static str> {
        DEFAULT_CHAINS
            .iter()
            .find(|(_, ids)| ids.contains(&chain_id))
            .map(|(name, _)| *name)
    }
}

impl FromIterator<u64> for ChainAllowList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            chains: iter.into_iter().collect(),
        }
    }
}
