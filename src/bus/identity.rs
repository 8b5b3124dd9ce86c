// Copyright (c) 2026 Sentrybus
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Authenticated-identity lookups.
//!
//! The CN allowlist and the signing-key map are deliberately two separate
//! tables (per `spec.md` §4.3 step 4): an agent can rotate its signing key
//! without touching the TLS allowlist, and the allowlist can be revoked
//! without waiting on a key rotation.

use std::collections::BTreeMap;

/// Maps an mTLS peer's Subject Common Name to an agent id, and an agent id
/// to its current signing public key.
#[derive(Clone, Debug, Default)]
pub struct IdentityTable {
    cn_allowlist: BTreeMap<String, String>,
    agent_key_map: BTreeMap<String, Vec<u8>>,
}

impl IdentityTable {
    /// Build from a CN allowlist and a hex-encoded agent key map, as loaded
    /// from [`crate::config::BusConfig`].
    pub fn from_config(
        cn_allowlist: &BTreeMap<String, String>,
        agent_key_map_hex: &BTreeMap<String, String>,
    ) -> Self {
        let agent_key_map = agent_key_map_hex
            .iter()
            .filter_map(|(agent_id, hex_key)| {
                hex::decode(hex_key).ok().map(|k| (agent_id.clone(), k))
            })
            .collect();
        Self { cn_allowlist: cn_allowlist.clone(), agent_key_map }
    }

    /// Resolve a peer CN to an agent id, if allowlisted.
    pub fn agent_id_for_cn(&self, cn: &str) -> Option<&str> {
        self.cn_allowlist.get(cn).map(|s| s.as_str())
    }

    /// Look up the current signing public key for an agent id.
    pub fn signing_key_for_agent(&self, agent_id: &str) -> Option<&[u8]> {
        self.agent_key_map.get(agent_id).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_cn_has_no_agent_id() {
        let table = IdentityTable::default();
        assert!(table.agent_id_for_cn("agent-1").is_none());
    }

    #[test]
    fn resolves_cn_then_key() {
        let mut cn = BTreeMap::new();
        cn.insert("agent-1.internal".to_string(), "agent-1".to_string());
        let mut keys = BTreeMap::new();
        keys.insert("agent-1".to_string(), hex::encode([7u8; 32]));
        let table = IdentityTable::from_config(&cn, &keys);
        let agent_id = table.agent_id_for_cn("agent-1.internal").unwrap();
        assert_eq!(agent_id, "agent-1");
        assert_eq!(table.signing_key_for_agent(agent_id), Some([7u8; 32].as_slice()));
    }
}
