//! Per-server and global player allow/deny evaluation for the wake-on-login
//! gate (spec §4.4).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::PlayerInfo;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerListEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uuid: Option<Uuid>,
}

impl PlayerListEntry {
    /// (name and uuid both set → both equal); (only uuid set → uuid
    /// equals); (only name set → name equals); (both empty → never
    /// matches).
    fn matches(&self, player: &PlayerInfo) -> bool {
        match (&self.name, &self.uuid) {
            (Some(name), Some(uuid)) => {
                name.eq_ignore_ascii_case(&player.name) && player.uuid == Some(*uuid)
            }
            (None, Some(uuid)) => player.uuid == Some(*uuid),
            (Some(name), None) => name.eq_ignore_ascii_case(&player.name),
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerListConfig {
    #[serde(default)]
    pub allow: Vec<PlayerListEntry>,
    #[serde(default)]
    pub deny: Vec<PlayerListEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowDenyConfig {
    #[serde(default)]
    pub global: PlayerListConfig,
    #[serde(default)]
    pub servers: HashMap<String, PlayerListConfig>,
}

impl AllowDenyConfig {
    /// Merges `global ∪ servers[address]` allow/deny lists, then applies
    /// allow-precedence-over-deny. Absent config (no entry for `address`
    /// and an empty global list) allows.
    pub fn server_allows_player(&self, address: &str, player: &PlayerInfo) -> bool {
        let per_server = self.servers.get(address);

        let allow_matches = self.global.allow.iter().any(|e| e.matches(player))
            || per_server
                .map(|cfg| cfg.allow.iter().any(|e| e.matches(player)))
                .unwrap_or(false);
        if allow_matches {
            return true;
        }

        let allowlist_non_empty = !self.global.allow.is_empty()
            || per_server.map(|cfg| !cfg.allow.is_empty()).unwrap_or(false);
        if allowlist_non_empty {
            return false;
        }

        let deny_matches = self.global.deny.iter().any(|e| e.matches(player))
            || per_server
                .map(|cfg| cfg.deny.iter().any(|e| e.matches(player)))
                .unwrap_or(false);
        !deny_matches
    }
}

/// Convenience set used by the file/orchestrator discovery adapters to dedup
/// hostnames parsed from a comma/newline-delimited annotation value.
pub fn split_hostnames(raw: &str) -> HashSet<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, uuid: Option<Uuid>) -> PlayerInfo {
        PlayerInfo {
            name: name.to_string(),
            uuid,
        }
    }

    #[test]
    fn absent_config_allows() {
        let cfg = AllowDenyConfig::default();
        assert!(cfg.server_allows_player("srv", &player("anyone", None)));
    }

    #[test]
    fn empty_entry_matches_no_one() {
        let entry = PlayerListEntry::default();
        assert!(!entry.matches(&player("anyone", None)));
        assert!(!entry.matches(&player("", Some(Uuid::nil()))));
    }

    #[test]
    fn uuid_only_entry_matches_regardless_of_name() {
        let uuid = Uuid::new_v4();
        let entry = PlayerListEntry {
            name: None,
            uuid: Some(uuid),
        };
        assert!(entry.matches(&player("anything", Some(uuid))));
        assert!(!entry.matches(&player("anything", None)));
    }

    #[test]
    fn allowlist_precedence_over_denylist_for_same_player() {
        let uuid = Uuid::new_v4();
        let mut cfg = AllowDenyConfig::default();
        cfg.global.allow.push(PlayerListEntry {
            name: None,
            uuid: Some(uuid),
        });
        cfg.global.deny.push(PlayerListEntry {
            name: None,
            uuid: Some(uuid),
        });

        assert!(cfg.server_allows_player("srv", &player("x", Some(uuid))));
    }

    #[test]
    fn nonempty_allowlist_denies_unmatched_players() {
        let mut cfg = AllowDenyConfig::default();
        cfg.global.allow.push(PlayerListEntry {
            name: Some("steve".to_string()),
            uuid: None,
        });

        assert!(!cfg.server_allows_player("srv", &player("alex", None)));
    }

    #[test]
    fn denylist_only_denies_matched_players() {
        let mut cfg = AllowDenyConfig::default();
        cfg.global.deny.push(PlayerListEntry {
            name: Some("griefer".to_string()),
            uuid: None,
        });

        assert!(!cfg.server_allows_player("srv", &player("griefer", None)));
        assert!(cfg.server_allows_player("srv", &player("steve", None)));
    }

    #[test]
    fn split_hostnames_handles_commas_newlines_and_whitespace() {
        let set = split_hostnames("a.com, b.com\nc.com ,  ");
        assert_eq!(set.len(), 3);
        assert!(set.contains("a.com"));
        assert!(set.contains("b.com"));
        assert!(set.contains("c.com"));
    }
}
