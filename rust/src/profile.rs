//! Named deployment profiles. A profile bundles the values that differ per
//! target environment: which swarm manager to reach, as whom, and under which
//! subdomain and deploy environment the service runs.

use serde::{Deserialize, Serialize};

/// Override values for one deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub manager_node: String,
    pub manager_user: String,
    pub subdomain: String,
    pub deploy_env: String,
}

impl Profile {
    pub fn new(manager_node: &str, manager_user: &str, subdomain: &str, deploy_env: &str) -> Self {
        Self {
            manager_node: manager_node.to_string(),
            manager_user: manager_user.to_string(),
            subdomain: subdomain.to_string(),
            deploy_env: deploy_env.to_string(),
        }
    }
}

/// Ordered table of profiles keyed by name.
///
/// Names are stored lowercased and looked up case-insensitively. Insertion
/// order is kept so listings match the order profiles were declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTable {
    entries: Vec<(String, Profile)>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The profiles every configuration starts with.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert("staging", Profile::new("localhost", "root", "staging", "staging"));
        table.insert("cybersec", Profile::new("localhost", "root", "cybersecurity", "cybersec"));
        table.insert("production", Profile::new("localhost", "root", "uhapps", "production"));
        table
    }

    /// Adds a profile, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: &str, profile: Profile) {
        let key = normalize(name);
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = profile,
            None => self.entries.push((key, profile)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        let key = normalize(name);
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, profile)| profile)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Profile)> {
        self.entries.iter().map(|(name, profile)| (name.as_str(), profile))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
