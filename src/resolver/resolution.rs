use crate::buildconfig::ModuleIdentity;
use crate::metadata::Commit;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Resolved dependency closure: one commit per module identity.
///
/// Iteration is ordered by identity so printed output is stable. The order
/// says nothing about build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    commits: BTreeMap<ModuleIdentity, Commit>,
}

/// One line of lock-file style output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPin {
    pub remote: String,
    pub owner: String,
    pub repository: String,
    pub commit: String,
}

impl Resolution {
    pub(crate) fn entry(&mut self, identity: ModuleIdentity) -> btree_map::Entry<'_, ModuleIdentity, Commit> {
        self.commits.entry(identity)
    }

    pub fn get(&self, identity: &ModuleIdentity) -> Option<&Commit> {
        self.commits.get(identity)
    }

    pub fn contains(&self, identity: &ModuleIdentity) -> bool {
        self.commits.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleIdentity, &Commit)> {
        self.commits.iter()
    }

    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits.values()
    }

    /// Pins for every resolved module; all of them live on `remote`.
    pub fn pins(&self, remote: &str) -> Vec<DependencyPin> {
        self.commits
            .iter()
            .map(|(identity, commit)| DependencyPin {
                remote: remote.to_string(),
                owner: identity.owner.clone(),
                repository: identity.repository.clone(),
                commit: commit.name.clone(),
            })
            .collect()
    }
}

impl IntoIterator for Resolution {
    type Item = (ModuleIdentity, Commit);
    type IntoIter = btree_map::IntoIter<ModuleIdentity, Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(name: &str) -> Commit {
        Commit {
            id: format!("id-{}", name),
            name: name.to_string(),
            repository_id: "repo".to_string(),
        }
    }

    #[test]
    fn test_pins_are_sorted_by_identity() {
        let mut resolution = Resolution::default();
        resolution
            .entry(ModuleIdentity::new("acme", "zeta"))
            .or_insert(commit("z1"));
        resolution
            .entry(ModuleIdentity::new("acme", "alpha"))
            .or_insert(commit("a1"));

        let pins = resolution.pins("registry.local");
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[0].repository, "alpha");
        assert_eq!(pins[0].commit, "a1");
        assert_eq!(pins[1].repository, "zeta");
        assert!(pins.iter().all(|p| p.remote == "registry.local"));
    }

    #[test]
    fn test_pin_serialization() {
        let pin = DependencyPin {
            remote: "registry.local".to_string(),
            owner: "acme".to_string(),
            repository: "money".to_string(),
            commit: "v2".to_string(),
        };
        let json = serde_json::to_value(&pin).unwrap();
        assert_eq!(json["owner"], "acme");
        assert_eq!(json["commit"], "v2");
    }
}
