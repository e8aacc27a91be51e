use serde::Serialize;
use std::collections::BTreeMap;

/// Counters for graph activity. Never consulted by the analysis itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub site_runs: usize,
    pub sites_created: usize,
    pub sites_destroyed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    /// Times a type left a vertex because its last origin went away
    pub type_removals: usize,
    pub live_sites: BTreeMap<&'static str, usize>,
}

impl EngineStats {
    pub(crate) fn site_created(&mut self, kind: &'static str) {
        self.sites_created += 1;
        *self.live_sites.entry(kind).or_insert(0) += 1;
    }

    pub(crate) fn site_destroyed(&mut self, kind: &'static str) {
        self.sites_destroyed += 1;
        if let Some(count) = self.live_sites.get_mut(kind) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn live_site_count(&self) -> usize {
        self.live_sites.values().sum()
    }
}
