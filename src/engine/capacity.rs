use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::cache::{Refresh, RemoteSyncCache};
use crate::limits::MAX_RESOURCES;
use crate::model::*;
use crate::observability::RESOURCES_INDEXED;
use crate::remote::RemoteSource;

use super::EngineError;

/// Time-of-day → number of active resources that can honor it.
/// Capacity is not date-scoped; there are no per-day overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityIndex {
    by_time: BTreeMap<TimeOfDay, u32>,
    resources: usize,
}

impl CapacityIndex {
    pub fn build(resources: &[Resource]) -> Self {
        let mut by_time = BTreeMap::new();
        let mut counted = 0;
        for r in resources.iter().filter(|r| r.active).take(MAX_RESOURCES) {
            if r.available_hours.is_empty() {
                debug!("resource {} has no hours configured, contributes no capacity", r.id);
                continue;
            }
            counted += 1;
            let mut hours = r.available_hours.clone();
            hours.sort();
            hours.dedup();
            for hour in hours {
                if r.covers(hour) {
                    *by_time.entry(hour).or_insert(0) += 1;
                }
            }
        }
        Self {
            by_time,
            resources: counted,
        }
    }

    pub fn capacity_at(&self, time: TimeOfDay) -> u32 {
        self.by_time.get(&time).copied().unwrap_or(0)
    }

    /// Active resources with at least one configured hour.
    pub fn resource_count(&self) -> usize {
        self.resources
    }

    /// Covered hours in ascending order with their capacity.
    pub fn hours(&self) -> impl Iterator<Item = (TimeOfDay, u32)> + '_ {
        self.by_time.iter().map(|(t, c)| (*t, *c))
    }
}

/// The pool of officials, as last fetched from the remote, plus the
/// capacity index derived from it. A failed fetch keeps the previous
/// snapshot and index.
#[derive(Debug)]
pub struct ResourceDirectory {
    cache: RemoteSyncCache<Vec<Resource>>,
    index: CapacityIndex,
}

impl ResourceDirectory {
    pub fn new(ttl_ms: Ms) -> Self {
        Self {
            cache: RemoteSyncCache::new("resources", ttl_ms),
            index: CapacityIndex::default(),
        }
    }

    pub fn index(&self) -> &CapacityIndex {
        &self.index
    }

    pub fn resources(&self) -> &[Resource] {
        self.cache.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cache(&self) -> &RemoteSyncCache<Vec<Resource>> {
        &self.cache
    }

    pub async fn refresh(&mut self, now: Ms, remote: &dyn RemoteSource) -> Result<Refresh, EngineError> {
        let outcome = self
            .cache
            .refresh(now, || remote.list_active_resources())
            .await?;
        if outcome == Refresh::Fetched {
            self.rebuild();
        }
        Ok(outcome)
    }

    /// Replace the snapshot directly, as if it had just been fetched.
    pub fn load(&mut self, resources: Vec<Resource>, now: Ms) {
        self.cache.store(resources, now);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let resources = self.cache.get().map(Vec::as_slice).unwrap_or(&[]);
        if resources.len() > MAX_RESOURCES {
            warn!(
                "resource directory has {} entries, indexing the first {MAX_RESOURCES}",
                resources.len()
            );
        }
        let index = CapacityIndex::build(resources);
        metrics::gauge!(RESOURCES_INDEXED).set(index.resource_count() as f64);
        self.index = index;
    }
}
