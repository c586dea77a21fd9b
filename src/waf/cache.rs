//! Profile engine cache.
//!
//! # Responsibilities
//! - Map profile id → compiled engine, process-local
//! - Build lazily on miss, never cache failures
//! - Drop entries on explicit invalidation only (no TTL, no eviction)
//!
//! # Design Decisions
//! - Concurrent misses for one profile share a single build (per-profile lock)
//! - Invalidation bumps a per-profile generation; a build that started before
//!   the bump returns its engine to the caller but does not publish it
//! - No map guard is held across an `.await`
//! - Build locks and generations only live while a profile has a build in
//!   flight or a pending invalidation, so unknown profile ids do not pile up

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::Engine;
use crate::observability::metrics;
use crate::waf::builder::EngineBuilder;
use crate::waf::types::{ProfileId, WafResult};

/// Concurrency-safe cache of compiled engines keyed by profile.
pub struct EngineCache {
    entries: DashMap<ProfileId, Arc<Engine>>,
    /// Present only while some caller holds or waits for the build.
    build_locks: DashMap<ProfileId, Arc<Mutex<()>>>,
    /// Invalidation counter, kept only while a build may need to observe it.
    generations: DashMap<ProfileId, u64>,
    builder: EngineBuilder,
}

impl EngineCache {
    pub fn new(builder: EngineBuilder) -> Self {
        Self {
            entries: DashMap::new(),
            build_locks: DashMap::new(),
            generations: DashMap::new(),
            builder,
        }
    }

    /// Cached engine for `profile`, building it on a miss.
    pub async fn get(&self, profile: &ProfileId) -> WafResult<Arc<Engine>> {
        if let Some(engine) = self.lookup(profile) {
            return Ok(engine);
        }

        let lock = self
            .build_locks
            .entry(profile.clone())
            .or_default()
            .clone();
        let result = self.build_locked(profile, &lock).await;
        self.release(profile, &lock);
        result
    }

    async fn build_locked(&self, profile: &ProfileId, lock: &Mutex<()>) -> WafResult<Arc<Engine>> {
        let _build = lock.lock().await;

        // Another caller may have finished the build while we waited.
        if let Some(engine) = self.lookup(profile) {
            return Ok(engine);
        }

        let generation = self.generation(profile);
        let engine = Arc::new(self.builder.build(profile).await?);
        self.publish(profile, generation, engine.clone());
        Ok(engine)
    }

    /// Drop the build lock of `profile` unless another caller still holds a
    /// clone of it. `lock` is the caller's own clone.
    fn release(&self, profile: &ProfileId, lock: &Arc<Mutex<()>>) {
        let removed = self
            .build_locks
            .remove_if(profile, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2);
        if removed.is_some() {
            self.forget_generation(profile);
        }
    }

    /// Drop the generation of `profile` when no build could still observe it.
    fn forget_generation(&self, profile: &ProfileId) {
        self.generations
            .remove_if(profile, |_, _| !self.build_locks.contains_key(profile));
    }

    /// Drop the cached engine of `profile`. Absent entries are not an error.
    pub fn invalidate(&self, profile: &ProfileId) -> WafResult<()> {
        *self.generations.entry(profile.clone()).or_insert(0) += 1;
        self.forget_generation(profile);
        if self.entries.remove(profile).is_some() {
            tracing::info!(profile = %profile, "Engine invalidated");
        } else {
            tracing::debug!(profile = %profile, "Invalidate on uncached profile");
        }
        metrics::record_cached_engines(self.entries.len());
        Ok(())
    }

    /// Whether an engine is cached for `profile`.
    pub fn contains(&self, profile: &ProfileId) -> bool {
        self.entries.contains_key(profile)
    }

    /// Profiles with a cached engine, sorted.
    pub fn cached_profiles(&self) -> Vec<ProfileId> {
        let mut profiles: Vec<ProfileId> = self.entries.iter().map(|r| r.key().clone()).collect();
        profiles.sort();
        profiles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, profile: &ProfileId) -> Option<Arc<Engine>> {
        self.entries.get(profile).map(|r| r.value().clone())
    }

    fn generation(&self, profile: &ProfileId) -> u64 {
        self.generations.get(profile).map_or(0, |g| *g)
    }

    fn publish(&self, profile: &ProfileId, started_at: u64, engine: Arc<Engine>) {
        // Holding the generation guard while inserting orders this publish
        // strictly before or after any concurrent invalidate.
        let current = self.generations.get(profile);
        if current.as_deref().copied().unwrap_or(0) != started_at {
            tracing::info!(profile = %profile, "Profile invalidated during build, not caching engine");
            return;
        }
        self.entries.insert(profile.clone(), engine);
        drop(current);
        metrics::record_cached_engines(self.entries.len());
    }
}
