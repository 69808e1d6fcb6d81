//! Bounded pool for expensive GPU objects.
//!
//! Textures, framebuffers and per-draw uniform storage are costly to create
//! and destroy every frame. The pool hands out idle ones, creates new ones up
//! to a cap, and reclaims entries that have sat idle for too long.
//!
//! Resources are small copyable handles; the device objects behind them are
//! created and destroyed by a [`ResourceFactory`] passed into each call, so
//! the pool never owns the device.

use std::time::{Duration, Instant};

use terra_common::{TerraError, TerraResult};
use tracing::{debug, info, warn};

/// Creates, validates and destroys the objects behind pooled handles.
pub trait ResourceFactory<T> {
    /// Creates a new resource.
    fn create(&mut self) -> TerraResult<T>;

    /// Whether a pooled resource can still be used (e.g. not lost with the device).
    fn is_valid(&self, resource: &T) -> bool;

    /// Frees the underlying object.
    fn destroy(&mut self, resource: T);
}

/// Pool sizing and reclamation settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Label used in log messages
    pub label: &'static str,
    /// Maximum number of tracked resources
    pub max_size: usize,
    /// Idle entries older than this are destroyed on the next acquire
    pub max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            label: "pool",
            max_size: 32,
            max_idle_time: Duration::from_secs(30),
        }
    }
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tracked resources (idle + in use)
    pub total: usize,
    /// Idle tracked resources
    pub available: usize,
    /// Tracked resources currently handed out
    pub in_use: usize,
    /// Resources created for the pool
    pub created: u64,
    /// Acquires served from an idle entry
    pub reused: u64,
    /// Idle or invalid entries destroyed
    pub purged: u64,
    /// Resources created outside the pool because it was full
    pub untracked: u64,
}

#[derive(Debug)]
struct PoolEntry<T> {
    resource: T,
    in_use: bool,
    last_used: Instant,
}

/// Generic bounded resource pool.
///
/// A resource returned by [`ResourcePool::acquire`] is never returned again
/// until it has been handed back through [`ResourcePool::release`].
#[derive(Debug)]
pub struct ResourcePool<T> {
    config: PoolConfig,
    entries: Vec<PoolEntry<T>>,
    stats: PoolStats,
    disposed: bool,
}

impl<T: Copy + PartialEq + std::fmt::Debug> ResourcePool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        debug!(
            "Creating {} pool (max_size={}, max_idle={:?})",
            config.label, config.max_size, config.max_idle_time
        );
        Self {
            config,
            entries: Vec::new(),
            stats: PoolStats::default(),
            disposed: false,
        }
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hands out an idle resource, or creates one.
    ///
    /// Expired idle entries are purged first. When the pool is at capacity
    /// the resource comes from [`Self::acquire_untracked`] instead.
    pub fn acquire<F: ResourceFactory<T> + ?Sized>(&mut self, factory: &mut F) -> TerraResult<T> {
        self.ensure_live()?;
        let now = Instant::now();
        self.purge_idle_at(factory, now);

        while let Some(index) = self.entries.iter().position(|e| !e.in_use) {
            if factory.is_valid(&self.entries[index].resource) {
                let entry = &mut self.entries[index];
                entry.in_use = true;
                entry.last_used = now;
                self.stats.reused += 1;
                return Ok(entry.resource);
            }
            let stale = self.entries.swap_remove(index);
            debug!("{} pool dropping invalid {:?}", self.config.label, stale.resource);
            factory.destroy(stale.resource);
            self.stats.purged += 1;
        }

        if self.entries.len() < self.config.max_size {
            let resource = factory.create()?;
            self.entries.push(PoolEntry {
                resource,
                in_use: true,
                last_used: now,
            });
            self.stats.created += 1;
            return Ok(resource);
        }

        self.acquire_untracked(factory)
    }

    /// Creates a resource the pool does not track.
    ///
    /// This is the escape valve for a saturated pool: a spike in concurrent
    /// demand gets a temporary resource instead of stalling rendering.
    pub fn acquire_untracked<F: ResourceFactory<T> + ?Sized>(
        &mut self,
        factory: &mut F,
    ) -> TerraResult<T> {
        self.ensure_live()?;
        warn!(
            "{} pool exhausted ({} in use), allocating untracked resource",
            self.config.label,
            self.entries.len()
        );
        let resource = factory.create()?;
        self.stats.untracked += 1;
        Ok(resource)
    }

    /// Returns a resource to the pool.
    ///
    /// Untracked resources are destroyed on the spot. Releasing a tracked
    /// resource that is already idle is an ownership bug and fails loudly.
    pub fn release<F: ResourceFactory<T> + ?Sized>(
        &mut self,
        factory: &mut F,
        resource: T,
    ) -> TerraResult<()> {
        if self.disposed {
            factory.destroy(resource);
            return Ok(());
        }
        match self.entries.iter_mut().find(|e| e.resource == resource) {
            Some(entry) if entry.in_use => {
                entry.in_use = false;
                entry.last_used = Instant::now();
                Ok(())
            },
            Some(_) => Err(TerraError::PoolInvariant(format!(
                "{} pool: {resource:?} released twice",
                self.config.label
            ))),
            None => {
                debug!("{} pool destroying untracked {resource:?}", self.config.label);
                factory.destroy(resource);
                Ok(())
            },
        }
    }

    /// Eagerly creates idle resources until `min(count, max_size)` are tracked.
    pub fn pre_warm<F: ResourceFactory<T> + ?Sized>(
        &mut self,
        factory: &mut F,
        count: usize,
    ) -> TerraResult<usize> {
        self.ensure_live()?;
        let target = count.min(self.config.max_size);
        let now = Instant::now();
        let mut created = 0;
        while self.entries.len() < target {
            let resource = factory.create()?;
            self.entries.push(PoolEntry {
                resource,
                in_use: false,
                last_used: now,
            });
            self.stats.created += 1;
            created += 1;
        }
        if created > 0 {
            debug!("{} pool pre-warmed {created} resources", self.config.label);
        }
        Ok(created)
    }

    /// Destroys idle entries that have been unused longer than `max_idle_time`.
    pub fn purge_idle<F: ResourceFactory<T> + ?Sized>(&mut self, factory: &mut F) -> usize {
        self.purge_idle_at(factory, Instant::now())
    }

    fn purge_idle_at<F: ResourceFactory<T> + ?Sized>(
        &mut self,
        factory: &mut F,
        now: Instant,
    ) -> usize {
        let max_idle = self.config.max_idle_time;
        let mut purged = 0;
        let mut index = 0;
        while index < self.entries.len() {
            let entry = &self.entries[index];
            if !entry.in_use && now.saturating_duration_since(entry.last_used) > max_idle {
                let expired = self.entries.swap_remove(index);
                factory.destroy(expired.resource);
                purged += 1;
            } else {
                index += 1;
            }
        }
        if purged > 0 {
            self.stats.purged += purged as u64;
            debug!("{} pool purged {purged} idle resources", self.config.label);
        }
        purged
    }

    /// Destroys every tracked resource. The pool rejects acquires afterwards.
    pub fn dispose<F: ResourceFactory<T> + ?Sized>(&mut self, factory: &mut F) {
        if self.disposed {
            return;
        }
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            factory.destroy(entry.resource);
        }
        self.disposed = true;
        info!("{} pool disposed ({count} resources released)", self.config.label);
    }

    /// Whether [`Self::dispose`] has run.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of idle tracked resources.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.in_use).count()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let available = self.available_count();
        PoolStats {
            total: self.entries.len(),
            available,
            in_use: self.entries.len() - available,
            ..self.stats
        }
    }

    fn ensure_live(&self) -> TerraResult<()> {
        if self.disposed {
            return Err(TerraError::Configuration(format!(
                "{} pool used after dispose",
                self.config.label
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Factory handing out increasing integers and recording destruction.
    #[derive(Default)]
    struct CountingFactory {
        next: u32,
        live: HashSet<u32>,
        destroyed: Vec<u32>,
        invalid: HashSet<u32>,
    }

    impl ResourceFactory<u32> for CountingFactory {
        fn create(&mut self) -> TerraResult<u32> {
            self.next += 1;
            self.live.insert(self.next);
            Ok(self.next)
        }

        fn is_valid(&self, resource: &u32) -> bool {
            !self.invalid.contains(resource)
        }

        fn destroy(&mut self, resource: u32) {
            self.live.remove(&resource);
            self.destroyed.push(resource);
        }
    }

    fn pool(max_size: usize) -> ResourcePool<u32> {
        ResourcePool::new(PoolConfig {
            label: "test",
            max_size,
            max_idle_time: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_reuses_released_resource() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(4);
        let a = pool.acquire(&mut factory).expect("acquire");
        pool.release(&mut factory, a).expect("release");
        let b = pool.acquire(&mut factory).expect("acquire");
        assert_eq!(a, b);
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(pool.stats().created, 1);
    }

    #[test]
    fn test_escape_valve_when_full() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(2);
        let a = pool.acquire(&mut factory).expect("acquire");
        let b = pool.acquire(&mut factory).expect("acquire");
        let c = pool.acquire(&mut factory).expect("acquire");
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(pool.total_count(), 2);
        assert_eq!(pool.stats().untracked, 1);

        // Untracked resources are destroyed, never pooled.
        pool.release(&mut factory, c).expect("release");
        assert!(factory.destroyed.contains(&c));
        assert_eq!(pool.available_count(), 0);
    }

    #[test]
    fn test_double_release_fails() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(2);
        let a = pool.acquire(&mut factory).expect("acquire");
        pool.release(&mut factory, a).expect("release");
        assert!(matches!(
            pool.release(&mut factory, a),
            Err(TerraError::PoolInvariant(_))
        ));
    }

    #[test]
    fn test_invalid_entries_replaced() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(2);
        let a = pool.acquire(&mut factory).expect("acquire");
        pool.release(&mut factory, a).expect("release");
        factory.invalid.insert(a);
        let b = pool.acquire(&mut factory).expect("acquire");
        assert_ne!(a, b);
        assert!(factory.destroyed.contains(&a));
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn test_idle_purge() {
        let mut factory = CountingFactory::default();
        let mut pool = ResourcePool::new(PoolConfig {
            label: "test",
            max_size: 4,
            max_idle_time: Duration::ZERO,
        });
        pool.pre_warm(&mut factory, 3).expect("pre-warm");
        assert_eq!(pool.available_count(), 3);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(pool.purge_idle(&mut factory), 3);
        assert_eq!(pool.total_count(), 0);
        assert!(factory.live.is_empty());
    }

    #[test]
    fn test_pre_warm_capped() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(3);
        assert_eq!(pool.pre_warm(&mut factory, 10).expect("pre-warm"), 3);
        assert_eq!(pool.available_count(), 3);
        assert_eq!(pool.pre_warm(&mut factory, 10).expect("pre-warm"), 0);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut factory = CountingFactory::default();
        let mut pool = pool(4);
        let _held = pool.acquire(&mut factory).expect("acquire");
        pool.pre_warm(&mut factory, 3).expect("pre-warm");
        pool.dispose(&mut factory);
        assert!(factory.live.is_empty());
        assert!(pool.is_disposed());
        assert!(matches!(
            pool.acquire(&mut factory),
            Err(TerraError::Configuration(_))
        ));
    }

    proptest! {
        /// No resource is handed out twice without a release in between.
        #[test]
        fn prop_no_double_acquire(ops in prop::collection::vec(any::<bool>(), 1..200)) {
            let mut factory = CountingFactory::default();
            let mut pool = pool(8);
            let mut held: Vec<u32> = Vec::new();
            for acquire in ops {
                if acquire || held.is_empty() {
                    let r = pool.acquire(&mut factory).expect("acquire");
                    prop_assert!(!held.contains(&r), "{} handed out twice", r);
                    held.push(r);
                } else {
                    let r = held.remove(0);
                    pool.release(&mut factory, r).expect("release");
                }
                prop_assert!(pool.total_count() <= 8);
            }
        }
    }
}
