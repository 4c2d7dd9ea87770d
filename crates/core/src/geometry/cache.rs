use crate::{
    config::GeometryConfig,
    geometry::{GeometryParameterSet, ParameterBuilder},
};
use anyhow::Context;
use indexmap::IndexMap;
use log::{debug, trace};
use std::{cell::Cell, rc::Rc};

/// Shared, immutable access to a derived parameter set
pub type GeometryHandle = Rc<GeometryParameterSet>;

/// Default number of unpinned entries the cache keeps around beyond the
/// ones it must retain
pub const DEFAULT_SLACK: usize = 3;

#[derive(Debug)]
struct CacheEntry {
    handle: GeometryHandle,
    /// Signature of the underlying entry, for nested geometries
    underlying: Option<String>,
    /// Value of the cache clock the last time this entry was touched
    stamp: u64,
    pins: Rc<Cell<usize>>,
}

impl CacheEntry {
    fn is_pinned(&self) -> bool {
        self.pins.get() > 0
    }
}

/// Keeps a cache entry alive while it exists. Pins are reference counted,
/// the entry becomes evictable again once every guard on it is dropped.
#[derive(Debug)]
pub struct PinGuard {
    signature: String,
    pins: Rc<Cell<usize>>,
}

impl PinGuard {
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.pins.set(self.pins.get().saturating_sub(1));
    }
}

/// Parameter sets keyed by config signature. Each signature is built at
/// most once while it stays cached. Entries are stamped with a logical clock
/// whenever they're touched, and the least recently stamped ones are
/// evicted once the table outgrows its retained entries plus some slack.
#[derive(Debug)]
pub struct GeometryCache {
    entries: IndexMap<String, CacheEntry>,
    clock: u64,
    slack: usize,
}

impl GeometryCache {
    /// Create an empty cache. `slack` is clamped to at least 1.
    pub fn new(slack: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            clock: 0,
            slack: slack.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }

    /// Get a cached parameter set without touching it
    pub fn get(&self, signature: &str) -> Option<&GeometryHandle> {
        self.entries.get(signature).map(|entry| &entry.handle)
    }

    /// Signatures of all cached entries, oldest insertion first
    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Get the parameter set for a config, building it (and its underlying
    /// geometry, first) if necessary. `retain` names an entry that must
    /// survive the eviction pass, e.g. the current geometry.
    pub fn get_or_build(
        &mut self,
        config: &GeometryConfig,
        retain: Option<&str>,
    ) -> anyhow::Result<GeometryHandle> {
        self.clock += 1;
        let now = self.clock;
        let handle = self.fetch(config, now)?;
        self.evict(now, retain);
        Ok(handle)
    }

    fn fetch(
        &mut self,
        config: &GeometryConfig,
        now: u64,
    ) -> anyhow::Result<GeometryHandle> {
        let signature = config.signature();
        if let Some(entry) = self.entries.get_mut(&signature) {
            trace!("Geometry cache hit for {}", signature);
            entry.stamp = now;
            let handle = Rc::clone(&entry.handle);
            // Keep the underlying entries fresh as well
            if let Some(underlying) = config.underlying_config() {
                self.fetch(&underlying, now)?;
            }
            return Ok(handle);
        }

        let underlying = match config.underlying_config() {
            Some(underlying) => Some(
                self.fetch(&underlying, now)
                    .context("error building underlying geometry")?,
            ),
            None => None,
        };
        debug!("Building geometry {}", signature);
        let handle = Rc::new(ParameterBuilder::build(config, underlying)?);
        self.entries.insert(
            signature,
            CacheEntry {
                underlying: handle.underlying_signature().map(String::from),
                handle: Rc::clone(&handle),
                stamp: now,
                pins: Rc::new(Cell::new(0)),
            },
        );
        Ok(handle)
    }

    /// Pin an entry, so it can't be evicted until the guard is dropped.
    /// Returns `None` if there is no such entry.
    pub fn pin(&self, signature: &str) -> Option<PinGuard> {
        let entry = self.entries.get(signature)?;
        entry.pins.set(entry.pins.get() + 1);
        Some(PinGuard {
            signature: signature.to_owned(),
            pins: Rc::clone(&entry.pins),
        })
    }

    pub fn is_pinned(&self, signature: &str) -> bool {
        self.entries
            .get(signature)
            .map_or(false, CacheEntry::is_pinned)
    }

    /// Drop an entry, along with every entry built on top of it. Returns the
    /// signatures that were removed. Outstanding handles stay valid, they're
    /// just no longer cached.
    pub fn invalidate(&mut self, signature: &str) -> Vec<String> {
        let mut removed = Vec::new();
        let mut queue = vec![signature.to_owned()];
        while let Some(sig) = queue.pop() {
            if self.entries.shift_remove(&sig).is_none() {
                continue;
            }
            queue.extend(
                self.entries
                    .iter()
                    .filter(|(_, entry)| {
                        entry.underlying.as_deref() == Some(&sig)
                    })
                    .map(|(dependent, _)| dependent.clone()),
            );
            debug!("Invalidated geometry {}", sig);
            removed.push(sig);
        }
        removed
    }

    /// Signatures that must survive eviction: pinned entries, entries touched
    /// at `now`, the explicitly retained one, and everything those are built
    /// on
    fn retained(&self, now: u64, retain: Option<&str>) -> Vec<String> {
        let mut retained: Vec<String> = self
            .entries
            .iter()
            .filter(|(sig, entry)| {
                entry.is_pinned()
                    || entry.stamp == now
                    || retain == Some(sig.as_str())
            })
            .map(|(sig, _)| sig.clone())
            .collect();
        let mut i = 0;
        while i < retained.len() {
            let underlying = self
                .entries
                .get(&retained[i])
                .and_then(|entry| entry.underlying.clone());
            if let Some(underlying) = underlying {
                if !retained.contains(&underlying) {
                    retained.push(underlying);
                }
            }
            i += 1;
        }
        retained
    }

    fn evict(&mut self, now: u64, retain: Option<&str>) {
        let retained = self.retained(now, retain);
        let limit = self.slack + retained.len();
        while self.entries.len() > limit {
            let oldest = self
                .entries
                .iter()
                .filter(|(sig, _)| !retained.contains(sig))
                .min_by_key(|(_, entry)| entry.stamp)
                .map(|(sig, _)| sig.clone());
            match oldest {
                Some(sig) => {
                    debug!("Evicting geometry {}", sig);
                    self.entries.shift_remove(&sig);
                }
                None => break,
            }
        }
    }
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::new(DEFAULT_SLACK)
    }
}

/// Owns the geometry cache and the currently active geometry. Everything
/// that needs "the current geometry" takes one of these (or a handle from
/// it) explicitly, so several contexts can coexist.
#[derive(Debug, Default)]
pub struct GeometryContext {
    cache: GeometryCache,
    current: Option<(GeometryConfig, GeometryHandle)>,
}

impl GeometryContext {
    pub fn new(slack: usize) -> Self {
        Self {
            cache: GeometryCache::new(slack),
            current: None,
        }
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    /// Get the parameter set for any config. The current geometry is never
    /// evicted by this.
    pub fn get_or_build(
        &mut self,
        config: &GeometryConfig,
    ) -> anyhow::Result<GeometryHandle> {
        let current = self.current.as_ref().map(|(_, h)| h.signature.clone());
        self.cache.get_or_build(config, current.as_deref())
    }

    /// Make a config the current geometry, building it if needed
    pub fn set_current(
        &mut self,
        config: &GeometryConfig,
    ) -> anyhow::Result<GeometryHandle> {
        let signature = config.signature();
        let handle = self.cache.get_or_build(config, Some(&signature))?;
        self.current = Some((config.clone(), Rc::clone(&handle)));
        Ok(handle)
    }

    pub fn current(&self) -> Option<&GeometryHandle> {
        self.current.as_ref().map(|(_, handle)| handle)
    }

    pub fn current_config(&self) -> Option<&GeometryConfig> {
        self.current.as_ref().map(|(config, _)| config)
    }

    /// See [GeometryCache::pin]
    pub fn pin(&self, signature: &str) -> Option<PinGuard> {
        self.cache.pin(signature)
    }

    /// See [GeometryCache::invalidate]. If this hits the current geometry's
    /// chain, the current handle stays usable until
    /// [Self::propagate_scale_change] rebuilds it.
    pub fn invalidate(&mut self, signature: &str) -> Vec<String> {
        self.cache.invalidate(signature)
    }

    /// Rebuild the current geometry's dependency chain after a scale change,
    /// underlying geometries first. A dependent is rebuilt whenever the
    /// handle it was built on is no longer the cached one.
    pub fn propagate_scale_change(&mut self) -> anyhow::Result<()> {
        let config = match &self.current {
            Some((config, _)) => config.clone(),
            None => return Ok(()),
        };
        let mut chain = vec![config];
        while let Some(underlying) = chain[chain.len() - 1].underlying_config()
        {
            chain.push(underlying);
        }

        let current_sig = chain[0].signature();
        let mut below: Option<GeometryHandle> = None;
        for config in chain.iter().rev() {
            let signature = config.signature();
            let stale = match (self.cache.get(&signature), &below) {
                (Some(cached), Some(below)) => !cached
                    .underlying
                    .as_ref()
                    .map_or(false, |u| Rc::ptr_eq(u, below)),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if stale {
                debug!("Rebuilding geometry {} after scale change", signature);
                self.cache.entries.shift_remove(&signature);
            }
            below =
                Some(self.cache.get_or_build(config, Some(&current_sig))?);
        }

        if let (Some((_, handle)), Some(rebuilt)) = (&mut self.current, below)
        {
            *handle = rebuilt;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeometryKind, Variation};

    fn config(creature_scale: f64) -> GeometryConfig {
        GeometryConfig {
            creature_scale,
            ..Default::default()
        }
    }

    fn product() -> GeometryConfig {
        GeometryConfig {
            geometry: GeometryKind::Product {
                face: 7,
                vertex: 3,
                plevel_factor: 1.0,
                twisted: false,
            },
            variation: Variation::Pure,
            ..Default::default()
        }
    }

    #[test]
    fn test_builds_once() {
        let mut cache = GeometryCache::default();
        let a = cache.get_or_build(&config(1.0), None).unwrap();
        let b = cache.get_or_build(&config(1.0), None).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_underlying_built_first() {
        let mut cache = GeometryCache::default();
        let handle = cache.get_or_build(&product(), None).unwrap();
        assert_eq!(cache.len(), 2);
        let underlying_sig = product().underlying_config().unwrap().signature();
        let underlying = cache.get(&underlying_sig).unwrap();
        assert!(Rc::ptr_eq(handle.underlying.as_ref().unwrap(), underlying));
    }

    #[test]
    fn test_eviction() {
        let mut cache = GeometryCache::new(1);
        let first = config(1.0).signature();
        for i in 0..5 {
            cache.get_or_build(&config(1.0 + i as f64), None).unwrap();
            assert!(cache.len() <= 2);
        }
        assert!(!cache.contains(&first));
        assert!(cache.contains(&config(5.0).signature()));
        assert!(cache.contains(&config(4.0).signature()));
    }

    #[test]
    fn test_pinned_never_evicted() {
        let mut cache = GeometryCache::new(1);
        cache.get_or_build(&config(1.0), None).unwrap();
        let first = config(1.0).signature();
        let guard = cache.pin(&first).unwrap();
        let second = cache.pin(&first).unwrap();
        for i in 1..5 {
            cache.get_or_build(&config(1.0 + i as f64), None).unwrap();
        }
        assert!(cache.contains(&first));
        drop(guard);
        assert!(cache.is_pinned(&first));
        drop(second);
        assert!(!cache.is_pinned(&first));
        cache.get_or_build(&config(10.0), None).unwrap();
        cache.get_or_build(&config(11.0), None).unwrap();
        assert!(!cache.contains(&first));
    }

    #[test]
    fn test_current_and_underlying_retained() {
        let mut context = GeometryContext::new(1);
        context.set_current(&product()).unwrap();
        for i in 1..6 {
            context.get_or_build(&config(1.0 + i as f64)).unwrap();
        }
        let underlying_sig = product().underlying_config().unwrap().signature();
        assert!(context.cache().contains(&product().signature()));
        assert!(context.cache().contains(&underlying_sig));
    }

    #[test]
    fn test_invalidate_dependents() {
        let mut cache = GeometryCache::default();
        cache.get_or_build(&product(), None).unwrap();
        let underlying_sig = product().underlying_config().unwrap().signature();
        let removed = cache.invalidate(&underlying_sig);
        assert_eq!(removed, vec![underlying_sig, product().signature()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_propagate_scale_change() {
        let mut context = GeometryContext::default();
        let old = context.set_current(&product()).unwrap();
        let underlying_sig = product().underlying_config().unwrap().signature();
        context.invalidate(&underlying_sig);
        // Nothing cached anymore, but the current handle still works
        assert_eq!(context.current().unwrap().signature, old.signature);

        context.propagate_scale_change().unwrap();
        let current = context.current().unwrap();
        assert!(!Rc::ptr_eq(current, &old));
        let underlying = context.cache().get(&underlying_sig).unwrap();
        assert!(Rc::ptr_eq(current.underlying.as_ref().unwrap(), underlying));

        // Rebuilding again with nothing stale is a no-op
        let before = Rc::clone(current);
        context.propagate_scale_change().unwrap();
        assert!(Rc::ptr_eq(context.current().unwrap(), &before));
    }

    #[test]
    fn test_invalid_config() {
        let mut cache = GeometryCache::default();
        let err = cache
            .get_or_build(
                &GeometryConfig {
                    creature_scale: -1.0,
                    ..Default::default()
                },
                None,
            )
            .unwrap_err();
        assert!(err.downcast_ref::<validator::ValidationErrors>().is_some());
    }
}
