// chkit/src/cluster/host_manager.rs
//
// Prioritized host registry with per-host cooldowns.
// The tier table is frozen at build time; only cooldown deadlines change
// afterwards, each behind its own lock.
//

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

use super::{Host, Topology};
use crate::errors::{ClickHouseError, Result};

#[derive(Debug)]
struct HostSlot {
    host: Host,
    priority: u32,
    cooling_until: Mutex<Option<Instant>>,
}

impl HostSlot {
    /// Eligible unless a cooldown is still running. An expired cooldown is
    /// cleared on the way.
    fn is_eligible(&self, now: Instant) -> bool {
        let mut until = self.cooling_until.lock();
        match *until {
            Some(deadline) if deadline > now => false,
            Some(_) => {
                *until = None;
                true
            }
            None => true,
        }
    }
}

/// Collects hosts before the set is frozen into a [`HostManager`].
#[derive(Debug, Default)]
pub struct HostManagerBuilder {
    entries: Vec<(u32, Host)>,
}

impl HostManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `host` under `priority`. Registering the same host twice is a
    /// no-op when the priority matches and an error otherwise.
    pub fn add(&mut self, priority: u32, host: impl Into<Host>) -> Result<&mut Self> {
        let host = host.into();
        if let Some((existing, _)) = self.entries.iter().find(|(_, h)| h == &host) {
            if *existing != priority {
                return Err(ClickHouseError::ConfigError(format!(
                    "host {} is already registered with priority {}, cannot move it to {}",
                    host, existing, priority
                )));
            }
            return Ok(self);
        }
        self.entries.push((priority, host));
        Ok(self)
    }

    /// Register every host of `topology`. Shapes without explicit priorities
    /// are only accepted while the builder is still empty.
    pub fn load(&mut self, topology: &Topology) -> Result<&mut Self> {
        if topology.is_empty() {
            return Ok(self);
        }
        if !self.entries.is_empty() && !topology.has_explicit_priority() {
            return Err(ClickHouseError::ConfigError(
                "priority is not specified for new hosts".to_string(),
            ));
        }
        for (priority, host) in topology.entries() {
            self.add(priority, host)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Result<HostManager> {
        if self.entries.is_empty() {
            return Err(ClickHouseError::ConfigError(
                "topology does not contain any hosts".to_string(),
            ));
        }

        let mut tiers: Vec<(u32, Vec<Arc<HostSlot>>)> = Vec::new();
        let mut index = HashMap::with_capacity(self.entries.len());
        for (priority, host) in self.entries {
            let slot = Arc::new(HostSlot {
                host: host.clone(),
                priority,
                cooling_until: Mutex::new(None),
            });
            index.insert(host, slot.clone());
            match tiers.iter_mut().find(|(p, _)| *p == priority) {
                Some((_, slots)) => slots.push(slot),
                None => tiers.push((priority, vec![slot])),
            }
        }
        tiers.sort_by_key(|(p, _)| *p);

        Ok(HostManager { tiers, index })
    }
}

/// Selects hosts by priority tier, skipping those that are cooling down.
#[derive(Debug)]
pub struct HostManager {
    /// Ascending by priority.
    tiers: Vec<(u32, Vec<Arc<HostSlot>>)>,
    index: HashMap<Host, Arc<HostSlot>>,
}

impl HostManager {
    pub fn builder() -> HostManagerBuilder {
        HostManagerBuilder::new()
    }

    pub fn from_topology(topology: &Topology) -> Result<Self> {
        let mut builder = HostManagerBuilder::new();
        builder.load(topology)?;
        builder.build()
    }

    /// Pick an eligible host from the most preferred tier that has one.
    pub fn get(&self) -> Result<Host> {
        self.get_at(Instant::now())
    }

    pub(crate) fn get_at(&self, now: Instant) -> Result<Host> {
        let mut rng = rand::thread_rng();
        for (priority, slots) in &self.tiers {
            let eligible: Vec<&Arc<HostSlot>> =
                slots.iter().filter(|slot| slot.is_eligible(now)).collect();
            if let Some(slot) = eligible.choose(&mut rng) {
                debug!("Selected host {} from tier {}", slot.host, priority);
                return Ok(slot.host.clone());
            }
        }
        Err(ClickHouseError::NoAvailableHosts(self.index.len()))
    }

    /// Exclude `host` from selection for `duration`.
    pub fn cooldown(&self, host: &Host, duration: Duration) {
        self.cooldown_at(host, duration, Instant::now())
    }

    pub(crate) fn cooldown_at(&self, host: &Host, duration: Duration, now: Instant) {
        let Some(slot) = self.index.get(host) else {
            debug!("Ignoring cooldown for unknown host {}", host);
            return;
        };
        let deadline = now + duration;
        let mut until = slot.cooling_until.lock();
        let next = match *until {
            Some(current) if current > deadline => current,
            _ => deadline,
        };
        *until = Some(next);
    }

    /// Make `host` eligible again immediately.
    pub fn release(&self, host: &Host) {
        if let Some(slot) = self.index.get(host) {
            *slot.cooling_until.lock() = None;
        }
    }

    pub fn is_cooling_down(&self, host: &Host) -> bool {
        self.index
            .get(host)
            .map(|slot| !slot.is_eligible(Instant::now()))
            .unwrap_or(false)
    }

    /// Every registered host regardless of cooldown, most preferred first.
    pub fn hosts_set(&self) -> Vec<Host> {
        self.tiers
            .iter()
            .flat_map(|(_, slots)| slots.iter().map(|slot| slot.host.clone()))
            .collect()
    }

    pub fn priority_of(&self, host: &Host) -> Option<u32> {
        self.index.get(host).map(|slot| slot.priority)
    }

    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.index.values().filter(|slot| slot.is_eligible(now)).count()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use super::*;
    use crate::cluster::Tier;

    fn layout(manager: &HostManager) -> Vec<(u32, String)> {
        manager
            .hosts_set()
            .into_iter()
            .map(|h| (manager.priority_of(&h).unwrap(), h.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_topology_shapes() {
        let single = HostManager::from_topology(&Topology::Single("a:8123".into())).unwrap();
        assert_eq!(layout(&single), vec![(1, "http://a:8123".to_string())]);

        let list = HostManager::from_topology(&Topology::List(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(
            layout(&list),
            vec![(0, "http://a".to_string()), (1, "http://b".to_string())]
        );

        let set = HostManager::from_topology(&Topology::Set(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(
            layout(&set),
            vec![(1, "http://a".to_string()), (1, "http://b".to_string())]
        );

        let tiers = HostManager::from_topology(&Topology::Tiers(vec![
            Tier { priority: 2, hosts: vec!["c".into()] },
            Tier { priority: 1, hosts: vec!["a".into(), "b".into()] },
        ]))
        .unwrap();
        assert_eq!(
            layout(&tiers),
            vec![
                (1, "http://a".to_string()),
                (1, "http://b".to_string()),
                (2, "http://c".to_string()),
            ]
        );

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 3);
        map.insert("b".to_string(), 1);
        let inverse = HostManager::from_topology(&Topology::Priorities(map)).unwrap();
        assert_eq!(
            layout(&inverse),
            vec![(1, "http://b".to_string()), (3, "http://a".to_string())]
        );
    }

    #[test]
    fn test_reloading_without_priority_is_rejected() {
        let mut builder = HostManager::builder();
        builder.load(&Topology::Single("a".into())).unwrap();

        for topo in [
            Topology::Single("b".into()),
            Topology::List(vec!["b".into()]),
            Topology::Set(vec!["b".into()]),
        ] {
            let err = builder.load(&topo).unwrap_err();
            assert!(matches!(err, ClickHouseError::ConfigError(_)));
        }

        builder
            .load(&Topology::Tiers(vec![Tier { priority: 2, hosts: vec!["b".into()] }]))
            .unwrap();
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_host_in_two_tiers_is_rejected() {
        let err = HostManager::from_topology(&Topology::Tiers(vec![
            Tier { priority: 1, hosts: vec!["a".into()] },
            Tier { priority: 2, hosts: vec!["a".into()] },
        ]))
        .unwrap_err();
        assert!(matches!(err, ClickHouseError::ConfigError(_)));
    }

    #[test]
    fn test_empty_topology_is_rejected() {
        let err = HostManager::from_topology(&Topology::List(vec![])).unwrap_err();
        assert!(matches!(err, ClickHouseError::ConfigError(_)));
    }

    #[test]
    fn test_prefers_lowest_tier() {
        let manager = HostManager::from_topology(&Topology::List(vec!["a".into(), "b".into()])).unwrap();
        for _ in 0..20 {
            assert_eq!(manager.get().unwrap(), Host::new("a"));
        }
    }

    #[test]
    fn test_spreads_within_tier() {
        let manager = HostManager::from_topology(&Topology::Set(vec![
            "a".into(),
            "b".into(),
            "c".into(),
        ]))
        .unwrap();
        let picked: HashSet<Host> = (0..300).map(|_| manager.get().unwrap()).collect();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_cooling_host_is_skipped_until_expiry() {
        let manager = HostManager::from_topology(&Topology::List(vec!["a".into(), "b".into()])).unwrap();
        let a = Host::new("a");
        let now = Instant::now();

        manager.cooldown_at(&a, Duration::from_secs(5), now);
        for _ in 0..20 {
            assert_eq!(manager.get_at(now).unwrap(), Host::new("b"));
        }
        assert_eq!(manager.get_at(now + Duration::from_secs(4)).unwrap(), Host::new("b"));
        assert_eq!(manager.get_at(now + Duration::from_secs(5)).unwrap(), a);
        // expiry cleared the deadline
        assert!(!manager.is_cooling_down(&a));
    }

    #[test]
    fn test_cooling_host_skipped_within_tier() {
        let manager = HostManager::from_topology(&Topology::Set(vec!["a".into(), "b".into()])).unwrap();
        let now = Instant::now();
        manager.cooldown_at(&Host::new("b"), Duration::from_secs(60), now);
        for _ in 0..50 {
            assert_eq!(manager.get_at(now).unwrap(), Host::new("a"));
        }
    }

    #[test]
    fn test_all_cooling_is_exhaustion() {
        let manager = HostManager::from_topology(&Topology::List(vec!["a".into(), "b".into()])).unwrap();
        let now = Instant::now();
        for host in manager.hosts_set() {
            manager.cooldown_at(&host, Duration::from_secs(1), now);
        }
        assert_eq!(manager.available_count(), 0);
        assert!(matches!(
            manager.get_at(now),
            Err(ClickHouseError::NoAvailableHosts(2))
        ));
        assert!(manager.get_at(now + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_shorter_cooldown_does_not_shrink_longer_one() {
        let manager = HostManager::from_topology(&Topology::Single("a".into())).unwrap();
        let a = Host::new("a");
        let now = Instant::now();
        manager.cooldown_at(&a, Duration::from_secs(10), now);
        manager.cooldown_at(&a, Duration::from_secs(1), now);
        assert!(manager.get_at(now + Duration::from_secs(2)).is_err());

        manager.release(&a);
        assert_eq!(manager.get_at(now).unwrap(), a);
    }

    #[test]
    fn test_concurrent_selection_and_cooldown() {
        let manager = Arc::new(
            HostManager::from_topology(&Topology::Set(vec!["a".into(), "b".into(), "c".into()]))
                .unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Ok(host) = manager.get() {
                            if i % 2 == 0 {
                                manager.cooldown(&host, Duration::from_micros(50));
                            } else {
                                manager.release(&host);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.hosts_set().len(), 3);
    }
}
