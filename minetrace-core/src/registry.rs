//! Detection registries - shared lists detectors append into
//!
//! Each registry is a bounded, append-only list guarded by a mutex:
//! - Detectors append under the lock
//! - The correlation loop reads a cloned snapshot
//! - Cleared at the start of every tracking session

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{DetectedSignal, RegistryKind, SensorDomain};

/// Default registry capacity before the oldest entries are dropped
pub const DEFAULT_REGISTRY_CAPACITY: usize = 2048;

/// Bounded append-only list of detected signals
#[derive(Debug)]
pub struct SignalRegistry {
    kind: RegistryKind,
    capacity: usize,
    signals: Mutex<VecDeque<DetectedSignal>>,
    /// Appends since the last clear, including evicted entries
    appended: AtomicU64,
}

impl SignalRegistry {
    pub fn new(kind: RegistryKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            signals: Mutex::new(VecDeque::new()),
            appended: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Append a signal, evicting the oldest when full
    pub fn append(&self, signal: DetectedSignal) {
        let mut signals = self.signals.lock();
        if signals.len() >= self.capacity {
            signals.pop_front();
        }
        signals.push_back(signal);
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Cloned copy of the current contents, in arrival order
    pub fn snapshot(&self) -> Vec<DetectedSignal> {
        self.signals.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.signals.lock().clear();
        self.appended.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.signals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}

/// The electromagnetic and acoustic registries together
#[derive(Debug)]
pub struct DetectionRegistries {
    electromagnetic: SignalRegistry,
    acoustic: SignalRegistry,
}

impl DetectionRegistries {
    pub fn new(capacity: usize) -> Self {
        Self {
            electromagnetic: SignalRegistry::new(RegistryKind::Electromagnetic, capacity),
            acoustic: SignalRegistry::new(RegistryKind::Acoustic, capacity),
        }
    }

    pub fn get(&self, kind: RegistryKind) -> &SignalRegistry {
        match kind {
            RegistryKind::Electromagnetic => &self.electromagnetic,
            RegistryKind::Acoustic => &self.acoustic,
        }
    }

    /// Registry a sensor domain's detections belong in
    pub fn for_domain(&self, domain: SensorDomain) -> &SignalRegistry {
        self.get(domain.registry())
    }

    pub fn clear_all(&self) {
        self.electromagnetic.clear();
        self.acoustic.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            electromagnetic: self.electromagnetic.len(),
            acoustic: self.acoustic.len(),
            total_appended: self.electromagnetic.total_appended() + self.acoustic.total_appended(),
        }
    }
}

impl Default for DetectionRegistries {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY)
    }
}

/// Registry sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub electromagnetic: usize,
    pub acoustic: usize,
    pub total_appended: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(domain: SensorDomain, frequency: f64) -> DetectedSignal {
        DetectedSignal::builder(domain, frequency, 50.0).build()
    }

    #[test]
    fn test_append_and_snapshot_order() {
        let registry = SignalRegistry::new(RegistryKind::Electromagnetic, 10);
        registry.append(signal(SensorDomain::Rf, 1.0));
        registry.append(signal(SensorDomain::Rf, 2.0));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].frequency, 1.0);
        assert_eq!(snapshot[1].frequency, 2.0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let registry = SignalRegistry::new(RegistryKind::Acoustic, 2);
        for f in [1.0, 2.0, 3.0] {
            registry.append(signal(SensorDomain::Acoustic, f));
        }

        let frequencies: Vec<f64> = registry.snapshot().iter().map(|s| s.frequency).collect();
        assert_eq!(frequencies, vec![2.0, 3.0]);
        assert_eq!(registry.total_appended(), 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SignalRegistry::new(RegistryKind::Electromagnetic, 10);
        registry.append(signal(SensorDomain::EmField, 1.0));
        let snapshot = registry.snapshot();
        registry.append(signal(SensorDomain::EmField, 2.0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_domain_routing_and_clear() {
        let registries = DetectionRegistries::new(16);
        registries.for_domain(SensorDomain::PowerLine).append(signal(SensorDomain::PowerLine, 1.0));
        registries.for_domain(SensorDomain::Acoustic).append(signal(SensorDomain::Acoustic, 2.0));

        let stats = registries.stats();
        assert_eq!(stats.electromagnetic, 1);
        assert_eq!(stats.acoustic, 1);

        registries.clear_all();
        assert!(registries.get(RegistryKind::Electromagnetic).is_empty());
        assert!(registries.get(RegistryKind::Acoustic).is_empty());
    }
}
