//! E2E tests for the shared simulation
//!
//! Concurrent first access, serialized mutations, failover, and write
//! coalescing, all through the public manager API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use petlife_core::{
    EngineConfig, FlushPolicy, MemoryStorage, PetLifeError, Result, SimulationManager,
    SimulationState, StorageBackend, Vitals,
};

/// Memory backend whose loads take a while, to widen the init race
#[derive(Debug, Default)]
struct SlowStorage {
    inner: MemoryStorage,
    opens: AtomicUsize,
}

impl StorageBackend for SlowStorage {
    fn name(&self) -> &str {
        "slow-memory"
    }

    fn load(&self, identity: &str) -> Result<Option<SimulationState>> {
        thread::sleep(Duration::from_millis(50));
        self.inner.load(identity)
    }

    fn save(&self, identity: &str, state: &SimulationState, expiry: Option<Duration>) -> Result<()> {
        self.inner.save(identity, state, expiry)
    }
}

fn slow_manager(config: EngineConfig) -> (Arc<SimulationManager>, Arc<SlowStorage>) {
    let storage = Arc::new(SlowStorage::default());
    let handle = storage.clone();
    let factory = move || -> Result<Arc<dyn StorageBackend>> {
        handle.opens.fetch_add(1, Ordering::SeqCst);
        Ok(handle.clone())
    };
    (Arc::new(SimulationManager::without_fallback(config, factory)), storage)
}

#[test]
fn e2e_concurrent_first_access_builds_one_instance() {
    const CALLERS: usize = 16;
    let (manager, storage) = slow_manager(EngineConfig::default());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.get().unwrap()
            })
        })
        .collect();

    let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(manager.construction_count(), 1);
    assert_eq!(storage.opens.load(Ordering::SeqCst), 1);
    assert_eq!(storage.inner.load_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_first_access_from_async_tasks() {
    let (manager, storage) = slow_manager(EngineConfig::default());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::task::spawn_blocking(move || manager.get().unwrap())
        })
        .collect();

    let mut instances = Vec::new();
    for task in tasks {
        instances.push(task.await.unwrap());
    }

    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(storage.inner.load_count(), 1);
}

#[test]
fn e2e_concurrent_greets_are_serialized() {
    // No decay, so every greet adds exactly +5 mood and -2 energy
    let config = EngineConfig::default()
        .with_decay(Vitals::zero())
        .with_defaults(Vitals::new(100.0, 0.0, 0.0));
    let (manager, _) = slow_manager(config);
    let sim = manager.get().unwrap();

    const CALLERS: usize = 8;
    const GREETS: usize = 2;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|n| {
            let sim = sim.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..GREETS {
                    sim.interact(&format!("device-{n}"), "greet").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = sim.snapshot();
    let total = (CALLERS * GREETS) as f64;
    assert_eq!(state.mood, 5.0 * total);
    assert_eq!(state.energy, 100.0 - 2.0 * total);
    assert_eq!(sim.history().len(), CALLERS * GREETS);
}

#[test]
fn e2e_long_absence_costs_one_write() {
    let (manager, storage) = slow_manager(EngineConfig::default());
    let sim = manager.get().unwrap();

    let started = Instant::now();
    let outcome = sim.catch_up("tablet", 720).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.state.vitals(), Vitals::new(0.0, 100.0, 0.0));
    assert_eq!(storage.inner.save_count(), 1);
    assert!(elapsed < Duration::from_millis(100), "catch-up took {elapsed:?}");
}

#[test]
fn e2e_catch_up_rejections_leave_state_untouched() {
    let (manager, storage) = slow_manager(EngineConfig::default());
    let sim = manager.get().unwrap();
    let before = sim.snapshot();

    for hours in [0, -1, 721, i64::MAX] {
        match sim.catch_up("tablet", hours) {
            Err(PetLifeError::OutOfRange { requested, min, max }) => {
                assert_eq!(requested, hours);
                assert_eq!((min, max), (1, 720));
            }
            other => panic!("expected OutOfRange for {hours}, got {other:?}"),
        }
    }

    assert_eq!(sim.snapshot(), before);
    assert_eq!(storage.inner.save_count(), 0);
}

#[test]
fn e2e_many_interactions_defer_writes_until_flush() {
    let (manager, storage) = slow_manager(EngineConfig::default());
    let sim = manager.get().unwrap();

    for action in ["feed", "greet", "play", "feed", "greet"] {
        sim.interact("phone", action).unwrap();
    }
    assert_eq!(storage.inner.save_count(), 0);

    sim.flush().unwrap();
    assert_eq!(storage.inner.save_count(), 1);
    assert_eq!(storage.inner.peek("shared-pet").unwrap(), sim.snapshot());
}

#[test]
fn e2e_immediate_policy_writes_through() {
    let config = EngineConfig::default().with_flush_policy(FlushPolicy::Immediate);
    let (manager, storage) = slow_manager(config);
    let sim = manager.get().unwrap();

    sim.interact("phone", "feed").unwrap();
    sim.interact("phone", "greet").unwrap();
    assert_eq!(storage.inner.save_count(), 2);
}

#[test]
fn e2e_reset_is_visible_to_every_device() {
    let (manager, _) = slow_manager(EngineConfig::default());
    let sim = manager.get().unwrap();
    sim.catch_up("laptop", 100).unwrap();

    manager.get().unwrap().reset("admin").unwrap();

    let seen_elsewhere = manager.get().unwrap().status("phone").unwrap().state;
    assert_eq!(seen_elsewhere.vitals(), Vitals::new(80.0, 30.0, 70.0));
}

#[test]
fn e2e_failover_when_primary_load_fails() {
    #[derive(Debug)]
    struct Unreachable;

    impl StorageBackend for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }
        fn load(&self, _: &str) -> Result<Option<SimulationState>> {
            Err(PetLifeError::Storage("connection refused".into()))
        }
        fn save(&self, _: &str, _: &SimulationState, _: Option<Duration>) -> Result<()> {
            Err(PetLifeError::Storage("connection refused".into()))
        }
    }

    let fallback = Arc::new(MemoryStorage::new());
    let handle = fallback.clone();
    let manager = SimulationManager::new(
        EngineConfig::default(),
        || -> Result<Arc<dyn StorageBackend>> { Ok(Arc::new(Unreachable)) },
        move || -> Result<Arc<dyn StorageBackend>> { Ok(handle.clone()) },
    );

    let sim = manager.get().unwrap();
    assert_eq!(sim.backend_name(), "memory");

    let outcome = sim.interact("phone", "feed").unwrap();
    assert!(outcome.persistence.is_none());
    sim.flush().unwrap();
    assert_eq!(fallback.save_count(), 1);
}

#[test]
fn e2e_no_backend_means_uninitialized_engine() {
    let down = || -> Result<Arc<dyn StorageBackend>> { Err(PetLifeError::Storage("down".into())) };
    let manager = SimulationManager::new(EngineConfig::default(), down, down);

    for _ in 0..2 {
        match manager.get() {
            Err(PetLifeError::UninitializedEngine(reason)) => assert!(reason.contains("down")),
            other => panic!("expected UninitializedEngine, got {other:?}"),
        }
    }
    assert!(!manager.is_initialized());
}
