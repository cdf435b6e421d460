/// integration tests for the facade's fail-open behavior and the demo service
///
mod common;

use std::time::Duration;

use cache_supervisor::demo::DemoCacheService;
use cache_supervisor::{CacheBackendKind, CacheSupervisor};

use common::{TestFactory, TestProbe, QUIET_PERIOD};

#[test]
fn fails_open_on_durable_errors() {
    async_std::task::block_on(async move {
        let factory = TestFactory::new();
        let supervisor = CacheSupervisor::start(QUIET_PERIOD, TestProbe::new(true), factory.clone())
            .await
            .unwrap();
        let facade = supervisor.facade();
        assert_eq!(facade.current_kind(), CacheBackendKind::Durable);

        factory.set_durable_ops_fail(true);

        // misses and no-ops, never errors
        assert_eq!(facade.get("k").await, None);
        facade.put("k", b"v").await;
        facade.evict("k").await;

        let state = supervisor.state();
        assert_eq!(state.operation_failures(), 3);

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn get_or_insert_with() {
    async_std::task::block_on(async move {
        let supervisor =
            CacheSupervisor::start(QUIET_PERIOD, TestProbe::new(false), TestFactory::new())
                .await
                .unwrap();
        let facade = supervisor.facade();

        let value = facade
            .get_or_insert_with("k", || async { Some(b"computed".to_vec()) })
            .await;
        assert_eq!(value, Some(b"computed".to_vec()));

        // cached now; the second computation never runs
        let value = facade
            .get_or_insert_with("k", || async { Some(b"other".to_vec()) })
            .await;
        assert_eq!(value, Some(b"computed".to_vec()));

        // absent values are not cached
        let value = facade.get_or_insert_with("none", || async { None }).await;
        assert_eq!(value, None);
        assert_eq!(facade.get("none").await, None);

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn put_with_ttl_and_evict() {
    async_std::task::block_on(async move {
        let supervisor =
            CacheSupervisor::start(QUIET_PERIOD, TestProbe::new(false), TestFactory::new())
                .await
                .unwrap();
        let facade = supervisor.facade();

        facade
            .put_with_ttl("short", b"v", Duration::from_millis(30))
            .await;
        facade.put("long", b"v").await;
        assert_eq!(facade.get("short").await, Some(b"v".to_vec()));

        async_std::task::sleep(Duration::from_millis(80)).await;
        assert_eq!(facade.get("short").await, None);

        facade.evict("long").await;
        assert_eq!(facade.get("long").await, None);

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn demo_lookup_is_cached() {
    async_std::task::block_on(async move {
        let probe = TestProbe::new(false);
        let supervisor = CacheSupervisor::start(QUIET_PERIOD, probe.clone(), TestFactory::new())
            .await
            .unwrap();
        let service = DemoCacheService::new(supervisor.facade());

        let first = service.lookup("k1").await;
        assert!(!first.is_empty());

        async_std::task::sleep(Duration::from_millis(5)).await;
        assert_eq!(service.lookup("k1").await, first);
        assert_eq!(service.respond("k1").await, format!("Hello Cache {}", first));

        // a swap to durable starts empty, so the value is recomputed
        probe.set_reachable(true);
        supervisor.reconcile().await;
        async_std::task::sleep(Duration::from_millis(5)).await;
        assert_ne!(service.lookup("k1").await, first);

        assert!(supervisor.shutdown().await.is_ok());
    });
}
