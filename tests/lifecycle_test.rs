// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use common::{init_tracing, test_config, FakeCli, FakeConnector, World};
use kube_testcluster::{
    ClusterConfig, ClusterError, ConnectState, ConnectionStrategy, ExternalStrategy,
    LifecyclePhase, LocalK3dStrategy, ResourcesDir, SetupStep, SuiteHooks, TestCluster,
};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn local_cluster(world: &Arc<World>, config: ClusterConfig, resources: &Path) -> TestCluster {
    let strategy = LocalK3dStrategy::new(
        config.cluster_name.clone(),
        config.k3d.clone(),
        config.timeouts.clone(),
        Arc::new(FakeCli::new(world.clone(), resources)),
        Arc::new(FakeConnector::new(world.clone())),
    );
    TestCluster::with_strategy(config, ResourcesDir::new(resources), Box::new(strategy))
}

#[tokio::test]
async fn test_fresh_setup_installs_and_creates_one_cluster() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());

    let handle = cluster.setup().await.unwrap();

    assert_eq!(world.install_calls.load(Ordering::SeqCst), 1);
    assert_eq!(world.creates(), 1);
    assert_eq!(cluster.phase(), LifecyclePhase::Ready);
    assert_eq!(cluster.strategy().state(), ConnectState::Connected);
    assert!(handle.credentials().path().ends_with("it-cluster-kubeconfig.yaml"));
    assert!(tmp.path().join("k3d").is_dir());

    let namespace = world.kube.namespace("it").expect("test namespace created");
    assert_eq!(
        namespace.metadata.labels.unwrap().get("is-test-namespace").map(String::as_str),
        Some("true")
    );

    let configmaps = world.kube.configmaps.lock().unwrap();
    let bootstrap = configmaps.get("it/cluster-config").expect("bootstrap config map");
    assert_eq!(
        bootstrap.data.as_ref().unwrap().get("cluster-name").map(String::as_str),
        Some("e2e")
    );
}

#[tokio::test]
async fn test_second_instance_reuses_running_cluster() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();

    let first = local_cluster(&world, test_config(tmp.path()), tmp.path());
    first.setup().await.unwrap();
    first.tear_down().await;

    let started = Instant::now();
    let second = local_cluster(&world, test_config(tmp.path()), tmp.path());
    second.setup().await.unwrap();

    assert_eq!(world.creates(), 1);
    assert_eq!(world.install_calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_setup_is_idempotent_on_ready_instance() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());

    cluster.setup().await.unwrap();
    cluster.setup().await.unwrap();

    assert_eq!(world.creates(), 1);
    assert_eq!(world.kube.apply_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_setups_are_serialized() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let cluster = Arc::new(local_cluster(&world, test_config(tmp.path()), tmp.path()));

    let a = tokio::spawn({
        let cluster = cluster.clone();
        async move { cluster.setup().await.map(|_| ()) }
    });
    let b = tokio::spawn({
        let cluster = cluster.clone();
        async move { cluster.setup().await.map(|_| ()) }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(world.creates(), 1);
}

#[tokio::test]
async fn test_broken_cluster_is_recreated() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    world.cluster_broken.store(true, Ordering::SeqCst);

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    cluster.setup().await.unwrap();

    assert_eq!(world.install_calls.load(Ordering::SeqCst), 0);
    assert_eq!(world.deletes(), 1);
    assert_eq!(world.creates(), 1);
}

#[tokio::test]
async fn test_delete_failure_during_recovery_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    cluster.setup().await.unwrap();

    // Nothing existed, so the delete before create failed.
    assert_eq!(world.deletes(), 1);
    assert_eq!(world.creates(), 1);
}

#[tokio::test]
async fn test_version_mismatch_triggers_reinstall() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.1");

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    cluster.setup().await.unwrap();

    assert_eq!(world.install_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        world.installed_tag.lock().unwrap().as_deref(),
        Some("v3.0.2")
    );
}

#[tokio::test]
async fn test_create_failure_poisons_instance() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    world.fail_create.store(true, Ordering::SeqCst);

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    let err = cluster.setup().await.unwrap_err();

    assert!(matches!(
        err,
        ClusterError::Setup {
            step: SetupStep::Connect,
            ..
        }
    ));
    assert!(matches!(err.root_cause(), ClusterError::ClusterCreate { .. }));
    assert_eq!(cluster.phase(), LifecyclePhase::Failed);
    assert_eq!(cluster.strategy().state(), ConnectState::ConnectFailed);
    assert!(matches!(cluster.client(), Err(ClusterError::NotSetUp)));

    world.fail_create.store(false, Ordering::SeqCst);
    assert!(matches!(
        cluster.setup().await,
        Err(ClusterError::SetupPoisoned)
    ));
}

#[tokio::test]
async fn test_unreachable_new_cluster_fails_within_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    world.create_yields_broken.store(true, Ordering::SeqCst);

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    let started = Instant::now();
    let err = cluster.setup().await.unwrap_err();

    assert!(matches!(err.root_cause(), ClusterError::ConnectFailed(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_existing_namespace_conflict_leaves_it_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let before = world.kube.insert_namespace("it");

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    let err = cluster.setup().await.unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ClusterError::NamespaceConflict { namespace } if namespace == "it"
    ));

    cluster.tear_down().await;
    let after = world.kube.namespace("it").expect("namespace kept");
    assert_eq!(after.metadata.uid, before.metadata.uid);
}

#[tokio::test]
async fn test_terminating_namespace_conflicts_when_flag_set() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let before = world.kube.insert_namespace("it");
    world.kube.mark_terminating("it");

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    let err = cluster.setup().await.unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ClusterError::NamespaceConflict { namespace } if namespace == "it"
    ));
    let after = world.kube.namespace("it").expect("namespace kept");
    assert_eq!(after.metadata.uid, before.metadata.uid);
    assert_eq!(world.kube.apply_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_terminating_namespace_waited_out_when_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let before = world.kube.insert_namespace("it");
    world.kube.mark_terminating("it");

    let kube_world = world.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        kube_world.kube.namespaces.lock().unwrap().remove("it");
    });

    let mut config = test_config(tmp.path());
    config.fail_on_existing_namespace = false;
    let cluster = local_cluster(&world, config, tmp.path());
    cluster.setup().await.unwrap();

    let after = world.kube.namespace("it").unwrap();
    assert_ne!(after.metadata.uid, before.metadata.uid);
}

#[tokio::test]
async fn test_existing_namespace_replaced_when_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let before = world.kube.insert_namespace("it");
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut config = test_config(tmp.path());
    config.fail_on_existing_namespace = false;
    let cluster = local_cluster(&world, config, tmp.path());
    cluster.setup().await.unwrap();

    let after = world.kube.namespace("it").unwrap();
    assert_ne!(after.metadata.uid, before.metadata.uid);
    assert!(
        after.metadata.creation_timestamp.unwrap().0
            > before.metadata.creation_timestamp.unwrap().0
    );
}

#[tokio::test]
async fn test_namespace_stuck_terminating_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    world.kube.insert_namespace("it");
    world
        .kube
        .namespaces_stuck_terminating
        .store(true, Ordering::SeqCst);

    let mut config = test_config(tmp.path());
    config.fail_on_existing_namespace = false;
    let cluster = local_cluster(&world, config, tmp.path());
    let err = cluster.setup().await.unwrap_err();

    assert!(matches!(
        err,
        ClusterError::Setup {
            step: SetupStep::Namespace,
            ..
        }
    ));
    assert!(matches!(
        err.root_cause(),
        ClusterError::ReadinessTimeout { .. }
    ));
}

#[tokio::test]
async fn test_tear_down_then_client_is_not_set_up() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());

    assert!(matches!(cluster.client(), Err(ClusterError::NotSetUp)));
    cluster.tear_down().await;

    cluster.setup().await.unwrap();
    assert!(cluster.client().is_ok());

    cluster.tear_down().await;
    assert!(matches!(cluster.client(), Err(ClusterError::NotSetUp)));
    assert!(world.kube.namespace("it").is_none());
    assert_eq!(cluster.phase(), LifecyclePhase::Idle);

    cluster.tear_down().await;
}

#[tokio::test]
async fn test_tear_down_swallows_delete_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    cluster.setup().await.unwrap();

    world.cluster_broken.store(true, Ordering::SeqCst);
    cluster.tear_down().await;

    assert_eq!(cluster.phase(), LifecyclePhase::Idle);
}

#[tokio::test]
async fn test_tear_down_after_failed_bootstrap_removes_created_namespace() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    world.kube.reject_configmaps.store(true, Ordering::SeqCst);

    let cluster = local_cluster(&world, test_config(tmp.path()), tmp.path());
    let err = cluster.setup().await.unwrap_err();
    assert!(matches!(
        err,
        ClusterError::Setup {
            step: SetupStep::Bootstrap,
            ..
        }
    ));
    assert!(world.kube.namespace("it").is_some());

    cluster.tear_down().await;

    assert!(world.kube.namespace("it").is_none());
    assert_eq!(cluster.phase(), LifecyclePhase::Failed);

    world.kube.reject_configmaps.store(false, Ordering::SeqCst);
    let next = local_cluster(&world, test_config(tmp.path()), tmp.path());
    next.setup().await.unwrap();
}

#[tokio::test]
async fn test_external_strategy_copies_credentials() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let source = tmp.path().join("my-kubeconfig");
    std::fs::write(&source, "apiVersion: v1\nkind: Config\n").unwrap();
    let resources = tmp.path().join("res");

    let strategy = ExternalStrategy::new(
        &source,
        ResourcesDir::new(&resources),
        Arc::new(FakeConnector::new(world.clone())),
    );
    let handle = strategy.connect().await.unwrap();

    assert_eq!(handle.credentials().path(), resources.join("custom-config"));
    assert_eq!(
        std::fs::read_to_string(resources.join("custom-config")).unwrap(),
        "apiVersion: v1\nkind: Config\n"
    );
    assert_eq!(strategy.state(), ConnectState::Connected);
    assert_eq!(world.creates(), 0);
}

#[tokio::test]
async fn test_external_strategy_accepts_its_own_copy() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::with_running_cluster("v3.0.2");
    let copied = tmp.path().join("custom-config");
    std::fs::write(&copied, "apiVersion: v1\nkind: Config\n").unwrap();

    let strategy = ExternalStrategy::new(
        &copied,
        ResourcesDir::new(tmp.path()),
        Arc::new(FakeConnector::new(world)),
    );
    strategy.connect().await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&copied).unwrap(),
        "apiVersion: v1\nkind: Config\n"
    );
}

#[tokio::test]
async fn test_external_strategy_missing_file_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();

    let strategy = ExternalStrategy::new(
        tmp.path().join("missing"),
        ResourcesDir::new(tmp.path()),
        Arc::new(FakeConnector::new(world)),
    );

    assert!(matches!(
        strategy.connect().await,
        Err(ClusterError::ConnectFailed(_))
    ));
    assert_eq!(strategy.state(), ConnectState::ConnectFailed);
}

#[tokio::test]
async fn test_suite_hooks_tear_down_once() {
    let tmp = tempfile::tempdir().unwrap();
    let world = World::new();
    let hooks = SuiteHooks::new();

    hooks.on_all_tests_done("never-set-up").await;

    let cluster = Arc::new(local_cluster(&world, test_config(tmp.path()), tmp.path()));
    hooks
        .on_test_instance_ready("suite-a", cluster.clone())
        .await
        .unwrap();
    assert!(hooks.cluster("suite-a").await.is_some());
    assert!(world.kube.namespace("it").is_some());

    hooks.on_all_tests_done("suite-a").await;
    hooks.on_all_tests_done("suite-a").await;

    assert!(hooks.cluster("suite-a").await.is_none());
    assert!(world.kube.namespace("it").is_none());
    assert_eq!(cluster.phase(), LifecyclePhase::Idle);
}

#[tokio::test]
async fn test_suite_setups_do_not_block_each_other() {
    let slow_dir = tempfile::tempdir().unwrap();
    let fast_dir = tempfile::tempdir().unwrap();
    let slow_world = World::new();
    slow_world.create_yields_broken.store(true, Ordering::SeqCst);
    let fast_world = World::with_running_cluster("v3.0.2");
    let hooks = Arc::new(SuiteHooks::new());

    let slow = tokio::spawn({
        let hooks = hooks.clone();
        let cluster = Arc::new(local_cluster(
            &slow_world,
            test_config(slow_dir.path()),
            slow_dir.path(),
        ));
        async move { hooks.on_test_instance_ready("slow", cluster).await.is_ok() }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let fast = Arc::new(local_cluster(
        &fast_world,
        test_config(fast_dir.path()),
        fast_dir.path(),
    ));
    hooks.on_test_instance_ready("fast", fast).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(700));

    assert!(!slow.await.unwrap());
    assert!(hooks.cluster("slow").await.is_none());
    assert!(hooks.cluster("fast").await.is_some());
}
