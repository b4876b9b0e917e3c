//! Stop & Recovery Integration Tests
//!
//! Scenarios around cancellation, rollback, dropped-task recovery, and the
//! adaptive concurrency controller, all on paused tokio time.


use driftq_cluster::types::{BrokerId, BrokerLoad, TopicPartition};
use driftq_exec::state::ExecutorPhase;
use driftq_exec::{ExecutionRequest, RebalanceProposal};
use test_utilities::*;
use uuid::Uuid;

fn tp(topic: &str, partition: u32) -> TopicPartition {
    TopicPartition::new(topic, partition)
}

#[tokio::test(start_paused = true)]
async fn test_dead_destination_triggers_rollback_and_self_stop() {
    // Broker 4 is the destination but is not alive in the cluster
    let rig = rig(fast_config(), snapshot(&[1, 2, 3], &[("t", 0, &[1, 2, 3], 1)]));
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), false).unwrap();
    let proposal =
        RebalanceProposal::new(tp("t", 0), broker_ids(&[1, 2, 3]), broker_ids(&[1, 2, 4]));
    let request = ExecutionRequest::new(vec![proposal], rig.mock.clone());
    rig.executor.execute(request, uuid).await.unwrap();

    wait_until(
        || {
            rig.executor.status().phase == ExecutorPhase::NoTask
                && rig.notifier.last_alert().is_some()
        },
        "self-stop to finish",
    )
    .await;

    let alert = rig.notifier.last_alert().unwrap();
    assert!(alert.contains("stopped by self"));
    assert!(alert.contains("INTER_BROKER_REPLICA: 0 completed, 1 dead"));

    {
        let state = rig.mock.state();
        // First submission was the movement, second the rollback to current
        assert!(state.submitted.len() >= 2);
        let rollback = state.submitted.last().unwrap();
        assert_eq!(rollback.target_replicas, broker_ids(&[1, 2, 3]));
        // No coordination-store intervention on a graceful self-stop
        assert_eq!(state.markers_deleted, 0);
    }

    // Self-healing batch: the anomaly detector hears about the end
    assert_eq!(rig.anomaly.self_healing_finished.lock().as_slice(), &[uuid]);
}

#[tokio::test(start_paused = true)]
async fn test_forced_stop_kills_everything_and_intervenes_once() {
    let rig = rig(
        fast_config(),
        snapshot(
            &[1, 2, 3, 4, 5],
            &[
                ("t", 0, &[1, 2], 1),
                ("t", 1, &[2, 3], 2),
                ("t", 2, &[1, 3], 1),
            ],
        ),
    );
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), false).unwrap();
    // Two admissible under cap 1 (disjoint brokers), third blocked on broker 4
    let proposals = vec![
        RebalanceProposal::new(tp("t", 0), broker_ids(&[1, 2]), broker_ids(&[1, 4])),
        RebalanceProposal::new(tp("t", 1), broker_ids(&[2, 3]), broker_ids(&[2, 5])),
        RebalanceProposal::new(tp("t", 2), broker_ids(&[1, 3]), broker_ids(&[1, 4])),
    ];
    let mut request = ExecutionRequest::new(proposals, rig.mock.clone());
    request.inter_broker_cap = Some(1);
    rig.executor.execute(request, uuid).await.unwrap();

    wait_until(
        || rig.executor.status().inter_broker.in_progress == 2,
        "two movements in flight",
    )
    .await;

    assert!(rig.executor.stop_execution(true));
    // Idempotent and monotone: no downgrade, no double escalation
    assert!(!rig.executor.stop_execution(false));
    assert!(!rig.executor.stop_execution(true));

    wait_until(
        || rig.executor.status().phase == ExecutorPhase::NoTask,
        "forced stop to drain",
    )
    .await;

    let alert = rig.notifier.last_alert().unwrap();
    assert!(alert.contains("stopped by user"));
    // In-flight tasks die, the never-emitted one is reported cancelled
    assert!(alert.contains("INTER_BROKER_REPLICA: 0 completed, 2 dead, 0 aborted, 1 cancelled"));

    // The coordination-store intervention ran exactly once
    assert_eq!(rig.mock.state().markers_deleted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_graceful_stop_rolls_back_and_blocks_until_clear() {
    let mut config = fast_config();
    config.resubmit_dropped_tasks = false;
    let rig = rig(config, snapshot(&[1, 2, 3, 4], &[("t", 0, &[1, 2, 3], 1)]));
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), false).unwrap();
    let proposal =
        RebalanceProposal::new(tp("t", 0), broker_ids(&[1, 2, 3]), broker_ids(&[1, 2, 4]));
    let request = ExecutionRequest::new(vec![proposal], rig.mock.clone());
    rig.executor.execute(request, uuid).await.unwrap();

    wait_until(
        || rig.executor.status().inter_broker.in_progress == 1,
        "movement in flight",
    )
    .await;

    // Let the rollback apply instantly so the wait loop can observe the
    // cluster letting go of the cancelled partition
    {
        let mut state = rig.mock.state();
        state.ongoing_reassignments.clear();
        state.auto_apply_reassignments = true;
    }
    assert!(rig.executor.stop_execution(false));

    wait_until(
        || rig.executor.status().phase == ExecutorPhase::NoTask,
        "graceful stop to drain",
    )
    .await;

    let alert = rig.notifier.last_alert().unwrap();
    assert!(alert.contains("stopped by user"));
    assert!(alert.contains("1 dead"));

    let state = rig.mock.state();
    // The rollback reverted the target to the current placement
    let rollback = state.submitted.last().unwrap();
    assert_eq!(rollback.target_replicas, broker_ids(&[1, 2, 3]));
    let info = state.cluster.partitions.get(&tp("t", 0)).unwrap();
    assert_eq!(info.replicas, broker_ids(&[1, 2, 3]));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_tasks_are_resubmitted() {
    let rig = rig(fast_config(), snapshot(&[1, 2, 3, 4], &[("t", 0, &[1, 2, 3], 1)]));
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), false).unwrap();
    let proposal =
        RebalanceProposal::new(tp("t", 0), broker_ids(&[1, 2, 3]), broker_ids(&[1, 2, 4]));
    let request = ExecutionRequest::new(vec![proposal], rig.mock.clone());
    rig.executor.execute(request, uuid).await.unwrap();

    wait_until(|| !rig.mock.state().submitted.is_empty(), "first submission").await;

    // The cluster controller drops the reassignment before acting on it
    rig.mock.state().ongoing_reassignments.clear();

    wait_until(
        || rig.mock.state().submitted.len() >= 2,
        "dropped task to be re-submitted",
    )
    .await;

    // Converge the cluster so the batch can finish
    {
        let mut state = rig.mock.state();
        if let Some(info) = state.cluster.partitions.get_mut(&tp("t", 0)) {
            info.replicas = broker_ids(&[1, 2, 4]);
            info.in_sync_replicas = broker_ids(&[1, 2, 4]);
        }
        state.ongoing_reassignments.clear();
    }

    wait_until(
        || rig.notifier.last_notification().is_some(),
        "execution to finish",
    )
    .await;
    assert!(
        rig.notifier
            .last_notification()
            .unwrap()
            .contains("INTER_BROKER_REPLICA: 1 completed")
    );
}

#[tokio::test(start_paused = true)]
async fn test_adjuster_follows_broker_load() {
    let rig = rig(fast_config(), snapshot(&[1, 2, 3, 4], &[("t", 0, &[1, 2, 3], 1)]));
    {
        let mut state = rig.mock.state();
        // One hot broker forces multiplicative decrease
        state.loads.insert(
            BrokerId(1),
            BrokerLoad {
                cpu_percent: 97.0,
                request_queue_time_ms: 100.0,
            },
        );
    }
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), false).unwrap();
    let proposal =
        RebalanceProposal::new(tp("t", 0), broker_ids(&[1, 2, 3]), broker_ids(&[1, 2, 4]));
    let mut request = ExecutionRequest::new(vec![proposal], rig.mock.clone());
    request.inter_broker_cap = Some(8);
    rig.executor.execute(request, uuid).await.unwrap();

    // The movement never converges, keeping the inter-broker phase alive
    wait_until(
        || rig.executor.status().inter_broker_cap <= 4,
        "cap to be halved",
    )
    .await;

    // All brokers cool: additive increase climbs the cap back up
    rig.mock.state().loads.insert(
        BrokerId(1),
        BrokerLoad {
            cpu_percent: 10.0,
            request_queue_time_ms: 50.0,
        },
    );
    wait_until(
        || rig.executor.status().inter_broker_cap >= 3,
        "cap to climb again",
    )
    .await;

    assert!(rig.executor.stop_execution(true));
    wait_until(
        || rig.executor.status().phase == ExecutorPhase::NoTask,
        "forced stop to drain",
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_demote_records_history_and_disables_adjuster() {
    let rig = rig(fast_config(), snapshot(&[1, 2, 3, 4], &[("t", 0, &[2, 1, 3], 2)]));
    {
        let mut state = rig.mock.state();
        state.loads.insert(
            BrokerId(1),
            BrokerLoad {
                cpu_percent: 97.0,
                request_queue_time_ms: 100.0,
            },
        );
    }
    let uuid = Uuid::new_v4();

    rig.executor.begin_proposing(uuid, reason(), true).unwrap();
    // Demotion moves a replica off broker 2; it never converges so the
    // inter-broker phase stays alive while we watch the cap
    let proposal =
        RebalanceProposal::new(tp("t", 0), broker_ids(&[2, 1, 3]), broker_ids(&[1, 3, 4]));
    let mut request = ExecutionRequest::new(vec![proposal], rig.mock.clone());
    request.demoted_brokers = [BrokerId(2)].into_iter().collect();
    request.inter_broker_cap = Some(8);
    rig.executor.execute_demote(request, uuid).await.unwrap();

    let history = rig.executor.broker_history();
    wait_until(
        || history.demotion_start(BrokerId(2)).is_some(),
        "demotion history entry",
    )
    .await;

    // Give the adjuster several ticks: the cap must not move during demote
    tokio::time::sleep(std::time::Duration::from_secs(180)).await;
    assert_eq!(rig.executor.status().inter_broker_cap, 8);

    assert!(rig.executor.stop_execution(true));
    wait_until(
        || rig.executor.status().phase == ExecutorPhase::NoTask,
        "forced stop to drain",
    )
    .await;
}
