mod common;

use common::{SHARED_CERT_STACK, SOURCE_STACK, id, options, provider, topology};
use stackweave_cloud::{ExecutionReport, Executor, ExecutorOptions, Fault, InMemoryProvider};
use stackweave_core::{NodeState, ResourceKind, ValidationState, field};
use std::sync::Arc;
use std::time::Duration;

async fn run(provider: Arc<InMemoryProvider>, options: ExecutorOptions) -> ExecutionReport {
    let topology = topology(&provider, SOURCE_STACK).await;
    Executor::new(provider, options)
        .execute(topology)
        .await
        .unwrap()
}

fn blocked_by<'a>(report: &'a ExecutionReport, node: &str) -> Option<&'a str> {
    report.outcome(node).and_then(|o| o.blocked_by.as_deref())
}

#[tokio::test(start_paused = true)]
async fn test_full_stack_reaches_ready() {
    let provider = Arc::new(provider());
    let topology = topology(&provider, SOURCE_STACK).await;
    let report = Executor::new(provider.clone(), options())
        .execute(topology.clone())
        .await
        .unwrap();

    assert!(report.is_success(), "failed: {:?}", report.failed());
    assert_eq!(report.outcomes.len(), 11);
    for outcome in &report.outcomes {
        assert_eq!(
            report
                .transitions_of(&outcome.node_id)
                .iter()
                .map(|t| t.to)
                .collect::<Vec<_>>(),
            vec![
                NodeState::Resolving,
                NodeState::Provisioning,
                NodeState::Validating,
                NodeState::Ready
            ],
            "{}",
            outcome.node_id
        );
    }

    assert_eq!(
        topology.node(&id("ec2")).unwrap().config_str(field::IMAGE_ID),
        Some("ami-0f7719e8b7ba25c61")
    );
    assert_eq!(
        topology.node(&id("alias")).unwrap().config_str(field::ZONE_ID),
        Some("Z2FDTNDATAQYW2")
    );

    // Adopted, not created
    let network = report.outcome(&id("vpc")).unwrap();
    assert_eq!(network.provider_id.as_deref(), Some("vpc-21d8cd46"));
    assert_eq!(provider.create_count_for(ResourceKind::Network).await, 0);
    assert_eq!(provider.create_count().await, 10);

    assert_eq!(report.certificates.len(), 2);
    assert!(
        report
            .certificates
            .iter()
            .all(|c| c.validation_state == ValidationState::Issued)
    );
    assert!(report.certificates.iter().any(|c| c.region == "us-east-1"));
    assert!(report.certificates.iter().any(|c| c.region == "ap-southeast-1"));

    let endpoints = report.endpoints();
    assert!(endpoints.load_balancers[&id("alb")].ends_with(".ap-southeast-1.elb.example.net"));
    assert!(endpoints.distributions[&id("cdn")].ends_with(".edge.example.net"));
    assert_eq!(endpoints.records[&id("alias")], endpoints.distributions[&id("cdn")]);
    assert_eq!(
        report.outcome(&id("alias")).unwrap().attribute_str(field::FQDN),
        Some("test-pl.example.org")
    );
}

#[tokio::test(start_paused = true)]
async fn test_dependencies_ready_before_dependents_provision() {
    let provider = Arc::new(provider());
    let topology = topology(&provider, SOURCE_STACK).await;
    let report = Executor::new(provider, options())
        .execute(topology.clone())
        .await
        .unwrap();

    for edge in topology.edges() {
        let ready = report.entered_at(&edge.dependency, NodeState::Ready).unwrap();
        let provisioning = report
            .entered_at(&edge.dependent, NodeState::Provisioning)
            .unwrap();
        assert!(
            ready < provisioning,
            "{} provisioned before {} was ready",
            edge.dependent,
            edge.dependency
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_listener_waits_for_certificate() {
    let provider = Arc::new(provider());
    provider.hold(id("alb-cert")).await;

    let topology = topology(&provider, SOURCE_STACK).await;
    let handle = Executor::new(provider.clone(), options()).spawn(topology);

    assert_eq!(
        handle.wait_for(&id("alb-cert"), NodeState::Validating).await,
        Some(NodeState::Validating)
    );
    assert_eq!(
        handle.wait_for(&id("alb"), NodeState::Ready).await,
        Some(NodeState::Ready)
    );
    assert_eq!(
        handle.wait_for(&id("tg"), NodeState::Ready).await,
        Some(NodeState::Ready)
    );

    assert_eq!(handle.state(&id("alb-cert")), Some(NodeState::Validating));
    assert_eq!(handle.state(&id("https")), Some(NodeState::Resolving));
    assert_eq!(provider.create_count_for(ResourceKind::Listener).await, 0);

    provider.release(&id("alb-cert")).await;
    let report = handle.wait().await.unwrap();
    assert!(report.is_success());
    assert!(
        report.entered_at(&id("alb-cert"), NodeState::Ready)
            < report.entered_at(&id("https"), NodeState::Provisioning)
    );
}

#[tokio::test(start_paused = true)]
async fn test_certificate_timeout_blocks_dependents_only() {
    let provider = Arc::new(provider().with_fault(id("alb-cert"), Fault::NeverReady));
    let report = run(provider, options()).await;

    assert!(!report.is_success());
    let cert = report.outcome(&id("alb-cert")).unwrap();
    assert_eq!(cert.state, NodeState::Failed);
    assert!(cert.error.as_deref().unwrap().contains("was not issued within 120s"));

    let listener = report.outcome(&id("https")).unwrap();
    assert_eq!(listener.state, NodeState::Blocked);
    assert_eq!(listener.blocked_by.as_deref(), Some(id("alb-cert").as_str()));
    assert!(!listener.cancelled);

    for unrelated in ["alb", "tg", "ec2", "edge-cert", "cdn", "alias"] {
        assert_eq!(report.state(&id(unrelated)), Some(NodeState::Ready), "{}", unrelated);
    }
    assert_eq!(report.failed().len(), 1);
    assert_eq!(report.blocked().len(), 1);

    let failed = report
        .certificates
        .iter()
        .find(|c| c.region == "ap-southeast-1")
        .unwrap();
    assert_eq!(failed.validation_state, ValidationState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_create_is_retried() {
    let provider = Arc::new(provider().with_fault(id("ec2"), Fault::Throttle(2)));
    let report = run(provider, options()).await;

    assert!(report.is_success());
    assert_eq!(report.outcome(&id("ec2")).unwrap().attempts, 3);
    assert_eq!(report.outcome(&id("alb")).unwrap().attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let provider = Arc::new(provider().with_fault(id("ec2"), Fault::Throttle(10)));
    let report = run(provider, options()).await;

    let compute = report.outcome(&id("ec2")).unwrap();
    assert_eq!(compute.state, NodeState::Failed);
    assert_eq!(compute.attempts, 3);

    let target_group = report.outcome(&id("tg")).unwrap();
    assert_eq!(target_group.state, NodeState::Blocked);
    assert_eq!(target_group.blocked_by.as_deref(), Some(id("ec2").as_str()));

    let listener = report.outcome(&id("https")).unwrap();
    assert_eq!(listener.state, NodeState::Blocked);
    assert_eq!(listener.blocked_by.as_deref(), Some(id("tg").as_str()));

    assert_eq!(report.state(&id("cdn")), Some(NodeState::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let provider = Arc::new(provider().with_fault(id("alb"), Fault::FailCreate));
    let report = run(provider.clone(), options()).await;

    let lb = report.outcome(&id("alb")).unwrap();
    assert_eq!(lb.state, NodeState::Failed);
    assert_eq!(lb.attempts, 1);

    for dependent in ["https", "cdn", "alias"] {
        assert_eq!(report.state(&id(dependent)), Some(NodeState::Blocked), "{}", dependent);
    }
    assert_eq!(provider.create_count_for(ResourceKind::Distribution).await, 0);
    assert!(report.endpoints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_validation_fails_node() {
    let provider = Arc::new(provider().with_fault(id("ec2"), Fault::FailValidation));
    let report = run(provider, options()).await;

    let compute = report.outcome(&id("ec2")).unwrap();
    assert_eq!(compute.state, NodeState::Failed);
    assert!(compute.provider_id.is_some());
    assert_eq!(
        report
            .transitions_of(&id("ec2"))
            .last()
            .map(|t| (t.from, t.to)),
        Some((NodeState::Validating, NodeState::Failed))
    );
}

#[tokio::test(start_paused = true)]
async fn test_shared_certificate_requested_once() {
    let provider = Arc::new(InMemoryProvider::new());
    let topology = topology(&provider, SHARED_CERT_STACK).await;
    let report = Executor::new(provider.clone(), options())
        .execute(topology)
        .await
        .unwrap();

    assert!(report.is_success(), "failed: {:?}", report.failed());
    assert_eq!(provider.create_count_for(ResourceKind::Certificate).await, 1);
    assert_eq!(report.certificates.len(), 1);
    assert_eq!(
        report.outcome("shared-cert-a").unwrap().provider_id,
        report.outcome("shared-cert-b").unwrap().provider_id
    );
}

#[tokio::test(start_paused = true)]
async fn test_shared_certificate_times_out_once() {
    let provider = Arc::new(
        InMemoryProvider::new()
            .with_fault("shared-cert-a", Fault::NeverReady)
            .with_fault("shared-cert-b", Fault::NeverReady),
    );
    let topology = topology(&provider, SHARED_CERT_STACK).await;

    let started = tokio::time::Instant::now();
    let report = Executor::new(provider.clone(), options())
        .execute(topology)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // one 120s validation budget for the shared certificate, not one per requester
    assert!(elapsed < Duration::from_secs(150), "run took {:?}", elapsed);
    assert_eq!(provider.create_count_for(ResourceKind::Certificate).await, 1);
    for cert in ["shared-cert-a", "shared-cert-b"] {
        let outcome = report.outcome(cert).unwrap();
        assert_eq!(outcome.state, NodeState::Failed, "{}", cert);
        assert!(outcome.error.as_deref().unwrap().contains("was not issued within 120s"));
    }
    assert_eq!(blocked_by(&report, "shared-a"), Some("shared-cert-a"));
    assert_eq!(blocked_by(&report, "shared-b"), Some("shared-cert-b"));
    assert_eq!(report.certificates[0].validation_state, ValidationState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_blocks_without_waiting_for_siblings() {
    let provider = Arc::new(provider().with_fault(id("edge-cert"), Fault::FailValidation));
    provider.hold(id("alb")).await;

    let topology = topology(&provider, SOURCE_STACK).await;
    let handle = Executor::new(provider.clone(), options()).spawn(topology);

    assert_eq!(
        handle.wait_for(&id("alb"), NodeState::Validating).await,
        Some(NodeState::Validating)
    );
    assert_eq!(
        handle.wait_for(&id("cdn"), NodeState::Ready).await,
        Some(NodeState::Blocked)
    );
    assert_eq!(handle.state(&id("edge-cert")), Some(NodeState::Failed));
    assert_eq!(handle.state(&id("alb")), Some(NodeState::Validating));

    provider.release(&id("alb")).await;
    let report = handle.wait().await.unwrap();
    assert_eq!(blocked_by(&report, &id("cdn")), Some(id("edge-cert").as_str()));
    assert!(
        report.entered_at(&id("cdn"), NodeState::Blocked)
            < report.entered_at(&id("alb"), NodeState::Ready)
    );
    assert_eq!(report.state(&id("alb")), Some(NodeState::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_edge_certificate_failure_blocks_edge_branch_only() {
    let provider = Arc::new(provider());
    let topology = topology(&provider, SOURCE_STACK).await;
    provider.inject(id("edge-cert"), Fault::FailValidation).await;

    let report = Executor::new(provider.clone(), options())
        .execute(topology)
        .await
        .unwrap();

    let cert = report.outcome(&id("edge-cert")).unwrap();
    assert_eq!(cert.state, NodeState::Failed);
    assert!(cert.error.as_deref().unwrap().contains("failed validation"));

    assert_eq!(report.state(&id("cdn")), Some(NodeState::Blocked));
    assert_eq!(blocked_by(&report, &id("cdn")), Some(id("edge-cert").as_str()));
    assert_eq!(report.state(&id("alias")), Some(NodeState::Blocked));
    assert_eq!(blocked_by(&report, &id("alias")), Some(id("cdn").as_str()));

    for ready in ["alb", "https", "alb-cert", "tg", "ec2"] {
        assert_eq!(report.state(&id(ready)), Some(NodeState::Ready), "{}", ready);
    }
    assert_eq!(provider.create_count_for(ResourceKind::Distribution).await, 0);

    let edge = report
        .certificates
        .iter()
        .find(|c| c.region == "us-east-1")
        .unwrap();
    assert_eq!(edge.validation_state, ValidationState::Failed);
    let endpoints = report.endpoints();
    assert!(endpoints.distributions.is_empty());
    assert_eq!(endpoints.load_balancers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_roots_provision_together() {
    let roots = ["ec2-sg", "alb-sg", "alb-cert", "edge-cert"];
    let provider = Arc::new(provider());
    for root in roots {
        provider.hold(id(root)).await;
    }

    let topology = topology(&provider, SOURCE_STACK).await;
    let handle = Executor::new(provider.clone(), options()).spawn(topology);
    for root in roots {
        assert_eq!(
            handle.wait_for(&id(root), NodeState::Validating).await,
            Some(NodeState::Validating)
        );
    }

    for root in roots {
        assert_eq!(handle.state(&id(root)), Some(NodeState::Validating), "{}", root);
    }
    let mut created = provider.created_names().await;
    created.sort();
    let mut expected: Vec<String> = roots.iter().map(|r| id(r)).collect();
    expected.sort();
    assert_eq!(created, expected);

    for root in roots {
        provider.release(&id(root)).await;
    }
    let report = handle.wait().await.unwrap();
    assert!(report.is_success(), "failed: {:?}", report.failed());

    let first_ready = roots
        .iter()
        .filter_map(|r| report.entered_at(&id(r), NodeState::Ready))
        .min()
        .unwrap();
    for root in roots {
        assert!(report.entered_at(&id(root), NodeState::Validating).unwrap() < first_ready);
    }
}

#[tokio::test(start_paused = true)]
async fn test_abort_before_start_cancels_everything() {
    let provider = Arc::new(provider());
    let topology = topology(&provider, SOURCE_STACK).await;
    let handle = Executor::new(provider.clone(), options()).spawn(topology);
    handle.abort();

    let report = handle.wait().await.unwrap();
    assert_eq!(report.cancelled().len(), report.outcomes.len());
    assert!(report.outcomes.iter().all(|o| o.state == NodeState::Blocked));
    assert_eq!(provider.create_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abort_lets_started_nodes_finish() {
    let provider = Arc::new(provider());
    provider.hold(id("alb-cert")).await;

    let topology = topology(&provider, SOURCE_STACK).await;
    let handle = Executor::new(provider.clone(), options()).spawn(topology);
    handle.wait_for(&id("alb-cert"), NodeState::Validating).await;
    handle.wait_for(&id("alias"), NodeState::Ready).await;

    handle.abort();
    provider.release(&id("alb-cert")).await;
    let report = handle.wait().await.unwrap();

    assert_eq!(report.state(&id("alb-cert")), Some(NodeState::Ready));
    assert_eq!(report.state(&id("alias")), Some(NodeState::Ready));

    let listener = report.outcome(&id("https")).unwrap();
    assert_eq!(listener.state, NodeState::Blocked);
    assert!(listener.cancelled);
    assert_eq!(listener.blocked_by, None);
    assert_eq!(provider.create_count_for(ResourceKind::Listener).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit() {
    let provider = Arc::new(provider());
    let report = run(
        provider,
        ExecutorOptions {
            max_concurrency: Some(1),
            ..options()
        },
    )
    .await;
    assert!(report.is_success());

    let mut active = 0i32;
    for transition in &report.transitions {
        match transition.to {
            NodeState::Provisioning => active += 1,
            NodeState::Ready | NodeState::Failed => active -= 1,
            _ => {}
        }
        assert!(active <= 1, "more than one node provisioning at seq {}", transition.seq);
    }
}
