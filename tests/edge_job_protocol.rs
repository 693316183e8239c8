//! Edge Job Protocol Tests
//!
//! Pairing, signed job delivery and the agent-side checks, exercised through
//! the public API only.
//!
//! Test Categories:
//! 1. Pairing-code lifecycle
//! 2. Replay protection
//! 3. Signature and binding failures
//! 4. Agent-side policy and change-control enforcement
//! 5. Controller to agent round trip

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use netops_gate::audit::MemoryAuditSink;
use netops_gate::edge::{EdgeRegistry, InMemoryEdgeRepository, PolicyBundle};
use netops_gate::errors::{GateError, GateResult};
use netops_gate::governance::{ApprovalStatus, GovernanceStore, InMemoryGovernanceStore, NewApproval};
use netops_gate::jobs::{
    AgentSettings, EdgeIdentity, EdgePoller, InMemoryJobRepository, JobDispatcher, JobEnvelope,
    JobRepository, JobResultStatus, JobSource, JobStatus, MockExecutor, NewJob, SubmitResult,
};
use netops_gate::principal::{Principal, Role};
use netops_gate::replay::{InMemoryNonceStore, NonceStore};
use netops_gate::signing::{format_expiry, JobSigner, JobVerifier};

const PRIVATE_PEM: &str = include_str!("fixtures/job_signing_private.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/job_signing_public.pem");
const ROGUE_PEM: &str = include_str!("fixtures/rogue_private.pem");

fn signer() -> JobSigner {
    JobSigner::from_pem(PRIVATE_PEM.as_bytes()).unwrap()
}

fn verifier() -> JobVerifier {
    JobVerifier::from_pem(PUBLIC_PEM.as_bytes()).unwrap()
}

/// Source that records submissions and never hands out jobs
#[derive(Default)]
struct RecordingSource {
    submitted: Mutex<Vec<SubmitResult>>,
}

impl JobSource for RecordingSource {
    fn pull(&self, _edge_token: &str, _limit: usize) -> GateResult<Vec<JobEnvelope>> {
        Ok(Vec::new())
    }

    fn submit(&self, _edge_token: &str, result: SubmitResult) -> GateResult<()> {
        self.submitted.lock().unwrap().push(result);
        Ok(())
    }
}

struct Agent {
    poller: EdgePoller,
    source: Arc<RecordingSource>,
    nonces: Arc<InMemoryNonceStore>,
}

fn agent(edge_id: &str) -> Agent {
    agent_with_nonces(edge_id, Arc::new(InMemoryNonceStore::new()))
}

/// Agent process sharing `nonces` with any others built from the same store
fn agent_with_nonces(edge_id: &str, nonces: Arc<InMemoryNonceStore>) -> Agent {
    let source = Arc::new(RecordingSource::default());
    let poller = EdgePoller::new(
        source.clone(),
        verifier(),
        nonces.clone(),
        Arc::new(MockExecutor),
        EdgeIdentity {
            edge_id: edge_id.to_string(),
            auth_token: "edge-token".to_string(),
            policy_bundle: PolicyBundle::default(),
        },
        AgentSettings::default(),
    );
    Agent {
        poller,
        source,
        nonces,
    }
}

fn sign_job(
    signer: &JobSigner,
    edge_id: &str,
    payload: Value,
    nonce: &str,
    expires_at: DateTime<Utc>,
) -> JobEnvelope {
    let signature = signer
        .sign(edge_id, "netops.command", &payload, nonce, expires_at)
        .unwrap();
    JobEnvelope {
        id: format!("job-{nonce}"),
        job_type: "netops.command".to_string(),
        payload,
        signature,
        nonce: nonce.to_string(),
        expires_at: format_expiry(expires_at),
    }
}

fn read_payload() -> Value {
    json!({
        "templateId": "show_interface",
        "params": {"iface": "Gi0/1"},
        "connector": "ssh",
        "target": {"ip": "10.0.0.1"},
        "riskLevel": "R0_READ",
        "approvalGranted": false
    })
}

fn soon() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(60)
}

// =============================================================================
// PAIRING
// =============================================================================

/// A code issued at t0 with the default 10 minute TTL is dead at t0+11m.
#[test]
fn test_pairing_code_expires() {
    let registry = EdgeRegistry::new(Arc::new(InMemoryEdgeRepository::new()));
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    registry.issue_pairing_code("tenant-1", "ABC123", None, t0).unwrap();

    let err = registry
        .pair_edge_at("ABC123", Some("fp"), "branch", t0 + Duration::minutes(11))
        .unwrap_err();
    assert!(matches!(err, GateError::PairingExpired));
    assert_eq!(err.to_string(), "Pairing code expired");
}

/// A code pairs exactly once; the second attempt conflicts.
#[test]
fn test_pairing_code_single_use() {
    let registry = EdgeRegistry::new(Arc::new(InMemoryEdgeRepository::new()));
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    registry.issue_pairing_code("tenant-1", "ABC123", None, t0).unwrap();

    let paired = registry
        .pair_edge_at("ABC123", Some("fp"), "branch", t0 + Duration::minutes(9))
        .unwrap();
    assert!(!paired.auth_token.is_empty());
    assert_eq!(registry.authenticate(&paired.auth_token).unwrap().id, paired.edge_id);

    let err = registry
        .pair_edge_at("ABC123", Some("fp"), "branch", t0 + Duration::minutes(9))
        .unwrap_err();
    assert!(matches!(err, GateError::PairingInvalidOrUsed));
    assert_eq!(err.status_code(), 409);

    assert!(matches!(
        registry.pair_edge_at("NOPE00", None, "x", t0),
        Err(GateError::PairingInvalidOrUsed)
    ));
}

// =============================================================================
// REPLAY
// =============================================================================

/// The same nonce never executes twice.
#[test]
fn test_replay_detected() {
    let agent = agent("edge-1");
    let job = sign_job(&signer(), "edge-1", read_payload(), "nonce-replay", soon());

    let first = agent.poller.process_batch(&[job.clone()], Utc::now());
    assert_eq!(first.results[0].status, JobResultStatus::Success);
    assert!(agent.nonces.is_used("nonce-replay").unwrap());

    let second = agent.poller.process_batch(&[job], Utc::now());
    assert_eq!(second.results[0].status, JobResultStatus::Failed);
    assert_eq!(second.results[0].reason.as_deref(), Some("Replay detected"));
}

/// Two agents polling concurrently over one nonce store execute a job once.
#[test]
fn test_concurrent_agents_execute_once() {
    let nonces = Arc::new(InMemoryNonceStore::new());
    let agents = [
        agent_with_nonces("edge-1", nonces.clone()),
        agent_with_nonces("edge-1", nonces.clone()),
    ];
    let job = sign_job(&signer(), "edge-1", read_payload(), "nonce-shared", soon());

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = agents
            .iter()
            .map(|a| {
                let job = job.clone();
                scope.spawn(move || a.poller.process_batch(&[job], Utc::now()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let statuses: Vec<_> = reports.iter().map(|r| r.results[0].status).collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == JobResultStatus::Success).count(),
        1,
        "{statuses:?}"
    );
    let failed = reports
        .iter()
        .map(|r| &r.results[0])
        .find(|o| o.status == JobResultStatus::Failed)
        .unwrap();
    assert_eq!(failed.reason.as_deref(), Some("Replay detected"));
    assert!(nonces.is_used("nonce-shared").unwrap());
}

// =============================================================================
// SIGNATURE AND BINDING
// =============================================================================

#[test]
fn test_tampered_payload_rejected() {
    let agent = agent("edge-1");
    let mut job = sign_job(&signer(), "edge-1", read_payload(), "nonce-tamper", soon());
    job.payload["params"]["iface"] = json!("Gi0/2");

    let report = agent.poller.process_batch(&[job], Utc::now());
    assert_eq!(report.results[0].reason.as_deref(), Some("Job payload mismatch"));
    assert!(!agent.nonces.is_used("nonce-tamper").unwrap());
}

#[test]
fn test_foreign_key_and_wrong_edge_rejected() {
    let agent = agent("edge-1");
    let rogue = JobSigner::from_pem(ROGUE_PEM.as_bytes()).unwrap();

    let forged = sign_job(&rogue, "edge-1", read_payload(), "nonce-forged", soon());
    let misrouted = sign_job(&signer(), "edge-2", read_payload(), "nonce-misrouted", soon());

    let report = agent.poller.process_batch(&[forged, misrouted], Utc::now());
    assert_eq!(report.processed, 2);
    assert_eq!(report.results[0].reason.as_deref(), Some("Invalid job signature"));
    assert_eq!(report.results[1].reason.as_deref(), Some("Edge mismatch"));
}

#[test]
fn test_expired_job_rejected() {
    let agent = agent("edge-1");
    let expires_at = Utc::now() + Duration::seconds(30);
    let job = sign_job(&signer(), "edge-1", read_payload(), "nonce-late", expires_at);

    let report = agent
        .poller
        .process_batch(&[job], expires_at + Duration::seconds(1));
    assert_eq!(report.results[0].reason.as_deref(), Some("Job expired"));
}

// =============================================================================
// AGENT-SIDE ENFORCEMENT
// =============================================================================

/// A signed payload carrying a raw command still never executes.
#[test]
fn test_signed_raw_command_rejected() {
    let agent = agent("edge-1");
    let mut payload = read_payload();
    payload["command"] = json!("write erase");
    let job = sign_job(&signer(), "edge-1", payload, "nonce-raw", soon());

    let report = agent.poller.process_batch(&[job], Utc::now());
    assert_eq!(
        report.results[0].reason.as_deref(),
        Some("Raw commands are not allowed")
    );
}

/// The agent re-runs the change gate on the signed approval flag, and one
/// bad job does not stop the batch.
#[test]
fn test_agent_gate_and_batch_isolation() {
    let agent = agent("edge-1");
    let mut change = read_payload();
    change["riskLevel"] = json!("R2_CHANGE");
    change["reason"] = json!("relabel");
    change["changeRequestId"] = json!("CR-1");

    let blocked = sign_job(&signer(), "edge-1", change, "nonce-change", soon());
    let fine = sign_job(&signer(), "edge-1", read_payload(), "nonce-fine", soon());

    let report = agent.poller.process_batch(&[blocked, fine], Utc::now());
    assert_eq!(report.processed, 2);
    assert_eq!(
        report.results[0].reason.as_deref(),
        Some("Approval is required before executing this action")
    );
    assert_eq!(report.results[1].status, JobResultStatus::Success);

    let submitted = agent.source.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].status, JobResultStatus::Failed);
    assert_eq!(submitted[1].output["templateId"], "show_interface");
    assert_eq!(submitted[1].output["dryRun"], true);
}

#[test]
fn test_bundle_blocks_command_and_connector() {
    let agent = agent("edge-1");
    let mut blocked = read_payload();
    blocked["renderedCommands"] = json!(["reload in 5"]);
    let mut no_connector = read_payload();
    no_connector.as_object_mut().unwrap().remove("connector");

    let report = agent.poller.process_batch(
        &[
            sign_job(&signer(), "edge-1", blocked, "nonce-blocked", soon()),
            sign_job(&signer(), "edge-1", no_connector, "nonce-noconn", soon()),
        ],
        Utc::now(),
    );
    assert_eq!(report.results[0].reason.as_deref(), Some("Blocked command detected"));
    assert_eq!(
        report.results[1].reason.as_deref(),
        Some("Connector not allowed by policy")
    );
}

// =============================================================================
// CONTROLLER TO AGENT
// =============================================================================

/// An approved change job is stamped `approvalGranted`, signed, pulled,
/// executed and settled exactly once.
#[test]
fn test_approved_change_round_trip() {
    let edges = Arc::new(EdgeRegistry::new(Arc::new(InMemoryEdgeRepository::new())));
    let code = edges.create_pairing_code("tenant-1", None).unwrap();
    let paired = edges.pair_edge(&code.pairing_code, None, "branch").unwrap();

    let governance = Arc::new(InMemoryGovernanceStore::new());
    let approval = governance
        .request_approval(
            NewApproval {
                device_id: "rtr-1".to_string(),
                ticket_id: "CHG-9".to_string(),
                reason: "relabel".to_string(),
            },
            "op-1",
        )
        .unwrap();
    governance
        .resolve_approval(&approval.id, ApprovalStatus::Approved, "lead")
        .unwrap();

    let dispatcher = Arc::new(JobDispatcher::new(
        Arc::new(InMemoryJobRepository::new()),
        edges.clone(),
        governance,
        Arc::new(MemoryAuditSink::new()),
        signer(),
        verifier(),
    ));

    let job = dispatcher
        .create_job(
            &Principal::new("op-1", Role::Netops),
            NewJob {
                tenant_id: "tenant-1".to_string(),
                edge_node_id: paired.edge_id.clone(),
                job_type: "netops.command".to_string(),
                payload: json!({
                    "templateId": "set_interface_comment",
                    "params": {"iface": "ether1", "comment": "uplink"},
                    "connector": "ssh",
                    "riskLevel": "R2_CHANGE",
                    "reason": "relabel",
                    "changeRequestId": "CR-9",
                    "deviceId": "rtr-1",
                    "ticketId": "CHG-9",
                    "approvalGranted": false
                }),
                ttl_seconds: None,
            },
        )
        .unwrap();
    assert_eq!(job.payload["approvalGranted"], true);

    let nonces: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new());
    let poller = EdgePoller::new(
        dispatcher.clone(),
        verifier(),
        nonces,
        Arc::new(MockExecutor),
        EdgeIdentity {
            edge_id: paired.edge_id.clone(),
            auth_token: paired.auth_token.clone(),
            policy_bundle: paired.policy_bundle.clone(),
        },
        AgentSettings::default(),
    );

    let report = poller.poll_jobs(5).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.outcome(&job.id).unwrap().status, JobResultStatus::Success);

    let stored = dispatcher.repository().get(&job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);

    assert_eq!(poller.poll_jobs(5).unwrap().processed, 0);
}
