use super::orchestrator::remote_targets;
use super::*;
use crate::address::NodeAddress;
use crate::config::{MeshConfig, NamedTarget, RoleKind};
use crate::error::MeshError;

const CAMERA: NodeAddress = NodeAddress::new([0x00, 0x13, 0xA2, 0x00, 0x42, 0x3D, 0x8A, 0xAC]);

fn create_test_config() -> MeshConfig {
    let mut config = MeshConfig::default();
    config.radio.bind = "127.0.0.1:0".to_string();
    config.hub.enabled = false;
    config.watchdog.enabled = false;
    config
}

#[tokio::test]
async fn test_orchestrator_rejects_invalid_config() {
    let mut config = create_test_config();
    config.node.role = RoleKind::Router;
    config.node.peer = None;

    match NodeOrchestrator::new(config) {
        Err(MeshError::Config(_)) => {}
        Err(e) => panic!("Unexpected orchestrator error: {}", e),
        Ok(_) => panic!("Router without peer must be rejected"),
    }
}

#[tokio::test]
async fn test_initialize_builds_context() {
    let mut orchestrator = NodeOrchestrator::new(create_test_config()).unwrap();
    assert!(!orchestrator.is_initialized());

    orchestrator.initialize().await.unwrap();
    assert!(orchestrator.is_initialized());

    let identity = orchestrator.identity();
    assert_eq!(identity.role, RoleKind::Coordinator);
    assert_eq!(identity.node_id, "XBEE_COORD");
}

#[tokio::test]
async fn test_radio_bind_failure_is_fatal() {
    let mut config = create_test_config();
    config.radio.bind = "not-an-endpoint".to_string();
    let mut orchestrator = NodeOrchestrator::new(config).unwrap();

    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(err, MeshError::FatalInit { .. }));
    assert!(!err.is_recoverable());
    assert!(!orchestrator.is_initialized());
}

#[tokio::test]
async fn test_run_requires_initialization() {
    let mut orchestrator = NodeOrchestrator::new(create_test_config()).unwrap();
    assert!(matches!(
        orchestrator.run().await,
        Err(MeshError::System { .. })
    ));
}

#[tokio::test]
async fn test_quit_request_stops_node() {
    let mut orchestrator = NodeOrchestrator::new(create_test_config()).unwrap();
    orchestrator.initialize().await.unwrap();

    orchestrator.cancellation_token.cancel();
    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_halt_safely_exits_non_zero() {
    let mut orchestrator = NodeOrchestrator::new(create_test_config()).unwrap();
    orchestrator.cancellation_token.cancel();

    let cause = MeshError::fatal_init("radio", "no module attached");
    assert_eq!(orchestrator.halt_safely(&cause).await.unwrap(), 1);
}

#[test]
fn test_remote_targets_fall_back_to_peer() {
    let mut config = create_test_config();
    config.node.role = RoleKind::Remote;
    config.node.peer = Some(CAMERA);

    let targets = remote_targets(&config).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].address, CAMERA);
    assert_eq!(targets[0].name, "0013A200423D8AAC");

    config.node.targets = vec![NamedTarget {
        name: "CAMARA1".to_string(),
        address: CAMERA,
    }];
    assert_eq!(remote_targets(&config).unwrap()[0].name, "CAMARA1");

    config.node.peer = None;
    config.node.targets.clear();
    assert!(remote_targets(&config).is_err());
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::Signal("SIGTERM".to_string()).exit_code(), 0);
    assert_eq!(ShutdownReason::UserRequest.exit_code(), 0);
    assert_eq!(ShutdownReason::WatchdogReset.exit_code(), 1);
    assert_eq!(ShutdownReason::Halted("radio".to_string()).exit_code(), 1);
    assert_eq!(
        ShutdownReason::Signal("SIGINT".to_string()).to_string(),
        "signal SIGINT"
    );
}
