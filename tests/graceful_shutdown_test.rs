//! Integration tests for graceful shutdown behavior.

mod common;

use common::{fast_settings, mock_devices, read_rows, wait_for_phase};
use drill_daq::controller::{Command, ControllerLinks};
use drill_daq::error::DaqError;
use drill_daq::rig::{DrillRig, RigOptions};
use drill_daq::session::SessionPhase;
use std::time::{Duration, Instant};
use tokio::io::{duplex, AsyncWriteExt};

#[tokio::test]
async fn test_shutdown_wakes_sleeping_loops_and_finalizes_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path(), 11.0);
    // loops spend nearly all their time asleep
    settings.acquisition.force_rate_hz = 0.5;
    settings.acquisition.temperature_rate_hz = 0.5;
    settings.acquisition.telemetry_rate_hz = 0.5;
    settings.acquisition.command_read_timeout_ms = 10_000;
    settings.acquisition.velocity_read_timeout_ms = 10_000;
    let (_force, _daq, devices) = mock_devices();

    let (mut plc_commands, rig_commands) = duplex(64);
    let (rig_telemetry, _plc_telemetry) = duplex(1024);
    let (_plc_velocity, rig_velocity) = duplex(64);
    let links = ControllerLinks::from_streams(
        rig_commands,
        rig_telemetry,
        Some(Box::new(rig_velocity)),
    );
    let rig = DrillRig::start(&settings, devices, links, RigOptions::default())
        .await
        .unwrap();
    let session = rig.session().clone();

    plc_commands.write_all(&Command::Begin.encode()).await.unwrap();
    wait_for_phase(&session, Duration::from_secs(1), |p| p == SessionPhase::Active).await;
    let path = session.current_path().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let summary = rig.shutdown().await.expect("shutdown");
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(500), "Shutdown took too long: {:?}", elapsed);
    assert!(summary.report.is_clean(), "{:?}", summary.report);
    assert_eq!(summary.report.exits.len(), 5);
    assert_eq!(summary.finalized, Some(path.clone()));

    // a second close has nothing left to do
    assert_eq!(session.close().await.unwrap(), None);
    assert_eq!(session.phase().await, SessionPhase::Idle);

    let (header, _rows) = read_rows(&path);
    assert_eq!(header.len(), 6);
}

#[tokio::test]
async fn test_shutdown_during_grace_tail_finalizes_early() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path(), 60.0);
    let (_force, _daq, devices) = mock_devices();

    let (mut plc_commands, rig_commands) = duplex(64);
    let (rig_telemetry, _plc_telemetry) = duplex(64 * 1024);
    let links = ControllerLinks::from_streams(rig_commands, rig_telemetry, None);
    let rig = DrillRig::start(&settings, devices, links, RigOptions::default())
        .await
        .unwrap();
    let session = rig.session().clone();

    plc_commands.write_all(&Command::Begin.encode()).await.unwrap();
    wait_for_phase(&session, Duration::from_secs(1), |p| p == SessionPhase::Active).await;
    plc_commands.write_all(&Command::End.encode()).await.unwrap();
    wait_for_phase(&session, Duration::from_secs(1), |p| {
        matches!(p, SessionPhase::ExtendedTail { .. })
    })
    .await;

    let start = Instant::now();
    let summary = rig.shutdown().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    let path = summary.finalized.expect("tail file finalized by shutdown");
    let (_header, rows) = read_rows(&path);
    assert_eq!(rows.iter().filter(|r| r.marker == "stop received").count(), 1);
}

#[tokio::test]
async fn test_controller_hang_up_wakes_wait_and_leaves_acquisition_running() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path(), 11.0);
    let (force, _daq, devices) = mock_devices();

    let (mut plc_commands, rig_commands) = duplex(64);
    let (rig_telemetry, _plc_telemetry) = duplex(64 * 1024);
    let links = ControllerLinks::from_streams(rig_commands, rig_telemetry, None);
    let rig = DrillRig::start(&settings, devices, links, RigOptions::default())
        .await
        .unwrap();
    let session = rig.session().clone();

    plc_commands.write_all(&Command::Begin.encode()).await.unwrap();
    wait_for_phase(&session, Duration::from_secs(1), |p| p == SessionPhase::Active).await;
    drop(plc_commands);

    tokio::time::timeout(Duration::from_secs(1), rig.wait())
        .await
        .expect("wait() should resolve once the command link closes");
    assert!(rig.run_flag().is_running());

    // the listener is gone but the force loop keeps sampling into the open file
    let triggers = force.trigger_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(force.trigger_count() > triggers);
    assert_eq!(session.phase().await, SessionPhase::Active);

    let summary = rig.shutdown().await.unwrap();
    let path = summary.finalized.expect("open file finalized by shutdown");
    let (_header, rows) = read_rows(&path);
    assert!(rows.iter().any(|r| r.force.is_some()));
}

#[tokio::test]
async fn test_failed_probe_aborts_before_any_loop_starts() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("never-created");
    let settings = fast_settings(&output_dir, 11.0);
    let (_force, daq, devices) = mock_devices();
    daq.set_failing(true);

    let (_plc_commands, rig_commands) = duplex(64);
    let (rig_telemetry, _plc_telemetry) = duplex(64);
    let links = ControllerLinks::from_streams(rig_commands, rig_telemetry, None);

    let result = DrillRig::start(&settings, devices, links, RigOptions::default()).await;
    assert!(matches!(result, Err(DaqError::Device(_))));
    assert!(!output_dir.exists());
}
