//! End-to-end flows against the loopback engine in manual-tick mode.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use btbridge_config::SessionConfig;
use btbridge_core::{AlertKind, EngineEvent, RateLimit, TorrentIdentity, TransferEngine};
use btbridge_libt::{
    BridgeError, ErrorKind, LoopbackEngine, PollRequest, PollStream, Session, TorrentHandle,
};
use btbridge_test_support::fixtures::{
    FIXTURE_HASH, SECOND_HASH, fixture_magnet, magnet_uri, multi_file_metadata, write_descriptor,
};

fn loopback_session_with(config: SessionConfig) -> (Session, Arc<LoopbackEngine>) {
    let engine = Arc::new(LoopbackEngine::manual(config.engine_settings()));
    let session = Session::new(config, engine.clone());
    (session, engine)
}

fn loopback_session() -> (Session, Arc<LoopbackEngine>) {
    loopback_session_with(SessionConfig::default())
}

fn publish(engine: &LoopbackEngine, hash: &str) -> Result<()> {
    engine.publish_fixture(TorrentIdentity::parse(hash)?, multi_file_metadata("bundle"));
    Ok(())
}

fn request(capacity: i64) -> PollRequest {
    PollRequest::from_parts(std::time::Duration::ZERO, usize::try_from(capacity).unwrap_or(0))
}

fn resume_payload(session: &Session, handle: TorrentHandle) -> Result<Vec<u8>> {
    session.request_save_resume(handle)?;
    let batch = session.poll_resume_data(PollRequest::new(1000, 8)?);
    assert_eq!(batch.len(), 1);
    let record = batch.into_records().into_iter().next().expect("one record");
    assert_eq!(record.identity(), &session.identity(handle)?);
    let (_, buffer) = record.into_parts();
    assert!(!buffer.is_empty());
    Ok(buffer.into_vec())
}

#[test]
fn added_magnets_are_listed_with_hex_identity() -> Result<()> {
    let (session, _engine) = loopback_session();
    let handle = session.add_magnet(&magnet_uri(FIXTURE_HASH, Some("Demo")), None, None)?;
    let identity = session.identity(handle)?;
    assert!(identity.as_str().len() % 2 == 0 && identity.as_str().len() <= 64);
    assert!(identity
        .as_str()
        .bytes()
        .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte)));

    let overview = session.list_overview(16);
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].identity, identity);
    assert_eq!(overview[0].name, "Demo");
    Ok(())
}

#[test]
fn find_by_identity_matches_exactly() -> Result<()> {
    let (session, _engine) = loopback_session();
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    let found = session.find_by_identity(FIXTURE_HASH)?;
    assert_eq!(found, handle);
    assert_eq!(session.identity(found)?.as_str(), FIXTURE_HASH);

    let upper = FIXTURE_HASH.to_uppercase();
    for probe in [&FIXTURE_HASH[..20], upper.as_str(), SECOND_HASH, ""] {
        let error = session.find_by_identity(probe).expect_err("no match");
        assert!(matches!(error, BridgeError::NotFound { .. }));
    }
    Ok(())
}

#[test]
fn polls_never_exceed_capacity_and_discard_the_rest() -> Result<()> {
    let (session, engine) = loopback_session();
    for index in 0..5_u8 {
        let hash = hex_hash(index);
        session.add_magnet(&magnet_uri(&hash, None), None, None)?;
    }
    engine.drain_events();

    session.post_torrent_updates()?;
    engine.push_event(EngineEvent::Log {
        message: "noise".into(),
    });
    let statuses = session.poll_status_updates(request(3));
    assert_eq!(statuses.len(), 3);
    let stats = session.last_drain(PollStream::Status);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.discarded_over_capacity, 2);
    assert_eq!(stats.discarded_non_matching, 1);

    // Nothing is requeued.
    assert!(session.poll_status_updates(request(10)).is_empty());
    assert_eq!(engine.queued_events(), 0);
    Ok(())
}

#[test]
fn zero_capacity_returns_without_draining() -> Result<()> {
    let (session, engine) = loopback_session();
    session.add_magnet(&fixture_magnet(), None, None)?;
    session.post_torrent_updates()?;
    let queued = engine.queued_events();

    let started = std::time::Instant::now();
    assert!(session.poll_status_updates(PollRequest::new(60_000, 0)?).is_empty());
    assert!(session.poll_alerts(PollRequest::new(60_000, 0)?).is_empty());
    assert!(session.poll_resume_data(PollRequest::new(60_000, 0)?).is_empty());
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(engine.queued_events(), queued);
    Ok(())
}

#[test]
fn invalid_arguments_have_no_side_effects() -> Result<()> {
    let (session, engine) = loopback_session();
    publish(&engine, FIXTURE_HASH)?;
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    engine.tick();
    let queued = engine.queued_events();

    let cases = [
        session.add_magnet("", None, None).map(|_| ()),
        session.file_info(handle, -1).map(|_| ()),
        PollRequest::new(10, -1).map(|_| ()),
        PollRequest::new(-10, 1).map(|_| ()),
    ];
    for result in cases {
        let error = result.expect_err("invalid input");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(session.torrent_count(), 1);
    assert_eq!(engine.queued_events(), queued);
    Ok(())
}

#[test]
fn resume_round_trip_restores_magnet_identity() -> Result<()> {
    let (session, engine) = loopback_session();
    publish(&engine, FIXTURE_HASH)?;
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    engine.tick();
    engine.tick();
    let payload = resume_payload(&session, handle)?;
    assert_eq!(session.outstanding_resume_batches(), 0);
    session.destroy();

    let (fresh, _engine) = loopback_session();
    let restored = fresh.add_magnet(&fixture_magnet(), None, Some(&payload))?;
    assert_eq!(fresh.identity(restored)?.as_str(), FIXTURE_HASH);
    let status = fresh.status(restored)?;
    assert!(status.has_metadata);
    assert!(status.total_downloaded > 0);
    Ok(())
}

#[test]
fn resume_round_trip_restores_descriptor_identity() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let descriptor = write_descriptor(dir.path(), "sample.torrent")?;
    let (session, _engine) = loopback_session();
    let handle = session.add_torrent_file(&descriptor, Some(dir.path()), None)?;
    let identity = session.identity(handle)?;
    let payload = resume_payload(&session, handle)?;

    let (fresh, _engine) = loopback_session();
    let restored = fresh.add_torrent_file(&descriptor, Some(dir.path()), Some(&payload))?;
    assert_eq!(fresh.identity(restored)?, identity);
    Ok(())
}

#[test]
fn unreadable_descriptors_are_engine_rejections() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (session, _engine) = loopback_session();
    let error = session
        .add_torrent_file(&dir.path().join("missing.torrent"), None, None)
        .expect_err("missing descriptor");
    assert_eq!(error.kind(), ErrorKind::EngineRejected);
    Ok(())
}

#[test]
fn exported_batches_flag_double_release() -> Result<()> {
    let (session, _engine) = loopback_session();
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    session.request_save_resume(handle)?;
    let batch = session.poll_resume_data(request(4));
    let id = session.export_resume_batch(batch);
    assert_eq!(session.outstanding_resume_batches(), 1);
    assert!(session.outstanding_resume_bytes() > 0);
    assert_eq!(session.with_exported_batch(id, |records| records.len())?, 1);

    assert_eq!(session.release_resume_batch(id)?, 1);
    let error = session.release_resume_batch(id).expect_err("second release");
    assert!(matches!(error, BridgeError::AlreadyReleased { .. }));
    assert_eq!(session.outstanding_resume_batches(), 0);
    Ok(())
}

#[test]
fn metadata_arrives_with_an_alert() -> Result<()> {
    let config = SessionConfig {
        enable_dht: false,
        ..SessionConfig::default().with_save_path("/tmp/t")
    };
    let (session, engine) = loopback_session_with(config);
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;

    let status = session.status(handle)?;
    assert!((0.0..=1.0).contains(&status.progress));
    assert!(!status.has_metadata);
    engine.tick();
    assert!(!session.status(handle)?.has_metadata);
    assert!(session.poll_alerts(request(8)).is_empty());

    publish(&engine, FIXTURE_HASH)?;
    engine.tick();
    let alerts = session.poll_alerts(PollRequest::new(100, 8)?);
    assert!(alerts
        .iter()
        .any(|alert| alert.kind == AlertKind::MetadataReceived
            && alert.identity.as_str() == FIXTURE_HASH));
    assert!(session.status(handle)?.has_metadata);
    Ok(())
}

#[test]
fn transfer_and_tracker_errors_surface_as_alerts() -> Result<()> {
    let (session, engine) = loopback_session();
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    let identity = session.identity(handle)?;
    assert!(engine.raise_torrent_error(&identity, 28, "No space left on device"));
    assert!(engine.raise_tracker_error(&identity, 404, "tracker said no"));

    let alerts = session.poll_alerts(request(8));
    let kinds: Vec<_> = alerts.iter().map(|alert| alert.kind).collect();
    assert_eq!(kinds, vec![AlertKind::TransferError, AlertKind::TrackerError]);
    assert_eq!(alerts[0].error_code, Some(28));
    Ok(())
}

#[test]
fn removed_handles_stay_retired() -> Result<()> {
    let (session, _engine) = loopback_session();
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    session.remove_torrent(handle, false)?;

    let results = [
        session.pause(handle),
        session.resume(handle),
        session.force_reannounce(handle),
        session.status(handle).map(|_| ()),
        session.identity(handle).map(|_| ()),
        session.move_storage(handle, Path::new("/tmp/elsewhere")),
        session.request_save_resume(handle),
        session.total_size(handle).map(|_| ()),
        session.remove_torrent(handle, false),
    ];
    for result in results {
        assert!(matches!(result, Err(BridgeError::RetiredHandle)));
    }

    // A new transfer in the reused slot does not revive the old handle.
    let second = session.add_magnet(&fixture_magnet(), None, None)?;
    assert_ne!(second, handle);
    assert!(matches!(session.status(handle), Err(BridgeError::RetiredHandle)));
    Ok(())
}

#[test]
fn session_limits_apply_to_every_transfer() -> Result<()> {
    let (session, engine) = loopback_session();
    publish(&engine, FIXTURE_HASH)?;
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    session.set_rate_limits(
        RateLimit::from_raw(2048),
        RateLimit::from_raw(-1),
    )?;
    engine.tick();
    engine.tick();
    assert_eq!(session.status(handle)?.download_rate, 2048);

    session.set_rate_limits(
        RateLimit::from_raw(0),
        RateLimit::from_raw(-1),
    )?;
    engine.tick();
    assert!(session.status(handle)?.download_rate > 2048);
    Ok(())
}

#[test]
fn sessions_are_shareable_across_threads() -> Result<()> {
    let (session, engine) = loopback_session();
    let session = Arc::new(session);
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.status(handle).is_ok())
        })
        .collect();
    engine.tick();
    for reader in readers {
        assert!(reader.join().expect("reader thread"));
    }
    Ok(())
}

fn hex_hash(index: u8) -> String {
    format!("{:040x}", u128::from(index) + 1)
}

#[test]
fn default_engine_sessions_tick_on_their_own() -> Result<()> {
    let config = SessionConfig {
        post_status_interval_ms: 50,
        ..SessionConfig::default()
    };
    let session = Session::with_default_engine(config)?;
    let handle = session.add_magnet(&fixture_magnet(), None, None)?;
    session.set_torrent_rate_limits(
        handle,
        RateLimit::Unlimited,
        RateLimit::Unchanged,
    )?;
    session.post_torrent_updates()?;
    let statuses = session.poll_status_updates(PollRequest::new(2_000, 8)?);
    assert_eq!(statuses.len(), 1);
    assert_eq!(session.engine_name(), "loopback");
    Ok(())
}
