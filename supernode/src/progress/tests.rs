use std::net::Ipv4Addr;
use super::*;

const TASK: &str = "task";
const SUPER_PID: &str = "supernode-10.0.0.1-1";

fn engine() -> ProgressEngine {
    let mut config = Config::default();
    config.set_cid_prefix(Ipv4Addr::new(10, 0, 0, 1));
    config.set_super_pid(SUPER_PID.to_string());
    ProgressEngine::new(Arc::new(config))
}

// Supernode cache with `pieces` successful pieces and two registered clients.
fn seeded(pieces: i32) -> Result<(ProgressEngine, String)> {
    let engine = engine();
    let super_cid = engine.config.super_cid(TASK);
    engine.init_progress(TASK, SUPER_PID, &super_cid)?;
    engine.init_progress(TASK, "peerA", "cidA")?;
    engine.init_progress(TASK, "peerB", "cidB")?;
    for n in 0..pieces {
        engine.update_progress(TASK, &super_cid, SUPER_PID, "", n, PieceStatus::Success)?;
    }
    Ok((engine, super_cid))
}

#[test]
fn test_init_progress() -> Result<()> {
    let engine = engine();
    assert!(matches!(engine.init_progress("", "p", "c"), Err(SupernodeError::EmptyValue(_))));

    let super_cid = engine.config.super_cid(TASK);
    engine.init_progress(TASK, SUPER_PID, &super_cid)?;
    assert!(engine.super_progress.contains_key(TASK));
    assert!(!engine.client_progress.contains_key(&super_cid));
    assert!(engine.peer_state(SUPER_PID).is_err());

    engine.init_progress(TASK, "peerA", "cidA")?;
    assert!(engine.client_progress.contains_key("cidA"));
    assert_eq!(engine.peer_state("peerA")?.producer_load(), 0);
    Ok(())
}

#[test]
fn test_super_pieces_are_not_holders() -> Result<()> {
    let (engine, _) = seeded(3)?;
    assert!(engine.get_peer_ids_by_piece_num(TASK, 0)?.is_empty());
    assert!(engine.get_peer_ids_by_piece_num(TASK, -1).is_err());
    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Available)?, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn test_running_and_success() -> Result<()> {
    let (engine, _) = seeded(3)?;
    engine.update_client_progress(TASK, "cidA", "peerB", 1, PieceStatus::Running)?;
    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Running)?, vec![1]);
    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Available)?, vec![0, 2]);

    engine.update_progress(TASK, "cidA", "peerA", "peerB", 1, PieceStatus::Success)?;
    assert!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Running)?.is_empty());
    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Success)?, vec![1]);
    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Available)?, vec![0, 2]);
    assert_eq!(engine.get_peer_ids_by_piece_num(TASK, 1)?, vec!["peerA".to_string()]);
    Ok(())
}

#[test]
fn test_success_blocks_later_updates() -> Result<()> {
    let (engine, _) = seeded(1)?;
    engine.update_progress(TASK, "cidA", "peerA", "peerB", 0, PieceStatus::Success)?;
    engine.update_progress(TASK, "cidA", "peerA", "peerB", 0, PieceStatus::Failed)?;
    engine.update_progress(TASK, "cidA", "peerA", "peerB", 0, PieceStatus::Waiting)?;

    assert_eq!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Success)?, vec![0]);
    // Ignored updates leave counters and blacklist alone.
    assert!(engine.get_black_info("peerA").is_empty());
    assert_eq!(engine.peer_state("peerA")?.client_error_count(), 0);
    Ok(())
}

#[test]
fn test_available_errors() -> Result<()> {
    let (engine, super_cid) = seeded(1)?;
    engine.update_progress(TASK, "cidA", "peerA", "peerB", 0, PieceStatus::Success)?;
    assert!(matches!(
        engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Available),
        Err(SupernodeError::PeerWait(_)),
    ));

    engine.update_progress(TASK, &super_cid, SUPER_PID, "", 1, PieceStatus::Failed)?;
    assert!(matches!(
        engine.get_piece_progress_by_cid(TASK, "cidB", PieceSelector::Available),
        Err(SupernodeError::CdnFail(_)),
    ));
    assert!(engine.get_piece_progress_by_cid(TASK, "nobody", PieceSelector::Running).unwrap_err().is_data_not_found());
    Ok(())
}

#[test]
fn test_failures_and_blacklist() -> Result<()> {
    let (engine, _) = seeded(2)?;
    engine.update_progress(TASK, "cidB", "peerB", "", 0, PieceStatus::Success)?;

    let load = engine.peer_state("peerB")?;
    for _ in 0..5 {
        engine.update_client_progress(TASK, "cidA", "peerB", 0, PieceStatus::Running)?;
        load.update_producer_load(true);
        engine.update_progress(TASK, "cidA", "peerA", "peerB", 0, PieceStatus::Failed)?;
    }
    assert_eq!(engine.get_black_info("peerA").get("peerB"), Some(&5));
    assert_eq!(engine.peer_state("peerA")?.client_error_count(), 5);
    assert_eq!(load.service_error_count(), 5);
    assert_eq!(load.producer_load(), 0);

    engine.update_progress(TASK, "cidA", "peerA", "peerB", 1, PieceStatus::SemiSuccess)?;
    assert_eq!(engine.peer_state("peerA")?.client_error_count(), 0);
    assert_eq!(load.service_error_count(), 0);
    // The blacklist keeps counting until the peer is removed.
    assert_eq!(engine.get_black_info("peerA").get("peerB"), Some(&5));

    engine.delete_peer_id("peerB");
    assert!(engine.get_black_info("peerA").is_empty());
    assert!(engine.peer_state("peerB").is_err());
    Ok(())
}

#[test]
fn test_service_down_once() -> Result<()> {
    let (engine, _) = seeded(1)?;
    engine.update_peer_service_down("peerA")?;
    assert!(engine.peer_state("peerA")?.is_down());
    assert!(engine.update_peer_service_down("peerA").is_err());
    assert!(engine.update_peer_service_down("ghost").unwrap_err().is_data_not_found());
    Ok(())
}

#[test]
fn test_super_load_limit() {
    let engine = engine();
    for _ in 0..4 {
        assert!(engine.update_super_load(TASK, 1, 4));
    }
    assert!(!engine.update_super_load(TASK, 1, 4));
    assert_eq!(engine.super_load(TASK), 4);
    assert!(engine.update_super_load(TASK, -1, 4));
    assert!(engine.update_super_load(TASK, 1, 4));
    // No limit at all.
    assert!(engine.update_super_load("other", 10, 0));

    engine.renew_super_load(now_millis() + RENEW_DELAY_MS + 1);
    assert_eq!(engine.super_load(TASK), 0);
}

#[tokio::test]
async fn test_concurrent_super_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for _ in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.update_super_load(TASK, 1, 5) }));
    }
    let mut admitted = 0;
    for h in handles {
        if h.await? {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
    assert_eq!(engine.super_load(TASK), 5);
    Ok(())
}

#[test]
fn test_delete_task_and_client() -> Result<()> {
    let (engine, _) = seeded(2)?;
    engine.update_progress(TASK, "cidA", "peerA", "", 0, PieceStatus::Success)?;
    engine.update_super_load(TASK, 1, 0);

    engine.delete_cid("cidA");
    assert!(engine.get_piece_progress_by_cid(TASK, "cidA", PieceSelector::Running).is_err());

    engine.delete_peer_id_by_piece_num(TASK, 0, "peerA")?;
    assert!(engine.get_peer_ids_by_piece_num(TASK, 0)?.is_empty());

    engine.delete_task_id(TASK, 2)?;
    assert!(engine.super_progress.is_empty());
    assert!(engine.piece_progress.is_empty());
    assert_eq!(engine.super_load(TASK), 0);
    Ok(())
}
