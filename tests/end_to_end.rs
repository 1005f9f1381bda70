//! Full canvas lifecycle against an on-disk database: first open, edits,
//! save, restart, reload.

use std::path::PathBuf;

use canvas_lib::db;
use canvas_lib::db::models::{ConnectionType, NewConnection};
use canvas_lib::engine::connection_graph::{HierarchyNode, RejectionReason};
use canvas_lib::engine::layout_persistence::LayoutSource;
use canvas_lib::open_session;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("canvas_e2e_{}", uuid::Uuid::new_v4()))
}

fn teams() -> Vec<String> {
    vec!["A".into(), "B".into(), "C".into()]
}

#[tokio::test]
async fn three_team_scenario_survives_restart() {
    let dir = temp_dir();

    let session = open_session(&dir, "user-1", Some("ws-1".into()), None).unwrap();
    let report = session.load(&teams()).await.unwrap();
    assert_eq!(report.source, None);

    let layout = session.snapshot().unwrap();
    let coords: Vec<(&str, f64, f64)> = layout
        .positions
        .iter()
        .map(|p| (p.team_id.as_str(), p.x, p.y))
        .collect();
    assert_eq!(coords, vec![("A", 50.0, 50.0), ("B", 370.0, 50.0), ("C", 690.0, 50.0)]);

    session
        .on_connect(NewConnection::new("A", "B", ConnectionType::ReportsTo))
        .unwrap()
        .unwrap();
    let rejected = session
        .on_connect(NewConnection::new("B", "A", ConnectionType::ReportsTo))
        .unwrap()
        .unwrap_err();
    assert_eq!(rejected.reason, RejectionReason::Cycle);
    session
        .on_connect(NewConnection::new("B", "C", ConnectionType::ReportsTo))
        .unwrap()
        .unwrap();

    let tree = session.hierarchy(None).unwrap();
    let expected = HierarchyNode {
        team_id: "A".into(),
        children: vec![HierarchyNode {
            team_id: "B".into(),
            children: vec![HierarchyNode::leaf("C")],
        }],
    };
    assert_eq!(tree, vec![expected]);

    let outcome = session.save_now().await.unwrap().unwrap();
    assert_eq!(outcome.positions_saved, 3);
    assert_eq!(outcome.connections_saved, 2);
    assert!(!session.has_unsaved_changes().unwrap());

    let before = session.snapshot().unwrap();
    session.shutdown().await.unwrap();
    drop(session);

    // Restart.
    let session = open_session(&dir, "user-1", Some("ws-1".into()), None).unwrap();
    let report = session.load(&teams()).await.unwrap();
    assert_eq!(report.source, Some(LayoutSource::Merged));
    assert!(report.reconcile.is_noop());
    assert!(!session.has_unsaved_changes().unwrap());
    assert!(!session.store().lock().unwrap().is_dirty());

    let after = session.snapshot().unwrap();
    assert_eq!(after.positions.len(), 3);
    for (b, a) in before.positions.iter().zip(&after.positions) {
        assert_eq!((&b.team_id, b.x, b.y), (&a.team_id, a.x, a.y));
    }
    let edges = |l: &canvas_lib::db::models::CanvasLayout| -> Vec<(String, String, String, ConnectionType)> {
        l.connections
            .iter()
            .map(|c| (c.id.clone(), c.source_team_id.clone(), c.target_team_id.clone(), c.connection_type))
            .collect()
    };
    assert_eq!(edges(&after), edges(&before));
    assert_eq!(after.view, before.view);

    session.shutdown().await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn other_workspace_starts_fresh() {
    let dir = temp_dir();
    let session = open_session(&dir, "user-1", Some("ws-1".into()), None).unwrap();
    session.load(&teams()).await.unwrap();
    session.on_node_drag_stop("A", 900.0, 900.0).unwrap();
    session.shutdown().await.unwrap();
    drop(session);

    let other = open_session(&dir, "user-1", Some("ws-2".into()), None).unwrap();
    let report = other.load(&teams()).await.unwrap();
    assert_eq!(report.source, None);
    assert_eq!(other.snapshot().unwrap().positions[0].x, 50.0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn import_from_another_workspace_saves_locally() {
    let dir = temp_dir();
    let source = open_session(&dir, "user-1", Some("ws-1".into()), None).unwrap();
    source.load(&teams()).await.unwrap();
    source.on_node_drag_stop("A", 100.0, 50.0).unwrap();
    source
        .on_connect(NewConnection::new("A", "B", ConnectionType::Supports))
        .unwrap()
        .unwrap();
    source.save_now().await.unwrap();
    let exported = source.export_layout().unwrap();
    source.shutdown().await.unwrap();
    drop(source);

    let target = open_session(&dir, "user-1", Some("ws-2".into()), None).unwrap();
    target.load(&teams()).await.unwrap();
    target.import_layout(&exported).unwrap();
    assert_eq!(target.snapshot().unwrap().workspace_id.as_deref(), Some("ws-2"));
    target.on_node_drag_stop("A", 3000.0, 50.0).unwrap();
    target.save_now().await.unwrap().unwrap();
    target.shutdown().await.unwrap();
    drop(target);

    let pool = db::init_db(&dir).unwrap();
    let ws1 = db::repos::canvas::get_layout(&pool, "user-1", Some("ws-1")).unwrap().unwrap();
    let ws2 = db::repos::canvas::get_layout(&pool, "user-1", Some("ws-2")).unwrap().unwrap();
    assert_eq!(ws1.position_of("A").unwrap().x, 100.0);
    assert_eq!(ws2.position_of("A").unwrap().x, 3000.0);
    // Same edge id lives in both layouts.
    assert_eq!(ws1.connections[0].id, ws2.connections[0].id);
    let _ = std::fs::remove_dir_all(&dir);
}
