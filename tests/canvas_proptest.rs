//! Property tests for layout geometry, the connection graph and merging.

use canvas_lib::db::models::{CanvasLayout, ConnectionType, NewConnection, TeamPosition, ViewSettings};
use canvas_lib::engine::connection_graph::{ConnectionGraph, RejectionReason};
use canvas_lib::engine::geometry::{self, LayoutBounds};
use canvas_lib::engine::layout_merge::{layouts_equivalent, merge_layouts};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn team_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("team-{i}")).collect()
}

fn connection_type() -> impl Strategy<Value = ConnectionType> {
    prop_oneof![
        Just(ConnectionType::ReportsTo),
        Just(ConnectionType::CollaboratesWith),
        Just(ConnectionType::Supports),
        Just(ConnectionType::Custom),
    ]
}

fn layout_strategy() -> impl Strategy<Value = CanvasLayout> {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    (
        prop::collection::vec((-5_000i32..5_000, -5_000i32..5_000), 0..12),
        10i32..400,
        (-2_000i32..2_000, -2_000i32..2_000),
    )
        .prop_map(move |(coords, zoom_centi, (cx, cy))| {
            let mut layout = CanvasLayout::empty("user-1", Some("ws".into()), at);
            layout.positions = coords
                .into_iter()
                .enumerate()
                .map(|(i, (x, y))| TeamPosition::new(format!("team-{i}"), x as f64, y as f64, at))
                .collect();
            layout.view = ViewSettings {
                zoom: zoom_centi as f64 / 100.0,
                center_x: cx as f64,
                center_y: cy as f64,
            };
            layout
        })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn grid_placement_is_deterministic(n in 0usize..60) {
        let teams = team_ids(n);
        let now = Utc::now();
        let first = geometry::default_layout(&teams, now);
        let second = geometry::default_layout(&teams, now);
        prop_assert_eq!(&first, &second);
        for (i, p) in first.iter().enumerate() {
            prop_assert_eq!(p.x, ((i % 3) * 320 + 50) as f64);
            prop_assert_eq!(p.y, ((i / 3) * 200 + 50) as f64);
        }
    }

    #[test]
    fn self_loops_always_rejected(n in 1usize..8, pick in 0usize..8, kind in connection_type()) {
        let teams = team_ids(n);
        let id = &teams[pick % n];
        let mut graph = ConnectionGraph::new(&teams, 10);
        let err = graph.add(NewConnection::new(id.as_str(), id.as_str(), kind)).unwrap_err();
        prop_assert_eq!(err.reason, RejectionReason::SelfReference);
        prop_assert!(graph.edges().is_empty());
    }

    #[test]
    fn closing_a_reports_to_chain_is_a_cycle(n in 2usize..10) {
        let teams = team_ids(n);
        let mut graph = ConnectionGraph::new(&teams, 10);
        for pair in teams.windows(2) {
            graph
                .add(NewConnection::new(pair[0].as_str(), pair[1].as_str(), ConnectionType::ReportsTo))
                .unwrap();
        }
        let last = teams[n - 1].as_str();
        let first = teams[0].as_str();
        let err = graph.add(NewConnection::new(last, first, ConnectionType::ReportsTo)).unwrap_err();
        prop_assert_eq!(err.reason, RejectionReason::Cycle);
        prop_assert!(graph.add(NewConnection::new(last, first, ConnectionType::CollaboratesWith)).is_ok());
    }

    #[test]
    fn merge_with_self_is_identity(layout in layout_strategy()) {
        let merged = merge_layouts(&layout, &layout);
        prop_assert!(layouts_equivalent(&merged, &layout));
    }

    #[test]
    fn sub_unit_jitter_is_not_a_change(layout in layout_strategy(), dx in -0.49f64..0.49, dy in -0.49f64..0.49) {
        let mut jittered = layout.clone();
        for p in &mut jittered.positions {
            p.x += dx;
            p.y += dy;
        }
        prop_assert!(layouts_equivalent(&layout, &jittered));
    }

    #[test]
    fn whole_unit_moves_are_changes(layout in layout_strategy(), shift in 1.0f64..50.0) {
        prop_assume!(!layout.positions.is_empty());
        let mut moved = layout.clone();
        moved.positions[0].x += shift;
        prop_assert!(!layouts_equivalent(&layout, &moved));
    }

    #[test]
    fn fit_viewport_never_upscales(
        w in 1.0f64..5_000.0,
        h in 1.0f64..5_000.0,
        cw in 1.0f64..8_000.0,
        ch in 1.0f64..8_000.0,
    ) {
        let bounds = LayoutBounds { min_x: 0.0, min_y: 0.0, max_x: w, max_y: h };
        let view = geometry::calculate_fit_viewport(&bounds, cw, ch);
        prop_assert!(view.zoom <= 1.0);
        prop_assert!(view.zoom > 0.0);
        if w <= cw && h <= ch {
            prop_assert_eq!(view.zoom, 1.0);
        }
    }
}
