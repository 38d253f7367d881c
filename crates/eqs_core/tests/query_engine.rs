//! End-to-end behaviour of the engine over an in-memory host

use eqs_core::spatial::{coordinate_to_index, index_to_coordinate};
use eqs_core::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn block(id: i64, min: Vec3, max: Vec3) -> SceneObject {
    SceneObject {
        id: ObjectId(id),
        name: format!("Block{}", id),
        scene: "Main".into(),
        kind: SceneObjectKind::Static,
        object_type: "wall".into(),
        transform: Transform::at(Bounds::new(min, max).center()),
        bounds: Some(Bounds::new(min, max)),
        parent: None,
        properties: BTreeMap::new(),
    }
}

/// 2 x 1 x 2 grid at the origin with cell (0, 0, 0) blocked
fn small_world() -> (Arc<InMemoryHost>, EqsEngine, BuildOptions) {
    let host = Arc::new(InMemoryHost::new());
    host.add_scene("Main");
    host.insert_object(block(1, Vec3::splat(0.1), Vec3::splat(0.9)));
    let engine = EqsEngine::new(EngineConfig::default(), HostBindings::from_host(host.clone()));
    let options = BuildOptions {
        bounds_override: Some(Bounds::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 2.0))),
        ..BuildOptions::default()
    };
    (host, engine, options)
}

fn closest_free_cell(query_id: &str, target: Vec3) -> QueryModel {
    QueryModel::new(query_id)
        .with_reference("target", target)
        .with_condition(ConditionSpec::new(ConditionKind::StaticOccupancy { occupied: false }))
        .with_criterion(CriterionSpec::new(CriterionKind::ProximityTo {
            reference: "target".into(),
            metric: DistanceMetric::Euclidean,
        }))
}

#[test]
fn free_cells_ranked_by_proximity() {
    let (_, engine, options) = small_world();
    let snapshot = engine.build_environment(&options).unwrap();
    assert_eq!(snapshot.grid().dimensions(), GridDimensions::new(2, 1, 2));
    assert_eq!(snapshot.grid().occupied_count(), 1);

    let result = engine.execute_query(&closest_free_cell("scenario", Vec3::new(1.0, 0.0, 1.0)));
    assert_eq!(result.status, QueryStatus::Success);
    assert_eq!(result.candidates_passed, 3);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.results[0].world_position, Vec3::new(1.0, 0.0, 1.0));
    assert_eq!(result.results[0].score, 1.0);
    assert!(result.results.iter().all(|c| c.world_position != Vec3::ZERO));
    assert!(result.results[1].score <= result.results[0].score);
}

#[test]
fn non_positive_sphere_fails_with_area_error() {
    let (_, engine, options) = small_world();
    engine.build_environment(&options).unwrap();

    for radius in [0.0, -2.0] {
        let query = QueryModel::new("bad").with_area(AreaOfInterest::sphere(Vec3::ZERO, radius));
        let result = engine.execute_query(&query);
        assert_eq!(result.status, QueryStatus::Failure);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidAreaOfInterest));
        assert!(result.error_message.is_some());
        assert!(result.results.is_empty());
    }
    // Failures are never cached
    assert_eq!(engine.environment_status().cached_queries_count, 0);
}

#[test]
fn unknown_object_is_reported_not_raised() {
    let (_, engine, _) = small_world();
    let details = engine.get_object_details(&["999999".to_string()], None);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].id, "999999");
    assert!(!details[0].exists);
    assert!(details[0].properties.is_empty());
}

#[test]
fn repeated_queries_are_deterministic() {
    let host = Arc::new(InMemoryHost::new());
    host.add_scene("Main");
    host.insert_object(block(1, Vec3::new(3.1, 0.0, 0.0), Vec3::new(3.9, 2.0, 6.0)));
    host.insert_object(block(2, Vec3::new(6.0, 0.0, 2.1), Vec3::new(9.0, 1.0, 2.9)));
    let mut config = EngineConfig::default();
    config.query.cache_enabled = false;
    config.query.parallel_threshold = 16;
    let engine = EqsEngine::new(config, HostBindings::from_host(host));
    engine.build_environment(&BuildOptions::default()).unwrap();

    let query = closest_free_cell("det", Vec3::new(5.0, 0.0, 5.0))
        .with_reference("threat", Vec3::new(8.0, 0.0, 0.0))
        .with_criterion(
            CriterionSpec::new(CriterionKind::CoverFrom {
                reference: "threat".into(),
            })
            .with_weight(0.5),
        )
        .with_result_count(25);

    let first = engine.execute_query(&query);
    let second = engine.execute_query(&query);
    assert!(first.is_success());
    assert_eq!(first.results, second.results);
    assert_eq!(first.environment_hash, second.environment_hash);
    assert_eq!(engine.cache_stats().hits, 0);
}

#[test]
fn cache_hits_only_while_hash_matches() {
    let (host, engine, options) = small_world();
    let first_snapshot = engine.build_environment(&options).unwrap();
    let query = closest_free_cell("cached", Vec3::new(1.0, 0.0, 1.0));

    let computed = engine.execute_query(&query);
    assert_eq!(engine.execute_query(&query), computed);
    assert_eq!(engine.cache_stats().hits, 1);

    // Same content, same hash: still a hit
    let rebuilt = engine.build_environment(&options).unwrap();
    assert_eq!(rebuilt.hash(), first_snapshot.hash());
    engine.execute_query(&query);
    assert_eq!(engine.cache_stats().hits, 2);

    // Occupancy change: new hash, forced miss
    host.insert_object(block(2, Vec3::new(1.1, 0.1, 1.1), Vec3::new(1.9, 0.9, 1.9)));
    let changed = engine.build_environment(&options).unwrap();
    assert_ne!(changed.hash(), first_snapshot.hash());
    let recomputed = engine.execute_query(&query);
    let stats = engine.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.stale_misses, 1);
    assert_eq!(recomputed.candidates_passed, 2);
    assert_eq!(recomputed.environment_hash, changed.hash());
}

#[test]
fn visualization_sweep_uses_strict_expiry() {
    let (host, engine, options) = small_world();
    engine.build_environment(&options).unwrap();
    engine.execute_query(&closest_free_cell("viz", Vec3::new(1.0, 0.0, 1.0)));

    let info = engine.activate_visualization("viz", Some(30.0)).unwrap();
    assert_eq!(info.marker_count, 3);
    assert_eq!(host.live_marker_count(), 3);

    assert_eq!(engine.sweep_visualizations(info.expiration_time), 0);
    assert_eq!(host.live_marker_count(), 3);
    assert_eq!(
        engine.sweep_visualizations(info.expiration_time + chrono::Duration::milliseconds(1)),
        1
    );
    assert_eq!(host.live_marker_count(), 0);
}

#[test]
fn index_and_coordinate_round_trip() {
    let dims = GridDimensions::new(3, 4, 5);
    for index in 0..60 {
        let coord = index_to_coordinate(index, dims).unwrap();
        assert_eq!(coordinate_to_index(coord, dims).unwrap(), index);
    }
    for z in 0..5 {
        for y in 0..4 {
            for x in 0..3 {
                let coord = GridCoord::new(x, y, z);
                let index = coordinate_to_index(coord, dims).unwrap();
                assert_eq!(index_to_coordinate(index, dims).unwrap(), coord);
            }
        }
    }
    assert_eq!(
        index_to_coordinate(60, dims).unwrap_err().kind(),
        ErrorKind::OutOfRange
    );
    assert_eq!(
        coordinate_to_index(GridCoord::new(0, -1, 0), dims).unwrap_err().kind(),
        ErrorKind::OutOfRange
    );
}

#[test]
fn squared_metric_matches_euclidean() {
    let points = [
        Vec3::ZERO,
        Vec3::new(1.5, -2.0, 3.25),
        Vec3::new(-100.0, 0.5, 42.0),
        Vec3::new(1e-3, 1e3, -7.0),
    ];
    for a in points {
        for b in points {
            let euclidean = DistanceMetric::Euclidean.distance(a, b);
            let squared = DistanceMetric::Squared.distance(a, b);
            assert!((squared.sqrt() - euclidean).abs() <= 1e-9 * euclidean.max(1.0));
        }
    }
}

#[test]
fn wire_query_with_unknown_type_fails_cleanly() {
    let (_, engine, options) = small_world();
    engine.build_environment(&options).unwrap();

    let result = engine.execute_query_json(json!({
        "queryId": "wire",
        "conditions": [{ "type": "teleportable", "parameters": {} }]
    }));
    assert_eq!(result.query_id, "wire");
    assert_eq!(result.status, QueryStatus::Failure);
    assert_eq!(result.error_kind, Some(ErrorKind::QueryExecutionFailed));

    let result = engine.execute_query_json(json!({
        "queryId": "wire-ok",
        "referencePoints": [{ "name": "target", "position": { "x": 1.0, "y": 0.0, "z": 1.0 } }],
        "conditions": [{ "type": "StaticOccupancy", "parameters": { "occupied": false } }],
        "scoringCriteria": [{ "type": "proximityTo", "parameters": { "reference": "target" } }],
        "desiredResultCount": 1
    }));
    assert_eq!(result.status, QueryStatus::Success);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].world_position, Vec3::new(1.0, 0.0, 1.0));
}

#[test]
fn dynamic_updates_change_the_hash() {
    let (host, engine, options) = small_world();
    host.insert_object(SceneObject {
        id: ObjectId(7),
        name: "Walker".into(),
        scene: "Main".into(),
        kind: SceneObjectKind::Dynamic,
        object_type: "npc".into(),
        transform: Transform::at(Vec3::new(1.2, 0.0, 0.2)),
        bounds: None,
        parent: None,
        properties: BTreeMap::new(),
    });
    let before = engine.build_environment(&options).unwrap();

    let after = engine.update_dynamic_object(ObjectId(7), Vec3::new(1.2, 0.0, 1.2)).unwrap();
    assert_ne!(before.hash(), after.hash());

    let occupied = QueryModel::new("walker").with_condition(ConditionSpec::new(ConditionKind::HasDynamicOccupant {
        object_type: None,
    }));
    let result = engine.execute_query(&occupied);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].world_position, Vec3::new(1.0, 0.0, 1.0));
    assert_eq!(result.results[0].associated_object_ids, vec![ObjectId(7)]);

    let removed = engine.remove_dynamic_object(ObjectId(7)).unwrap();
    assert!(removed.dynamic_objects().is_empty());
    assert_eq!(
        engine.remove_dynamic_object(ObjectId(7)).unwrap_err().kind(),
        ErrorKind::ObjectNotFound
    );
}
