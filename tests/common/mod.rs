//! Shared helpers for the integration suites

#![allow(dead_code)]

use std::sync::Arc;

use geo::{Coord, LineString};
use roadtrack::graph::{RoadEdge, SimpleRoadNetwork};
use roadtrack::models::observation::GpsObservation;
use roadtrack::paths::RoadPath;
use roadtrack::types::spaces::ObsVector;

/// A straight edge between two points.
pub fn make_edge(id: u64, from: (f64, f64), to: (f64, f64)) -> Arc<RoadEdge> {
    let line = LineString::new(vec![
        Coord {
            x: from.0,
            y: from.1,
        },
        Coord { x: to.0, y: to.1 },
    ]);
    Arc::new(RoadEdge::new(id, line, false))
}

/// A forward path over the given edges.
pub fn make_path(edges: &[Arc<RoadEdge>]) -> RoadPath {
    RoadPath::from_graph_edges(edges, false)
}

/// An axis-aligned grid network: `n × n` intersections at `spacing` meters,
/// every street present in both directions.
pub fn grid_network(n: usize, spacing: f64) -> SimpleRoadNetwork {
    let mut edges = Vec::new();
    let mut id = 0;
    let coord = |i: usize, j: usize| (i as f64 * spacing, j as f64 * spacing);

    for j in 0..n {
        for i in 0..n.saturating_sub(1) {
            edges.push(make_edge(id, coord(i, j), coord(i + 1, j)));
            id += 1;
            edges.push(make_edge(id, coord(i + 1, j), coord(i, j)));
            id += 1;
        }
    }
    for i in 0..n {
        for j in 0..n.saturating_sub(1) {
            edges.push(make_edge(id, coord(i, j), coord(i, j + 1)));
            id += 1;
            edges.push(make_edge(id, coord(i, j + 1), coord(i, j)));
            id += 1;
        }
    }

    SimpleRoadNetwork::new(edges)
}

/// A projected-only observation.
pub fn make_obs(t: f64, x: f64, y: f64) -> Arc<GpsObservation> {
    Arc::new(GpsObservation::projected_only(
        "test",
        t,
        ObsVector::from_array([x, y]),
        t as u64,
        None,
    ))
}
