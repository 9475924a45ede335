//! Read-only road network queries
//!
//! The tracker never mutates the graph; every query type it needs is covered
//! by this trait, and the graph is shared by reference across all particles.

use std::sync::Arc;

use geo::{Coord, LineString};

use crate::geom::{project_to_segment, coord_distance};

use super::edge::RoadEdge;

/// The query surface the tracker requires from a road network.
///
/// Implementations must be immutable after load; all methods are `&self` and
/// the trait requires `Send + Sync` so particles can be stepped in parallel.
pub trait RoadNetwork: Send + Sync {
    /// All edges within `radius` meters of `point`.
    fn nearby_edges(&self, point: Coord<f64>, radius: f64) -> Vec<Arc<RoadEdge>>;

    /// Edges reachable by continuing forward off the end of `edge`,
    /// already filtered for legal transfers (one-way restrictions etc.).
    fn outgoing_transferable(&self, edge: &RoadEdge) -> Vec<Arc<RoadEdge>>;

    /// Edges from which `edge` can be entered, i.e. reachable by moving
    /// backward off its start.
    fn incoming_transferable(&self, edge: &RoadEdge) -> Vec<Arc<RoadEdge>>;

    /// Whether the graph contains the reverse of the given geometry.
    fn edge_has_reverse(&self, geometry: &LineString<f64>) -> bool;
}

// ============================================================================
// SimpleRoadNetwork
// ============================================================================

/// A brute-force in-memory network over a list of edges.
///
/// Adjacency is inferred from shared endpoints; the reverse of an edge is
/// excluded from its own transfer sets (no U-turns in place). Intended for
/// tests and small graphs; production graphs implement [`RoadNetwork`] over
/// a spatial index.
#[derive(Debug, Default)]
pub struct SimpleRoadNetwork {
    edges: Vec<Arc<RoadEdge>>,
}

impl SimpleRoadNetwork {
    pub fn new(edges: Vec<Arc<RoadEdge>>) -> Self {
        Self { edges }
    }

    pub fn edges(&self) -> &[Arc<RoadEdge>] {
        &self.edges
    }

    fn is_reverse_of(a: &RoadEdge, b: &RoadEdge) -> bool {
        let rev = a.reversed_geometry();
        rev == *b.geometry()
    }

    fn min_distance(edge: &RoadEdge, point: Coord<f64>) -> f64 {
        edge.segments()
            .iter()
            .map(|seg| {
                let (_, projected) = project_to_segment(&seg.line, point);
                coord_distance(projected, point)
            })
            .fold(f64::INFINITY, f64::min)
    }
}

impl RoadNetwork for SimpleRoadNetwork {
    fn nearby_edges(&self, point: Coord<f64>, radius: f64) -> Vec<Arc<RoadEdge>> {
        self.edges
            .iter()
            .filter(|e| Self::min_distance(e, point) <= radius)
            .cloned()
            .collect()
    }

    fn outgoing_transferable(&self, edge: &RoadEdge) -> Vec<Arc<RoadEdge>> {
        self.edges
            .iter()
            .filter(|e| {
                e.start_point() == edge.end_point()
                    && e.geometry() != edge.geometry()
                    && !Self::is_reverse_of(edge, e)
            })
            .cloned()
            .collect()
    }

    fn incoming_transferable(&self, edge: &RoadEdge) -> Vec<Arc<RoadEdge>> {
        self.edges
            .iter()
            .filter(|e| {
                e.end_point() == edge.start_point()
                    && e.geometry() != edge.geometry()
                    && !Self::is_reverse_of(edge, e)
            })
            .cloned()
            .collect()
    }

    fn edge_has_reverse(&self, geometry: &LineString<f64>) -> bool {
        let rev = crate::geom::reversed(geometry);
        self.edges.iter().any(|e| *e.geometry() == rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    fn net() -> SimpleRoadNetwork {
        // Three chained east-west edges plus the reverse of the middle one.
        let mk = |id, line: LineString<f64>| Arc::new(RoadEdge::new(id, line, false));
        SimpleRoadNetwork::new(vec![
            mk(0, line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]),
            mk(1, line_string![(x: 100.0, y: 0.0), (x: 200.0, y: 0.0)]),
            mk(2, line_string![(x: 200.0, y: 0.0), (x: 300.0, y: 0.0)]),
            mk(3, line_string![(x: 200.0, y: 0.0), (x: 100.0, y: 0.0)]),
        ])
    }

    #[test]
    fn test_nearby_edges() {
        let net = net();
        let near = net.nearby_edges(Coord { x: 50.0, y: 5.0 }, 10.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id(), 0);

        let none = net.nearby_edges(Coord { x: 50.0, y: 50.0 }, 10.0);
        assert!(none.is_empty());
    }

    #[test]
    fn test_outgoing_excludes_reverse() {
        let net = net();
        let edge = net.edges()[1].clone();
        let out: Vec<u64> = net
            .outgoing_transferable(&edge)
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_incoming() {
        let net = net();
        let edge = net.edges()[1].clone();
        let inc: Vec<u64> = net
            .incoming_transferable(&edge)
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(inc, vec![0]);
    }

    #[test]
    fn test_edge_has_reverse() {
        let net = net();
        assert!(net.edge_has_reverse(net.edges()[1].geometry()));
        assert!(!net.edge_has_reverse(net.edges()[0].geometry()));
    }
}
