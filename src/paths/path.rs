//! Paths: directed concatenations of road segments
//!
//! A path's geometry runs in traversal order, so positive arc length along
//! the geometry always means forward travel. The *signed* arc-length
//! convention matches the total distance: states on a backward path carry
//! negative distances.

use std::sync::Arc;

use geo::LineString;

use crate::geom::{dedup_coords, total_length};
use crate::graph::RoadEdge;

use super::edge::PathEdge;
use super::EDGE_LENGTH_ERROR_TOLERANCE;

// ============================================================================
// RoadPath
// ============================================================================

/// A connected, directed sequence of path edges.
#[derive(Debug, Clone)]
pub struct RoadPath {
    edges: Vec<PathEdge>,
    geometry: LineString<f64>,
    is_backward: bool,
    total_distance: f64,
}

impl RoadPath {
    /// Assembles a path from its edges.
    ///
    /// # Panics
    /// Panics if `edges` is empty or the edges disagree on direction.
    pub fn new(edges: Vec<PathEdge>, is_backward: bool) -> Self {
        assert!(!edges.is_empty(), "a road path needs at least one edge");
        assert!(
            edges.iter().all(|e| e.is_backward() == is_backward),
            "all edges of a path share its direction"
        );

        let mut coords = Vec::with_capacity(edges.len() + 1);
        for pe in &edges {
            coords.push(pe.line().start);
            coords.push(pe.line().end);
        }
        let geometry = LineString::new(dedup_coords(coords));

        let length = total_length(&geometry);
        let total_distance = if is_backward { -length } else { length };

        Self {
            edges,
            geometry,
            is_backward,
            total_distance,
        }
    }

    /// Builds a path over whole graph edges, traversed in the given order.
    ///
    /// Backward paths traverse each edge's segments in reverse.
    pub fn from_graph_edges(edges: &[Arc<RoadEdge>], is_backward: bool) -> Self {
        let sign = if is_backward { -1.0 } else { 1.0 };
        let mut path_edges = Vec::new();
        let mut dist = 0.0;
        for edge in edges {
            if is_backward {
                for seg in edge.segments().iter().rev() {
                    path_edges.push(PathEdge::new(edge.clone(), *seg, sign * dist, is_backward));
                    dist += seg.length();
                }
            } else {
                for seg in edge.segments() {
                    path_edges.push(PathEdge::new(edge.clone(), *seg, sign * dist, is_backward));
                    dist += seg.length();
                }
            }
        }
        Self::new(path_edges, is_backward)
    }

    #[inline]
    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    #[inline]
    pub fn first_edge(&self) -> &PathEdge {
        self.edges.first().expect("non-empty path")
    }

    #[inline]
    pub fn last_edge(&self) -> &PathEdge {
        self.edges.last().expect("non-empty path")
    }

    /// The concatenated geometry, in traversal order.
    #[inline]
    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    #[inline]
    pub fn is_backward(&self) -> bool {
        self.is_backward
    }

    /// Signed total distance; negative for backward paths.
    #[inline]
    pub fn total_path_distance(&self) -> f64 {
        self.total_distance
    }

    /// Path-direction sign: `-1` for backward paths, `1` otherwise.
    #[inline]
    pub fn direction_sign(&self) -> f64 {
        if self.is_backward {
            -1.0
        } else {
            1.0
        }
    }

    /// Whether a signed arc-length lies on the path, within tolerance.
    pub fn is_on_path(&self, distance: f64) -> bool {
        let along = self.direction_sign() * distance;
        along >= -EDGE_LENGTH_ERROR_TOLERANCE
            && along <= self.total_distance.abs() + EDGE_LENGTH_ERROR_TOLERANCE
    }

    /// Clamps a signed arc-length onto the path, preserving the sign
    /// convention.
    pub fn clamp_to_path(&self, distance: f64) -> f64 {
        let along = (self.direction_sign() * distance).clamp(0.0, self.total_distance.abs());
        self.direction_sign() * along
    }

    /// The path edge a signed arc-length falls on.
    ///
    /// At an edge boundary the *entered* edge wins; distances beyond the end
    /// resolve to the last edge.
    pub fn edge_for_distance(&self, distance: f64) -> &PathEdge {
        let along = (self.direction_sign() * distance).max(0.0);
        for pe in &self.edges {
            let start = pe.dist_to_start().abs();
            if along < start + pe.length() {
                return pe;
            }
        }
        self.last_edge()
    }
}

// ============================================================================
// Path
// ============================================================================

/// A path, or the null path standing for free (off-road) motion.
#[derive(Debug, Clone)]
pub enum Path {
    /// Off-road: no path.
    Null,
    /// A concrete path over the road network.
    Road(RoadPath),
}

impl Path {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Path::Null)
    }

    /// The underlying road path, if any.
    pub fn as_road(&self) -> Option<&RoadPath> {
        match self {
            Path::Null => None,
            Path::Road(p) => Some(p),
        }
    }
}
