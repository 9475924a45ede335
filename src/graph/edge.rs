//! Graph edges and their segments
//!
//! Edge identity is the geometry: two edges are the same edge exactly when
//! their polylines have identical coordinates. A one-way pair therefore
//! yields two distinct edges with reversed geometries, and `has_reverse`
//! records whether the opposite direction exists in the graph.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use geo::{Coord, Line, LineString};

use crate::geom::{num_segments, reversed, segment_at, segment_length, total_length};

// ============================================================================
// Segment
// ============================================================================

/// One straight segment of an edge's polyline, with its arc-length offset
/// from the start of the edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// The segment geometry, in the edge's native direction.
    pub line: Line<f64>,
    /// Arc length from the edge start to this segment's start.
    pub offset_on_edge: f64,
}

impl Segment {
    /// Length of this segment.
    #[inline]
    pub fn length(&self) -> f64 {
        segment_length(&self.line)
    }

    /// Unit direction vector of this segment.
    pub fn direction(&self) -> Coord<f64> {
        let len = self.length();
        Coord {
            x: (self.line.end.x - self.line.start.x) / len,
            y: (self.line.end.y - self.line.start.y) / len,
        }
    }
}

// ============================================================================
// RoadEdge
// ============================================================================

/// A directed edge of the road network.
#[derive(Debug, Clone)]
pub struct RoadEdge {
    id: u64,
    geometry: LineString<f64>,
    start: Coord<f64>,
    end: Coord<f64>,
    has_reverse: bool,
    length: f64,
    segments: Vec<Segment>,
}

impl RoadEdge {
    /// Builds an edge from its polyline geometry.
    ///
    /// # Panics
    /// Panics if the geometry has fewer than two points or zero length.
    pub fn new(id: u64, geometry: LineString<f64>, has_reverse: bool) -> Self {
        assert!(geometry.0.len() >= 2, "edge geometry needs two points");
        let length = total_length(&geometry);
        assert!(length > 0.0, "edge geometry must have positive length");

        let mut segments = Vec::with_capacity(num_segments(&geometry));
        let mut offset = 0.0;
        for idx in 0..num_segments(&geometry) {
            let line = segment_at(&geometry, idx);
            segments.push(Segment {
                line,
                offset_on_edge: offset,
            });
            offset += segment_length(&line);
        }

        let start = geometry.0[0];
        let end = *geometry.0.last().expect("non-empty geometry");

        Self {
            id,
            geometry,
            start,
            end,
            has_reverse,
            length,
            segments,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    #[inline]
    pub fn start_point(&self) -> Coord<f64> {
        self.start
    }

    #[inline]
    pub fn end_point(&self) -> Coord<f64> {
        self.end
    }

    /// Whether the graph also contains this edge's reverse geometry.
    #[inline]
    pub fn has_reverse(&self) -> bool {
        self.has_reverse
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The constituent segments, in order, with edge-start offsets.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// This edge's geometry reversed.
    pub fn reversed_geometry(&self) -> LineString<f64> {
        reversed(&self.geometry)
    }
}

// ============================================================================
// GraphEdge
// ============================================================================

/// An edge reference, or the null edge standing for free (off-road) motion.
#[derive(Debug, Clone)]
pub enum GraphEdge {
    /// Off-road: no edge.
    Null,
    /// A concrete edge of the network.
    Real(Arc<RoadEdge>),
}

impl GraphEdge {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, GraphEdge::Null)
    }

    /// The underlying edge, if any.
    pub fn as_real(&self) -> Option<&Arc<RoadEdge>> {
        match self {
            GraphEdge::Null => None,
            GraphEdge::Real(edge) => Some(edge),
        }
    }

    /// Edge length; the null edge has none.
    pub fn length(&self) -> Option<f64> {
        self.as_real().map(|e| e.length())
    }
}

fn coords_cmp(a: &LineString<f64>, b: &LineString<f64>) -> Ordering {
    for (ca, cb) in a.0.iter().zip(b.0.iter()) {
        match ca.x.partial_cmp(&cb.x).unwrap_or(Ordering::Equal) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match ca.y.partial_cmp(&cb.y).unwrap_or(Ordering::Equal) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    a.0.len().cmp(&b.0.len())
}

impl PartialEq for GraphEdge {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GraphEdge::Null, GraphEdge::Null) => true,
            (GraphEdge::Real(a), GraphEdge::Real(b)) => a.geometry() == b.geometry(),
            _ => false,
        }
    }
}

impl Eq for GraphEdge {}

impl PartialOrd for GraphEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GraphEdge::Null, GraphEdge::Null) => Ordering::Equal,
            (GraphEdge::Null, GraphEdge::Real(_)) => Ordering::Less,
            (GraphEdge::Real(_), GraphEdge::Null) => Ordering::Greater,
            (GraphEdge::Real(a), GraphEdge::Real(b)) => coords_cmp(a.geometry(), b.geometry()),
        }
    }
}

impl Hash for GraphEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            GraphEdge::Null => 0u8.hash(state),
            GraphEdge::Real(edge) => {
                1u8.hash(state);
                for c in &edge.geometry().0 {
                    c.x.to_bits().hash(state);
                    c.y.to_bits().hash(state);
                }
            }
        }
    }
}
