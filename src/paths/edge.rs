//! Directed edges of a path
//!
//! A path edge binds one straight segment of a graph edge to its place on a
//! path: the signed distance from the path start to the segment start, and
//! whether the path runs the edge against its native direction. The segment
//! line is stored in *traversal* direction, so projection math never needs to
//! re-orient it.

use std::sync::Arc;

use geo::Line;

use crate::graph::{RoadEdge, Segment};

use super::EDGE_LENGTH_ERROR_TOLERANCE;

/// One segment of a path, in traversal order.
#[derive(Debug, Clone)]
pub struct PathEdge {
    edge: Arc<RoadEdge>,
    segment: Segment,
    line: Line<f64>,
    dist_to_start: f64,
    is_backward: bool,
}

impl PathEdge {
    /// Binds a segment of `edge` to a path position.
    ///
    /// `dist_to_start` is the signed distance from the path start to the
    /// start of this segment in traversal order; its sign matches the path
    /// direction (and is zero for the first edge).
    pub fn new(edge: Arc<RoadEdge>, segment: Segment, dist_to_start: f64, is_backward: bool) -> Self {
        debug_assert!(
            dist_to_start == 0.0 || (dist_to_start < 0.0) == is_backward,
            "dist_to_start sign must match path direction"
        );
        let line = if is_backward {
            Line::new(segment.line.end, segment.line.start)
        } else {
            segment.line
        };
        Self {
            edge,
            segment,
            line,
            dist_to_start,
            is_backward,
        }
    }

    /// The graph edge this path edge lies on.
    #[inline]
    pub fn graph_edge(&self) -> &Arc<RoadEdge> {
        &self.edge
    }

    /// The underlying segment in the edge's native direction.
    #[inline]
    pub fn native_segment(&self) -> &Segment {
        &self.segment
    }

    /// The segment line in traversal direction.
    #[inline]
    pub fn line(&self) -> &Line<f64> {
        &self.line
    }

    /// Signed distance from the path start to this segment's start.
    #[inline]
    pub fn dist_to_start(&self) -> f64 {
        self.dist_to_start
    }

    #[inline]
    pub fn is_backward(&self) -> bool {
        self.is_backward
    }

    /// Length of this path edge's segment.
    #[inline]
    pub fn length(&self) -> f64 {
        self.segment.length()
    }

    /// Whether a signed arc-length falls on this edge, within tolerance.
    pub fn is_on_edge(&self, distance: f64) -> bool {
        let start = self.dist_to_start.abs();
        let end = start + self.length();
        let d = distance.abs();
        d + EDGE_LENGTH_ERROR_TOLERANCE >= start && d - EDGE_LENGTH_ERROR_TOLERANCE <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, Coord};

    fn one_edge() -> Arc<RoadEdge> {
        Arc::new(RoadEdge::new(
            1,
            line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)],
            false,
        ))
    }

    #[test]
    fn test_forward_line_is_native() {
        let edge = one_edge();
        let seg = edge.segments()[0];
        let pe = PathEdge::new(edge.clone(), seg, 0.0, false);
        assert_eq!(pe.line().start, Coord { x: 0.0, y: 0.0 });
        assert_eq!(pe.line().end, Coord { x: 100.0, y: 0.0 });
    }

    #[test]
    fn test_backward_line_is_reversed() {
        let edge = one_edge();
        let seg = edge.segments()[0];
        let pe = PathEdge::new(edge.clone(), seg, 0.0, true);
        assert_eq!(pe.line().start, Coord { x: 100.0, y: 0.0 });
        assert_eq!(pe.line().end, Coord { x: 0.0, y: 0.0 });
        assert_eq!(pe.native_segment().line.start, Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_is_on_edge_tolerance() {
        let edge = one_edge();
        let seg = edge.segments()[0];
        let pe = PathEdge::new(edge, seg, 0.0, false);
        assert!(pe.is_on_edge(50.0));
        assert!(pe.is_on_edge(100.5));
        assert!(!pe.is_on_edge(102.0));
    }
}
