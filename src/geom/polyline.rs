//! Arc-length indexing on polylines
//!
//! Maps between distances along a polyline and concrete `(segment, fraction)`
//! locations, snaps points orthogonally onto the nearest segment, and
//! extracts sublines. All operations are exact coordinate arithmetic over
//! `geo` primitives; no projections or datums are involved here.

use geo::{Coord, Line, LineString};

/// A position on a polyline: the index of the segment it falls on and the
/// fraction `[0, 1]` along that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineLocation {
    /// Segment index into the polyline (0-based).
    pub segment: usize,
    /// Fractional position along that segment.
    pub fraction: f64,
}

impl PolylineLocation {
    /// The location at the very start of the polyline.
    pub fn start() -> Self {
        Self {
            segment: 0,
            fraction: 0.0,
        }
    }
}

/// Euclidean distance between two coordinates.
#[inline]
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Length of a single segment.
#[inline]
pub fn segment_length(line: &Line<f64>) -> f64 {
    coord_distance(line.start, line.end)
}

/// Number of segments in a polyline.
#[inline]
pub fn num_segments(line: &LineString<f64>) -> usize {
    line.0.len().saturating_sub(1)
}

/// The `idx`-th segment of a polyline.
///
/// # Panics
/// Panics if `idx` is out of range.
pub fn segment_at(line: &LineString<f64>, idx: usize) -> Line<f64> {
    Line::new(line.0[idx], line.0[idx + 1])
}

/// Total arc length of a polyline.
pub fn total_length(line: &LineString<f64>) -> f64 {
    line.0.windows(2).map(|w| coord_distance(w[0], w[1])).sum()
}

/// Clamps a distance to the valid arc-length range `[0, length]`.
pub fn clamp_length(line: &LineString<f64>, distance: f64) -> f64 {
    distance.clamp(0.0, total_length(line))
}

/// Maps a distance along the polyline to a location.
///
/// The distance is clamped to `[0, length]`. When it lands exactly on a
/// vertex and a further segment follows, the location is reported at the
/// *start* of the following segment, so that downstream segment lookups see
/// the edge being entered rather than the edge being left.
pub fn locate(line: &LineString<f64>, distance: f64) -> PolylineLocation {
    let n = num_segments(line);
    debug_assert!(n > 0);

    let mut remaining = distance.max(0.0);
    for idx in 0..n {
        let seg_len = segment_length(&segment_at(line, idx));
        if remaining < seg_len {
            return PolylineLocation {
                segment: idx,
                fraction: if seg_len > 0.0 { remaining / seg_len } else { 0.0 },
            };
        }
        if remaining == seg_len && idx + 1 < n {
            return PolylineLocation {
                segment: idx + 1,
                fraction: 0.0,
            };
        }
        remaining -= seg_len;
    }

    PolylineLocation {
        segment: n - 1,
        fraction: 1.0,
    }
}

/// Maps a location back to its distance along the polyline.
pub fn location_to_length(line: &LineString<f64>, loc: &PolylineLocation) -> f64 {
    let mut length = 0.0;
    for idx in 0..loc.segment {
        length += segment_length(&segment_at(line, idx));
    }
    length + loc.fraction * segment_length(&segment_at(line, loc.segment))
}

/// The coordinate at a location.
pub fn point_at(line: &LineString<f64>, loc: &PolylineLocation) -> Coord<f64> {
    let seg = segment_at(line, loc.segment);
    Coord {
        x: seg.start.x + loc.fraction * (seg.end.x - seg.start.x),
        y: seg.start.y + loc.fraction * (seg.end.y - seg.start.y),
    }
}

/// Orthogonal projection of a point onto one segment.
///
/// Returns the clamped fraction along the segment and the projected point.
pub fn project_to_segment(seg: &Line<f64>, p: Coord<f64>) -> (f64, Coord<f64>) {
    let dx = seg.end.x - seg.start.x;
    let dy = seg.end.y - seg.start.y;
    let len_sq = dx * dx + dy * dy;

    let fraction = if len_sq > 0.0 {
        (((p.x - seg.start.x) * dx + (p.y - seg.start.y) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let projected = Coord {
        x: seg.start.x + fraction * dx,
        y: seg.start.y + fraction * dy,
    };
    (fraction, projected)
}

/// Snaps a point to the nearest segment of the polyline.
///
/// Ties between equally distant segments resolve to the earliest one.
pub fn snap(line: &LineString<f64>, p: Coord<f64>) -> (PolylineLocation, Coord<f64>) {
    let n = num_segments(line);
    debug_assert!(n > 0);

    let mut best = (
        PolylineLocation::start(),
        point_at(line, &PolylineLocation::start()),
    );
    let mut best_dist = f64::INFINITY;

    for idx in 0..n {
        let seg = segment_at(line, idx);
        let (fraction, projected) = project_to_segment(&seg, p);
        let dist = coord_distance(projected, p);
        if dist < best_dist {
            best_dist = dist;
            best = (PolylineLocation { segment: idx, fraction }, projected);
        }
    }

    best
}

/// Extracts the subline between two arc-length positions.
///
/// When `from > to` the extraction runs backwards and the result is the
/// reversed subline. Degenerate ranges produce a two-point zero-length line
/// at the position.
pub fn extract(line: &LineString<f64>, from: f64, to: f64) -> LineString<f64> {
    if from > to {
        return reversed(&extract(line, to, from));
    }

    let start = locate(line, from);
    let end = locate(line, to);

    let mut coords = vec![point_at(line, &start)];
    // Interior vertices strictly between the two locations.
    for idx in (start.segment + 1)..=end.segment {
        let vertex = line.0[idx];
        if coords.last() != Some(&vertex) {
            coords.push(vertex);
        }
    }
    let end_point = point_at(line, &end);
    if coords.last() != Some(&end_point) {
        coords.push(end_point);
    }
    if coords.len() < 2 {
        coords.push(end_point);
    }

    LineString::new(coords)
}

/// The polyline with its coordinate order reversed.
pub fn reversed(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.reverse();
    LineString::new(coords)
}

/// Removes consecutive duplicate coordinates.
pub fn dedup_coords(coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    fn l_shape() -> LineString<f64> {
        // 10 east then 10 north
        line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0)
        ]
    }

    #[test]
    fn test_total_length() {
        assert!((total_length(&l_shape()) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_locate_interior() {
        let loc = locate(&l_shape(), 5.0);
        assert_eq!(loc.segment, 0);
        assert!((loc.fraction - 0.5).abs() < 1e-12);

        let loc = locate(&l_shape(), 15.0);
        assert_eq!(loc.segment, 1);
        assert!((loc.fraction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_locate_vertex_prefers_next_segment() {
        let loc = locate(&l_shape(), 10.0);
        assert_eq!(loc.segment, 1);
        assert_eq!(loc.fraction, 0.0);
    }

    #[test]
    fn test_locate_clamps() {
        let loc = locate(&l_shape(), -3.0);
        assert_eq!(loc.segment, 0);
        assert_eq!(loc.fraction, 0.0);

        let loc = locate(&l_shape(), 50.0);
        assert_eq!(loc.segment, 1);
        assert_eq!(loc.fraction, 1.0);
    }

    #[test]
    fn test_length_location_roundtrip() {
        let line = l_shape();
        for d in [0.0, 2.5, 10.0, 13.0, 20.0] {
            let loc = locate(&line, d);
            assert!((location_to_length(&line, &loc) - d).abs() < 1e-12);
        }
    }

    #[test]
    fn test_snap_orthogonal() {
        let (loc, pt) = snap(&l_shape(), Coord { x: 4.0, y: 3.0 });
        assert_eq!(loc.segment, 0);
        assert!((pt.x - 4.0).abs() < 1e-12);
        assert!(pt.y.abs() < 1e-12);

        let (loc, pt) = snap(&l_shape(), Coord { x: 12.0, y: 7.0 });
        assert_eq!(loc.segment, 1);
        assert!((pt.x - 10.0).abs() < 1e-12);
        assert!((pt.y - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_snap_beyond_endpoint_clamps() {
        let (loc, pt) = snap(&l_shape(), Coord { x: -5.0, y: -5.0 });
        assert_eq!(loc.segment, 0);
        assert_eq!(loc.fraction, 0.0);
        assert_eq!(pt, Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_extract_across_vertex() {
        let sub = extract(&l_shape(), 5.0, 15.0);
        assert_eq!(sub.0.len(), 3);
        assert_eq!(sub.0[0], Coord { x: 5.0, y: 0.0 });
        assert_eq!(sub.0[1], Coord { x: 10.0, y: 0.0 });
        assert_eq!(sub.0[2], Coord { x: 10.0, y: 5.0 });
        assert!((total_length(&sub) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_extract_reversed_range() {
        let sub = extract(&l_shape(), 15.0, 5.0);
        assert_eq!(sub.0[0], Coord { x: 10.0, y: 5.0 });
        assert_eq!(sub.0[2], Coord { x: 5.0, y: 0.0 });
    }

    #[test]
    fn test_reversed() {
        let rev = reversed(&l_shape());
        assert_eq!(rev.0[0], Coord { x: 10.0, y: 10.0 });
        assert_eq!(rev.0[2], Coord { x: 0.0, y: 0.0 });
        assert!((total_length(&rev) - 20.0).abs() < 1e-12);
    }
}
