//! Path merging under orientation ambiguity
//!
//! Given the geometries of two consecutively evaluated paths and the
//! head-distances traveled on each, produce one polyline covering both,
//! together with a flag recording whether the to-geometry had to be reversed
//! to line up. The overlap between the paths anchors the merge; everything
//! on the wrong side of it is cut away before concatenation.

use geo::{Coord, LineString};

use crate::geom::{
    dedup_coords, extract, indices_of, last_shared_run, reversed, total_length,
};

/// Outcome of a path merge.
#[derive(Debug, Clone)]
pub struct PathMergeResult {
    /// The merged polyline.
    pub geometry: LineString<f64>,
    /// Whether `to` was reversed to align with `from`.
    pub to_is_reversed: bool,
}

fn is_degenerate(line: &LineString<f64>) -> bool {
    total_length(line) <= 0.0
}

fn line_from(coords: Vec<Coord<f64>>) -> LineString<f64> {
    LineString::new(dedup_coords(coords))
}

/// Merges two path geometries across their last colinear overlap.
///
/// `dist_from` / `dist_to` are the distances traveled along each geometry;
/// they decide which side of the overlap survives the cut. Returns `None`
/// when the geometries share no segment, or when the cut parts cannot be
/// joined at any endpoint.
pub fn merge_paths(
    from: &LineString<f64>,
    dist_from: f64,
    to: &LineString<f64>,
    dist_to: f64,
) -> Option<PathMergeResult> {
    let overlap = last_shared_run(from, to)?;

    // Orient the to-geometry so the overlap runs forward on it. When the
    // overlap is located on neither direction by exact subsequence search,
    // reverse unconditionally; shared segments guarantee the geometries do
    // relate, just not vertex-for-vertex.
    let mut to = to.clone();
    let mut dist_to = dist_to;
    let mut to_is_reversed = false;
    if indices_of(&to, &overlap).is_none() {
        to = reversed(&to);
        to_is_reversed = true;
        dist_to = total_length(&to) - dist_to;
    }

    let from_locs = indices_of(from, &overlap)?;
    let from_length = total_length(from);

    let from_part = if dist_from <= from_locs.1 {
        extract(from, 0.0, from_locs.1)
    } else {
        extract(from, from_locs.1, from_length)
    };

    // The to-geometry covers the from-geometry entirely.
    if is_degenerate(&from_part) {
        let mut coords = to.0.clone();
        if to_is_reversed {
            coords.reverse();
        }
        return Some(PathMergeResult {
            geometry: line_from(coords),
            to_is_reversed,
        });
    }

    let to_locs = indices_of(&to, &overlap)?;
    let to_length = total_length(&to);

    let to_part = if dist_to <= to_locs.0 {
        extract(&to, 0.0, to_locs.1)
    } else {
        extract(&to, to_locs.1, to_length)
    };

    if is_degenerate(&to_part) {
        return Some(PathMergeResult {
            geometry: line_from(from.0.clone()),
            to_is_reversed,
        });
    }

    let from_start = from_part.0[0];
    let from_end = *from_part.0.last().expect("non-empty part");
    let to_start = to_part.0[0];
    let to_end = *to_part.0.last().expect("non-empty part");

    let merged: Vec<Coord<f64>> = if from_end == to_start {
        from_part.0.iter().chain(to_part.0.iter()).copied().collect()
    } else if to_end == from_start {
        to_part.0.iter().chain(from_part.0.iter()).copied().collect()
    } else if from_start == to_start {
        if last_shared_run(&from_part, &to_part).is_none() {
            // Only the start point is shared: flip the to-part around it.
            to_is_reversed = !to_is_reversed;
            let flipped = reversed(&to_part);
            from_part.0.iter().chain(flipped.0.iter()).copied().collect()
        } else {
            // The parts overlap beyond the point: keep the longer.
            if total_length(&from_part) > total_length(&to_part) {
                from_part.0.clone()
            } else {
                to_part.0.clone()
            }
        }
    } else if from_end == to_end {
        to_is_reversed = !to_is_reversed;
        let flipped = reversed(&to_part);
        from_part.0.iter().chain(flipped.0.iter()).copied().collect()
    } else {
        return None;
    };

    Some(PathMergeResult {
        geometry: line_from(merged),
        to_is_reversed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_merge_head_to_tail() {
        let from = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 200.0, y: 0.0)];
        let to = line_string![(x: 100.0, y: 0.0), (x: 200.0, y: 0.0), (x: 300.0, y: 0.0)];

        let result = merge_paths(&from, 150.0, &to, 150.0).unwrap();
        assert!(!result.to_is_reversed);
        assert!((total_length(&result.geometry) - 300.0).abs() < 1e-9);
        assert_eq!(result.geometry.0[0], Coord { x: 0.0, y: 0.0 });
        assert_eq!(
            *result.geometry.0.last().unwrap(),
            Coord { x: 300.0, y: 0.0 }
        );
    }

    #[test]
    fn test_merge_opposite_orientation() {
        // A -> B against B -> A over the same stretch.
        let from = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)];
        let to = line_string![(x: 100.0, y: 0.0), (x: 0.0, y: 0.0)];

        let result = merge_paths(&from, 50.0, &to, 50.0).unwrap();
        assert!(result.to_is_reversed);
        assert!((total_length(&result.geometry) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_to_covers_from() {
        let from = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)];
        let to = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 200.0, y: 0.0)];

        let result = merge_paths(&from, 0.0, &to, 150.0).unwrap();
        assert!(!result.to_is_reversed);
        // The merge keeps the full to-extent beyond the shared stretch.
        assert!((total_length(&result.geometry) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_no_overlap() {
        let from = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)];
        let to = line_string![(x: 0.0, y: 50.0), (x: 100.0, y: 50.0)];
        assert!(merge_paths(&from, 10.0, &to, 10.0).is_none());
    }
}
