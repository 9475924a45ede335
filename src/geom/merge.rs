//! Colinear line merging and overlap extraction
//!
//! Path merging needs to know which portion of two polylines covers the same
//! ground. Paths produced by path-state propagation overlap edge-by-edge with
//! exact coordinates, so the overlap of interest is a run of shared segments,
//! possibly traversed in opposite directions by the two paths.

use geo::{Coord, Line, LineString};

use super::polyline::{dedup_coords, num_segments, segment_at};

/// True when two segments cover the same coordinates, in either direction.
pub fn segments_match(a: &Line<f64>, b: &Line<f64>) -> bool {
    (a.start == b.start && a.end == b.end) || (a.start == b.end && a.end == b.start)
}

/// Sews a collection of polylines into maximal chains by joining shared
/// endpoints. Inputs that cannot be joined pass through unchanged.
///
/// Only endpoint-to-endpoint joins are considered; the result order follows
/// the order in which chains are first started.
pub fn merge_chains(lines: &[LineString<f64>]) -> Vec<LineString<f64>> {
    let mut pool: Vec<Vec<Coord<f64>>> = lines
        .iter()
        .filter(|l| l.0.len() >= 2)
        .map(|l| l.0.clone())
        .collect();
    let mut merged: Vec<Vec<Coord<f64>>> = Vec::new();

    while let Some(mut chain) = pool.pop() {
        let mut grew = true;
        while grew {
            grew = false;
            let mut idx = 0;
            while idx < pool.len() {
                let candidate = &pool[idx];
                let c_first = candidate[0];
                let c_last = *candidate.last().expect("non-empty chain");
                let first = chain[0];
                let last = *chain.last().expect("non-empty chain");

                if last == c_first {
                    let tail = pool.remove(idx);
                    chain.extend_from_slice(&tail[1..]);
                    grew = true;
                } else if last == c_last {
                    let mut tail = pool.remove(idx);
                    tail.reverse();
                    chain.extend_from_slice(&tail[1..]);
                    grew = true;
                } else if first == c_last {
                    let mut head = pool.remove(idx);
                    head.pop();
                    head.extend_from_slice(&chain);
                    chain = head;
                    grew = true;
                } else if first == c_first {
                    let mut head = pool.remove(idx);
                    head.reverse();
                    head.pop();
                    head.extend_from_slice(&chain);
                    chain = head;
                    grew = true;
                } else {
                    idx += 1;
                }
            }
        }
        merged.push(chain);
    }

    merged.reverse();
    merged
        .into_iter()
        .map(|c| LineString::new(dedup_coords(c)))
        .collect()
}

/// The last run of segments of `from` that `to` also covers (in either
/// direction), oriented as `from` traverses it.
///
/// Shared segments are gathered, sewn into maximal chains, and the chain
/// lying furthest along `from` is returned. `None` when the polylines share
/// no segment.
pub fn last_shared_run(from: &LineString<f64>, to: &LineString<f64>) -> Option<LineString<f64>> {
    let n_from = num_segments(from);
    let n_to = num_segments(to);

    let mut shared: Vec<LineString<f64>> = Vec::new();
    let mut last_shared_idx: Vec<usize> = Vec::new();
    for i in 0..n_from {
        let seg = segment_at(from, i);
        let covered = (0..n_to).any(|j| segments_match(&seg, &segment_at(to, j)));
        if covered {
            shared.push(LineString::new(vec![seg.start, seg.end]));
            last_shared_idx.push(i);
        }
    }

    if shared.is_empty() {
        return None;
    }

    let chains = merge_chains(&shared);

    // Pick the chain containing the furthest shared from-segment.
    let last_seg = segment_at(from, *last_shared_idx.last().expect("non-empty"));
    chains.into_iter().find(|chain| {
        (0..num_segments(chain)).any(|j| segments_match(&segment_at(chain, j), &last_seg))
    })
}

/// Locates `run` as a contiguous coordinate subsequence of `line`, forward
/// only. Returns the arc-length range it occupies.
pub fn indices_of(line: &LineString<f64>, run: &LineString<f64>) -> Option<(f64, f64)> {
    let coords = &line.0;
    let target = &run.0;
    if target.len() < 2 || coords.len() < target.len() {
        return None;
    }

    'outer: for start in 0..=(coords.len() - target.len()) {
        for (offset, want) in target.iter().enumerate() {
            if coords[start + offset] != *want {
                continue 'outer;
            }
        }
        let mut length_before = 0.0;
        for w in coords[..=start].windows(2) {
            length_before += super::polyline::coord_distance(w[0], w[1]);
        }
        let mut run_length = 0.0;
        for w in target.windows(2) {
            run_length += super::polyline::coord_distance(w[0], w[1]);
        }
        return Some((length_before, length_before + run_length));
    }

    None
}
