//! GPS observations
//!
//! Observations arrive already projected into planar meters; the tracker
//! never touches datums. The back-reference to the previous observation is
//! weak: it seeds the initial velocity estimate and then dies with the
//! producer's buffer, so long observation chains never pin memory.

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use geo::Coord;

use crate::types::spaces::ObsVector;

/// One GPS fix from a source.
#[derive(Debug, Clone)]
pub struct GpsObservation {
    source_id: String,
    timestamp: f64,
    coords_lat_lon: Coord<f64>,
    projected: ObsVector,
    velocity: Option<f64>,
    heading: Option<f64>,
    accuracy: Option<f64>,
    record_number: u64,
    previous: Option<Weak<GpsObservation>>,
}

impl GpsObservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: impl Into<String>,
        timestamp: f64,
        coords_lat_lon: Coord<f64>,
        projected: ObsVector,
        velocity: Option<f64>,
        heading: Option<f64>,
        accuracy: Option<f64>,
        record_number: u64,
        previous: Option<&Arc<GpsObservation>>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            timestamp,
            coords_lat_lon,
            projected,
            velocity,
            heading,
            accuracy,
            record_number,
            previous: previous.map(Arc::downgrade),
        }
    }

    /// Shorthand for test and demo fixes: projected coordinates only.
    pub fn projected_only(
        source_id: impl Into<String>,
        timestamp: f64,
        projected: ObsVector,
        record_number: u64,
        previous: Option<&Arc<GpsObservation>>,
    ) -> Self {
        let coords = Coord {
            x: projected.index(0),
            y: projected.index(1),
        };
        Self::new(
            source_id, timestamp, coords, projected, None, None, None, record_number, previous,
        )
    }

    #[inline]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Timestamp in seconds.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[inline]
    pub fn coords_lat_lon(&self) -> Coord<f64> {
        self.coords_lat_lon
    }

    /// The projected planar position, meters.
    #[inline]
    pub fn projected_point(&self) -> &ObsVector {
        &self.projected
    }

    #[inline]
    pub fn velocity(&self) -> Option<f64> {
        self.velocity
    }

    #[inline]
    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    #[inline]
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    #[inline]
    pub fn record_number(&self) -> u64 {
        self.record_number
    }

    /// The previous observation from the same source, if it is still alive.
    pub fn previous_observation(&self) -> Option<Arc<GpsObservation>> {
        self.previous.as_ref().and_then(Weak::upgrade)
    }
}

impl PartialEq for GpsObservation {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.source_id == other.source_id
    }
}

impl Eq for GpsObservation {}

impl PartialOrd for GpsObservation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GpsObservation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then_with(|| self.source_id.cmp(&other.source_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_timestamp_then_source() {
        let a = GpsObservation::projected_only("a", 1.0, ObsVector::zeros(), 0, None);
        let b = GpsObservation::projected_only("b", 1.0, ObsVector::zeros(), 0, None);
        let c = GpsObservation::projected_only("a", 2.0, ObsVector::zeros(), 1, None);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(
            a,
            GpsObservation::projected_only("a", 1.0, ObsVector::from_array([9.0, 9.0]), 7, None)
        );
    }

    #[test]
    fn test_previous_reference_is_weak() {
        let first = Arc::new(GpsObservation::projected_only(
            "a",
            1.0,
            ObsVector::zeros(),
            0,
            None,
        ));
        let second =
            GpsObservation::projected_only("a", 2.0, ObsVector::zeros(), 1, Some(&first));

        assert!(second.previous_observation().is_some());
        drop(first);
        assert!(second.previous_observation().is_none());
    }
}
