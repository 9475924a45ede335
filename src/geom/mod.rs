//! Geometry adapter: arc-length indexing and colinear merging over polylines

pub mod merge;
pub mod polyline;

pub use merge::*;
pub use polyline::*;
