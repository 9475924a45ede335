//! On/off-edge transition distribution
//!
//! At each step a particle either stays in its motion regime or crosses
//! between free and edge-bound motion. The candidate set depends on where the
//! particle is and how uncertain it is: off-road particles see every edge
//! within a covariance-inflated radius, on-road particles see the edges their
//! predicted arc-length can reach through the graph.

use std::collections::BTreeSet;

use geo::Coord;
use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::graph::{GraphEdge, RoadNetwork};
use crate::types::svd::SvdCovariance;

/// Probability-vector entries closer to certainty than this collapse to a
/// deterministic outcome when sampling.
pub const ZERO_TOLERANCE: f64 = 1e-6;

/// The ~95% normal quantile used to inflate the observation covariance into
/// a search radius.
const DOMAIN_RADIUS_QUANTILE: f64 = 1.98;

// ============================================================================
// Transition types
// ============================================================================

/// The four regime transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    OffToOff,
    OffToOn,
    OnToOn,
    OnToOff,
}

impl TransitionType {
    /// Classifies a pair of edges.
    pub fn of(from: &GraphEdge, to: &GraphEdge) -> Self {
        match (from.is_null(), to.is_null()) {
            (true, true) => TransitionType::OffToOff,
            (true, false) => TransitionType::OffToOn,
            (false, false) => TransitionType::OnToOn,
            (false, true) => TransitionType::OnToOff,
        }
    }

    /// Index into the matching 2-vector of transition probabilities:
    /// staying in the regime is index 0, crossing out is index 1.
    pub fn index(&self) -> usize {
        match self {
            TransitionType::OffToOff | TransitionType::OnToOn => 0,
            TransitionType::OffToOn | TransitionType::OnToOff => 1,
        }
    }

    /// Whether this transition starts in free motion.
    pub fn starts_off_road(&self) -> bool {
        matches!(self, TransitionType::OffToOff | TransitionType::OffToOn)
    }
}

// ============================================================================
// Dirichlet prior
// ============================================================================

/// A two-outcome Dirichlet, the conjugate prior of the transition vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Dirichlet {
    alpha: [f64; 2],
}

impl Dirichlet {
    /// Creates the prior from concentration parameters (both positive).
    pub fn new(alpha: [f64; 2]) -> Self {
        assert!(alpha.iter().all(|a| *a > 0.0));
        Self { alpha }
    }

    #[inline]
    pub fn concentrations(&self) -> [f64; 2] {
        self.alpha
    }

    /// The mean probability vector.
    pub fn mean(&self) -> [f64; 2] {
        let total = self.alpha[0] + self.alpha[1];
        [self.alpha[0] / total, self.alpha[1] / total]
    }

    /// Conjugate update: increment the concentration of the observed outcome.
    pub fn observe(&mut self, index: usize) {
        self.alpha[index] += 1.0;
    }

    /// Draws a probability vector via normalized gamma draws.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 2] {
        let g0 = Gamma::new(self.alpha[0], 1.0).expect("positive concentration");
        let g1 = Gamma::new(self.alpha[1], 1.0).expect("positive concentration");
        let a = g0.sample(rng);
        let b = g1.sample(rng);
        let total = a + b;
        if total > 0.0 {
            [a / total, b / total]
        } else {
            self.mean()
        }
    }
}

/// Samples an outcome index from a two-outcome probability vector, collapsing
/// to a deterministic outcome when the vector has concentrated on one entry
/// (or degenerated to NaN). The collapse path never touches the RNG.
pub fn checked_sample_index<R: Rng + ?Sized>(probs: [f64; 2], rng: &mut R) -> usize {
    for (i, p) in probs.iter().enumerate() {
        if p.is_nan() || (1.0 - p).abs() <= ZERO_TOLERANCE {
            return i;
        }
    }
    let u: f64 = rng.gen();
    if u < probs[0] {
        0
    } else {
        1
    }
}

// ============================================================================
// Transition context
// ============================================================================

/// The state a transition decision depends on.
pub struct TransitionContext<'a> {
    /// The edge the particle currently occupies.
    pub current_edge: GraphEdge,
    /// Mean planar location of the particle.
    pub mean_location: Coord<f64>,
    /// Current observation-covariance value.
    pub observation_covariance: &'a SvdCovariance<2>,
    /// Predicted arc-length, interpreted as distance to travel from the
    /// current edge (meaningful on-road only).
    pub distance_to_travel: f64,
}

// ============================================================================
// OnOffEdgeTransition
// ============================================================================

/// Categorical transition model between free and edge-bound motion, with
/// Dirichlet priors over both transition vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct OnOffEdgeTransition {
    free_motion_probs: [f64; 2],
    edge_motion_probs: [f64; 2],
    free_motion_prior: Dirichlet,
    edge_motion_prior: Dirichlet,
}

impl OnOffEdgeTransition {
    /// Builds the model from prior concentrations; the transition vectors
    /// start at the prior means.
    pub fn new(free_motion_alpha: [f64; 2], edge_motion_alpha: [f64; 2]) -> Self {
        let free_motion_prior = Dirichlet::new(free_motion_alpha);
        let edge_motion_prior = Dirichlet::new(edge_motion_alpha);
        Self {
            free_motion_probs: free_motion_prior.mean(),
            edge_motion_probs: edge_motion_prior.mean(),
            free_motion_prior,
            edge_motion_prior,
        }
    }

    /// `[P(off→off), P(off→on)]`.
    #[inline]
    pub fn free_motion_probs(&self) -> [f64; 2] {
        self.free_motion_probs
    }

    /// `[P(on→on), P(on→off)]`.
    #[inline]
    pub fn edge_motion_probs(&self) -> [f64; 2] {
        self.edge_motion_probs
    }

    pub fn free_motion_prior(&self) -> &Dirichlet {
        &self.free_motion_prior
    }

    pub fn edge_motion_prior(&self) -> &Dirichlet {
        &self.edge_motion_prior
    }

    /// The search radius implied by an observation covariance.
    pub fn large_normal_cov_radius(observation_covariance: &SvdCovariance<2>) -> f64 {
        DOMAIN_RADIUS_QUANTILE * observation_covariance.norm_frobenius().sqrt()
    }

    /// The candidate edges for the next step, always including the null
    /// edge for the off-road outcome.
    pub fn domain<G: RoadNetwork>(&self, graph: &G, ctx: &TransitionContext<'_>) -> Vec<GraphEdge> {
        let mut domain: BTreeSet<GraphEdge> = BTreeSet::new();

        match ctx.current_edge.as_real() {
            None => {
                let radius = Self::large_normal_cov_radius(ctx.observation_covariance);
                for edge in graph.nearby_edges(ctx.mean_location, radius) {
                    domain.insert(GraphEdge::Real(edge));
                }
                domain.insert(GraphEdge::Null);
            }
            Some(edge) => {
                let mut reached = BTreeSet::new();
                Self::edges_for_length(graph, edge.clone(), ctx.distance_to_travel, &mut reached);
                domain.extend(reached);
                domain.insert(GraphEdge::Null);
            }
        }

        domain.into_iter().collect()
    }

    /// Collects the edges on which travel of `length_to_travel` meters from
    /// the start of `edge` can terminate: forward through outgoing transfers,
    /// backward through incoming ones.
    fn edges_for_length<G: RoadNetwork>(
        graph: &G,
        edge: std::sync::Arc<crate::graph::RoadEdge>,
        length_to_travel: f64,
        out: &mut BTreeSet<GraphEdge>,
    ) {
        if length_to_travel.abs() <= edge.length() {
            out.insert(GraphEdge::Real(edge));
        } else if length_to_travel > 0.0 {
            let remaining = length_to_travel - edge.length();
            for next in graph.outgoing_transferable(&edge) {
                Self::edges_for_length(graph, next, remaining, out);
            }
        } else {
            let remaining = length_to_travel + edge.length();
            for prev in graph.incoming_transferable(&edge) {
                Self::edges_for_length(graph, prev, remaining, out);
            }
        }
    }

    /// Samples the next edge.
    pub fn sample<G: RoadNetwork, R: Rng + ?Sized>(
        &self,
        graph: &G,
        ctx: &TransitionContext<'_>,
        rng: &mut R,
    ) -> GraphEdge {
        let mut domain = self.domain(graph, ctx);

        if ctx.current_edge.is_null() {
            // Free motion: decide whether to board an edge at all.
            if domain.is_empty() {
                return GraphEdge::Null;
            }
            let outcome = checked_sample_index(self.free_motion_probs, rng);
            if outcome == TransitionType::OffToOn.index() {
                domain.retain(|e| !e.is_null());
                if !domain.is_empty() {
                    return domain[rng.gen_range(0..domain.len())].clone();
                }
            }
            GraphEdge::Null
        } else {
            // Edge motion: going off-road is only possible when the null
            // edge is in the support.
            let outcome = if domain.iter().any(GraphEdge::is_null) {
                checked_sample_index(self.edge_motion_probs, rng)
            } else {
                TransitionType::OnToOn.index()
            };

            domain.retain(|e| !e.is_null());
            if outcome == TransitionType::OnToOff.index() || domain.is_empty() {
                GraphEdge::Null
            } else {
                domain[rng.gen_range(0..domain.len())].clone()
            }
        }
    }

    /// The modal outcome: the argmax transition resolved to a concrete edge.
    pub fn mean<G: RoadNetwork>(&self, graph: &G, ctx: &TransitionContext<'_>) -> GraphEdge {
        let domain = self.domain(graph, ctx);
        let first_real = || {
            domain
                .iter()
                .find(|e| !e.is_null())
                .cloned()
                .unwrap_or(GraphEdge::Null)
        };

        if ctx.current_edge.is_null() {
            if self.free_motion_probs[0] > self.free_motion_probs[1] {
                GraphEdge::Null
            } else {
                first_real()
            }
        } else if self.edge_motion_probs[0] > self.edge_motion_probs[1] {
            domain
                .iter()
                .find(|e| !e.is_null())
                .cloned()
                .unwrap_or_else(|| ctx.current_edge.clone())
        } else {
            GraphEdge::Null
        }
    }

    /// Conjugate update of the relevant Dirichlet from an observed
    /// transition; the transition vectors refresh to the posterior means.
    pub fn observe_transition(&mut self, from: &GraphEdge, to: &GraphEdge) {
        let transition = TransitionType::of(from, to);
        if transition.starts_off_road() {
            self.free_motion_prior.observe(transition.index());
            self.free_motion_probs = self.free_motion_prior.mean();
        } else {
            self.edge_motion_prior.observe(transition.index());
            self.edge_motion_probs = self.edge_motion_prior.mean();
        }
    }
}
