//! Belief tracking over hidden hands.
//!
//! - `dist`: the exact hand-distribution engine with lazy partner snapshots.
//! - `cdf`: sampling forms and the public-to-private reweighting.
//! - `factorized`: the cheap per-slot "V0" count tables.

pub mod cdf;
pub mod dist;
pub mod factorized;

pub use cdf::{
    pdf_to_cdf, populate_cdf, populate_pdf, reweight_private, sample_from_cdf, HandDistCdf,
};
pub use dist::{
    apply_delayed_observations, check_beliefs, clone_partner_bases, filter_consistent_with_action,
    filter_consistent_with_hint, populate_initial, update_from_my_draw, update_from_revealed_card,
    DistVal, HandDist, ObsThunk, ObservationFn,
};
pub use factorized::{FactorizedBeliefs, TwoBitArray};
