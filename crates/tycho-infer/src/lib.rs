//! Inference-time type algorithms for Tycho.
//!
//! The crate hosts the common-supertype (join) engine used at control-flow
//! merge points: branches of a conditional, collection literal elements,
//! lambda return points, and generic-argument inference all feed their
//! observed types through [`common_super_type`].

mod cst;

pub use cst::common_super_type;

use serde::{Deserialize, Serialize};

/// Tunables for the join engine. Deserializable so a driver can thread them
/// through from project configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOptions {
    /// Keep an invariant type-argument position invariant when the joined
    /// argument is equal to every operand's argument; off, the position is
    /// always promoted to an `out` projection when the arguments differ
    /// syntactically (compatibility behavior for older front ends).
    #[serde(default = "default_improved_variance")]
    pub improved_variance_in_cst: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        InferenceOptions {
            improved_variance_in_cst: true,
        }
    }
}

fn default_improved_variance() -> bool {
    true
}
