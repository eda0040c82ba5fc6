use std::fmt::Display;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::system::Mass;

/// A symmetric relative mass tolerance in parts per million. All peak
/// searches in this crate are ppm searches against a theoretical mass, so
/// this carries the single number and the two operations they need: the mass
/// window to scan and the acceptance check.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PpmTolerance(OrderedFloat<f64>);

impl PpmTolerance {
    /// Create a new tolerance, the sign of the value is ignored
    pub fn new(value: f64) -> Self {
        Self(value.abs().into())
    }

    /// The tolerance in ppm
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }

    /// The lowest mass still inside the window around the given mass
    pub fn minimum_value(self, mass: Mass) -> Mass {
        mass * (1.0 - self.0.into_inner() / 1e6)
    }

    /// The highest mass still inside the window around the given mass
    pub fn maximum_value(self, mass: Mass) -> Mass {
        mass * (1.0 + self.0.into_inner() / 1e6)
    }

    /// Whether the experimental mass lies within the tolerance of the
    /// theoretical one. The deviation is measured relative to the
    /// theoretical mass.
    pub fn within(self, experimental: Mass, theoretical: Mass) -> bool {
        theoretical.ppm(experimental).value * 1e6 <= self.0.into_inner()
    }
}

impl Display for PpmTolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "±{} ppm", self.0)
    }
}
