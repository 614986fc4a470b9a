//! Terminal objectives: scalar reductions of the final particle position.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Reduction of the terminal position to the scalar objective.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// Vertical component of the final position.
    #[default]
    Height,
    /// Negative squared distance from the final position to a target point.
    TargetDistance {
        /// Target point (m).
        target: Vector3<f64>,
    },
}

impl Objective {
    /// Evaluate the objective at the terminal position.
    #[must_use]
    pub fn evaluate(&self, position: &Vector3<f64>) -> f64 {
        match self {
            Self::Height => position.y,
            Self::TargetDistance { target } => -(position - target).norm_squared(),
        }
    }

    /// Gradient of the objective with respect to the terminal position.
    #[must_use]
    pub fn gradient(&self, position: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Height => Vector3::y(),
            Self::TargetDistance { target } => -2.0 * (position - target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_height() {
        let p = Vector3::new(3.0, 2.5, -1.0);
        assert_relative_eq!(Objective::Height.evaluate(&p), 2.5);
        assert_relative_eq!(Objective::Height.gradient(&p), Vector3::y());
    }

    #[test]
    fn test_target_distance() {
        let objective = Objective::TargetDistance {
            target: Vector3::new(1.0, 0.0, 0.0),
        };
        let p = Vector3::new(2.0, 1.0, 0.0);
        assert_relative_eq!(objective.evaluate(&p), -2.0);
        assert_relative_eq!(objective.gradient(&p), Vector3::new(-2.0, -2.0, 0.0));
    }
}
