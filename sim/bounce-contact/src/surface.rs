//! Contact surfaces baked from the model geometry.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use bounce_types::Model;

/// Maximum number of surfaces a model can carry (ground + wall).
pub const MAX_SURFACES: usize = 2;

/// What a surface represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// Horizontal ground plane.
    Ground,
    /// Vertical wall plane.
    Wall,
}

/// A half-space boundary `n · x >= offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// What this surface is.
    pub kind: SurfaceKind,
    /// Outward unit normal.
    pub normal: Vector3<f64>,
    /// Plane offset along the normal.
    pub offset: f64,
}

impl Surface {
    /// Ground plane at height `y`.
    #[must_use]
    pub fn ground(y: f64) -> Self {
        Self {
            kind: SurfaceKind::Ground,
            normal: Vector3::y(),
            offset: y,
        }
    }

    /// Wall plane through `x` with the given outward normal.
    #[must_use]
    pub fn wall(x: f64, normal: Vector3<f64>) -> Self {
        Self {
            kind: SurfaceKind::Wall,
            normal,
            offset: normal.x * x,
        }
    }

    /// Signed distance of a point from the plane (positive outside).
    #[must_use]
    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(point) - self.offset
    }

    /// Penetration depth of a sphere of `radius` centred at `point`.
    ///
    /// Positive when overlapping, zero or negative otherwise.
    #[must_use]
    pub fn penetration(&self, point: &Vector3<f64>, radius: f64) -> f64 {
        radius - self.signed_distance(point)
    }
}

/// The fixed set of surfaces of one model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceSet {
    surfaces: [Option<Surface>; MAX_SURFACES],
}

impl SurfaceSet {
    /// Surfaces present in the model: ground first, then the wall.
    #[must_use]
    pub fn from_model(model: &Model) -> Self {
        Self {
            surfaces: [
                model.ground.map(Surface::ground),
                model.wall.map(|w| Surface::wall(w.x, w.normal)),
            ],
        }
    }

    /// Iterate over present surfaces with their slot index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Surface)> {
        self.surfaces
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// Surface in slot `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Surface> {
        self.surfaces.get(index).and_then(Option::as_ref)
    }

    /// Number of present surfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.surfaces.iter().flatten().count()
    }

    /// Whether the model has no surfaces at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bounce_types::ModelBuilder;

    #[test]
    fn test_ground_penetration() {
        let ground = Surface::ground(0.0);
        assert_relative_eq!(ground.penetration(&Vector3::new(0.0, 0.05, 0.0), 0.1), 0.05);
        assert!(ground.penetration(&Vector3::new(0.0, 1.0, 0.0), 0.1) < 0.0);
    }

    #[test]
    fn test_wall_penetration_from_left() {
        let wall = Surface::wall(1.0, Vector3::new(-1.0, 0.0, 0.0));
        // Centre 0.05 m left of the wall with radius 0.1 overlaps by 0.05.
        assert_relative_eq!(wall.penetration(&Vector3::new(0.95, 0.0, 0.0), 0.1), 0.05);
        assert!(wall.penetration(&Vector3::new(0.0, 0.0, 0.0), 0.1) < 0.0);
    }

    #[test]
    fn test_surface_set_from_model() {
        let model = ModelBuilder::new()
            .add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros(), 1.0)
            .wall(2.0)
            .finalize()
            .unwrap();
        let set = SurfaceSet::from_model(&model);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().kind, SurfaceKind::Ground);
        assert_eq!(set.get(1).unwrap().kind, SurfaceKind::Wall);

        let bare = ModelBuilder::new()
            .add_particle(Vector3::zeros(), Vector3::zeros(), 1.0)
            .no_ground()
            .finalize()
            .unwrap();
        assert!(SurfaceSet::from_model(&bare).is_empty());
    }
}
