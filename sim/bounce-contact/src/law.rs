//! Contact force laws and their Jacobians.
//!
//! Both laws share the same normal model
//!
//! ```text
//! F_n = k * d + c * max(-v_n, 0)      (d > 0)
//! F_n = 0                             (d <= 0)
//! ```
//!
//! where `d` is the penetration depth and `v_n` the normal velocity. There is
//! no smoothing at `d = 0`: the force switches from exactly zero to `k * d`,
//! and that kink is what makes gradients through contact ill-conditioned.
//!
//! They differ in the tangential term:
//!
//! - [`PenaltyContact`]: Coulomb friction `|F_t| = mu * F_n` opposing sliding.
//! - [`SoftContact`]: regularised friction `|F_t| = min(kf * |v_t|, mu * ke * d)`.

use nalgebra::{Matrix3, Vector3};

use bounce_types::{PenaltyParams, SoftContactParams};

use crate::Surface;

/// Tangential speeds below this are treated as sticking (no friction direction).
const TANGENT_EPSILON: f64 = 1e-12;

/// Force produced by one contact, split into normal and tangential parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactForce {
    /// Normal (repulsive) part.
    pub normal: Vector3<f64>,
    /// Tangential (friction) part.
    pub friction: Vector3<f64>,
}

impl ContactForce {
    /// No force.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            normal: Vector3::zeros(),
            friction: Vector3::zeros(),
        }
    }

    /// Total force on the particle.
    #[must_use]
    pub fn total(&self) -> Vector3<f64> {
        self.normal + self.friction
    }
}

/// Partial derivatives of a contact force with respect to particle state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactJacobian {
    /// `∂F/∂x`.
    pub position: Matrix3<f64>,
    /// `∂F/∂v`.
    pub velocity: Matrix3<f64>,
}

impl ContactJacobian {
    /// Zero Jacobian (no contact).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            position: Matrix3::zeros(),
            velocity: Matrix3::zeros(),
        }
    }
}

impl std::ops::Add for ContactJacobian {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            position: self.position + rhs.position,
            velocity: self.velocity + rhs.velocity,
        }
    }
}

impl std::ops::AddAssign for ContactJacobian {
    fn add_assign(&mut self, rhs: Self) {
        self.position += rhs.position;
        self.velocity += rhs.velocity;
    }
}

/// A force law for a sphere against a plane.
pub trait ContactLaw {
    /// Force on a sphere of `radius` at `position` moving with `velocity`.
    fn force(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactForce;

    /// Jacobian of [`force`](Self::force) at the same point.
    fn jacobian(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactJacobian;
}

/// Kinematics shared by both laws at one contact.
struct Kinematics {
    depth: f64,
    normal: Vector3<f64>,
    normal_speed: f64,
    tangent_velocity: Vector3<f64>,
}

impl Kinematics {
    fn new(
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> Self {
        let n = surface.normal;
        let normal_speed = n.dot(velocity);
        Self {
            depth: surface.penetration(position, radius),
            normal: n,
            normal_speed,
            tangent_velocity: velocity - n * normal_speed,
        }
    }

    fn in_contact(&self) -> bool {
        self.depth > 0.0
    }

    /// Projection onto the tangent plane.
    fn tangent_projector(&self) -> Matrix3<f64> {
        Matrix3::identity() - self.normal * self.normal.transpose()
    }

    /// Normal force magnitude and its gradients for stiffness `k`, damping `c`.
    fn normal_force(&self, k: f64, c: f64) -> (f64, Vector3<f64>, Vector3<f64>) {
        let approach = (-self.normal_speed).max(0.0);
        let magnitude = k * self.depth + c * approach;
        // ∂d/∂x = -n
        let d_dx = -k * self.normal;
        let d_dv = if self.normal_speed < 0.0 {
            -c * self.normal
        } else {
            Vector3::zeros()
        };
        (magnitude, d_dx, d_dv)
    }
}

/// Fixed-stiffness penalty law used by custom integrators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyContact {
    params: PenaltyParams,
}

impl PenaltyContact {
    /// Create the law.
    #[must_use]
    pub fn new(params: PenaltyParams) -> Self {
        Self { params }
    }

    /// The penalty constants.
    #[must_use]
    pub fn params(&self) -> &PenaltyParams {
        &self.params
    }
}

impl ContactLaw for PenaltyContact {
    fn force(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactForce {
        let k = Kinematics::new(surface, radius, position, velocity);
        if !k.in_contact() {
            return ContactForce::zero();
        }

        let (fn_mag, _, _) = k.normal_force(self.params.stiffness, self.params.damping);
        let speed = k.tangent_velocity.norm();
        let friction = if self.params.friction > 0.0 && speed > TANGENT_EPSILON {
            -k.tangent_velocity / speed * (self.params.friction * fn_mag)
        } else {
            Vector3::zeros()
        };

        ContactForce {
            normal: k.normal * fn_mag,
            friction,
        }
    }

    fn jacobian(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactJacobian {
        let k = Kinematics::new(surface, radius, position, velocity);
        if !k.in_contact() {
            return ContactJacobian::zero();
        }

        let (fn_mag, dfn_dx, dfn_dv) = k.normal_force(self.params.stiffness, self.params.damping);
        let mut jac = ContactJacobian {
            position: k.normal * dfn_dx.transpose(),
            velocity: k.normal * dfn_dv.transpose(),
        };

        let speed = k.tangent_velocity.norm();
        let mu = self.params.friction;
        if mu > 0.0 && speed > TANGENT_EPSILON {
            let t = k.tangent_velocity / speed;
            // F_t = -mu * F_n * t
            jac.position -= mu * t * dfn_dx.transpose();
            jac.velocity -= mu * t * dfn_dv.transpose();
            let dt_dv = (Matrix3::identity() - t * t.transpose()) * k.tangent_projector() / speed;
            jac.velocity -= mu * fn_mag * dt_dv;
        }
        jac
    }
}

/// Soft-contact law used by library-style integrators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftContact {
    params: SoftContactParams,
}

impl SoftContact {
    /// Create the law.
    #[must_use]
    pub fn new(params: SoftContactParams) -> Self {
        Self { params }
    }

    /// The soft-contact constants.
    #[must_use]
    pub fn params(&self) -> &SoftContactParams {
        &self.params
    }

    /// Friction magnitude and whether the Coulomb cap is active.
    fn friction_magnitude(&self, depth: f64, speed: f64) -> (f64, bool) {
        let regularised = self.params.kf * speed;
        let cap = self.params.mu * self.params.ke * depth;
        if regularised < cap {
            (regularised, false)
        } else {
            (cap, true)
        }
    }
}

impl ContactLaw for SoftContact {
    fn force(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactForce {
        let k = Kinematics::new(surface, radius, position, velocity);
        if !k.in_contact() {
            return ContactForce::zero();
        }

        let (fn_mag, _, _) = k.normal_force(self.params.ke, self.params.kd);
        let speed = k.tangent_velocity.norm();
        let friction = if speed > TANGENT_EPSILON {
            let (magnitude, _) = self.friction_magnitude(k.depth, speed);
            -k.tangent_velocity / speed * magnitude
        } else {
            Vector3::zeros()
        };

        ContactForce {
            normal: k.normal * fn_mag,
            friction,
        }
    }

    fn jacobian(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactJacobian {
        let k = Kinematics::new(surface, radius, position, velocity);
        if !k.in_contact() {
            return ContactJacobian::zero();
        }

        let (_, dfn_dx, dfn_dv) = k.normal_force(self.params.ke, self.params.kd);
        let mut jac = ContactJacobian {
            position: k.normal * dfn_dx.transpose(),
            velocity: k.normal * dfn_dv.transpose(),
        };

        let speed = k.tangent_velocity.norm();
        if speed > TANGENT_EPSILON {
            let t = k.tangent_velocity / speed;
            let (magnitude, capped) = self.friction_magnitude(k.depth, speed);
            if capped {
                // F_t = -mu * ke * d * t
                let dcap_dx = -self.params.mu * self.params.ke * k.normal;
                jac.position -= t * dcap_dx.transpose();
                let dt_dv =
                    (Matrix3::identity() - t * t.transpose()) * k.tangent_projector() / speed;
                jac.velocity -= magnitude * dt_dv;
            } else {
                // F_t = -kf * v_t
                jac.velocity -= self.params.kf * k.tangent_projector();
            }
        }
        jac
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ground() -> Surface {
        Surface::ground(0.0)
    }

    /// Central-difference Jacobian of a law's total force.
    fn numerical_jacobian(
        law: &impl ContactLaw,
        x: Vector3<f64>,
        v: Vector3<f64>,
    ) -> ContactJacobian {
        let eps = 1e-7;
        let mut jac = ContactJacobian::zero();
        for j in 0..3 {
            let mut dx = Vector3::zeros();
            dx[j] = eps;
            let fp = law.force(&ground(), 0.1, &(x + dx), &v).total();
            let fm = law.force(&ground(), 0.1, &(x - dx), &v).total();
            jac.position.set_column(j, &((fp - fm) / (2.0 * eps)));

            let fp = law.force(&ground(), 0.1, &x, &(v + dx)).total();
            let fm = law.force(&ground(), 0.1, &x, &(v - dx)).total();
            jac.velocity.set_column(j, &((fp - fm) / (2.0 * eps)));
        }
        jac
    }

    #[test]
    fn test_penalty_no_force_without_penetration() {
        let law = PenaltyContact::new(PenaltyParams::spring(1.0e4));
        // Just outside contact: d = -1e-12
        let x = Vector3::new(0.0, 0.1 + 1e-12, 0.0);
        let f = law.force(&ground(), 0.1, &x, &Vector3::new(0.0, -5.0, 0.0));
        assert_eq!(f.total(), Vector3::zeros());
        assert_eq!(
            law.jacobian(&ground(), 0.1, &x, &Vector3::zeros()),
            ContactJacobian::zero()
        );
    }

    #[test]
    fn test_penalty_force_proportional_to_depth() {
        let law = PenaltyContact::new(PenaltyParams::spring(1.0e4));
        let x = Vector3::new(0.0, 0.1 - 1e-3, 0.0);
        let f = law.force(&ground(), 0.1, &x, &Vector3::zeros());
        assert_relative_eq!(f.normal.y, 10.0, epsilon = 1e-9);
        assert_eq!(f.friction, Vector3::zeros());
    }

    #[test]
    fn test_penalty_friction_opposes_sliding() {
        let law = PenaltyContact::new(PenaltyParams::spring(1.0e4).with_friction(0.5));
        let x = Vector3::new(0.0, 0.09, 0.0);
        let f = law.force(&ground(), 0.1, &x, &Vector3::new(2.0, 0.0, 0.0));
        assert!(f.friction.x < 0.0);
        assert_relative_eq!(f.friction.norm(), 0.5 * f.normal.norm(), epsilon = 1e-9);
    }

    #[test]
    fn test_penalty_jacobian_matches_finite_difference() {
        let law = PenaltyContact::new(
            PenaltyParams::spring(1.0e4)
                .with_damping(20.0)
                .with_friction(0.3),
        );
        let x = Vector3::new(0.2, 0.05, -0.1);
        let v = Vector3::new(1.5, -2.0, 0.5);
        let analytic = law.jacobian(&ground(), 0.1, &x, &v);
        let numerical = numerical_jacobian(&law, x, v);
        assert_relative_eq!(analytic.position, numerical.position, epsilon = 1e-4);
        assert_relative_eq!(analytic.velocity, numerical.velocity, epsilon = 1e-4);
    }

    #[test]
    fn test_soft_damping_only_when_approaching() {
        let law = SoftContact::new(SoftContactParams::with_stiffness(1.0e4));
        let x = Vector3::new(0.0, 0.099, 0.0);
        let approaching = law.force(&ground(), 0.1, &x, &Vector3::new(0.0, -1.0, 0.0));
        let separating = law.force(&ground(), 0.1, &x, &Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(approaching.normal.y, 10.0 + 10.0, epsilon = 1e-9);
        assert_relative_eq!(separating.normal.y, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_soft_jacobian_regularised_branch() {
        let law = SoftContact::new(SoftContactParams {
            ke: 1.0e4,
            kd: 10.0,
            kf: 1.0,
            mu: 0.5,
            margin: 0.0,
        });
        let x = Vector3::new(0.0, 0.05, 0.0);
        let v = Vector3::new(0.3, -1.0, 0.0);
        let analytic = law.jacobian(&ground(), 0.1, &x, &v);
        let numerical = numerical_jacobian(&law, x, v);
        assert_relative_eq!(analytic.position, numerical.position, epsilon = 1e-4);
        assert_relative_eq!(analytic.velocity, numerical.velocity, epsilon = 1e-4);
    }

    #[test]
    fn test_soft_jacobian_capped_branch() {
        let law = SoftContact::new(SoftContactParams {
            ke: 1.0e3,
            kd: 0.0,
            kf: 1.0e4,
            mu: 0.2,
            margin: 0.0,
        });
        let x = Vector3::new(0.0, 0.08, 0.0);
        let v = Vector3::new(3.0, 0.0, 1.0);
        let analytic = law.jacobian(&ground(), 0.1, &x, &v);
        let numerical = numerical_jacobian(&law, x, v);
        assert_relative_eq!(analytic.position, numerical.position, epsilon = 1e-4);
        assert_relative_eq!(analytic.velocity, numerical.velocity, epsilon = 1e-4);
    }
}
