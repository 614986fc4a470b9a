//! Resolved contact response and per-step contact detection.

use nalgebra::Vector3;
use tracing::trace;

use bounce_types::{ContactParameters, PenaltyParams, Result, SimError, SoftContactParams};

use crate::{
    ContactForce, ContactJacobian, ContactLaw, PenaltyContact, SoftContact, Surface, SurfaceKind,
    SurfaceSet, MAX_SURFACES,
};

/// Which family of contact law an integrator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactFamily {
    /// Fixed-stiffness penalty constants.
    Penalty,
    /// Soft-contact constants.
    Soft,
}

/// A validated contact law, ready to evaluate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactResponse {
    /// Penalty law, used inside custom integrator steps.
    Penalty(PenaltyContact),
    /// Soft-contact law, used by the pre-step collide pass.
    Soft(SoftContact),
}

impl ContactResponse {
    /// Resolve the raw parameters for an integrator of the given family.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ConfigurationMismatch`] when the required block is
    /// missing or the block belonging to the other family is set.
    pub fn resolve(
        integrator: &str,
        family: ContactFamily,
        params: &ContactParameters,
    ) -> Result<Self> {
        match (family, params.penalty, params.soft) {
            (ContactFamily::Penalty, Some(p), None) => Ok(Self::Penalty(PenaltyContact::new(p))),
            (ContactFamily::Soft, None, Some(s)) => Ok(Self::Soft(SoftContact::new(s))),
            (ContactFamily::Penalty, None, _) => Err(SimError::mismatch(
                integrator,
                "custom integrators require penalty stiffness (customized_kn)",
            )),
            (ContactFamily::Penalty, Some(_), Some(_)) => Err(SimError::mismatch(
                integrator,
                "soft-contact parameters are not used by custom integrators",
            )),
            (ContactFamily::Soft, Some(_), _) => Err(SimError::mismatch(
                integrator,
                "penalty stiffness (customized_kn) is not used by library integrators",
            )),
            (ContactFamily::Soft, None, None) => Err(SimError::mismatch(
                integrator,
                "library integrators require soft-contact parameters",
            )),
        }
    }

    /// Penalty constants, if this is a penalty response.
    #[must_use]
    pub fn penalty(&self) -> Option<&PenaltyParams> {
        match self {
            Self::Penalty(law) => Some(law.params()),
            Self::Soft(_) => None,
        }
    }

    /// Soft-contact constants, if this is a soft response.
    #[must_use]
    pub fn soft(&self) -> Option<&SoftContactParams> {
        match self {
            Self::Penalty(_) => None,
            Self::Soft(law) => Some(law.params()),
        }
    }

    /// Detection margin. Penalty contact only reports actual overlap.
    #[must_use]
    pub fn margin(&self) -> f64 {
        match self {
            Self::Penalty(_) => 0.0,
            Self::Soft(law) => law.params().margin,
        }
    }

    /// Stiffness along the normal, used for compliance in position-based steps.
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        match self {
            Self::Penalty(law) => law.params().stiffness,
            Self::Soft(law) => law.params().ke,
        }
    }

    fn law(&self) -> &dyn ContactLaw {
        match self {
            Self::Penalty(law) => law,
            Self::Soft(law) => law,
        }
    }

    /// Force on the particle from one surface.
    #[must_use]
    pub fn force(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactForce {
        self.law().force(surface, radius, position, velocity)
    }

    /// Jacobian of the force from one surface.
    #[must_use]
    pub fn jacobian(
        &self,
        surface: &Surface,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactJacobian {
        self.law().jacobian(surface, radius, position, velocity)
    }

    /// Summed force over every surface.
    #[must_use]
    pub fn total_force(
        &self,
        surfaces: &SurfaceSet,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> Vector3<f64> {
        surfaces
            .iter()
            .map(|(_, s)| self.force(s, radius, position, velocity).total())
            .fold(Vector3::zeros(), |acc, f| acc + f)
    }

    /// Summed Jacobian over every surface.
    #[must_use]
    pub fn total_jacobian(
        &self,
        surfaces: &SurfaceSet,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> ContactJacobian {
        surfaces
            .iter()
            .map(|(_, s)| self.jacobian(s, radius, position, velocity))
            .fold(ContactJacobian::zero(), |acc, j| acc + j)
    }
}

/// A surface within detection range of the particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Slot of the surface in its [`SurfaceSet`].
    pub surface: usize,
    /// Kind of the surface.
    pub kind: SurfaceKind,
    /// Penetration depth. Negative while still separated.
    pub depth: f64,
    /// Force the surface exerts.
    pub force: ContactForce,
}

impl Contact {
    /// Whether the particle actually overlaps the surface.
    #[must_use]
    pub fn is_penetrating(&self) -> bool {
        self.depth > 0.0
    }
}

/// Contact candidates of one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactSet {
    contacts: [Option<Contact>; MAX_SURFACES],
}

impl ContactSet {
    /// Detect candidates within the response's margin and evaluate their forces.
    #[must_use]
    pub fn detect(
        response: &ContactResponse,
        surfaces: &SurfaceSet,
        radius: f64,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> Self {
        let margin = response.margin();
        let mut set = Self::default();
        for (slot, surface) in surfaces.iter() {
            let depth = surface.penetration(position, radius);
            // Penalty contacts report only overlap, soft contacts anything within margin.
            let candidate = if margin > 0.0 {
                depth > -margin
            } else {
                depth > 0.0
            };
            if candidate {
                set.contacts[slot] = Some(Contact {
                    surface: slot,
                    kind: surface.kind,
                    depth,
                    force: response.force(surface, radius, position, velocity),
                });
            }
        }
        set
    }

    /// Iterate over detected contacts.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().flatten()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any candidate actually overlaps.
    #[must_use]
    pub fn any_penetrating(&self) -> bool {
        self.iter().any(Contact::is_penetrating)
    }

    /// Summed force of all candidates.
    #[must_use]
    pub fn total_force(&self) -> Vector3<f64> {
        self.iter()
            .fold(Vector3::zeros(), |acc, c| acc + c.force.total())
    }
}

/// Detect contacts and return them with their summed force.
///
/// This is the pre-step pass of library-style integrators: the caller adds
/// the returned force to the state's accumulated force.
pub fn collide(
    response: &ContactResponse,
    surfaces: &SurfaceSet,
    radius: f64,
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
) -> ContactSet {
    let set = ContactSet::detect(response, surfaces, radius, position, velocity);
    if set.any_penetrating() {
        trace!(contacts = set.len(), force = ?set.total_force(), "contact");
    }
    set
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bounce_types::ModelBuilder;

    fn ground_and_wall() -> SurfaceSet {
        let model = ModelBuilder::new()
            .add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros(), 1.0)
            .wall(1.0)
            .finalize()
            .unwrap();
        SurfaceSet::from_model(&model)
    }

    #[test]
    fn test_resolve_matching_families() {
        let penalty = ContactParameters::penalty(PenaltyParams::spring(1.0e4));
        let soft = ContactParameters::soft(SoftContactParams::default());

        assert!(matches!(
            ContactResponse::resolve("custom", ContactFamily::Penalty, &penalty).unwrap(),
            ContactResponse::Penalty(_)
        ));
        assert!(matches!(
            ContactResponse::resolve("library", ContactFamily::Soft, &soft).unwrap(),
            ContactResponse::Soft(_)
        ));
    }

    #[test]
    fn test_resolve_mismatch() {
        let penalty = ContactParameters::penalty(PenaltyParams::spring(1.0e4));
        let soft = ContactParameters::soft(SoftContactParams::default());
        let both = ContactParameters {
            penalty: Some(PenaltyParams::spring(1.0e4)),
            soft: Some(SoftContactParams::default()),
        };

        for (family, params) in [
            (ContactFamily::Soft, &penalty),
            (ContactFamily::Penalty, &soft),
            (ContactFamily::Penalty, &both),
            (ContactFamily::Soft, &both),
            (ContactFamily::Soft, &ContactParameters::default()),
        ] {
            let err = ContactResponse::resolve("x", family, params).unwrap_err();
            assert!(matches!(err, SimError::ConfigurationMismatch { .. }));
        }
    }

    #[test]
    fn test_margin_reports_candidates_without_force() {
        let response = ContactResponse::Soft(SoftContact::new(SoftContactParams::default()));
        let surfaces = ground_and_wall();
        let set = ContactSet::detect(
            &response,
            &surfaces,
            0.1,
            &Vector3::new(0.0, 1.0, 0.0),
            &Vector3::zeros(),
        );
        assert_eq!(set.len(), 2);
        assert!(!set.any_penetrating());
        assert_eq!(set.total_force(), Vector3::zeros());
    }

    #[test]
    fn test_penalty_reports_overlap_only() {
        let response = ContactResponse::Penalty(PenaltyContact::new(PenaltyParams::spring(1.0e4)));
        let surfaces = ground_and_wall();
        let x = Vector3::new(0.0, 0.09, 0.0);
        let set = collide(&response, &surfaces, 0.1, &x, &Vector3::zeros());
        assert_eq!(set.len(), 1);
        let contact = set.iter().next().unwrap();
        assert_eq!(contact.kind, SurfaceKind::Ground);
        assert_relative_eq!(set.total_force().y, 100.0, epsilon = 1e-9);
        assert_relative_eq!(
            response.total_force(&surfaces, 0.1, &x, &Vector3::zeros()),
            set.total_force(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_corner_contact_sums_surfaces() {
        let response = ContactResponse::Penalty(PenaltyContact::new(PenaltyParams::spring(1.0e3)));
        let surfaces = ground_and_wall();
        // Overlapping ground by 0.01 and the wall by 0.02.
        let x = Vector3::new(0.92, 0.09, 0.0);
        let f = response.total_force(&surfaces, 0.1, &x, &Vector3::zeros());
        assert_relative_eq!(f.x, -20.0, epsilon = 1e-9);
        assert_relative_eq!(f.y, 10.0, epsilon = 1e-9);

        let jac = response.total_jacobian(&surfaces, 0.1, &x, &Vector3::zeros());
        assert_relative_eq!(jac.position[(0, 0)], -1.0e3, epsilon = 1e-9);
        assert_relative_eq!(jac.position[(1, 1)], -1.0e3, epsilon = 1e-9);
    }
}
