//! Behaviour at the contact boundary.
//!
//! The force is exactly zero while separated and grows as `k·d` once the
//! particle overlaps. A step taken just outside the boundary must not see
//! any of it.

use approx::assert_relative_eq;
use bounce_contact::{collide, ContactResponse, SurfaceSet};
use bounce_core::{IntegratorStrategy, Scene};
use bounce_types::{
    ContactParameters, ModelBuilder, PenaltyParams, SimulationState, SoftContactParams, Vector3,
};

const RADIUS: f64 = 0.1;
const STIFFNESS: f64 = 1.0e4;

fn scene(integrator: IntegratorStrategy, contact: ContactParameters) -> Scene {
    let model = ModelBuilder::new()
        .add_particle(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros(), 1.0)
        .radius(RADIUS)
        .zero_gravity()
        .contact(contact)
        .finalize()
        .unwrap();
    Scene::new(&model, &integrator).unwrap()
}

fn penalty_scene() -> Scene {
    scene(
        IntegratorStrategy::SymplecticPenalty,
        ContactParameters::penalty(PenaltyParams::spring(STIFFNESS)),
    )
}

fn soft_scene() -> Scene {
    scene(
        IntegratorStrategy::SemiImplicit,
        ContactParameters::soft(SoftContactParams::with_stiffness(STIFFNESS)),
    )
}

#[test]
fn test_penalty_force_is_zero_just_outside_and_linear_just_inside() {
    let scene = penalty_scene();
    let still = Vector3::zeros();

    let outside = Vector3::new(0.0, RADIUS + 1e-9, 0.0);
    assert_eq!(scene.contact_force(&outside, &still), Vector3::zeros());

    let touching = Vector3::new(0.0, RADIUS, 0.0);
    assert_eq!(scene.contact_force(&touching, &still), Vector3::zeros());

    let depth = 1e-6;
    let inside = Vector3::new(0.0, RADIUS - depth, 0.0);
    let force = scene.contact_force(&inside, &still);
    assert_relative_eq!(force.y, STIFFNESS * depth, max_relative = 1e-8);
    assert_eq!(force.x, 0.0);
}

#[test]
fn test_soft_contact_reports_candidates_without_force() {
    let scene = soft_scene();
    let still = Vector3::zeros();

    let outside = Vector3::new(0.0, RADIUS + 0.5, 0.0);
    let set = collide(&scene.response, &scene.surfaces, RADIUS, &outside, &still);
    assert_eq!(set.len(), 1);
    assert!(!set.any_penetrating());
    assert_eq!(set.total_force(), Vector3::zeros());

    let inside = Vector3::new(0.0, RADIUS - 1e-6, 0.0);
    let set = collide(&scene.response, &scene.surfaces, RADIUS, &inside, &still);
    assert!(set.any_penetrating());
    assert_relative_eq!(set.total_force().y, STIFFNESS * 1e-6, max_relative = 1e-8);
}

#[test]
fn test_penalty_response_has_no_margin() {
    let scene = penalty_scene();
    let near = Vector3::new(0.0, RADIUS + 1e-3, 0.0);
    let set = collide(&scene.response, &scene.surfaces, RADIUS, &near, &Vector3::zeros());
    assert!(set.is_empty());
}

#[test]
fn test_step_just_outside_is_free_flight() {
    let scene = penalty_scene();
    let integrator = IntegratorStrategy::SymplecticPenalty;
    let dt = 1.0 / 480.0;

    let mut from = SimulationState::zeroed(true);
    from.position = Vector3::new(0.0, RADIUS + 1e-9, 0.0);
    from.velocity = Vector3::new(1.0, 0.0, 0.0);
    let mut to = SimulationState::zeroed(true);
    integrator.step(&scene, &from, &mut to, dt);
    assert_eq!(to.velocity, from.velocity);

    from.position.y = RADIUS - 1e-3;
    integrator.step(&scene, &from, &mut to, dt);
    assert_relative_eq!(to.velocity.y, STIFFNESS * 1e-3 * dt, max_relative = 1e-9);
}

#[test]
fn test_surfaces_follow_model() {
    let scene = penalty_scene();
    assert_eq!(scene.surfaces.len(), 1);
    let wall = ModelBuilder::new()
        .add_particle(Vector3::zeros(), Vector3::zeros(), 1.0)
        .wall(1.0)
        .contact(ContactParameters::penalty(PenaltyParams::spring(STIFFNESS)))
        .finalize()
        .unwrap();
    assert_eq!(SurfaceSet::from_model(&wall).len(), 2);
    let response = ContactResponse::resolve(
        "symplectic_penalty",
        IntegratorStrategy::SymplecticPenalty.contact_family(),
        &wall.contact,
    )
    .unwrap();
    assert!(response.penalty().is_some());
}
