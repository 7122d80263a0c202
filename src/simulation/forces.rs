//! # Pairwise and singular force terms
//!
//! All routines here are impulse-based: they turn a force (or acceleration)
//! into a velocity delta over one tick and apply it directly, which is what
//! lets them run concurrently over shared entities with only relaxed atomic
//! adds. Positions are never touched here.
//!
//! Contact is a spring penalty, not an analytic bounce: overlapping
//! particles feel a restoring impulse proportional to penetration depth.
//! Energy loss comes from scaling the impulse by the rebound efficiency
//! only on axes where the pair is already separating, so the exit push is
//! weaker than the entry brake and a bounce returns less speed than it
//! took in. Scaling the approach side instead would pump energy into every
//! bounce.

use crate::simulation::black_hole::{BlackHole, InteractionMode};
use crate::simulation::params::{DEEP_OVERLAP, DIST_EPSILON};
use crate::simulation::particle::Particle;

/// Resolve one particle pair for one tick: spring-penalty repulsion inside
/// contact distance, optional inverse-square stickiness just outside it.
///
/// Safe to call concurrently with other pairs sharing a particle; each
/// velocity component is updated with an atomic add.
pub fn collision_update(a: &Particle, b: &Particle, dt: f64, stickiness: bool) {
    let pa = a.position();
    let pb = b.position();
    let delta = pa - pb;
    let dist = delta.norm().max(DIST_EPSILON);
    let contact = a.radius() + b.radius();

    if dist < contact {
        let spring = a.spring_rate().min(b.spring_rate());
        let force = spring * (contact - dist) * dt;

        // Centers nearly coincident: the spring direction is meaningless,
        // so approaching axes first merge inelastically (mass-weighted).
        if dist < contact * DEEP_OVERLAP {
            let va = a.velocity();
            let vb = b.velocity();
            let mass_a = a.mass();
            let mass_b = b.mass();
            if (pa.x < pb.x && va.x > vb.x) || (pa.x > pb.x && va.x < vb.x) {
                let merged = (va.x * mass_a + vb.x * mass_b) / (mass_a + mass_b);
                a.set_velocity_x(merged);
                b.set_velocity_x(merged);
            }
            if (pa.y < pb.y && va.y > vb.y) || (pa.y > pb.y && va.y < vb.y) {
                let merged = (va.y * mass_a + vb.y * mass_b) / (mass_a + mass_b);
                a.set_velocity_y(merged);
                b.set_velocity_y(merged);
            }
        }

        // Re-read velocities after a possible merge.
        let va = a.velocity();
        let vb = b.velocity();
        let rebound = a.rebound_efficiency();

        let separating_x = (pa.x < pb.x && va.x < vb.x) || (pa.x > pb.x && va.x > vb.x);
        let impulse_x = (delta.x / dist) * force * if separating_x { rebound } else { 1.0 };
        a.add_velocity_x(impulse_x / a.mass());
        b.add_velocity_x(-impulse_x / b.mass());

        let separating_y = (pa.y < pb.y && va.y < vb.y) || (pa.y > pb.y && va.y > vb.y);
        let impulse_y = (delta.y / dist) * force * if separating_y { rebound } else { 1.0 };
        a.add_velocity_y(impulse_y / a.mass());
        b.add_velocity_y(-impulse_y / b.mass());
    } else if stickiness && dist < contact + a.attr_radius().max(b.attr_radius()) {
        // Each particle contributes its rate only while the other is
        // inside its own attraction shell.
        let mut attract_rate = 0.0;
        if dist < contact + a.attr_radius() {
            attract_rate += a.attr_rate();
        }
        if dist < contact + b.attr_radius() {
            attract_rate += b.attr_rate();
        }

        let force = attract_rate * dt / (dist * dist);
        let impulse_x = (delta.x / dist) * force;
        a.add_velocity_x(-impulse_x / a.mass());
        b.add_velocity_x(impulse_x / b.mass());
        let impulse_y = (delta.y / dist) * force;
        a.add_velocity_y(-impulse_y / a.mass());
        b.add_velocity_y(impulse_y / b.mass());
    }
}

/// Per-particle boundary springs and linear gravity for one tick.
///
/// Each enabled edge acts once the particle's own radius crosses it, with
/// the same exit-scaled spring penalty as particle contact. Gravity only
/// pulls while the particle is clear of the floor and ceiling zones, so a
/// particle resting on the floor feels the spring alone.
#[allow(clippy::too_many_arguments)]
pub fn apply_boundaries(
    particle: &Particle,
    dt: f64,
    width: f64,
    height: f64,
    walls: bool,
    ceiling: bool,
    floor: bool,
    gravity: f64,
) {
    let position = particle.position();
    let velocity = particle.velocity();
    let radius = particle.radius();
    let spring = particle.spring_rate();
    let rebound = particle.rebound_efficiency();

    if walls {
        if position.x > width - radius {
            let scale = if velocity.x < 0.0 { rebound } else { 1.0 };
            particle.add_velocity_x(((width - radius) - position.x) * spring * scale * dt);
        } else if position.x < radius {
            let scale = if velocity.x > 0.0 { rebound } else { 1.0 };
            particle.add_velocity_x((radius - position.x) * spring * scale * dt);
        }
    }

    if position.y > height - radius {
        if floor {
            let scale = if velocity.y < 0.0 { rebound } else { 1.0 };
            particle.add_velocity_y(((height - radius) - position.y) * spring * scale * dt);
        }
    } else if position.y < radius {
        if ceiling {
            let scale = if velocity.y > 0.0 { rebound } else { 1.0 };
            particle.add_velocity_y((radius - position.y) * spring * scale * dt);
        }
    } else {
        particle.add_velocity_y(gravity * dt);
    }
}

/// One black hole acting on one particle for one tick.
///
/// Black-hole terms are accelerations on the particle, independent of its
/// mass. Outside the hole's radius the field falls off as the inverse
/// square of center distance; at the surface it equals the configured
/// surface acceleration by construction of the center rate.
pub fn apply_black_hole(particle: &Particle, hole: &BlackHole, dt: f64) {
    let position = particle.position();
    let center = hole.position();
    let delta = center - position;
    let dist = delta.norm().max(DIST_EPSILON);

    if hole.interaction() == InteractionMode::Collision && dist < particle.radius() + hole.radius() {
        // The surface is a hard spring shell: push the particle out with
        // its own contact spring, no rebound scaling.
        let term = particle.spring_rate() * (particle.radius() + hole.radius() - dist) * dt;
        particle.add_velocity_x((-delta.x / dist) * term);
        particle.add_velocity_y((-delta.y / dist) * term);
        return;
    }

    let term = if dist > hole.radius() {
        hole.center_accel() / (dist * dist) * dt
    } else if hole.interaction() == InteractionMode::Destruction {
        particle.kill();
        return;
    } else {
        hole.surface_accel() * dt
    };

    particle.add_velocity_x((delta.x / dist) * term);
    particle.add_velocity_y((delta.y / dist) * term);
}
