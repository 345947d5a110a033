//! Rigid-body physics contract and the rapier-backed world
//!
//! The simulation core only talks to physics through [`PhysicsWorld`]: create
//! bodies, step, read contacts, read/write position and velocity. Any engine
//! that honours that contract can sit underneath. [`RapierWorld`] is the
//! built-in implementation on top of `rapier2d`. Handles are handed out in
//! creation order and every contact list is sorted, so two runs with the same
//! inputs produce the same contact sequence.

use std::collections::BTreeMap;
use std::sync::Mutex;

use glam::Vec2;
use rapier2d::geometry::ContactPair as RapierContactPair;
use rapier2d::prelude::{
    ActiveCollisionTypes, ActiveEvents, BroadPhase, CCDSolver, CoefficientCombineRule,
    ColliderBuilder, ColliderHandle, ColliderSet, CollisionEvent, EventHandler, Group,
    ImpulseJointSet, IntegrationParameters, InteractionGroups, IslandManager,
    MultibodyJointSet, NarrowPhase, PhysicsPipeline, Real, RigidBody, RigidBodyBuilder,
    RigidBodyHandle, RigidBodySet, Vector, vector,
};
use serde::{Deserialize, Serialize};

use crate::consts::GRAVITY;

/// Stable identifier of a body inside a physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

/// Unordered contact between two bodies, as reported by the world
pub type ContactPair = (BodyHandle, BodyHandle);

/// Collision shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f32 },
    /// Box centred on the body position, rotated by `angle` radians
    Box { half_extents: Vec2, angle: f32 },
}

/// Surface material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self { restitution: 0.8 }
    }
}

/// How a body moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Integrated under gravity, responds to fixed and kinematic solids
    Dynamic,
    /// Never moves
    Fixed,
    /// Moved only by its own velocity / explicit position writes
    Kinematic,
}

/// Body creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub shape: Shape,
    pub mass: f32,
    pub material: Material,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Sensors report contacts but never produce a physical response
    pub sensor: bool,
    pub gravity_scale: f32,
}

impl BodyDesc {
    fn new(kind: BodyKind, shape: Shape, mass: f32) -> Self {
        Self {
            kind,
            shape,
            mass,
            material: Material::default(),
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            sensor: false,
            gravity_scale: 1.0,
        }
    }

    pub fn dynamic(shape: Shape, mass: f32) -> Self {
        Self::new(BodyKind::Dynamic, shape, mass)
    }

    pub fn fixed(shape: Shape) -> Self {
        Self::new(BodyKind::Fixed, shape, 0.0)
    }

    pub fn kinematic(shape: Shape) -> Self {
        Self::new(BodyKind::Kinematic, shape, 0.0)
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }
}

/// The physics engine contract consumed by the simulation core
pub trait PhysicsWorld {
    /// Create a body and return its stable handle
    fn create_rigid_body(&mut self, desc: BodyDesc) -> BodyHandle;
    /// Remove a body; returns false if it did not exist
    fn remove_body(&mut self, handle: BodyHandle) -> bool;
    fn contains(&self, handle: BodyHandle) -> bool;
    /// Advance by whole `fixed_dt` steps covering `real_dt`, at most `max_substeps`
    fn step(&mut self, fixed_dt: f32, real_dt: f32, max_substeps: u32);
    /// Post-step scan of every pair currently touching
    fn current_contacts(&self) -> Vec<ContactPair>;
    /// Begin-contact notifications accumulated since the last call
    fn take_begin_contacts(&mut self) -> Vec<ContactPair>;
    fn position(&self, handle: BodyHandle) -> Option<Vec2>;
    fn velocity(&self, handle: BodyHandle) -> Option<Vec2>;
    fn set_position(&mut self, handle: BodyHandle, position: Vec2);
    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2);
    /// Drop every body and start over from an empty world
    fn clear(&mut self);
}

/// Distance within which resting bodies still count as touching
const CONTACT_SKIN: f32 = 0.5;

/// Gathers collision events raised while the pipeline steps
#[derive(Default)]
struct EventCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    fn drain(&mut self) -> Vec<CollisionEvent> {
        match self.events.get_mut() {
            Ok(events) => std::mem::take(events),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        }
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&RapierContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &RapierContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Everything rapier needs to step, rebuilt wholesale by [`PhysicsWorld::clear`]
struct Sets {
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
}

impl Sets {
    fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
        }
    }
}

/// Built-in world backed by `rapier2d`
pub struct RapierWorld {
    sets: Sets,
    params: IntegrationParameters,
    gravity: Vector<Real>,
    collector: EventCollector,
    handles: BTreeMap<u32, (RigidBodyHandle, ColliderHandle)>,
    next_handle: u32,
    accumulator: f32,
    begin_contacts: Vec<ContactPair>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(Vec2::new(0.0, -GRAVITY))
    }
}

impl RapierWorld {
    pub fn new(gravity: Vec2) -> Self {
        let params = IntegrationParameters {
            prediction_distance: CONTACT_SKIN,
            ..IntegrationParameters::default()
        };
        Self {
            sets: Sets::new(),
            params,
            gravity: vector![gravity.x, gravity.y],
            collector: EventCollector::default(),
            handles: BTreeMap::new(),
            next_handle: 1,
            accumulator: 0.0,
            begin_contacts: Vec::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let (body, _) = self.handles.get(&handle.0)?;
        self.sets.bodies.get(*body)
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let (body, _) = self.handles.get(&handle.0)?;
        self.sets.bodies.get_mut(*body)
    }

    /// Our handle for a live collider
    fn owner(&self, collider: ColliderHandle) -> Option<BodyHandle> {
        let data = self.sets.colliders.get(collider)?.user_data;
        let handle = u32::try_from(data).ok()?;
        self.handles.contains_key(&handle).then_some(BodyHandle(handle))
    }

    fn pair(&self, a: ColliderHandle, b: ColliderHandle) -> Option<ContactPair> {
        let (a, b) = (self.owner(a)?, self.owner(b)?);
        Some((a.min(b), a.max(b)))
    }

    fn step_once(&mut self, dt: f32) {
        self.params.dt = dt;
        let sets = &mut self.sets;
        sets.pipeline.step(
            &self.gravity,
            &self.params,
            &mut sets.islands,
            &mut sets.broad_phase,
            &mut sets.narrow_phase,
            &mut sets.bodies,
            &mut sets.colliders,
            &mut sets.impulse_joints,
            &mut sets.multibody_joints,
            &mut sets.ccd,
            None,
            &(),
            &self.collector,
        );

        for event in self.collector.drain() {
            if !event.started() {
                continue;
            }
            if let Some(pair) = self.pair(event.collider1(), event.collider2()) {
                self.begin_contacts.push(pair);
            }
        }
    }
}

impl PhysicsWorld for RapierWorld {
    fn create_rigid_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = self.next_handle;
        self.next_handle += 1;

        let builder = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .ccd_enabled(true)
                .can_sleep(false)
                .lock_rotations(),
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        };
        let angle = match desc.shape {
            Shape::Box { angle, .. } => angle,
            Shape::Circle { .. } => 0.0,
        };
        let body = builder
            .translation(vector![desc.position.x, desc.position.y])
            .rotation(angle)
            .linvel(vector![desc.velocity.x, desc.velocity.y])
            .gravity_scale(desc.gravity_scale)
            .build();

        let mut collider = match desc.shape {
            Shape::Circle { radius } => ColliderBuilder::ball(radius),
            Shape::Box { half_extents, .. } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y)
            }
        }
        .restitution(desc.material.restitution)
        .restitution_combine_rule(CoefficientCombineRule::Max)
        .friction(0.0)
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .user_data(u128::from(handle));

        if desc.kind == BodyKind::Dynamic {
            // Dynamic pairs are reported but never pushed apart
            collider = collider
                .mass(desc.mass.max(0.01))
                .solver_groups(InteractionGroups::new(Group::GROUP_1, !Group::GROUP_1));
        }
        if desc.sensor {
            // Kinematic sensors must still see fixed pegs
            collider = collider
                .sensor(true)
                .active_collision_types(ActiveCollisionTypes::all());
        }

        let sets = &mut self.sets;
        let body = sets.bodies.insert(body);
        let collider = sets
            .colliders
            .insert_with_parent(collider.build(), body, &mut sets.bodies);
        self.handles.insert(handle, (body, collider));
        BodyHandle(handle)
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.begin_contacts.retain(|&(a, b)| a != handle && b != handle);
        let Some((body, _)) = self.handles.remove(&handle.0) else {
            return false;
        };
        let sets = &mut self.sets;
        sets.bodies
            .remove(
                body,
                &mut sets.islands,
                &mut sets.colliders,
                &mut sets.impulse_joints,
                &mut sets.multibody_joints,
                true,
            )
            .is_some()
    }

    fn contains(&self, handle: BodyHandle) -> bool {
        self.handles.contains_key(&handle.0)
    }

    fn step(&mut self, fixed_dt: f32, real_dt: f32, max_substeps: u32) {
        if fixed_dt <= 0.0 {
            return;
        }
        let max_substeps = max_substeps.max(1);
        self.accumulator += real_dt;
        let mut steps = 0;
        while self.accumulator + 1e-6 >= fixed_dt && steps < max_substeps {
            self.accumulator -= fixed_dt;
            self.step_once(fixed_dt);
            steps += 1;
        }
        // Drop any backlog the substep cap could not cover
        if self.accumulator >= fixed_dt {
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.max(0.0);
    }

    fn current_contacts(&self) -> Vec<ContactPair> {
        let narrow = &self.sets.narrow_phase;
        let touching = narrow
            .contact_pairs()
            .filter(|pair| {
                pair.manifolds
                    .iter()
                    .any(|m| m.points.iter().any(|p| p.dist <= CONTACT_SKIN))
            })
            .filter_map(|pair| self.pair(pair.collider1, pair.collider2));
        let overlapping = narrow
            .intersection_pairs()
            .filter(|(_, _, hit)| *hit)
            .filter_map(|(a, b, _)| self.pair(a, b));

        let mut contacts: Vec<ContactPair> = touching.chain(overlapping).collect();
        contacts.sort_unstable();
        contacts.dedup();
        contacts
    }

    fn take_begin_contacts(&mut self) -> Vec<ContactPair> {
        let mut contacts = std::mem::take(&mut self.begin_contacts);
        contacts.sort_unstable();
        contacts.dedup();
        contacts
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        let t = self.rigid_body(handle)?.translation();
        Some(Vec2::new(t.x, t.y))
    }

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        let v = self.rigid_body(handle)?.linvel();
        Some(Vec2::new(v.x, v.y))
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.rigid_body_mut(handle) {
            body.set_translation(vector![position.x, position.y], true);
        }
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(body) = self.rigid_body_mut(handle) {
            body.set_linvel(vector![velocity.x, velocity.y], true);
        }
    }

    fn clear(&mut self) {
        self.sets = Sets::new();
        self.collector.drain();
        self.handles.clear();
        self.next_handle = 1;
        self.accumulator = 0.0;
        self.begin_contacts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn ball_at(pos: Vec2) -> BodyDesc {
        BodyDesc::dynamic(Shape::Circle { radius: 8.0 }, 1.0).at(pos)
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut world = RapierWorld::default();
        let ball = world.create_rigid_body(ball_at(Vec2::new(0.0, 300.0)));
        for _ in 0..10 {
            world.step(SIM_DT, SIM_DT, 3);
        }
        let pos = world.position(ball).unwrap();
        assert!(pos.y < 300.0);
        assert!(world.velocity(ball).unwrap().y < 0.0);
    }

    #[test]
    fn test_bounce_off_fixed_circle_reports_both_channels() {
        let mut world = RapierWorld::default();
        let peg = world.create_rigid_body(
            BodyDesc::fixed(Shape::Circle { radius: 10.0 }).at(Vec2::new(0.0, 100.0)),
        );
        let ball = world.create_rigid_body(
            ball_at(Vec2::new(0.0, 125.0)).with_velocity(Vec2::new(0.0, -300.0)),
        );

        let mut began = Vec::new();
        let mut bounced = false;
        for _ in 0..10 {
            world.step(SIM_DT, SIM_DT, 3);
            began.extend(world.take_begin_contacts());
            if world.velocity(ball).unwrap().y > 0.0 {
                bounced = true;
                break;
            }
        }

        assert!(bounced, "ball should rebound off the peg");
        assert!(began.contains(&(peg, ball)));
    }

    #[test]
    fn test_resting_contact_stays_in_scan() {
        let mut world = RapierWorld::default();
        let floor = world.create_rigid_body(BodyDesc::fixed(Shape::Box {
            half_extents: Vec2::new(100.0, 5.0),
            angle: 0.0,
        }));
        let ball = world.create_rigid_body(
            ball_at(Vec2::new(0.0, 13.0)).material(Material { restitution: 0.0 }),
        );
        for _ in 0..120 {
            world.step(SIM_DT, SIM_DT, 3);
        }
        assert!(world.current_contacts().contains(&(floor, ball)));
        assert!((world.position(ball).unwrap().y - 13.0).abs() < 1.0);
    }

    #[test]
    fn test_sensor_reports_without_response() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let sensor = world.create_rigid_body(
            BodyDesc::fixed(Shape::Box {
                half_extents: Vec2::new(50.0, 5.0),
                angle: 0.0,
            })
            .at(Vec2::ZERO)
            .sensor(),
        );
        let ball = world.create_rigid_body(
            ball_at(Vec2::new(0.0, 12.0)).with_velocity(Vec2::new(0.0, -60.0)),
        );
        world.step(SIM_DT, SIM_DT, 3);
        world.step(SIM_DT, SIM_DT, 3);
        assert!(world.current_contacts().contains(&(sensor, ball)));
        assert!((world.velocity(ball).unwrap() - Vec2::new(0.0, -60.0)).length() < 1e-3);
    }

    #[test]
    fn test_dynamic_pairs_do_not_push_apart() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let a = world.create_rigid_body(ball_at(Vec2::ZERO));
        let b = world.create_rigid_body(ball_at(Vec2::new(4.0, 0.0)));
        world.step(SIM_DT, SIM_DT, 1);
        assert!(world.current_contacts().contains(&(a, b)));
        assert_eq!(world.position(a).unwrap(), Vec2::ZERO);
        assert_eq!(world.position(b).unwrap(), Vec2::new(4.0, 0.0));
    }

    #[test]
    fn test_rotated_box_deflects() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        world.create_rigid_body(
            BodyDesc::fixed(Shape::Box {
                half_extents: Vec2::new(40.0, 5.0),
                angle: std::f32::consts::FRAC_PI_4,
            })
            .at(Vec2::ZERO),
        );
        let ball = world.create_rigid_body(
            ball_at(Vec2::new(0.0, 20.0)).with_velocity(Vec2::new(0.0, -200.0)),
        );
        for _ in 0..10 {
            world.step(SIM_DT, SIM_DT, 3);
        }
        // A 45° ramp sends a falling ball sideways
        assert!(world.velocity(ball).unwrap().x.abs() > 50.0);
    }

    #[test]
    fn test_step_caps_substeps() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let ball = world.create_rigid_body(
            ball_at(Vec2::ZERO).with_velocity(Vec2::new(60.0, 0.0)),
        );
        // A full second of backlog only advances three steps
        world.step(SIM_DT, 1.0, 3);
        let x = world.position(ball).unwrap().x;
        assert!((x - 60.0 * SIM_DT * 3.0).abs() < 0.01);
    }

    #[test]
    fn test_remove_body_forgets_contacts() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let a = world.create_rigid_body(ball_at(Vec2::ZERO));
        let b = world.create_rigid_body(BodyDesc::fixed(Shape::Circle { radius: 5.0 }).at(Vec2::new(10.0, 0.0)));
        world.step(SIM_DT, SIM_DT, 1);
        assert!(!world.current_contacts().is_empty());
        assert!(world.remove_body(b));
        assert!(!world.contains(b));
        assert!(world.current_contacts().is_empty());
        assert!(world.take_begin_contacts().iter().all(|&(x, y)| x != b && y != b));
        assert!(world.contains(a));
    }

    #[test]
    fn test_clear_restarts_handles() {
        let mut world = RapierWorld::default();
        let first = world.create_rigid_body(ball_at(Vec2::ZERO));
        world.create_rigid_body(BodyDesc::fixed(Shape::Circle { radius: 5.0 }).at(Vec2::new(10.0, 0.0)));
        world.step(SIM_DT, SIM_DT, 1);
        world.clear();
        assert_eq!(world.body_count(), 0);
        assert!(world.current_contacts().is_empty());
        assert_eq!(world.create_rigid_body(ball_at(Vec2::ZERO)), first);
    }
}
