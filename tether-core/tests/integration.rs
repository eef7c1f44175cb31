//! Integration Tests for the Slot Graph
//!
//! These tests verify that slots, connections, procedural slots, dependency
//! groups and sub-slot views work together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Once};

use tether_core::clock::Clock;
use tether_core::config::EngineConfig;
use tether_core::declare_slots;
use tether_core::graph::GraphSnapshot;
use tether_core::interdep::{DependencyController, DependencyGroup, Participant, TransformGroup};
use tether_core::slot::{connect, connect_any, disconnect, Mat4, Slot, ValueKind, Vec3};
use tether_core::subslot::SubSlots;
use tether_core::{Result, SlotError};

/// Route `tracing` output to the test harness. Set `RUST_LOG=tether_core=trace`
/// to see the notification walk.
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A procedural slot that counts how often its callback runs.
fn counted<T, F>(f: F) -> (Slot<T>, Arc<AtomicI32>)
where
    T: tether_core::SlotValue,
    F: Fn() -> Result<T> + Send + Sync + 'static,
{
    let count = Arc::new(AtomicI32::new(0));
    let count_clone = count.clone();
    let slot = Slot::procedural(move || {
        count_clone.fetch_add(1, Ordering::SeqCst);
        f()
    });
    (slot, count)
}

/// After `connect(a, b)`, `b` reads whatever `a` holds until disconnected.
#[test]
fn connection_invariant() {
    init_tracing();
    let a = Slot::new(0.0_f64);
    let b = Slot::new(-1.0_f64);
    connect(&a, &b).unwrap();

    for value in [1.0, 2.5, -3.0, 2.5] {
        a.set(value).unwrap();
        assert_eq!(b.get().unwrap(), a.get().unwrap());
    }

    disconnect(&b);
    a.set(100.0).unwrap();
    assert_eq!(b.get().unwrap(), 2.5);
}

/// A second controller is rejected until the first is disconnected.
#[test]
fn single_controller_invariant() {
    let a = Slot::new(1_i64);
    let b = Slot::new(2_i64);
    let target = Slot::new(0_i64);

    connect(&a, &target).unwrap();
    assert_eq!(
        connect(&b, &target),
        Err(SlotError::AlreadyControlled { slot: target.id() })
    );
    assert_eq!(target.set(5), Err(SlotError::AlreadyControlled { slot: target.id() }));

    disconnect(&target);
    connect(&b, &target).unwrap();
    assert_eq!(target.get().unwrap(), 2);
}

/// In a diamond, each slot is invalidated once and recomputed once.
#[test]
fn diamond_propagation_visits_each_slot_once() {
    init_tracing();
    let a = Slot::new(1_i64);

    let a1 = a.clone();
    let (left, left_count) = counted(move || Ok(a1.get()? + 1));
    let a2 = a.clone();
    let (right, right_count) = counted(move || Ok(a2.get()? * 10));
    let (l, r) = (left.clone(), right.clone());
    let (bottom, bottom_count) = counted(move || Ok(l.get()? + r.get()?));

    // Observe invalidations of the bottom slot through a plain follower.
    let follower = Slot::new(0_i64);
    connect(&bottom, &follower).unwrap();
    assert_eq!(follower.get().unwrap(), 12);

    for value in 2..6 {
        a.set(value).unwrap();
        assert!(!follower.is_cache_valid());
    }
    assert_eq!(bottom_count.load(Ordering::SeqCst), 1);

    assert_eq!(follower.get().unwrap(), 5 + 1 + 50);
    assert_eq!(left_count.load(Ordering::SeqCst), 2);
    assert_eq!(right_count.load(Ordering::SeqCst), 2);
    assert_eq!(bottom_count.load(Ordering::SeqCst), 2);

    let snapshot = GraphSnapshot::collect(&[a.erase()]);
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.verify().is_empty());
}

/// Keeps two slots equal and counts how often the change handler runs.
struct Twins {
    first: Participant<i64>,
    second: Participant<i64>,
    visits: Arc<AtomicI32>,
}

impl DependencyController for Twins {
    fn slot_changed(&self, changed: usize) -> Result<()> {
        self.visits.fetch_add(1, Ordering::SeqCst);
        match changed {
            0 => self.second.assign(self.first.peek()?),
            _ => self.first.assign(self.second.peek()?),
        }
        Ok(())
    }

    fn update_all(&self) -> Result<()> {
        if !self.second.is_valid() {
            self.second.assign(self.first.peek()?);
        }
        Ok(())
    }
}

/// A plain slot reached through both arms of a diamond handles the change
/// once. Plain slots never go stale, so only the walk bounds them.
#[test]
fn diamond_reaches_plain_dependent_once() {
    init_tracing();
    let a = Slot::new(1_i64);
    let a1 = a.clone();
    let (left, _) = counted(move || Ok(a1.get()? + 1));
    let a2 = a.clone();
    let (right, _) = counted(move || Ok(a2.get()? * 10));

    let joined = Slot::new(0_i64);
    let twin = Slot::new(0_i64);
    let visits = Arc::new(AtomicI32::new(0));
    let controller = Twins {
        first: Participant::new(&joined),
        second: Participant::new(&twin),
        visits: visits.clone(),
    };
    let _group = DependencyGroup::new("twins", controller, vec![joined.erase(), twin.erase()]).unwrap();
    left.add_dependent(&joined.erase()).unwrap();
    right.add_dependent(&joined.erase()).unwrap();

    for value in 2..5 {
        assert_eq!(left.get().unwrap(), value);
        assert_eq!(right.get().unwrap(), (value - 1) * 10);
        visits.store(0, Ordering::SeqCst);

        a.set(value).unwrap();
        assert_eq!(visits.load(Ordering::SeqCst), 1);
    }
}

/// Dependent edges between plain slots cannot close a loop.
#[test]
fn plain_dependent_loop_is_rejected() {
    let a = Slot::new(0_i64);
    let b = Slot::new(0_i64);
    a.add_dependent(&b.erase()).unwrap();

    assert!(matches!(
        b.add_dependent(&a.erase()),
        Err(SlotError::CyclicConnection { .. })
    ));
    a.set(1).unwrap();
    b.set(2).unwrap();
    assert_eq!(a.get().unwrap(), 1);
}

/// Setting a controller never runs a dependent's compute callback.
#[test]
fn evaluation_is_lazy() {
    let a = Slot::new(1_i64);
    let a1 = a.clone();
    let (doubled, count) = counted(move || Ok(a1.get()? * 2));

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(doubled.get().unwrap(), 2);

    for value in 0..10 {
        a.set(value).unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(doubled.get().unwrap(), 18);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

/// A + B computed lazily, without explicit invalidation.
#[test]
fn procedural_sum_scenario() {
    let a = Slot::new(0_i64);
    let b = Slot::new(0_i64);
    let (x, y) = (a.clone(), b.clone());
    let c = Slot::procedural(move || Ok(x.get()? + y.get()?));

    a.set(2).unwrap();
    b.set(3).unwrap();
    assert_eq!(c.get().unwrap(), 5);

    a.set(10).unwrap();
    assert_eq!(c.get().unwrap(), 13);
}

/// Three linked values: `sum = a + b`, with `a` kept when `sum` is written.
struct SumController {
    a: Participant<i64>,
    b: Participant<i64>,
    sum: Participant<i64>,
    handled: Arc<[AtomicI32; 3]>,
}

impl DependencyController for SumController {
    fn slot_changed(&self, changed: usize) -> Result<()> {
        self.handled[changed].fetch_add(1, Ordering::SeqCst);
        match changed {
            0 => self.b.assign(self.sum.peek()? - self.a.peek()?),
            _ => self.sum.assign(self.a.peek()? + self.b.peek()?),
        }
        Ok(())
    }

    fn update_all(&self) -> Result<()> {
        if !self.b.is_valid() || !self.a.is_valid() {
            self.b.assign(self.sum.peek()? - self.a.peek()?);
            self.a.assign(self.a.peek()?);
        }
        Ok(())
    }
}

/// An external write runs the group's handler once and never re-enters it
/// through the siblings' notifications.
#[test]
fn interdependency_has_no_loop() {
    init_tracing();
    let sum = Slot::new(10_i64);
    let a = Slot::new(4_i64);
    let b = Slot::new(0_i64);
    let handled: Arc<[AtomicI32; 3]> = Arc::new(Default::default());
    let controller = SumController {
        a: Participant::new(&a),
        b: Participant::new(&b),
        sum: Participant::new(&sum),
        handled: handled.clone(),
    };
    let group = DependencyGroup::new(
        "sum",
        controller,
        vec![sum.erase(), a.erase(), b.erase()],
    )
    .unwrap();
    assert_eq!(group.len(), 3);
    assert_eq!(b.get().unwrap(), 6);

    // Dependents of every participant see the change.
    let sum_follower = Slot::new(0_i64);
    let b_follower = Slot::new(0_i64);
    connect(&sum, &sum_follower).unwrap();
    connect(&b, &b_follower).unwrap();
    assert_eq!(sum_follower.get().unwrap(), 10);
    assert_eq!(b_follower.get().unwrap(), 6);

    a.set(5).unwrap();
    assert_eq!(handled[1].load(Ordering::SeqCst), 1);
    assert_eq!(handled[0].load(Ordering::SeqCst), 0);
    assert_eq!(handled[2].load(Ordering::SeqCst), 0);
    assert_eq!(sum.get().unwrap(), 11);
    assert_eq!(sum_follower.get().unwrap(), 11);

    sum.set(20).unwrap();
    assert_eq!(handled[0].load(Ordering::SeqCst), 1);
    assert_eq!(handled[1].load(Ordering::SeqCst), 1);
    assert_eq!(b.get().unwrap(), 15);
    assert_eq!(b_follower.get().unwrap(), 15);
}

/// Transform and position stay in sync both ways.
#[test]
fn transform_position_scenario() {
    let transform = Slot::new(Mat4::IDENTITY);
    let pos = Slot::new(Vec3::ZERO);
    let group = TransformGroup::builder(&transform)
        .label("cube")
        .position(&pos)
        .bind()
        .unwrap();
    assert_eq!(group.group().label(), "cube");

    pos.set(Vec3::new(1.0, 2.0, 3.0)).unwrap();
    assert_eq!(transform.get().unwrap().translation(), Vec3::new(1.0, 2.0, 3.0));

    let t = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
    transform.set(t).unwrap();
    assert_eq!(pos.get().unwrap(), Vec3::new(4.0, 5.0, 6.0));
}

/// A written sub-slot reads back, and the master reflects the merge.
#[test]
fn subslot_round_trip() {
    let master = Slot::new(Vec3::new(1.0, 2.0, 3.0));
    let mut views = SubSlots::new(&master);
    let x = views.writable(|v: &Vec3| v.x, |v, x| v.x = *x).unwrap();
    let yz = views
        .writable(
            |v: &Vec3| [v.y, v.z].to_vec(),
            |v: &mut Vec3, yz: &Vec<f64>| {
                v.y = yz[0];
                v.z = yz[1];
            },
        )
        .unwrap();
    let _group = views.bind().unwrap();

    x.set(9.0).unwrap();
    assert_eq!(x.get().unwrap(), 9.0);
    assert_eq!(master.get().unwrap(), Vec3::new(9.0, 2.0, 3.0));

    yz.set(vec![7.0, 8.0]).unwrap();
    assert_eq!(master.get().unwrap(), Vec3::new(9.0, 7.0, 8.0));

    master.set(Vec3::new(-1.0, -2.0, -3.0)).unwrap();
    assert_eq!(x.get().unwrap(), -1.0);
    assert_eq!(yz.get().unwrap(), vec![-2.0, -3.0]);
}

/// A read-only view rejects writes and leaves the master alone.
#[test]
fn read_only_subslot_rejects_writes() {
    let master = Slot::new(Vec3::new(1.0, 2.0, 3.0));
    let views = SubSlots::new(&master);
    let length = views.read_only(|v: &Vec3| v.length());

    let err = length.set(0.0).unwrap_err();
    assert!(matches!(err, SlotError::ReadOnlyViolation { .. }));
    assert_eq!(master.get().unwrap(), Vec3::new(1.0, 2.0, 3.0));

    master.set(Vec3::new(3.0, 4.0, 0.0)).unwrap();
    assert_eq!(length.get().unwrap(), 5.0);
}

/// Connecting slots of different types fails.
#[test]
fn type_mismatch_on_erased_connect() {
    let a = Slot::new(1_i64);
    let b = Slot::new(Mat4::IDENTITY);
    let err = connect_any(&a.erase(), &b.erase()).unwrap_err();
    assert_eq!(
        err,
        SlotError::TypeMismatch {
            expected: ValueKind::Int,
            found: ValueKind::Mat4,
        }
    );
    assert!(!b.has_controller());

    let err = b.erase().downcast::<i64>().unwrap_err();
    assert!(matches!(err, SlotError::TypeMismatch { .. }));
}

/// A dropped controller leaves its dependents with their last value.
#[test]
fn dropping_a_slot_detaches_it() {
    let follower = Slot::new(0_i64);
    let reader = {
        let source = Slot::new(3_i64);
        connect(&source, &follower).unwrap();
        let f = follower.clone();
        let reader = Slot::procedural(move || f.get());
        assert_eq!(reader.get().unwrap(), 3);
        reader
    };

    assert!(!follower.has_controller());
    assert_eq!(follower.get().unwrap(), 3);
    follower.set(4).unwrap();
    assert_eq!(reader.get().unwrap(), 4);
}

/// Stepping the clock invalidates everything downstream of time.
#[test]
fn clock_step_cascade() {
    init_tracing();
    let clock = Clock::new(&EngineConfig::from_json_str(r#"{ "clock": { "step": 0.25 } }"#).unwrap()).unwrap();
    let time = clock.time();
    let (position, count) = counted(move || Ok(Vec3::new(time.get()? * 4.0, 0.0, 0.0)));
    let ticks = Arc::new(AtomicI32::new(0));
    let t = ticks.clone();
    clock.on_frame_step().subscribe(move |_| {
        t.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(position.get().unwrap(), Vec3::ZERO);
    clock.step().unwrap();
    clock.step().unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(position.get().unwrap(), Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

declare_slots! {
    /// A light with animatable intensity.
    struct Light {
        intensity: f64 = 1.0,
        color: Vec3 = Vec3::ONE,
    }
}

/// Declared slots are reachable by name and by accessor.
#[test]
fn declared_component_slots() {
    let light = Light::new("key");
    let names: Vec<_> = light.component().slot_names().collect();
    assert_eq!(names, ["intensity", "color"]);

    let clock = Clock::new(&EngineConfig::default()).unwrap();
    let flicker = {
        let time = clock.time();
        Slot::procedural(move || Ok(1.0 + time.get()?))
    };
    let intensity = light.component().slot_as::<f64>("intensity").unwrap();
    connect(&flicker, &intensity).unwrap();

    clock.seek(2.0).unwrap();
    assert_eq!(light.intensity().get().unwrap(), 3.0);
    assert_eq!(light.color().get().unwrap(), Vec3::ONE);
}
