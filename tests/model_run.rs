use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use spill_common::{ElementStatus, Vec3};
use spill_engine::{
    CacheError, LandWaterMap, Model, ModelError, Mover, PointRelease, PolygonMap, RandomMover, SimpleMover,
    SpillContainer, StepOutcome, WaterWorld, WindMover, WindSeries,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 2, 13).unwrap().and_hms_opt(9, 0, 0).unwrap()
}

fn hour_model() -> Model {
    Model::with_clock(t0(), 900u32, Duration::hours(1)).unwrap()
}

/// Moves every element by a fixed vector and counts how often it is asked.
struct ConstantMover {
    name: String,
    delta: Vec3,
    calls: Arc<AtomicUsize>,
}

impl ConstantMover {
    fn new(name: &str, delta: Vec3) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mover = ConstantMover {
            name: name.to_string(),
            delta,
            calls: Arc::clone(&calls),
        };
        (mover, calls)
    }
}

impl Mover for ConstantMover {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_move(&self, sc: &SpillContainer, _time_step: f64, _model_time: NaiveDateTime) -> anyhow::Result<Vec<Vec3>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.delta; sc.num_elements()])
    }
}

#[test]
fn fifteen_minute_steps_over_one_hour() {
    let mut model = hour_model();
    assert_eq!(model.num_time_steps(), 4);
    let outcomes: Vec<StepOutcome> = (0..5).map(|_| model.step().unwrap()).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Advanced(0),
            StepOutcome::Advanced(1),
            StepOutcome::Advanced(2),
            StepOutcome::Advanced(3),
            StepOutcome::Finished,
        ]
    );
}

#[test]
fn clock_is_monotonic_from_a_fresh_rewind() {
    let mut model = Model::with_clock(t0(), 600u32, Duration::hours(3)).unwrap();
    model.rewind();
    for n in 1..=10i64 {
        model.step().unwrap();
        assert_eq!(model.current_step(), n - 1);
        assert_eq!(model.model_time(), t0() + Duration::seconds((n - 1) * 600));
    }
}

#[test]
fn finished_run_stays_finished() {
    let mut model = hour_model();
    while let StepOutcome::Advanced(_) = model.step().unwrap() {}
    let index = model.current_step();
    for _ in 0..3 {
        assert_eq!(model.step().unwrap(), StepOutcome::Finished);
        assert_eq!(model.current_step(), index);
    }
}

#[test]
fn rewind_is_idempotent() {
    let mut model = hour_model();
    model.set_uncertain(true);
    model.add_spill(PointRelease::new("s", 10, Vec3::zero(), t0())).unwrap();
    model.step().unwrap();
    model.step().unwrap();

    model.rewind();
    let once = (model.current_step(), model.model_time(), model.spills().snapshots());
    model.rewind();
    let twice = (model.current_step(), model.model_time(), model.spills().snapshots());
    assert_eq!(once, twice);
    assert_eq!(once.0, -1);
    assert_eq!(once.1, t0());
    assert!(model.spills().items().all(|sc| sc.is_empty()));
}

#[test]
fn two_movers_compose_exactly() {
    let start = Vec3::new(-72.4, 41.2, 0.0);
    let d1 = Vec3::new(0.001, -0.0005, 0.0);
    let d2 = Vec3::new(0.0003, 0.0007, 1.5);
    let mut model = hour_model();
    model.add_spill(PointRelease::new("s", 5, start, t0())).unwrap();
    let (m1, _) = ConstantMover::new("one", d1);
    let (m2, _) = ConstantMover::new("two", d2);
    model.add_mover(m1);
    model.add_mover(m2);

    model.step().unwrap();
    model.step().unwrap();
    let expected = (start + d1) + d2;
    assert!(model.spills().certain().positions.iter().all(|p| *p == expected));
}

#[test]
fn empty_population_is_never_moved() {
    let mut model = hour_model();
    model.set_uncertain(true);
    model.add_spill(PointRelease::new("late", 20, Vec3::zero(), t0() + Duration::days(1))).unwrap();
    let (mover, calls) = ConstantMover::new("counting", Vec3::new(1.0, 0.0, 0.0));
    model.add_mover(mover);

    let mut steps = model.steps();
    while let Some(step) = steps.next() {
        step.unwrap();
        assert!(model_is_empty_after_step(steps.model()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

fn model_is_empty_after_step(model: &Model) -> bool {
    model.spills().items().all(|sc| sc.num_elements() == 0)
}

#[test]
fn disabled_cache_has_nothing_to_load() {
    let mut model = hour_model();
    model.add_spill(PointRelease::new("s", 3, Vec3::zero(), t0())).unwrap();
    model.add_mover(SimpleMover::new(Vec3::new(0.2, 0.0, 0.0)));
    for _ in 0..3 {
        model.step().unwrap();
    }
    for step in 0..3 {
        assert!(matches!(
            model.cache().load_timestep(step),
            Err(CacheError::NotAvailable { step: s }) if s == step
        ));
    }
    let live = &model.spills().certain().positions;
    assert_eq!(live.len(), 3);
    assert!(live.iter().all(|p| p.x > 0.0));
}

#[test]
fn disabling_the_cache_mid_run_hides_earlier_steps() {
    let mut model = hour_model();
    model.set_cache_enabled(true);
    model.add_spill(PointRelease::new("s", 3, Vec3::zero(), t0())).unwrap();
    model.step().unwrap();
    assert!(model.cache().load_timestep(0).is_ok());

    model.set_cache_enabled(false);
    model.step().unwrap();
    model.step().unwrap();
    for step in 0..3 {
        assert!(matches!(
            model.cache().load_timestep(step),
            Err(CacheError::NotAvailable { step: s }) if s == step
        ));
    }
}

#[test]
fn cached_step_matches_the_live_population() {
    let mut model = hour_model();
    model.set_uncertain(true);
    model.set_cache_enabled(true);
    model.add_spill(PointRelease::new("s", 25, Vec3::new(-72.0, 41.0, 0.0), t0()).with_seed(11)).unwrap();
    model.add_mover(RandomMover::default().with_seed(5));
    model.add_mover(WindMover::new(WindSeries::constant(8.0, 270.0)).with_seed(9));

    let mut live = Vec::new();
    while let StepOutcome::Advanced(step) = model.step().unwrap() {
        live.push((step, model.spills().snapshots()));
    }
    for (step, populations) in live {
        let cached = model.cache().load_timestep(step).unwrap();
        assert_eq!(cached.step, step);
        assert_eq!(cached.populations, populations);
    }
}

#[test]
fn replaying_a_run_reproduces_it() {
    let mut model = Model::with_clock(t0(), 900u32, Duration::hours(6)).unwrap();
    model.set_uncertain(true);
    model.set_cache_enabled(true);
    model.add_spill(
        PointRelease::new("s", 40, Vec3::new(-72.0, 41.0, 0.0), t0())
            .with_end_release_time(t0() + Duration::hours(2))
            .with_seed(2),
    )
    .unwrap();
    model.add_mover(RandomMover::default().with_seed(3));
    model.add_mover(WindMover::new(WindSeries::constant(10.0, 45.0)).with_seed(4));

    model.steps().for_each(|s| {
        s.unwrap();
    });
    let first: Vec<_> = model.cache().iter().cloned().collect();
    model.steps().for_each(|s| {
        s.unwrap();
    });
    let second: Vec<_> = model.cache().iter().cloned().collect();
    assert_eq!(first.len(), 24);
    assert_eq!(first, second);
}

#[test]
fn setters_always_rewind() {
    let mut model = hour_model();
    let advance = |model: &mut Model| {
        model.step().unwrap();
        model.step().unwrap();
        assert_eq!(model.current_step(), 1);
    };

    advance(&mut model);
    model.set_time_step(Duration::minutes(10)).unwrap();
    assert_eq!(model.current_step(), -1);

    advance(&mut model);
    model.set_start_time(t0() - Duration::hours(1));
    assert_eq!(model.current_step(), -1);

    advance(&mut model);
    model.set_duration(Duration::minutes(40)).unwrap();
    assert_eq!(model.current_step(), -1);

    advance(&mut model);
    model.set_map(Box::new(WaterWorld::default()));
    assert_eq!(model.current_step(), -1);

    advance(&mut model);
    model.set_uncertain(true);
    assert_eq!(model.current_step(), -1);
}

#[test]
fn runs_shorter_than_one_step_are_rejected() {
    assert!(matches!(
        Model::with_clock(t0(), 900u32, Duration::minutes(10)),
        Err(ModelError::Configuration(_))
    ));

    let mut model = hour_model();
    model.step().unwrap();
    model.step().unwrap();
    assert!(matches!(model.set_duration(Duration::minutes(10)), Err(ModelError::Configuration(_))));
    assert!(matches!(model.set_time_step(Duration::hours(2)), Err(ModelError::Configuration(_))));
    assert_eq!(model.duration(), Duration::hours(1));
    assert_eq!(model.time_step(), 900.0);
    assert_eq!(model.current_step(), 1);
    assert_eq!(model.step().unwrap(), StepOutcome::Advanced(2));
}

#[test]
fn failing_map_reports_the_hook_and_keeps_the_clock() {
    struct BrokenMap;

    impl LandWaterMap for BrokenMap {
        fn bounds(&self) -> ((f64, f64), (f64, f64)) {
            ((-180.0, -90.0), (180.0, 90.0))
        }

        fn on_land(&self, _p: Vec3) -> bool {
            false
        }

        fn refloat_elements(&mut self, _sc: &mut SpillContainer, _time_step: f64) -> anyhow::Result<()> {
            Ok(())
        }

        fn beach_elements(&mut self, _sc: &mut SpillContainer) -> anyhow::Result<()> {
            anyhow::bail!("coastline unavailable")
        }
    }

    let mut model = hour_model();
    model.set_map(Box::new(BrokenMap));
    model.add_spill(PointRelease::new("s", 1, Vec3::zero(), t0())).unwrap();
    model.step().unwrap();
    let err = model.step().unwrap_err();
    assert!(matches!(err, ModelError::Collaborator { ref collaborator, .. } if collaborator == "map"));
    assert!(err.to_string().contains("beach_elements"));
    assert_eq!(model.current_step(), 0);
}

#[test]
fn steps_iterator_stops_after_an_error() {
    struct Failing;

    impl Mover for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn prepare_for_model_step(&mut self, _sc: &SpillContainer, _dt: f64, _t: NaiveDateTime) -> anyhow::Result<()> {
            anyhow::bail!("no data for this time")
        }

        fn get_move(&self, sc: &SpillContainer, _dt: f64, _t: NaiveDateTime) -> anyhow::Result<Vec<Vec3>> {
            Ok(vec![Vec3::zero(); sc.num_elements()])
        }
    }

    let mut model = hour_model();
    model.add_mover(Failing);
    let results: Vec<_> = model.steps().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(model.current_step(), 0);
}

#[test]
fn current_drives_elements_onto_land() {
    let land = vec![(0.02, -1.0), (1.0, -1.0), (1.0, 1.0), (0.02, 1.0)];
    let map = PolygonMap::new(((-1.0, -1.0), (1.0, 1.0)), vec![land]).with_refloat_halflife(f64::INFINITY);
    let mut model = Model::with_clock(t0(), 900u32, Duration::hours(6)).unwrap();
    model.set_map(Box::new(map));
    model.add_spill(PointRelease::new("s", 4, Vec3::zero(), t0())).unwrap();
    model.add_mover(SimpleMover::new(Vec3::new(1.0, 0.0, 0.0)));

    for step in model.steps() {
        step.unwrap();
    }
    let sc = model.spills().certain();
    assert!(sc.status_codes.iter().all(|s| *s == ElementStatus::OnLand));
    assert!(sc.positions.iter().all(|p| p.x < 0.02 && p.x > 0.0));
    assert!(sc.positions.iter().all(|p| !model.map().on_land(*p)));
}

proptest! {
    #[test]
    fn num_time_steps_tracks_clock_setters(
        dt in 1u32..3600,
        hours in 1i64..240,
        new_dt in 1u32..3600,
        new_hours in 1i64..240,
    ) {
        let mut model = Model::with_clock(t0(), dt, Duration::hours(hours)).unwrap();
        prop_assert_eq!(model.num_time_steps(), hours * 3600 / dt as i64);
        model.set_time_step(new_dt).unwrap();
        prop_assert_eq!(model.num_time_steps(), hours * 3600 / new_dt as i64);
        model.set_duration(Duration::hours(new_hours)).unwrap();
        prop_assert_eq!(model.num_time_steps(), new_hours * 3600 / new_dt as i64);
        model.set_start_time(t0() + Duration::days(3));
        prop_assert_eq!(model.num_time_steps(), new_hours * 3600 / new_dt as i64);
    }
}
