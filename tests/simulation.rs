//! 仿真内核的行为性质测试：守恒、优先级、冲突概率、维度累加、抑制弧、时间上限等。
use RustSPN::net::guard::NetView;
use RustSPN::net::*;
use RustSPN::sim::{EventType, Outcome, SimError, SimulationOptions, replicate, simulate};

fn options(max_time: f64, seed: u64) -> SimulationOptions {
    SimulationOptions::new(max_time).with_seed(seed).with_protocol()
}

#[test]
fn firing_conserves_multiplicities_and_fork() {
    let mut net = Net::empty();
    let src = net.add_place(Place::new("src", 3)).unwrap();
    let dst = net.add_place(Place::new("dst", 0)).unwrap();
    let split = net
        .add_transition(Transition::timed("split", DelayDistribution::deterministic(1.0)).with_fork(3))
        .unwrap();
    net.add_input_arc(src, split, 2).unwrap();
    net.add_output_arc(split, dst, 1).unwrap();

    let report = simulate(&mut net, &options(10.0, 1)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::Deadlock));
    assert_eq!(report.fire_counts["split"], 1);
    let record = &report.events.as_ref().unwrap().records()[0];
    assert_eq!((record.consumed, record.produced), (2, 3));
    assert_eq!(net.tokens(src).unwrap(), 1);
    assert_eq!(net.tokens(dst).unwrap(), 3);
    assert_eq!(report.tokens_issued, 6);
}

#[test]
fn immediate_transitions_win_without_advancing_the_clock() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 1)).unwrap();
    let q = net.add_place(Place::new("q", 0)).unwrap();
    let timed = net
        .add_transition(Transition::timed("timed", DelayDistribution::deterministic(0.0)))
        .unwrap();
    let instant = net.add_transition(Transition::immediate("instant", 0.01)).unwrap();
    for t in [timed, instant] {
        net.add_input_arc(p, t, 1).unwrap();
        net.add_output_arc(t, q, 1).unwrap();
    }

    let report = simulate(&mut net, &options(5.0, 3)).unwrap();
    assert_eq!(report.fire_counts["instant"], 1);
    assert_eq!(report.fire_counts["timed"], 0);
    let record = &report.events.as_ref().unwrap().records()[0];
    assert_eq!(record.clock, 0.0);
}

fn coin_net() -> Result<Net, NetError> {
    let mut net = Net::empty();
    let coin = net.add_place(Place::new("coin", 1))?;
    let heads = net.add_place(Place::new("heads", 0))?;
    let tails = net.add_place(Place::new("tails", 0))?;
    let h = net.add_transition(Transition::immediate("h", 1.0))?;
    let t = net.add_transition(Transition::immediate("t", 1.0))?;
    net.add_input_arc(coin, h, 1)?;
    net.add_input_arc(coin, t, 1)?;
    net.add_output_arc(h, heads, 1)?;
    net.add_output_arc(t, tails, 1)?;
    Ok(net)
}

#[test]
fn equal_weights_split_evenly() {
    let trials = 10_000;
    let reports = replicate(coin_net, trials, &SimulationOptions::new(1.0).with_seed(2024)).unwrap();
    let heads = reports.iter().filter(|r| r.fire_counts["h"] == 1).count();
    assert!(reports.iter().all(|r| r.total_firings() == 1));
    let share = heads as f64 / trials as f64;
    assert!((share - 0.5).abs() <= 0.02, "heads share {share}");
}

#[test]
fn replications_are_reproducible() {
    let build = || -> Result<Net, NetError> {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1))?;
        let t = net.add_transition(Transition::timed("t", DelayDistribution::exponential(2.0)))?;
        net.add_input_arc(p, t, 1)?;
        net.add_output_arc(t, p, 1)?;
        Ok(net)
    };
    let opts = SimulationOptions::new(50.0).with_seed(9);
    let a = replicate(build, 4, &opts).unwrap();
    let b = replicate(build, 4, &opts).unwrap();
    assert_eq!(a, b);
    assert_eq!(a[0].seed, Some(9));
    assert_eq!(a[3].seed, Some(12));
}

#[test]
fn rate_accrual_never_decreases() {
    let mut net = Net::new(NetConfig::with_dimensions(["Energy", "Scrap"]));
    let ready = net.add_place(Place::new("ready", 2)).unwrap();
    net.add_place(Place::dimension("energy", "Energy", 0.0)).unwrap();
    let press = net
        .add_transition(
            Transition::timed("press", DelayDistribution::exponential(1.5))
                .with_capacity(2)
                .with_dimension_change("Energy", ChangeKind::Rate, 0.75)
                .with_dimension_change("Scrap", ChangeKind::Fixed, 0.1),
        )
        .unwrap();
    net.add_input_arc(ready, press, 1).unwrap();
    net.add_output_arc(press, ready, 1).unwrap();

    let report = simulate(&mut net, &options(40.0, 11)).unwrap();
    let records = report.events.as_ref().unwrap().records();
    assert!(!records.is_empty());
    for pair in records.windows(2) {
        for (dimension, value) in &pair[0].dimensions {
            assert!(pair[1].dimensions[dimension] >= *value);
        }
    }
    // two tokens in `ready` keep two instances active the whole run
    assert!((report.dimension_totals["Energy"] - 0.75 * 2.0 * 40.0).abs() < 1e-9);
    assert!((report.place_dimensions["Energy"] - report.dimension_totals["Energy"]).abs() < 1e-9);
}

#[test]
fn shifted_weibull_never_fires_before_its_location() {
    for seed in 0..200 {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1)).unwrap();
        let t = net
            .add_transition(Transition::timed("arrive", DelayDistribution::weibull(0.966, 0.198, 9.45)))
            .unwrap();
        net.add_input_arc(p, t, 1).unwrap();
        let report = simulate(&mut net, &options(100.0, seed)).unwrap();
        let fired = report.events.as_ref().unwrap().firings_of("arrive").next().unwrap().clock;
        assert!(fired >= 9.45, "seed {seed} fired at {fired}");
    }
}

#[test]
fn negative_samples_abort_the_run() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 1)).unwrap();
    let t = net
        .add_transition(Transition::timed("t", DelayDistribution::normal(-5.0, 0.1)))
        .unwrap();
    net.add_input_arc(p, t, 1).unwrap();
    let err = simulate(&mut net, &options(10.0, 0)).unwrap_err();
    assert!(matches!(err, SimError::InvalidDistributionParameters { ref transition, .. } if transition == "t"));
}

#[test]
fn inhibitor_arcs_block_at_threshold() {
    let mut net = Net::empty();
    let blocker = net.add_place(Place::new("blocker", 1)).unwrap();
    let job = net.add_place(Place::new("job", 1)).unwrap();
    let done = net.add_place(Place::new("done", 0)).unwrap();
    let blocked = net
        .add_transition(Transition::timed("blocked", DelayDistribution::deterministic(1.0)))
        .unwrap();
    net.add_input_arc(job, blocked, 1).unwrap();
    net.add_inhibitor_arc(blocker, blocked, 1).unwrap();
    net.add_output_arc(blocked, done, 1).unwrap();
    let report = simulate(&mut net, &options(10.0, 0)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::Deadlock));
    assert_eq!(report.fire_counts["blocked"], 0);

    let mut net = Net::empty();
    let blocker = net.add_place(Place::new("blocker", 1)).unwrap();
    let job = net.add_place(Place::new("job", 1)).unwrap();
    let passes = net
        .add_transition(Transition::timed("passes", DelayDistribution::deterministic(1.0)))
        .unwrap();
    net.add_input_arc(job, passes, 1).unwrap();
    net.add_inhibitor_arc(blocker, passes, 2).unwrap();
    let report = simulate(&mut net, &options(10.0, 0)).unwrap();
    assert_eq!(report.fire_counts["passes"], 1);
}

#[test]
fn guards_see_the_current_marking() {
    let mut net = Net::empty();
    let src = net.add_place(Place::new("src", 1)).unwrap();
    let done = net.add_place(Place::new("done", 0)).unwrap();
    let produce = net
        .add_transition(
            Transition::timed("produce", DelayDistribution::deterministic(1.0))
                .with_guard(move |view: &NetView<'_>| view.tokens(done).unwrap_or(0) < 3),
        )
        .unwrap();
    net.add_input_arc(src, produce, 1).unwrap();
    net.add_output_arc(produce, src, 1).unwrap();
    net.add_output_arc(produce, done, 1).unwrap();

    let report = simulate(&mut net, &options(100.0, 0)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::Deadlock));
    assert_eq!(report.fire_counts["produce"], 3);
    assert_eq!(report.clock, 3.0);
}

#[test]
fn zero_horizon_runs_no_timed_transition() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 1)).unwrap();
    let t = net
        .add_transition(Transition::timed("t", DelayDistribution::exponential(1.0)))
        .unwrap();
    net.add_input_arc(p, t, 1).unwrap();
    let report = simulate(&mut net, &options(0.0, 5)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::TimeLimit));
    assert_eq!(report.clock, 0.0);
    assert_eq!(report.stats.timed_firings, 0);
}

#[test]
fn time_limit_integrates_up_to_the_horizon() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 1)).unwrap();
    net.add_place(Place::dimension("meter", "Energy", 0.0)).unwrap();
    let t = net
        .add_transition(
            Transition::timed("idle", DelayDistribution::deterministic(100.0))
                .with_dimension_change("Energy", ChangeKind::Rate, 1.0),
        )
        .unwrap();
    net.add_input_arc(p, t, 1).unwrap();
    let report = simulate(&mut net, &options(12.5, 0)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::TimeLimit));
    assert_eq!(report.clock, 12.5);
    assert_eq!(report.dimension_totals["Energy"], 12.5);
    assert_eq!(report.transitions["idle"].time_enabled, 12.5);
}

#[test]
fn handicap_shortens_delays() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 1)).unwrap();
    let t = net
        .add_transition(Transition::timed("t", DelayDistribution::deterministic(4.0)).with_handicap(2.0))
        .unwrap();
    net.add_input_arc(p, t, 1).unwrap();
    let report = simulate(&mut net, &options(10.0, 0)).unwrap();
    assert_eq!(report.clock, 2.0);
}

#[test]
fn join_waits_for_enough_arrivals() {
    let mut net = Net::empty();
    let source = net.add_place(Place::new("source", 1)).unwrap();
    let parts = net.add_place(Place::new("parts", 0)).unwrap();
    let product = net.add_place(Place::new("product", 0)).unwrap();
    let feed = net
        .add_transition(Transition::timed("feed", DelayDistribution::deterministic(1.0)))
        .unwrap();
    let assemble = net
        .add_transition(Transition::immediate("assemble", 1.0).with_join(3))
        .unwrap();
    net.add_input_arc(source, feed, 1).unwrap();
    net.add_output_arc(feed, source, 1).unwrap();
    net.add_output_arc(feed, parts, 1).unwrap();
    net.add_input_arc(parts, assemble, 1).unwrap();
    net.add_output_arc(assemble, product, 1).unwrap();

    let report = simulate(&mut net, &options(10.0, 0)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::TimeLimit));
    assert_eq!(report.fire_counts["feed"], 10);
    let assembled_at = report
        .events
        .as_ref()
        .unwrap()
        .firings_of("assemble")
        .map(|r| r.clock)
        .collect::<Vec<_>>();
    assert_eq!(assembled_at, [3.0, 6.0, 9.0]);
    assert_eq!(net.tokens(parts).unwrap(), 7);
    assert_eq!(net.tokens(product).unwrap(), 3);
}

#[test]
fn reset_threshold_forces_resampling() {
    let mut net = Net::empty();
    let clock = net.add_place(Place::new("clock", 1)).unwrap();
    let job = net.add_place(Place::new("job", 1)).unwrap();
    let tick = net
        .add_transition(Transition::timed("tick", DelayDistribution::deterministic(1.0)))
        .unwrap();
    let slow = net
        .add_transition(
            Transition::timed("slow", DelayDistribution::deterministic(5.0)).with_reset_threshold(2.0),
        )
        .unwrap();
    net.add_input_arc(clock, tick, 1).unwrap();
    net.add_output_arc(tick, clock, 1).unwrap();
    net.add_input_arc(job, slow, 1).unwrap();

    let report = simulate(&mut net, &options(20.0, 0)).unwrap();
    assert_eq!(report.fire_counts["slow"], 0);
    assert_eq!(report.stats.resets, 10);
    let resets = report
        .events
        .as_ref()
        .unwrap()
        .records()
        .iter()
        .filter(|r| r.event == EventType::Reset)
        .map(|r| r.clock)
        .collect::<Vec<_>>();
    // resets are driven by `slow`'s own deadline, not by `tick`
    assert_eq!(resets, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0]);
    assert!(report.fire_counts["tick"] >= 19);
}

#[test]
fn deadlock_ends_before_the_horizon() {
    let mut net = Net::empty();
    let p = net.add_place(Place::new("p", 2)).unwrap();
    let t = net
        .add_transition(Transition::timed("t", DelayDistribution::deterministic(1.5)))
        .unwrap();
    net.add_input_arc(p, t, 1).unwrap();
    let report = simulate(&mut net, &options(100.0, 0)).unwrap();
    assert_eq!(report.outcome, Some(Outcome::Deadlock));
    assert_eq!(report.clock, 3.0);
    assert_eq!(report.fire_counts["t"], 2);
}

#[test]
fn a_net_runs_only_once() {
    let mut net = coin_net().unwrap();
    simulate(&mut net, &options(1.0, 0)).unwrap();
    assert!(net.has_run());
    let err = simulate(&mut net, &options(1.0, 0)).unwrap_err();
    assert!(matches!(err, SimError::Net(NetError::InvalidOperation(_))));
    let coin = net.place_id("coin").unwrap();
    let h = net.transition_id("h").unwrap();
    assert!(matches!(
        net.add_input_arc(coin, h, 1),
        Err(NetError::InvalidOperation(_))
    ));
    assert!(matches!(
        net.add_place(Place::new("late", 0)),
        Err(NetError::InvalidOperation(_))
    ));
    assert!(matches!(
        net.add_transition(Transition::immediate("late", 1.0)),
        Err(NetError::InvalidOperation(_))
    ));
    assert!(net.place_id("late").is_err());
}
