//! 事件调度器。
//!
//! 状态推进规则：
//! - 瞬时迁移严格优先于定时迁移，按 (权重 × 障碍系数) 加权抽取，时钟不动；
//! - 没有瞬时迁移时，为尚未计时的定时迁移抽样延迟（除以障碍系数），最早的触发时刻获胜，
//!   同一时刻按标签决胜；
//! - 推进时钟前，按 `幅度 × Δt × min(使能度, 容量)` 把速率型维度变化记入迁移表与维度库所；
//! - 强制复位的截止时刻与定时迁移一同竞争，先到者先处理；
//! - 不推进时钟的连续步数受 `max_vanishing_steps` 约束。
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::net::core::{Net, NetError};
use crate::net::distribution::DistributionError;
use crate::net::ids::{ArcId, PlaceId, TransitionId};
use crate::net::structure::{MemoryPolicy, Multiplicity, Transition};
use crate::report::SimulationReport;
use crate::sim::conflict::{self, ImmediateCandidate, TimedCandidate};
use crate::sim::dimension::DimensionAccumulator;
use crate::sim::dwell::DurationTracker;
use crate::sim::event_log::{EventLog, EventRecord, EventType, TransitionClass};
use crate::sim::{Outcome, SimError, SimulationOptions, Verbosity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub steps: u64,
    pub immediate_firings: u64,
    pub timed_firings: u64,
    pub resets: u64,
}

enum TimedEvent {
    Fire(TransitionId),
    Reset(TransitionId),
}

pub struct EventScheduler<'a> {
    net: &'a mut Net,
    options: SimulationOptions,
    rng: StdRng,
    dimensions: DimensionAccumulator,
    dwell: DurationTracker,
    events: Option<EventLog>,
    stats: RunStats,
    vanishing_streak: usize,
    outcome: Option<Outcome>,
}

impl<'a> EventScheduler<'a> {
    /// Claims `net` for a single run. Fails if the net has been simulated before
    /// or its configuration is incomplete.
    pub fn new(net: &'a mut Net, options: &SimulationOptions) -> Result<Self, SimError> {
        if net.has_run() {
            return Err(NetError::InvalidOperation(
                "the net has already been simulated; build a fresh instance".to_string(),
            )
            .into());
        }
        if options.max_time.is_nan() || options.max_time < 0.0 {
            return Err(SimError::InvalidConfiguration(format!(
                "max_time must be non-negative, got {}",
                options.max_time
            )));
        }
        net.validate()?;
        net.log_diagnostics();

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let run = net.run_mut();
        run.started = true;
        run.clock = 0.0;

        let mut scheduler = Self {
            net,
            options: options.clone(),
            rng,
            dimensions: DimensionAccumulator::new(),
            dwell: DurationTracker::new(),
            events: options.protocol.then(EventLog::new),
            stats: RunStats::default(),
            vanishing_streak: 0,
            outcome: None,
        };
        scheduler.prime();
        Ok(scheduler)
    }

    pub fn clock(&self) -> f64 {
        self.net.clock()
    }

    pub fn net(&self) -> &Net {
        self.net
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn dimensions(&self) -> &DimensionAccumulator {
        &self.dimensions
    }

    pub fn dwell(&self) -> &DurationTracker {
        &self.dwell
    }

    pub fn events(&self) -> Option<&EventLog> {
        self.events.as_ref()
    }

    /// Initial tokens count as arrivals at time zero.
    fn prime(&mut self) {
        let tracked = self
            .net
            .places()
            .filter(|(_, p)| p.dwell_tracked && !p.is_dimension_holder())
            .map(|(id, p)| (id, p.marking()))
            .collect::<Vec<_>>();
        for (place, count) in tracked {
            for _ in 0..count {
                self.dwell.enter(place, 0.0);
            }
        }

        for t in self.net.transition_ids() {
            let transition = self.net.transition_at(t);
            if transition.join == 0 {
                continue;
            }
            let arrivals = transition
                .input_arcs()
                .iter()
                .map(|&a| self.net.arc_at(a).place)
                .unique()
                .filter(|&p| self.net.place_at(p).marking() > 0)
                .count() as u32;
            self.net.transition_state_mut(t).clock.join_arrivals = arrivals;
        }

        self.evaluate_enabling();
        if self.options.verbosity >= Verbosity::Summary {
            log::info!(
                "simulation started: {} places, {} transitions, horizon {}",
                self.net.places_len(),
                self.net.transitions_len(),
                self.options.max_time
            );
        }
    }

    /// Advances the simulation by one firing. Returns the outcome once the run
    /// has reached a terminal state; further calls keep returning it.
    pub fn step(&mut self) -> Result<Option<Outcome>, SimError> {
        if let Some(outcome) = self.outcome {
            return Ok(Some(outcome));
        }

        let (immediate, timed) = self.enabled_split();

        if !immediate.is_empty() {
            self.count_vanishing()?;
            let chosen = {
                let candidates = immediate
                    .iter()
                    .map(|&id| {
                        let t = self.net.transition_at(id);
                        ImmediateCandidate {
                            id,
                            label: &t.label,
                            weight: t.effective_weight(),
                        }
                    })
                    .collect::<Vec<_>>();
                conflict::choose_immediate(&candidates, &mut self.rng)
            }
            .map_err(|e| SimError::InvalidConfiguration(e.to_string()))?;
            self.fire(chosen)?;
            return Ok(None);
        }

        if timed.is_empty() {
            return Ok(Some(self.finish(Outcome::Deadlock)));
        }
        if self.clock() >= self.options.max_time {
            return Ok(Some(self.finish(Outcome::TimeLimit)));
        }

        self.schedule_timers(&timed)?;
        let firing = {
            let candidates = timed
                .iter()
                .map(|&id| {
                    let t = self.net.transition_at(id);
                    TimedCandidate {
                        id,
                        label: &t.label,
                        firing_time: t.clock.firing_time.unwrap_or(f64::INFINITY),
                    }
                })
                .collect::<Vec<_>>();
            conflict::choose_timed(&candidates).map(|c| (c.id, c.firing_time))
        };
        // a reset due no later than the earliest firing preempts it
        let (event, at) = match (firing, self.next_reset(&timed)) {
            (Some((_, at)), Some((id, deadline))) if deadline <= at => (TimedEvent::Reset(id), deadline),
            (None, Some((id, deadline))) => (TimedEvent::Reset(id), deadline),
            (Some((id, at)), _) => (TimedEvent::Fire(id), at),
            (None, None) => return Ok(Some(self.finish(Outcome::Deadlock))),
        };

        if at > self.options.max_time {
            self.advance_to(self.options.max_time);
            return Ok(Some(self.finish(Outcome::TimeLimit)));
        }

        if at > self.clock() {
            self.vanishing_streak = 0;
            self.advance_to(at);
        } else {
            self.count_vanishing()?;
        }
        match event {
            TimedEvent::Fire(id) => self.fire(id)?,
            TimedEvent::Reset(id) => self.force_reset(id),
        }
        Ok(None)
    }

    /// Counts a step that leaves the clock where it is.
    fn count_vanishing(&mut self) -> Result<(), SimError> {
        self.vanishing_streak += 1;
        if self.vanishing_streak > self.options.max_vanishing_steps {
            return Err(SimError::VanishingLoop {
                clock: self.clock(),
                steps: self.vanishing_streak,
            });
        }
        Ok(())
    }

    /// Earliest reset deadline among `timed`, ties broken by label.
    fn next_reset(&self, timed: &[TransitionId]) -> Option<(TransitionId, f64)> {
        let clock = self.clock();
        timed
            .iter()
            .filter_map(|&id| {
                let t = self.net.transition_at(id);
                let threshold = t.reset_threshold?;
                let deadline = clock + (threshold - t.clock.enabled_since_reset).max(0.0);
                Some((id, deadline, &t.label))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.cmp(b.2)))
            .map(|(id, deadline, _)| (id, deadline))
    }

    /// Runs until a terminal outcome and returns the final report.
    pub fn run(mut self) -> Result<SimulationReport, SimError> {
        while self.step()?.is_none() {}
        Ok(self.report())
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport::collect(self)
    }

    /// Enabled transitions, split into immediate and timed. Immediate
    /// transitions with zero effective weight can never be drawn and are left out.
    fn enabled_split(&self) -> (Vec<TransitionId>, Vec<TransitionId>) {
        self.net
            .transitions()
            .filter(|(_, t)| t.clock.enabled)
            .filter(|(_, t)| !t.is_immediate() || t.effective_weight() > 0.0)
            .map(|(id, t)| (id, t.is_immediate()))
            .partition_map(|(id, immediate)| {
                if immediate {
                    itertools::Either::Left(id)
                } else {
                    itertools::Either::Right(id)
                }
            })
    }

    /// Recomputes enabling for every transition and applies the bookkeeping of
    /// each enable/disable edge.
    fn evaluate_enabling(&mut self) {
        let clock = self.clock();
        let net = &*self.net;
        let verdicts = net
            .transition_ids()
            .map(|t| (t, is_enabled(net, t)))
            .collect::<Vec<_>>();
        for (t, enabled) in verdicts {
            let transition = self.net.transition_state_mut(t);
            match (transition.clock.enabled, enabled) {
                (false, true) => {
                    on_enable(transition, clock);
                    log::debug!("[t={clock:.4}] `{}` enabled", transition.label);
                }
                (true, false) => {
                    on_disable(transition, clock);
                    log::debug!("[t={clock:.4}] `{}` disabled", transition.label);
                }
                _ => {}
            }
        }
    }

    fn schedule_timers(&mut self, timed: &[TransitionId]) -> Result<(), SimError> {
        let clock = self.clock();
        for &id in timed {
            let transition = self.net.transition_at(id);
            if transition.clock.firing_time.is_some() {
                continue;
            }
            let distribution = transition.distribution().ok_or_else(|| {
                NetError::InvalidConfiguration(format!(
                    "timed transition `{}` has no delay distribution",
                    transition.label
                ))
            })?;
            let invalid = |source| SimError::InvalidDistributionParameters {
                transition: transition.label.clone(),
                source,
            };
            let raw = distribution
                .sample(&mut self.rng, self.options.time_unit)
                .map_err(invalid)?;
            let delay = raw / transition.handicap;
            if !delay.is_finite() {
                return Err(invalid(DistributionError::InvalidSample {
                    family: distribution.family.name(),
                    value: delay,
                }));
            }
            log::trace!("[t={clock:.4}] `{}` scheduled after {delay:.4}", transition.label);

            let state = &mut self.net.transition_state_mut(id).clock;
            state.firing_delay = delay;
            state.firing_time = Some(clock + delay);
        }
        Ok(())
    }

    /// Moves the clock to `target`, integrating rate changes of every enabled
    /// timed transition over the interval.
    fn advance_to(&mut self, target: f64) {
        let elapsed = target - self.clock();
        if elapsed <= 0.0 {
            return;
        }
        let net = &*self.net;
        let active = net
            .transitions()
            .filter(|(_, t)| t.clock.enabled && !t.is_immediate())
            .map(|(id, _)| (id, active_instances(net, id)))
            .collect::<Vec<_>>();
        for (t, instances) in active {
            self.dimensions.accrue_rates(self.net, t, elapsed, instances);
            let state = &mut self.net.transition_state_mut(t).clock;
            state.time_enabled += elapsed;
            state.enabled_since_reset += elapsed;
        }
        self.net.run_mut().clock = target;
    }

    fn fire(&mut self, id: TransitionId) -> Result<(), SimError> {
        let clock = self.clock();
        let (label, class, fork, inputs, outputs) = {
            let t = self.net.transition_at(id);
            let endpoints = |arcs: &[ArcId]| {
                arcs.iter()
                    .map(|&a| {
                        let arc = self.net.arc_at(a);
                        (arc.place, arc.multiplicity)
                    })
                    .collect::<Vec<_>>()
            };
            let class = if t.is_immediate() {
                TransitionClass::Immediate
            } else {
                TransitionClass::Timed
            };
            (
                t.label.clone(),
                class,
                Multiplicity::from(t.fork.max(1)),
                endpoints(t.input_arcs()),
                endpoints(t.output_arcs()),
            )
        };

        let mut consumed = 0;
        for (place, multiplicity) in inputs {
            let tracked = self.net.place_at(place).dwell_tracked;
            for _ in 0..multiplicity {
                if self.net.place_mut(place).take_token().is_none() {
                    return Err(NetError::InvalidOperation(format!(
                        "`{label}` fired without enough tokens in `{}`",
                        self.net.place_at(place).label
                    ))
                    .into());
                }
                if tracked {
                    let stay = self.dwell.exit(place, clock);
                    log::trace!("token left `{}` after {stay:.4}", self.net.place_at(place).label);
                }
            }
            consumed += multiplicity;
        }

        // The firing transition starts over: fresh join count and timer.
        {
            let state = &mut self.net.transition_state_mut(id).clock;
            state.fire_count += 1;
            state.join_arrivals = 0;
            state.firing_time = None;
            state.remaining = None;
            state.enabled_since_reset = 0.0;
            if state.enabled {
                state.enabled = false;
                state.disabled_at = Some(clock);
            }
        }

        let mut produced = 0;
        for (place, multiplicity) in outputs {
            let count = multiplicity * fork;
            let tracked = self.net.place_at(place).dwell_tracked;
            for _ in 0..count {
                let token = self.net.issue_token();
                self.net.place_mut(place).put_token(token);
                if tracked {
                    self.dwell.enter(place, clock);
                }
            }
            produced += count;
            self.record_join_arrival(place);
        }

        self.dimensions.apply_fixed(self.net, id);

        self.stats.steps += 1;
        match class {
            TransitionClass::Immediate => self.stats.immediate_firings += 1,
            TransitionClass::Timed => self.stats.timed_firings += 1,
        }
        if self.options.verbosity >= Verbosity::Trace {
            log::info!("[t={clock:.4}] {class:?} `{label}` fired: -{consumed} +{produced}");
        }
        self.record(label, class, EventType::Fire, consumed, produced);

        self.evaluate_enabling();
        Ok(())
    }

    fn record_join_arrival(&mut self, place: PlaceId) {
        let waiting = self
            .net
            .place_at(place)
            .input_arcs()
            .iter()
            .map(|&a| self.net.arc_at(a).transition)
            .unique()
            .filter(|&t| self.net.transition_at(t).join > 0)
            .collect::<Vec<_>>();
        for t in waiting {
            self.net.transition_state_mut(t).clock.join_arrivals += 1;
        }
    }

    /// Force-disables `id` once its enabled time since the last reset reaches
    /// the threshold. It re-enables at once with a fresh timer when still
    /// structurally enabled.
    fn force_reset(&mut self, id: TransitionId) {
        let clock = self.clock();
        let transition = self.net.transition_state_mut(id);
        let state = &mut transition.clock;
        state.enabled = false;
        state.disabled_at = Some(clock);
        state.firing_time = None;
        state.remaining = None;
        state.enabled_since_reset = 0.0;
        state.last_reset = clock;
        let label = transition.label.clone();
        log::debug!("[t={clock:.4}] `{label}` reset");
        self.stats.resets += 1;
        self.record(label, TransitionClass::Timed, EventType::Reset, 0, 0);
        self.evaluate_enabling();
    }

    fn record(&mut self, transition: String, class: TransitionClass, event: EventType, consumed: u64, produced: u64) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        events.push(EventRecord {
            step: self.stats.steps,
            clock: self.net.clock(),
            transition,
            class,
            event,
            consumed,
            produced,
            dimensions: self.dimensions.totals().clone(),
        });
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.outcome = Some(outcome);
        if self.options.verbosity >= Verbosity::Summary {
            log::info!(
                "simulation finished with {outcome:?} at t={:.4} after {} steps",
                self.clock(),
                self.stats.steps
            );
        }
        outcome
    }
}

fn is_enabled(net: &Net, id: TransitionId) -> bool {
    let transition = net.transition_at(id);
    let inputs_ready = transition.input_arcs().iter().all(|&a| {
        let arc = net.arc_at(a);
        net.place_at(arc.place).marking() >= arc.multiplicity
    });
    let not_inhibited = transition.inhibitor_arcs().iter().all(|&a| {
        let arc = net.arc_at(a);
        net.place_at(arc.place).marking() < arc.multiplicity
    });
    let joined = transition.join == 0 || transition.clock.join_arrivals >= transition.join;
    inputs_ready
        && not_inhibited
        && joined
        && transition
            .guard()
            .is_none_or(|guard| guard.evaluate(&net.view()))
}

/// Concurrent instances for rate accrual: the enabling degree, capped by capacity.
fn active_instances(net: &Net, id: TransitionId) -> u32 {
    let transition = net.transition_at(id);
    let degree = transition
        .input_arcs()
        .iter()
        .map(|&a| {
            let arc = net.arc_at(a);
            net.place_at(arc.place).marking() / arc.multiplicity
        })
        .min()
        .unwrap_or(1);
    degree.max(1).min(Multiplicity::from(transition.capacity)) as u32
}

fn on_enable(transition: &mut Transition, clock: f64) {
    let policy = transition.memory_policy;
    let state = &mut transition.clock;
    state.enabled = true;
    state.enabled_at = clock;
    if let Some(at) = state.disabled_at.take() {
        state.disabled_time += clock - at;
    }
    state.firing_time = match (policy, state.remaining.take()) {
        (MemoryPolicy::Age, Some(remaining)) => Some(clock + remaining),
        _ => None,
    };
}

fn on_disable(transition: &mut Transition, clock: f64) {
    let policy = transition.memory_policy;
    let state = &mut transition.clock;
    state.enabled = false;
    state.disabled_at = Some(clock);
    let pending = state.firing_time.take();
    state.remaining = match (policy, pending) {
        (MemoryPolicy::Age, Some(at)) => Some((at - clock).max(0.0)),
        _ => None,
    };
}
