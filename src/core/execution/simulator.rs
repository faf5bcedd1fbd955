use crate::core::errors::{PropagationOutcome, SimResult, SimulationError};
use crate::core::execution::clock::{ClockDriver, ClockListener};
use crate::core::execution::config::SimulatorConfig;
use crate::core::execution::context::{SimulatorContext, UpdatePair};
use log::{debug, trace};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::Arc;

impl SimulatorContext {
    /// Run one propagation round over everything queued so far.
    ///
    /// Pairs queued while the round runs wait for the next round. A
    /// component error is returned after the round completes. A short circuit
    /// is only reported once nothing else is pending; until then the shorted
    /// pairs are queued again, since a later update may resolve them.
    /// Does nothing when called from inside a step.
    pub fn step(&mut self) -> SimResult<()> {
        if self.stepping {
            return Ok(());
        }

        self.stepping = true;
        let result = self.run_step();
        self.stepping = false;
        result
    }

    fn run_step(&mut self) -> SimResult<()> {
        std::mem::swap(&mut self.pending, &mut self.scratch);
        self.pending.clear();
        self.short_circuited.clear();

        let batch = std::mem::take(&mut self.scratch);
        let mut fatal = None;
        for &(state, link) in &batch {
            if self.is_stale(state, link) {
                trace!("Skipping stale update of {} in {}", link, state);
                continue;
            }

            match self.propagate_signal(state, link) {
                PropagationOutcome::Settled => {}
                PropagationOutcome::ShortCircuit(sc) => {
                    trace!("{}", sc);
                    self.short_circuited.insert((state, link));
                }
                PropagationOutcome::Fatal(err) => {
                    fatal.get_or_insert(err);
                }
            }
        }
        debug!(
            "Step propagated {} updates, {} pending",
            batch.len(),
            self.pending.len()
        );

        let mut batch = batch;
        batch.clear();
        self.scratch = batch;

        if let Some(err) = fatal {
            return Err(err);
        }
        if self.short_circuited.is_empty() {
            return Ok(());
        }

        if self.pending.is_empty() {
            let shorted: Vec<UpdatePair> = self.short_circuited.iter().copied().collect();
            for (state, link) in shorted {
                if self.is_stale(state, link) {
                    continue;
                }
                if let Some(link_state) = self
                    .states
                    .get_mut(&state)
                    .and_then(|circuit_state| circuit_state.link_states.get_mut(&link))
                {
                    if let Err(sc) = link_state.merged_value() {
                        return Err(SimulationError::ShortCircuit(sc));
                    }
                }
            }
            self.short_circuited.clear();
        } else {
            let retry: Vec<UpdatePair> = self.short_circuited.iter().copied().collect();
            self.pending.extend(retry);
        }
        Ok(())
    }

    /// Step until nothing is pending.
    ///
    /// Fails with an oscillation once the same pending set has recurred
    /// `oscillation_threshold` times. Errors from individual steps are held
    /// until the queue drains; a component error is reported ahead of a
    /// short circuit. Does nothing when called from inside a step.
    pub fn step_all(&mut self) -> SimResult<()> {
        if self.stepping {
            return Ok(());
        }

        self.history.clear();
        let threshold = self.config.oscillation_threshold;
        let limit = self.config.history_limit;

        let mut repeats = 0;
        let mut steps = 0usize;
        let mut last_error = None;
        let mut last_short = None;

        while !self.pending.is_empty() {
            let mut snapshot: Vec<UpdatePair> = self.pending.iter().copied().collect();
            snapshot.sort();

            if self.history.contains(&snapshot) {
                repeats += 1;
                if repeats >= threshold {
                    self.history.clear();
                    debug!("Oscillation after {} steps", steps);
                    return Err(SimulationError::Oscillation { repeats });
                }
            }

            if self.history.len() >= limit {
                self.history.shift_remove_index(0);
            }
            self.history.insert(snapshot);

            match self.step() {
                Ok(()) => {}
                Err(err @ SimulationError::ShortCircuit(_)) => last_short = Some(err),
                Err(err) => last_error = Some(err),
            }
            steps += 1;
        }

        self.history.clear();
        debug!("step_all settled after {} steps", steps);

        if let Some(err) = last_error {
            return Err(err);
        }
        if let Some(err) = last_short {
            return Err(err);
        }
        Ok(())
    }
}

pub(crate) struct Shared {
    pub(crate) context: ReentrantMutex<RefCell<SimulatorContext>>,
    clock: Mutex<ClockDriver>,
}

/// Thread-safe handle to a simulator.
///
/// All simulation state sits behind one fair, reentrant lock. Cloning the
/// handle shares the same simulator.
///
/// Every method takes the lock and borrows the context for the duration of
/// the call, so calling a `Simulator` method while already inside one on the
/// same thread returns `SimulationError::ContextBusy`. Clock and pin
/// listeners run in that situation: they must work through the
/// `&mut SimulatorContext` they are handed rather than a captured handle.
#[derive(Clone)]
pub struct Simulator {
    shared: Arc<Shared>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    pub fn with_config(config: SimulatorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                context: ReentrantMutex::new(RefCell::new(SimulatorContext::new(config))),
                clock: Mutex::new(ClockDriver::default()),
            }),
        }
    }

    /// Run `f` with exclusive access to the simulator context.
    ///
    /// The lock is reentrant, but the context can only be borrowed once:
    /// calling back in from inside `f` on the same thread fails with
    /// `ContextBusy` instead of deadlocking. Code running inside `f` (listeners
    /// included) should use the context argument. The lock is released fairly.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut SimulatorContext) -> R) -> SimResult<R> {
        let guard = self.shared.context.lock();
        let result = match guard.try_borrow_mut() {
            Ok(mut ctx) => Ok(f(&mut *ctx)),
            Err(_) => Err(SimulationError::ContextBusy),
        };
        ReentrantMutexGuard::unlock_fair(guard);
        result
    }

    fn run<R>(&self, f: impl FnOnce(&mut SimulatorContext) -> SimResult<R>) -> SimResult<R> {
        self.with_lock(f)?
    }

    pub fn step(&self) -> SimResult<()> {
        self.run(SimulatorContext::step)
    }

    pub fn step_all(&self) -> SimResult<()> {
        self.run(SimulatorContext::step_all)
    }

    pub fn reset(&self) -> SimResult<()> {
        self.with_lock(SimulatorContext::reset)
    }

    pub fn clear(&self) -> SimResult<()> {
        self.with_lock(SimulatorContext::clear)
    }

    pub fn has_links_to_update(&self) -> SimResult<bool> {
        self.with_lock(|ctx| ctx.has_links_to_update())
    }

    /// Toggle the clock once on the calling thread
    pub fn tick_clock(&self) -> SimResult<bool> {
        self.with_lock(|ctx| {
            ctx.tick_clock();
            ctx.clock_high()
        })
    }

    pub fn add_clock_listener(&self, listener: ClockListener) -> SimResult<()> {
        self.with_lock(|ctx| ctx.add_clock_listener(listener))
    }

    pub fn remove_clock_listener(&self, listener: &ClockListener) -> SimResult<()> {
        self.with_lock(|ctx| ctx.remove_clock_listener(listener))
    }

    /// Start the background clock at `hertz` full cycles per second,
    /// replacing any running clock thread.
    pub fn start_clock(&self, hertz: u32) -> SimResult<()> {
        let mut clock = self.shared.clock.lock();
        clock
            .start(Arc::downgrade(&self.shared), hertz)
            .map_err(|err| SimulationError::Clock(err.to_string()))
    }

    /// Start the background clock at the configured frequency
    pub fn start_default_clock(&self) -> SimResult<()> {
        let hertz = self.with_lock(|ctx| ctx.config().clock_hertz)?;
        self.start_clock(hertz)
    }

    pub fn stop_clock(&self) {
        self.shared.clock.lock().stop();
    }

    pub fn is_clock_running(&self) -> bool {
        self.shared.clock.lock().is_running()
    }

    /// Stop the clock thread and bring the clock bit back low
    pub fn reset_clock(&self) -> SimResult<()> {
        self.stop_clock();
        self.with_lock(SimulatorContext::reset_clock_bit)
    }

    /// Clock toggles counted over the most recent full second
    pub fn last_tick_count(&self) -> u64 {
        self.shared.clock.lock().last_tick_count()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
