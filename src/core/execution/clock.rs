//! Simulator clock: the shared clock bit, its listeners and the optional
//! background thread that toggles it in real time.
//!
//! The thread never owns simulation state. Each toggle takes the simulator
//! lock, pushes the new bit onto every clock component in every state, runs
//! the clock listeners and releases the lock.

use crate::core::errors::SimResult;
use crate::core::execution::context::SimulatorContext;
use crate::core::execution::simulator::Shared;
use crate::core::types::{Port, StateId};
use crate::core::values::WireValue;
use log::{debug, trace, warn};
use parking_lot::ReentrantMutexGuard;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback run after every clock toggle, still under the simulator lock.
///
/// Work through the context argument. A `Simulator` handle captured by the
/// listener cannot be used here: its methods return `ContextBusy`.
pub type ClockListener = Arc<dyn Fn(&mut SimulatorContext, &WireValue) -> SimResult<()> + Send + Sync>;

/// How long the clock thread waits for the lock before re-checking its stop flag
const LOCK_POLL: Duration = Duration::from_millis(5);

impl SimulatorContext {
    /// Toggle the clock bit and drive it onto every clock component.
    ///
    /// Push failures and listener failures are logged; the tick itself
    /// always completes.
    pub fn tick_clock(&mut self) -> WireValue {
        self.clock_high = !self.clock_high;
        let value = WireValue::of(self.clock_high as u64, 1);

        let mut targets: Vec<(StateId, Port)> = Vec::new();
        for circuit in self.circuits.values() {
            for component in circuit.components() {
                let clock_port = self
                    .components
                    .get(&component)
                    .and_then(|entry| entry.component.clock_port());
                if let Some(index) = clock_port {
                    targets.extend(circuit.states().map(|state| (state, Port::new(component, index))));
                }
            }
        }

        for (state, port) in targets {
            if let Err(err) = self.push_value(state, port, &value) {
                warn!("Clock push to {} in {} failed: {}", port, state, err);
            }
        }

        let listeners = self.clock_listeners.clone();
        for listener in listeners {
            if let Err(err) = listener(self, &value) {
                warn!("Clock listener failed: {}", err);
            }
        }

        trace!("Clock ticked to {}", value);
        value
    }

    pub fn add_clock_listener(&mut self, listener: ClockListener) {
        self.clock_listeners.push(listener);
    }

    pub fn remove_clock_listener(&mut self, listener: &ClockListener) {
        self.clock_listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Bring the clock bit back low, ticking once if it is high
    pub(crate) fn reset_clock_bit(&mut self) {
        if self.clock_high {
            self.tick_clock();
        }
    }
}

/// Owner of the background clock thread
#[derive(Default)]
pub(crate) struct ClockDriver {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    last_tick_count: Arc<AtomicU64>,
}

impl ClockDriver {
    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn last_tick_count(&self) -> u64 {
        self.last_tick_count.load(Ordering::Acquire)
    }

    pub(crate) fn start(&mut self, shared: Weak<Shared>, hertz: u32) -> std::io::Result<()> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let last_tick_count = Arc::new(AtomicU64::new(0));
        let thread_stop = Arc::clone(&stop);
        let thread_count = Arc::clone(&last_tick_count);

        let handle = thread::Builder::new()
            .name("clock".to_string())
            .spawn(move || run_clock(shared, thread_stop, thread_count, hertz.max(1)))?;

        self.handle = Some(handle);
        self.stop = stop;
        self.last_tick_count = last_tick_count;
        debug!("Clock started at {} Hz", hertz);
        Ok(())
    }

    /// Signal the thread and wait for it to exit
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Clock thread panicked");
            }
            debug!("Clock stopped");
        }
        self.last_tick_count.store(0, Ordering::Release);
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        // The last simulator handle may be dropped on the clock thread itself,
        // so only signal here.
        self.stop.store(true, Ordering::Release);
    }
}

fn run_clock(shared: Weak<Shared>, stop: Arc<AtomicBool>, last_tick_count: Arc<AtomicU64>, hertz: u32) {
    let period = Duration::from_secs_f64(1.0 / (2.0 * hertz as f64));
    let mut window_start = Instant::now();
    let mut next_tick = window_start;
    let mut ticks = 0u64;

    while !stop.load(Ordering::Acquire) {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        let Some(guard) = shared.context.try_lock_for(LOCK_POLL) else {
            continue;
        };
        let ticked = match guard.try_borrow_mut() {
            Ok(mut ctx) => {
                ctx.tick_clock();
                true
            }
            Err(_) => false,
        };
        ReentrantMutexGuard::unlock_fair(guard);
        drop(shared);

        if !ticked {
            warn!("Clock tick skipped: simulator context busy");
            continue;
        }
        ticks += 1;

        let now = Instant::now();
        if now.duration_since(window_start) >= Duration::from_secs(1) {
            last_tick_count.store(ticks, Ordering::Release);
            ticks = 0;
            window_start = now;
        }

        next_tick += period;
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }
}
