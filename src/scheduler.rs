// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Runs the graph on a dedicated thread at a fixed tick.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use crate::{
    config::{self, ConfigError},
    graph::Graph,
};

pub mod thread_priority;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("unable to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Owns the graph and drives it with one `update_all` per tick.
///
/// The graph lock is held for a whole tick, so anything done through
/// `with_graph` happens strictly between two ticks.
pub struct Scheduler {
    graph: Arc<Mutex<Graph>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    period: Duration,
    priority: u8,
    realtime: bool,
    join_handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a stopped scheduler. The priority environment overrides are
    /// resolved here, once.
    pub fn new(graph: Graph, config: &config::Scheduler) -> Result<Scheduler, ConfigError> {
        Ok(Scheduler {
            graph: Arc::new(Mutex::new(graph)),
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            period: config.tick()?,
            priority: thread_priority::scheduler_thread_priority(config.thread_priority()),
            realtime: thread_priority::realtime_enabled(config.realtime()),
            join_handle: None,
        })
    }

    /// Starts the scheduler thread.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.join_handle.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.running.store(true, Ordering::Release);
        let graph = self.graph.clone();
        let running = self.running.clone();
        let ticks = self.ticks.clone();
        let (period, priority, realtime) = (self.period, self.priority, self.realtime);

        let spawned = thread::Builder::new()
            .name("pisynth-scheduler".into())
            .spawn(move || run(graph, running, ticks, period, priority, realtime));
        match spawned {
            Ok(join_handle) => {
                self.join_handle = Some(join_handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Clears the enable flag and waits for the thread to exit after its
    /// current tick.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!("Scheduler thread panicked.");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.is_some()
    }

    /// Runs one tick on the calling thread.
    pub fn tick(&self) {
        self.graph.lock().update_all();
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// The number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Gives exclusive access to the graph between two ticks, e.g. to add
    /// nodes or connections while running.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        f(&mut self.graph.lock())
    }
}

fn run(
    graph: Arc<Mutex<Graph>>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    period: Duration,
    priority: u8,
    realtime: bool,
) {
    let span = span!(Level::INFO, "scheduler");
    let _enter = span.enter();

    thread_priority::configure_scheduler_thread(priority, realtime);
    info!(?period, priority, realtime, "Scheduler started.");

    let mut deadline = Instant::now();
    while running.load(Ordering::Acquire) {
        graph.lock().update_all();
        ticks.fetch_add(1, Ordering::Relaxed);

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            spin_sleep::sleep(deadline - now);
        } else {
            debug!(overrun = ?(now - deadline), "Scheduler tick overran its period.");
            deadline = now;
        }
    }

    info!(ticks = ticks.load(Ordering::Relaxed), "Scheduler stopped.");
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .field("period", &self.period)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::{
        block::Pool,
        config,
        graph::{Graph, NodeContext},
        testutil::{eventually, FnNode},
    };

    use super::{Scheduler, SchedulerError};

    fn scheduler(runs: Arc<AtomicUsize>) -> Scheduler {
        let mut graph = Graph::new(Pool::new("test", 32).unwrap(), 2).unwrap();
        let counter = graph
            .add_node(
                "counter",
                0,
                0,
                1,
                FnNode(move |_: &mut NodeContext<'_>| {
                    runs.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let sink = graph
            .add_node("sink", 1, 1, 0, FnNode(|_: &mut NodeContext<'_>| {}))
            .unwrap();
        graph.connect(counter, 0, sink, 0).unwrap();

        Scheduler::new(graph, &config::Scheduler::new(2, "1ms", 10, false)).unwrap()
    }

    #[test]
    fn test_manual_ticks() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler(runs.clone());

        scheduler.tick();
        scheduler.tick();
        assert_eq!(2, runs.load(Ordering::SeqCst));
        assert_eq!(2, scheduler.ticks());
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_thread_ticks_and_stops() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler(runs.clone());

        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyRunning)));
        eventually(
            || runs.load(Ordering::SeqCst) >= 10,
            "Scheduler never ticked",
        );

        scheduler.stop();
        assert!(!scheduler.is_running());
        let stopped_at = runs.load(Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(stopped_at, runs.load(Ordering::SeqCst));
        assert_eq!(stopped_at as u64, scheduler.ticks());

        // A stopped scheduler can be started again.
        scheduler.start().unwrap();
        eventually(
            || runs.load(Ordering::SeqCst) > stopped_at,
            "Scheduler did not restart",
        );
    }

    #[test]
    fn test_with_graph_while_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = scheduler(runs.clone());
        scheduler.start().unwrap();

        let late_runs = Arc::new(AtomicUsize::new(0));
        {
            let late_runs = late_runs.clone();
            scheduler.with_graph(|graph| {
                let late = graph
                    .add_node(
                        "late",
                        0,
                        0,
                        1,
                        FnNode(move |_: &mut NodeContext<'_>| {
                            late_runs.fetch_add(1, Ordering::SeqCst);
                        }),
                    )
                    .unwrap();
                let sink = graph
                    .add_node("late sink", 1, 1, 0, FnNode(|_: &mut NodeContext<'_>| {}))
                    .unwrap();
                graph.connect(late, 0, sink, 0).unwrap();
            });
        }

        eventually(
            || late_runs.load(Ordering::SeqCst) >= 5,
            "Node added while running was never updated",
        );
        assert_eq!(4, scheduler.with_graph(|graph| graph.node_count()));
    }

    #[test]
    fn test_rejects_invalid_tick() {
        let graph = Graph::new(Pool::new("test", 32).unwrap(), 2).unwrap();
        assert!(Scheduler::new(graph, &config::Scheduler::new(2, "never", 10, false)).is_err());
    }
}
