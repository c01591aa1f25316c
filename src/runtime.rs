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
use std::{error::Error, fmt, sync::Arc};

use tracing::info;

use crate::{
    block::Pool,
    config,
    graph::{Graph, NodeId},
    input::{self, RawSender},
    midi::{MidiEvents, MidiHandler, MidiParser},
    scheduler::{Scheduler, SchedulerError},
    stats::FaultCounters,
};

/// The stage of the MIDI parser. Producers of raw bytes go before it.
pub const PARSER_STAGE: usize = 0;
/// The stage of the MIDI handler.
pub const HANDLER_STAGE: usize = 1;

/// The assembled pipeline: pools, the parser and handler nodes, and the
/// scheduler driving them. Everything is owned here; there is no global state.
pub struct Runtime {
    control_pool: Pool,
    raw_pool: Pool,
    events: Arc<MidiEvents>,
    sender: RawSender,
    input_senders: Vec<RawSender>,
    parser: NodeId,
    handler: NodeId,
    parser_faults: Arc<FaultCounters>,
    handler_faults: Arc<FaultCounters>,
    graph_faults: Arc<FaultCounters>,
    scheduler: Scheduler,
}

impl Runtime {
    /// Builds the pipeline from a configuration. Invalid configuration is
    /// rejected here, before anything runs.
    pub fn new(config: &config::Pipeline) -> Result<Runtime, Box<dyn Error>> {
        config.validate()?;

        let control_pool = Pool::new("control", config.pools().control_capacity())?;
        let raw_pool = Pool::new("raw", config.pools().raw_capacity())?;

        // One queue for programmatic input plus one per configured device.
        let mut parser = MidiParser::new(config.parser());
        let mut senders = Vec::with_capacity(config.inputs().len() + 1);
        for _ in 0..=config.inputs().len() {
            let (sender, receiver) = input::queue(raw_pool.clone(), config.queue_depth());
            parser.attach(receiver);
            senders.push(sender);
        }
        let sender = senders.remove(0);
        let parser_faults = parser.faults();

        let events = Arc::new(MidiEvents::new(config.handler().enabled()));
        let handler = MidiHandler::new(events.clone(), config.handler().max_sysex_length());
        let handler_faults = handler.faults();

        let mut graph = Graph::new(control_pool.clone(), config.scheduler().stages())?;
        let parser = graph.add_node(
            "midi parser",
            PARSER_STAGE,
            MidiParser::INPUTS,
            MidiParser::OUTPUTS,
            parser,
        )?;
        let handler = graph.add_node(
            "midi handler",
            HANDLER_STAGE,
            MidiHandler::INPUTS,
            MidiHandler::OUTPUTS,
            handler,
        )?;
        graph.connect(parser, 0, handler, 0)?;
        let graph_faults = graph.faults();

        let scheduler = Scheduler::new(graph, config.scheduler())?;
        info!(
            control_capacity = control_pool.capacity(),
            raw_capacity = raw_pool.capacity(),
            stages = config.scheduler().stages(),
            period = ?scheduler.period(),
            inputs = config.inputs().len(),
            "Built MIDI pipeline."
        );

        Ok(Runtime {
            control_pool,
            raw_pool,
            events,
            sender,
            input_senders: senders,
            parser,
            handler,
            parser_faults,
            handler_faults,
            graph_faults,
            scheduler,
        })
    }

    /// Starts the scheduler thread.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        self.scheduler.start()
    }

    /// Stops the scheduler thread and waits for it.
    pub fn stop(&mut self) {
        self.scheduler.stop()
    }

    /// Runs a single tick on the calling thread.
    pub fn tick(&self) {
        self.scheduler.tick()
    }

    /// The general purpose input queue.
    pub fn sender(&self) -> RawSender {
        self.sender.clone()
    }

    /// The input queues reserved for the configured devices, in configuration order.
    pub fn input_senders(&self) -> &[RawSender] {
        &self.input_senders
    }

    pub fn events(&self) -> Arc<MidiEvents> {
        self.events.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn parser(&self) -> NodeId {
        self.parser
    }

    pub fn handler(&self) -> NodeId {
        self.handler
    }

    pub fn control_pool(&self) -> &Pool {
        &self.control_pool
    }

    pub fn raw_pool(&self) -> &Pool {
        &self.raw_pool
    }

    pub fn parser_faults(&self) -> Arc<FaultCounters> {
        self.parser_faults.clone()
    }

    pub fn handler_faults(&self) -> Arc<FaultCounters> {
        self.handler_faults.clone()
    }

    pub fn graph_faults(&self) -> Arc<FaultCounters> {
        self.graph_faults.clone()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("control_pool", &self.control_pool)
            .field("raw_pool", &self.raw_pool)
            .field("scheduler", &self.scheduler)
            .field("parser_faults", &self.parser_faults)
            .field("handler_faults", &self.handler_faults)
            .field("graph_faults", &self.graph_faults)
            .finish()
    }
}
