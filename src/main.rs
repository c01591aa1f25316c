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
use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use pisynth::config::Pipeline;
use pisynth::input;
use pisynth::monitor;
use pisynth::runtime::Runtime;
use tracing::info;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=MIDI stream pipeline

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/pisynth
ExecStart=/usr/local/bin/pisynth start "$PISYNTH_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=pisynth.service
"#;

/// How often fault counters are logged while running.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A real-time MIDI stream pipeline."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will build the pipeline, connect the configured inputs and log every event.
    Start {
        /// The path to the pipeline config.
        config_path: String,
    },
    /// Verify will load and validate a pipeline config.
    Verify {
        /// The path to the pipeline config.
        config_path: String,
    },
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = Pipeline::deserialize(&PathBuf::from(&config_path))?;
            let mut runtime = Runtime::new(&config)?;
            monitor::attach(&runtime.events());

            // The connections stay open for as long as they are held.
            let _inputs = config
                .inputs()
                .iter()
                .zip(runtime.input_senders())
                .map(|(input, sender)| input::midir::connect(input.device(), sender.clone()))
                .collect::<Result<Vec<_>, _>>()?;

            runtime.start()?;
            loop {
                thread::sleep(STATS_INTERVAL);
                info!(
                    ticks = runtime.scheduler().ticks(),
                    parser = ?runtime.parser_faults(),
                    handler = ?runtime.handler_faults(),
                    graph = ?runtime.graph_faults(),
                    "Pipeline statistics."
                );
            }
        }
        Commands::Verify { config_path } => {
            let config = Pipeline::deserialize(&PathBuf::from(&config_path))?;
            println!("Configuration {} is valid.", config_path);
            println!(
                "- pools: control {}, raw {}",
                config.pools().control_capacity(),
                config.pools().raw_capacity()
            );
            println!(
                "- scheduler: {} stages, tick {:?}, priority {}, realtime {}",
                config.scheduler().stages(),
                config.scheduler().tick()?,
                config.scheduler().thread_priority(),
                config.scheduler().realtime()
            );
            println!(
                "- parser: ring {}, max message {}, running status {}",
                config.parser().ring_capacity(),
                config.parser().max_message_length(),
                config.parser().running_status()
            );
            println!(
                "- handler: max sysex {}, enabled {}",
                config.handler().max_sysex_length(),
                config.handler().enabled()
            );
            println!("- queue depth: {}", config.queue_depth());
            for input in config.inputs() {
                println!("- input: {}", input.device());
            }
        }
        Commands::MidiDevices {} => {
            let devices = input::midir::list()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
