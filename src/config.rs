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
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

mod error;
mod midi;
mod pools;
mod scheduler;

pub use self::error::ConfigError;
pub use self::midi::{Handler, Input, Parser, MAX_SYSEX_LENGTH};
pub use self::pools::Pools;
pub use self::scheduler::Scheduler;

/// Environment variables starting with this prefix override file values, e.g.
/// PISYNTH__PARSER__RUNNING_STATUS=true.
const ENV_PREFIX: &str = "PISYNTH";
const ENV_SEPARATOR: &str = "__";

const DEFAULT_QUEUE_DEPTH: usize = 64;

/// The configuration for the whole pipeline. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pipeline {
    #[serde(default)]
    pools: Pools,

    #[serde(default)]
    scheduler: Scheduler,

    #[serde(default)]
    parser: Parser,

    #[serde(default)]
    handler: Handler,

    /// Depth of each input queue in blocks (default: 64).
    queue_depth: Option<usize>,

    /// MIDI input devices to connect at startup.
    #[serde(default)]
    inputs: Vec<Input>,
}

impl Pipeline {
    /// Parse and validate a pipeline configuration from a YAML file, applying
    /// environment overrides.
    pub fn deserialize(path: &Path) -> Result<Pipeline, ConfigError> {
        let pipeline = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Pipeline>()?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Parse and validate a pipeline configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Pipeline, ConfigError> {
        let pipeline = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Pipeline>()?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Checks every value that would otherwise fail later, at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pools.validate()?;
        self.scheduler.validate()?;
        self.parser.validate()?;
        self.handler.validate()?;
        if self.queue_depth() == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        Ok(())
    }

    pub fn with_pools(mut self, pools: Pools) -> Pipeline {
        self.pools = pools;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Pipeline {
        self.scheduler = scheduler;
        self
    }

    pub fn with_parser(mut self, parser: Parser) -> Pipeline {
        self.parser = parser;
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Pipeline {
        self.handler = handler;
        self
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Returns the input queue depth (default: 64).
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH)
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }
}

#[cfg(test)]
mod test {
    use std::{io::Write, time::Duration};

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults() {
        let pipeline = Pipeline::from_yaml("inputs: []").unwrap();

        assert_eq!(64, pipeline.pools().control_capacity());
        assert_eq!(64, pipeline.pools().raw_capacity());
        assert_eq!(8, pipeline.scheduler().stages());
        assert_eq!(Duration::from_millis(1), pipeline.scheduler().tick().unwrap());
        assert_eq!(70, pipeline.scheduler().thread_priority());
        assert!(pipeline.scheduler().realtime());
        assert_eq!(1024, pipeline.parser().ring_capacity());
        assert_eq!(256, pipeline.parser().max_message_length());
        assert!(!pipeline.parser().running_status());
        assert_eq!(256, pipeline.handler().max_sysex_length());
        assert!(pipeline.handler().enabled());
        assert_eq!(64, pipeline.queue_depth());
        assert!(pipeline.inputs().is_empty());
    }

    #[test]
    fn test_full_configuration() {
        let pipeline = Pipeline::from_yaml(
            r#"
            pools:
              control_capacity: 128
              raw_capacity: 32
            scheduler:
              stages: 4
              tick: 2ms
              thread_priority: 80
              realtime: false
            parser:
              ring_capacity: 2048
              max_message_length: 128
              running_status: true
            handler:
              max_sysex_length: 64
              enabled: false
            queue_depth: 16
            inputs:
              - device: UM-ONE
              - device: Keystep
            "#,
        )
        .unwrap();

        assert_eq!(128, pipeline.pools().control_capacity());
        assert_eq!(32, pipeline.pools().raw_capacity());
        assert_eq!(4, pipeline.scheduler().stages());
        assert_eq!(Duration::from_millis(2), pipeline.scheduler().tick().unwrap());
        assert_eq!(80, pipeline.scheduler().thread_priority());
        assert!(!pipeline.scheduler().realtime());
        assert_eq!(2048, pipeline.parser().ring_capacity());
        assert_eq!(128, pipeline.parser().max_message_length());
        assert!(pipeline.parser().running_status());
        assert_eq!(64, pipeline.handler().max_sysex_length());
        assert!(!pipeline.handler().enabled());
        assert_eq!(16, pipeline.queue_depth());
        let devices: Vec<&str> = pipeline.inputs().iter().map(|i| i.device()).collect();
        assert_eq!(vec!["UM-ONE", "Keystep"], devices);
    }

    #[test]
    fn test_validation() {
        let invalid = [
            "pools:\n  control_capacity: 48",
            "pools:\n  raw_capacity: 0",
            "pools:\n  raw_capacity: 288",
            "scheduler:\n  stages: 0",
            "scheduler:\n  stages: 33",
            "scheduler:\n  tick: soon",
            "scheduler:\n  tick: 0ms",
            "scheduler:\n  thread_priority: 100",
            "parser:\n  ring_capacity: 1000",
            "parser:\n  ring_capacity: 256",
            "parser:\n  max_message_length: 509",
            "parser:\n  max_message_length: 2",
            "handler:\n  max_sysex_length: 2",
            "handler:\n  max_sysex_length: 65537",
            "handler:\n  max_sysex_length: 99999999999",
            "queue_depth: 0",
        ];
        for yaml in invalid {
            assert!(
                matches!(Pipeline::from_yaml(yaml), Err(ConfigError::Invalid(_))),
                "expected {:?} to be rejected",
                yaml
            );
        }

        assert!(matches!(
            Pipeline::from_yaml("pools:\n  control_capacity: many"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_programmatic_configuration() {
        let pipeline = Pipeline::default()
            .with_pools(Pools::new(32, 32))
            .with_scheduler(Scheduler::new(2, "5ms", 10, false))
            .with_parser(Parser::new(512, 64, true))
            .with_handler(Handler::new(32, true));
        assert!(pipeline.validate().is_ok());
        assert_eq!(Duration::from_millis(5), pipeline.scheduler().tick().unwrap());
    }

    #[test]
    #[serial]
    fn test_deserialize_file_with_env_override() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "parser:\n  running_status: false\nqueue_depth: 8").unwrap();

        std::env::set_var("PISYNTH__PARSER__RUNNING_STATUS", "true");
        let pipeline = Pipeline::deserialize(file.path());
        std::env::remove_var("PISYNTH__PARSER__RUNNING_STATUS");

        let pipeline = pipeline.unwrap();
        assert!(pipeline.parser().running_status());
        assert_eq!(8, pipeline.queue_depth());
    }

    #[test]
    #[serial]
    fn test_deserialize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Pipeline::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
