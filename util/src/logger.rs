// Copyright 2019 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging for the solver plugin. The plugin lives inside a host process
//! that may well have logging of its own, so everything here is scoped to
//! the workspace crates: the root logger stays off and only the solver
//! targets are routed into the plugin appenders.
use crate::Mutex;

use backtrace::Backtrace;
use std::{panic, thread};

use crate::types::{LogLevel, LoggingConfig};

use log::LevelFilter;
use log4rs;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

/// Crates whose records reach the plugin appenders; everything else in the
/// process is left to the host
const LOG_TARGETS: [&str; 3] = ["cuckoo_mean", "cuckoo_mean_core", "cuckoo_mean_util"];

const LOGGING_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

lazy_static! {
	/// Set once the global logger has been claimed, later calls are no-ops
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
}

fn pattern() -> Box<PatternEncoder> {
	Box::new(PatternEncoder::new(LOGGING_PATTERN))
}

/// Assemble the log4rs configuration for the given settings. Both appenders
/// hang off the root with their own thresholds; the root itself is off and
/// only the solver targets get loggers.
fn build_config(config: &LoggingConfig) -> Result<Config, String> {
	let mut appenders = vec![];
	let mut root = Root::builder();
	let mut level = LevelFilter::Off;

	if config.log_to_stdout {
		let threshold = config.stdout_log_level.to_filter();
		let stdout = ConsoleAppender::builder().encoder(pattern()).build();
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(threshold)))
				.build("stdout", Box::new(stdout)),
		);
		root = root.appender("stdout");
		level = level.max(threshold);
	}

	if config.log_to_file {
		let threshold = config.file_log_level.to_filter();
		let file = FileAppender::builder()
			.append(config.log_file_append)
			.encoder(pattern())
			.build(&config.log_file_path)
			.map_err(|e| format!("unable to open log file {}: {}", config.log_file_path, e))?;
		appenders.push(
			Appender::builder()
				.filter(Box::new(ThresholdFilter::new(threshold)))
				.build("file", Box::new(file)),
		);
		root = root.appender("file");
		level = level.max(threshold);
	}

	let mut builder = Config::builder().appenders(appenders);
	for target in LOG_TARGETS.iter() {
		builder = builder.logger(Logger::builder().build(*target, level));
	}
	builder
		.build(root.build(LevelFilter::Off))
		.map_err(|e| format!("broken logging configuration: {}", e))
}

/// Initialize logging with the given configuration. Passing `None` leaves
/// the process logger entirely to the host. Idempotent, so a host loading
/// the plugin twice doesn't trip over the already claimed global logger.
pub fn init_logger(config: Option<LoggingConfig>) {
	let config = match config {
		Some(config) => config,
		None => return,
	};
	{
		let mut was_init = WAS_INIT.lock();
		if !*was_init {
			match build_config(&config) {
				Ok(built) => {
					if log4rs::init_config(built).is_ok() {
						*was_init = true;
					}
				}
				Err(e) => eprintln!("{}", e),
			}
		}
		if !*was_init {
			return;
		}
	}
	let log_file = if config.log_to_file {
		Some(config.log_file_path)
	} else {
		None
	};
	send_panic_to_log(log_file);
}

/// Logging for unit and integration tests: debug to stdout, no file
pub fn init_test_logger() {
	let mut config = LoggingConfig::default();
	config.log_to_file = false;
	config.stdout_log_level = LogLevel::Debug;
	init_logger(Some(config));
}

/// Route panics into the log as well as stderr, pointing at the log file
/// when one is written
fn send_panic_to_log(log_file: Option<String>) {
	panic::set_hook(Box::new(move |info| {
		let thread = thread::current();
		let thread = thread.name().unwrap_or("unnamed");
		let message = match info.payload().downcast_ref::<&str>() {
			Some(s) => (*s).to_string(),
			None => match info.payload().downcast_ref::<String>() {
				Some(s) => s.clone(),
				None => "unknown panic payload".to_string(),
			},
		};
		match info.location() {
			Some(location) => error!(
				"thread '{}' panicked at '{}', {}:{}\n{:?}",
				thread,
				message,
				location.file(),
				location.line(),
				Backtrace::new()
			),
			None => error!(
				"thread '{}' panicked at '{}'\n{:?}",
				thread,
				message,
				Backtrace::new()
			),
		}
		if let Some(ref path) = log_file {
			eprintln!(
				"thread '{}' panicked with message \"{}\", see {} for details",
				thread, message, path
			);
		}
	}));
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn config_respects_appender_switches() {
		let mut config = LoggingConfig::default();
		config.log_to_file = false;
		assert!(build_config(&config).is_ok());

		// nothing enabled is still a valid, silent configuration
		config.log_to_stdout = false;
		assert!(build_config(&config).is_ok());
	}
}
