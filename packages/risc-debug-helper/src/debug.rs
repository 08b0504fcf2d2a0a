// Copyright (c) 2026 MCU-Debug Authors.
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

/// Global verbosity and logger setup
use std::sync::OnceLock;

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

static VERBOSE: OnceLock<bool> = OnceLock::new();

/// Initialize the verbose flag. Only the first call has an effect.
pub fn set_verbose(enabled: bool) {
    VERBOSE.set(enabled).ok();
}

/// Check if register traffic should be traced
pub fn is_verbose() -> bool {
    *VERBOSE.get().unwrap_or(&false)
}

/// Log level spec for a `-v` count. `RUST_LOG` overrides it.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Start logging to stderr. Keep the handle alive for the life of the program.
pub fn init_logging(verbosity: u8) -> Result<LoggerHandle, FlexiLoggerError> {
    set_verbose(verbosity > 1);
    Logger::try_with_env_or_str(level_for(verbosity))?
        .format(flexi_logger::default_format)
        .log_to_stderr()
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(5), "debug");
    }
}
