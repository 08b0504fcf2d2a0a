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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::firmware::ExtraVar;
use crate::utils::resolve_relative;

pub const EPOCH_INFO_PTR: &str = "EPOCH_INFO_PTR";
pub const ETH_EPOCH_INFO_PTR: &str = "ETH_EPOCH_INFO_PTR";

/// Settings for one debugging session.
///
/// ```json
/// {
///   "firmware": { "brisc": "brisc/brisc.elf", "ncrisc": "ncrisc/ncrisc.elf" },
///   "extra_vars": { "EPOCH_INFO_PTR": { "offset": "EPOCH_INFO_ADDR", "type": "epoch_t" } },
///   "strict_reads": true
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Image prefix -> firmware ELF. Relative paths are relative to the config file.
    pub firmware: BTreeMap<String, PathBuf>,
    /// Synthetic symbols; `None` selects [`default_extra_vars`] for the device architecture.
    pub extra_vars: Option<BTreeMap<String, ExtraVar>>,
    pub verbose: bool,
    pub strict_reads: bool,
}

impl SessionConfig {
    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        let base = path.parent();
        for image in config.firmware.values_mut() {
            *image = resolve_relative(base, image);
        }
        Ok(config)
    }

    pub fn extra_vars_for(&self, arch: &str) -> BTreeMap<String, ExtraVar> {
        self.extra_vars
            .clone()
            .unwrap_or_else(|| default_extra_vars(arch))
    }
}

pub fn has_ethernet_cores(arch: &str) -> bool {
    !arch.eq_ignore_ascii_case("grayskull")
}

/// Firmware pointers defined with `#define`, which never reach the debug info.
pub fn default_extra_vars(arch: &str) -> BTreeMap<String, ExtraVar> {
    let mut vars = BTreeMap::new();
    vars.insert(
        EPOCH_INFO_PTR.to_string(),
        ExtraVar::new("EPOCH_INFO_ADDR", "epoch_t"),
    );
    if has_ethernet_cores(arch) {
        vars.insert(
            ETH_EPOCH_INFO_PTR.to_string(),
            ExtraVar::new("ETH_EPOCH_INFO_ADDR", "epoch_t"),
        );
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn parse_with_defaults() {
        let config = SessionConfig::from_json_str(r#"{"firmware": {"brisc": "/fw/brisc.elf"}}"#)
            .unwrap();
        assert_eq!(config.firmware["brisc"], PathBuf::from("/fw/brisc.elf"));
        assert!(!config.strict_reads);
        assert_eq!(config.extra_vars_for("wormhole").len(), 2);
        assert_eq!(config.extra_vars_for("grayskull").len(), 1);
    }

    #[test]
    fn explicit_extra_vars_replace_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{"extra_vars": {"LIMIT_PTR": {"offset_symbol_name": "BASE", "type_name": "limit_t"}}}"#,
        )
        .unwrap();
        let vars = config.extra_vars_for("wormhole");
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["LIMIT_PTR"]);
    }

    #[test]
    fn firmware_paths_are_relative_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"firmware": {{"brisc": "brisc/brisc.elf"}}, "verbose": true}}"#).unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert!(config.verbose);
        assert_eq!(config.firmware["brisc"], dir.path().join("brisc/brisc.elf"));
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(
            SessionConfig::from_json_str("{firmware"),
            Err(LoadError::Config(_))
        ));
    }
}
