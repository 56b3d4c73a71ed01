// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunConfig, TestThreads};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};
use tracing::warn;

/// Receives warnings produced while loading a config.
pub trait ConfigWarnings {
    /// Called when a config file contains keys regrtest doesn't know about.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// The default [`ConfigWarnings`] implementation, which logs warnings.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        warn!(
            "{config_file}: ignoring unknown {}: {}",
            if unknown.len() == 1 { "key" } else { "keys" },
            unknown.iter().map(|key| format!("`{key}`")).join(", "),
        );
    }
}

/// Overall configuration for regrtest.
///
/// Runner settings are grouped into profiles, obtained through [`profile`](Self::profile). The
/// embedded default config is always loaded first, and the repository config is layered on top.
#[derive(Clone, Debug)]
pub struct RegrtestConfig {
    root: Utf8PathBuf,
    default_profile: DefaultProfileImpl,
    other_profiles: HashMap<String, CustomProfileImpl>,
}

impl RegrtestConfig {
    /// The default location of the config within a repository: `.config/regrtest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/regrtest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the embedded defaults and an optional file.
    ///
    /// If `config_file` is `None`, `<root>/.config/regrtest.toml` is read if it exists.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        // An explicitly named file must exist; the repository file is optional.
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (root.join(Self::CONFIG_PATH), false),
        };
        let layers = Self::layers()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required));
        Self::load(root, &config_file, layers, warnings)
    }

    /// Reads the config from the embedded defaults and a TOML string.
    ///
    /// `config_file` is used for error reporting only.
    pub fn from_toml_str(
        root: impl Into<Utf8PathBuf>,
        config_file: &Utf8Path,
        contents: &str,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let layers = Self::layers().add_source(File::from_str(contents, FileFormat::Toml));
        Self::load(root.into(), config_file, layers, warnings)
    }

    /// Returns the default config.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Result<Self, ConfigParseError> {
        Self::load(
            root.into(),
            Utf8Path::new("<default config>"),
            Self::layers(),
            &mut DefaultConfigWarnings,
        )
    }

    /// Returns the root directory the config was loaded for.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the profile with the given name, or an error if it isn't known.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<RegrtestProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = match self.other_profiles.get(name) {
            _ if name == Self::DEFAULT_PROFILE => None,
            Some(profile) => Some(profile),
            None => {
                let known = self
                    .other_profiles
                    .keys()
                    .map(String::as_str)
                    .chain([Self::DEFAULT_PROFILE]);
                return Err(ProfileNotFound::new(name, known));
            }
        };

        Ok(RegrtestProfile {
            name: name.to_owned(),
            default_profile: &self.default_profile,
            custom_profile,
        })
    }

    /// The embedded defaults, to be overlaid by one more source.
    fn layers() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn load(
        root: Utf8PathBuf,
        config_file: &Utf8Path,
        layers: ConfigBuilder<DefaultState>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let parse_error = |kind| ConfigParseError::new(config_file, kind);

        let merged = layers
            .build()
            .map_err(|error| parse_error(ConfigParseErrorKind::BuildError(Box::new(error))))?;
        let (mut profiles, unknown) = deserialize_profiles(merged).map_err(parse_error)?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(config_file, &unknown);
        }

        let default_profile = DefaultProfileImpl::new(
            profiles.remove(Self::DEFAULT_PROFILE).unwrap_or_default(),
        )
        .map_err(parse_error)?;

        Ok(Self {
            root,
            default_profile,
            other_profiles: profiles,
        })
    }
}

/// Deserializes the `[profile.*]` tables, collecting the paths of keys that weren't recognized.
fn deserialize_profiles(
    merged: Config,
) -> Result<(HashMap<String, CustomProfileImpl>, BTreeSet<String>), ConfigParseErrorKind> {
    let mut unknown = BTreeSet::new();
    let mut record_unknown = |path: serde_ignored::Path| {
        unknown.insert(path.to_string());
    };
    let de = serde_ignored::Deserializer::new(merged, &mut record_unknown);
    let parsed: RegrtestConfigDeserialize =
        serde_path_to_error::deserialize(de).map_err(|error| {
            // serde_path_to_error already tracks the key, so strip the config crate's copy.
            let path = error.path().clone();
            let inner = match error.into_inner() {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, inner,
            )))
        })?;
    Ok((parsed.profiles, unknown))
}

/// A regrtest profile, obtained through [`RegrtestConfig::profile`].
///
/// Keys not set in the named profile fall back to `profile.default`.
#[derive(Clone, Debug)]
pub struct RegrtestProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl RegrtestProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn get<T>(&self, custom: impl FnOnce(&CustomProfileImpl) -> Option<T>, default: T) -> T {
        self.custom_profile.and_then(custom).unwrap_or(default)
    }

    /// Returns the number of worker processes to run at once.
    pub fn test_threads(&self) -> TestThreads {
        self.get(|profile| profile.test_threads, self.default_profile.test_threads)
    }

    /// Returns the per-unit timeout, or `None` if timeouts are disabled.
    pub fn timeout(&self) -> Option<Duration> {
        let timeout = self.get(|profile| profile.timeout, self.default_profile.timeout);
        (!timeout.is_zero()).then_some(timeout)
    }

    /// Returns true if the run should stop at the first failure.
    pub fn fail_fast(&self) -> bool {
        self.get(|profile| profile.fail_fast, self.default_profile.fail_fast)
    }

    /// Returns true if environment-changed outcomes count as failures.
    pub fn fail_env_changed(&self) -> bool {
        self.get(|profile| profile.fail_env_changed, self.default_profile.fail_env_changed)
    }

    /// Returns true if failed units should be rerun after the initial pass.
    pub fn rerun(&self) -> bool {
        self.get(|profile| profile.rerun, self.default_profile.rerun)
    }

    /// Returns true if needing a rerun is reported with a dedicated exit code.
    pub fn fail_rerun(&self) -> bool {
        self.get(|profile| profile.fail_rerun, self.default_profile.fail_rerun)
    }

    /// Returns how often long-running units are reported. Zero disables these reports.
    pub fn progress_interval(&self) -> Duration {
        self.get(|profile| profile.progress_interval, self.default_profile.progress_interval)
    }

    /// Builds the run configuration described by this profile.
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            test_threads: self.test_threads(),
            timeout: self.timeout(),
            fail_fast: self.fail_fast(),
            fail_env_changed: self.fail_env_changed(),
            fail_rerun: self.fail_rerun(),
            rerun_failed: self.rerun(),
            progress_interval: self.progress_interval(),
            ..RunConfig::default()
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RegrtestConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: HashMap<String, CustomProfileImpl>,
}

#[derive(Clone, Debug)]
struct DefaultProfileImpl {
    test_threads: TestThreads,
    timeout: Duration,
    fail_fast: bool,
    fail_env_changed: bool,
    rerun: bool,
    fail_rerun: bool,
    progress_interval: Duration,
}

impl DefaultProfileImpl {
    fn new(p: CustomProfileImpl) -> Result<Self, ConfigParseErrorKind> {
        Ok(Self {
            test_threads: p
                .test_threads
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("test-threads"))?,
            timeout: p
                .timeout
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("timeout"))?,
            fail_fast: p
                .fail_fast
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("fail-fast"))?,
            fail_env_changed: p
                .fail_env_changed
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("fail-env-changed"))?,
            rerun: p
                .rerun
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("rerun"))?,
            fail_rerun: p
                .fail_rerun
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("fail-rerun"))?,
            progress_interval: p
                .progress_interval
                .ok_or(ConfigParseErrorKind::MissingDefaultKey("progress-interval"))?,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    test_threads: Option<TestThreads>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    fail_fast: Option<bool>,
    #[serde(default)]
    fail_env_changed: Option<bool>,
    #[serde(default)]
    rerun: Option<bool>,
    #[serde(default)]
    fail_rerun: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    progress_interval: Option<Duration>,
}
