//! Process-global configuration, loaded once on first access.
//!
//! Mirrors the Python original's module-level `config` singleton
//! (`rosslt/config.py`): a handful of flags consulted only at
//! serialize/append time, safe to hold behind a single process-wide mutex
//! since all mutation happens on the single-writer executor (see the
//! concurrency section of the spec).

use std::sync::{Mutex, OnceLock};

use serde::Deserialize;

/// Default well-known path `config_load` checks before falling back to
/// defaults, matching the Python original's `rosslt_py.json`.
pub const DEFAULT_CONFIG_PATH: &str = "rosslt.json";

/// Expression-chain fusion, message framing, and compression knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Enable §4.1 group-fusion/neutral-absorption simplification on append.
    pub expr_chain: bool,
    /// Emit the textual form into the wire message's `data` field instead of
    /// typed elements.
    pub msg_str: bool,
    /// Enable generic deflate compression of the element/data arrays.
    pub zlib_enable: bool,
    /// Deflate level, 1 (fastest) through 9 (smallest).
    pub zlib_level: u32,
    /// Minimum `max(len(elements), len(data))` before compression kicks in.
    pub zlib_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expr_chain: true,
            msg_str: false,
            zlib_enable: true,
            zlib_level: 1,
            zlib_threshold: 1024,
        }
    }
}

/// Partial document used to merge a JSON config file over the defaults.
/// Unknown keys are ignored by `serde_json`'s normal deny-nothing behavior;
/// missing keys fall back to `Config::default()` per field.
#[derive(Debug, Deserialize, Default)]
struct ConfigDocument {
    expr_chain: Option<bool>,
    msg_str: Option<bool>,
    zlib_enable: Option<bool>,
    zlib_level: Option<u32>,
    zlib_threshold: Option<usize>,
}

impl ConfigDocument {
    fn apply_over(self, base: Config) -> Config {
        Config {
            expr_chain: self.expr_chain.unwrap_or(base.expr_chain),
            msg_str: self.msg_str.unwrap_or(base.msg_str),
            zlib_enable: self.zlib_enable.unwrap_or(base.zlib_enable),
            zlib_level: self.zlib_level.unwrap_or(base.zlib_level),
            zlib_threshold: self.zlib_threshold.unwrap_or(base.zlib_threshold),
        }
    }
}

static CONFIG: OnceLock<Mutex<Config>> = OnceLock::new();

fn state() -> &'static Mutex<Config> {
    CONFIG.get_or_init(|| Mutex::new(Config::default()))
}

/// Returns a copy of the current process-wide configuration.
#[must_use]
pub fn config() -> Config {
    *state().lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Replaces the process-wide configuration wholesale.
pub fn set_config(new: Config) {
    *state().lock().unwrap_or_else(std::sync::PoisonError::into_inner) = new;
}

/// Parses a JSON document and merges it over the current configuration.
///
/// # Errors
/// Returns the `serde_json` error if `data` is not valid JSON.
pub fn config_parse(data: &str) -> Result<(), serde_json::Error> {
    let doc: ConfigDocument = serde_json::from_str(data)?;
    set_config(doc.apply_over(config()));
    Ok(())
}

/// Loads configuration from `path` if it exists, otherwise resets to
/// defaults. Mirrors `rosslt/config.py::config_load`.
pub fn config_load(path: &str) {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            if let Err(err) = config_parse(&contents) {
                tracing::warn!(%path, %err, "failed to parse config file, falling back to defaults");
                set_config(Config::default());
            }
        }
        Err(_) => set_config(Config::default()),
    }
}

/// Runs `f` against a temporary configuration, restoring whatever was
/// active beforehand afterwards. Exists so tests can exercise `expr_chain`
/// on/off without leaking state into other tests (spec §9: "tests must
/// reset it between cases").
pub fn with_config<R>(overrides: Config, f: impl FnOnce() -> R) -> R {
    let previous = config();
    set_config(overrides);
    let result = f();
    set_config(previous);
    result
}
