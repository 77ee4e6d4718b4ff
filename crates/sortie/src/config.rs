//! Process-wide switches consulted when a command fails.
//!
//! A [`HubConfig`] lives inside a [`CommandHub`](crate::CommandHub) and can be
//! swapped at any time with [`CommandHub::set_config`](crate::CommandHub::set_config).
//!
//! # Environment
//!
//! [`HubConfig::from_env`] starts from the defaults and applies:
//!
//! | Variable | Field |
//! |---|---|
//! | `SORTIE_PANICS_PROPAGATE` | `panics_propagate` |
//! | `SORTIE_RETHROW_ALL` | `rethrow_all` |
//! | `SORTIE_REPORT_ALL_ERRORS` | `report_all_errors` |
//! | `SORTIE_REPORT_HANDLER_FAILURES` | `report_handler_failures` |
//! | `SORTIE_CAPTURE_TRACES` | `capture_traces` |
//!
//! Accepted values are `1`/`true`/`on` and `0`/`false`/`off` (case
//! insensitive). Anything else is ignored with a warning.

use std::env;

/// Switches for error routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct HubConfig {
    /// Panics raised by work propagate unchanged. When off, they are caught
    /// and routed as [`SortieError::Panicked`](crate::SortieError::Panicked).
    pub panics_propagate: bool,
    /// Treat every failure as [`ErrorReaction::Rethrow`](crate::ErrorReaction::Rethrow).
    /// Meant for debugging.
    pub rethrow_all: bool,
    /// Forward every non-rethrown failure to the global handler in addition
    /// to whatever its reaction asks for.
    pub report_all_errors: bool,
    /// Forward panics of local error listeners to the global handler instead
    /// of resuming them.
    pub report_handler_failures: bool,
    /// Capture a backtrace for every classified failure.
    pub capture_traces: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            panics_propagate: true,
            rethrow_all: false,
            report_all_errors: false,
            report_handler_failures: true,
            capture_traces: true,
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `SORTIE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed like the
    /// environment variables.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let fields: [(&str, &mut bool); 5] = [
            ("SORTIE_PANICS_PROPAGATE", &mut config.panics_propagate),
            ("SORTIE_RETHROW_ALL", &mut config.rethrow_all),
            ("SORTIE_REPORT_ALL_ERRORS", &mut config.report_all_errors),
            (
                "SORTIE_REPORT_HANDLER_FAILURES",
                &mut config.report_handler_failures,
            ),
            ("SORTIE_CAPTURE_TRACES", &mut config.capture_traces),
        ];
        for (key, slot) in fields {
            if let Some(raw) = lookup(key) {
                match parse_flag(&raw) {
                    Some(flag) => *slot = flag,
                    None => tracing::warn!(key, value = %raw, "ignoring unparseable flag"),
                }
            }
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw == "1" || raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("on") {
        Some(true)
    } else if raw == "0" || raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}
