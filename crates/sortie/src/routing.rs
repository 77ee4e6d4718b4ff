//! Where a classified failure goes.
//!
//! [`route`] is a pure function of the reaction, who is listening and the
//! hub switches. The engine applies the resulting [`Delivery`].

use thiserror::Error;

use crate::config::HubConfig;
use crate::filter::ErrorReaction;

/// Who could receive an error right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    /// A live subscriber on the command's `errors` or `results` cell.
    pub local: bool,
    /// A global handler is registered on the hub.
    pub global: bool,
}

/// Delivery plan for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Publish to the command's `errors` and `results` cells.
    pub local: bool,
    /// Forward to the global handler and broadcast stream.
    pub global: bool,
    /// Hand the error back to the caller.
    pub rethrow: bool,
}

impl Delivery {
    const NONE: Self = Self {
        local: false,
        global: false,
        rethrow: false,
    };
    const LOCAL: Self = Self {
        local: true,
        ..Self::NONE
    };
    const GLOBAL: Self = Self {
        global: true,
        ..Self::NONE
    };
    const BOTH: Self = Self {
        local: true,
        global: true,
        rethrow: false,
    };
    const RETHROW: Self = Self {
        rethrow: true,
        ..Self::NONE
    };

    /// Whether nobody hears about the error.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        *self == Self::NONE
    }
}

/// A reaction that cannot be honored with the current listeners. These are
/// configuration defects and the engine panics on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoutingDefect {
    #[error("{0:?} requires a listener on the command's errors or results")]
    NoLocalListener(ErrorReaction),
    #[error("{0:?} requires a global error handler on the hub")]
    NoGlobalHandler(ErrorReaction),
    #[error("ErrorReaction::Defer must be resolved before routing")]
    Unresolved,
}

/// Compute the delivery for `reaction`.
///
/// `rethrow_all` overrides every reaction. `report_all_errors` adds global
/// delivery to anything that is neither swallowed nor rethrown.
pub fn route(
    reaction: ErrorReaction,
    presence: Presence,
    config: &HubConfig,
) -> Result<Delivery, RoutingDefect> {
    if config.rethrow_all {
        return Ok(Delivery::RETHROW);
    }
    let mut delivery = plan(reaction, presence)?;
    if config.report_all_errors && !delivery.rethrow && reaction != ErrorReaction::Swallow {
        delivery.global = true;
    }
    Ok(delivery)
}

fn plan(reaction: ErrorReaction, presence: Presence) -> Result<Delivery, RoutingDefect> {
    use ErrorReaction as R;

    let Presence { local, global } = presence;
    match reaction {
        R::Swallow => Ok(Delivery::NONE),
        R::Rethrow => Ok(Delivery::RETHROW),
        R::GlobalOnly => Ok(Delivery::GLOBAL),
        R::LocalOnly if local => Ok(Delivery::LOCAL),
        R::LocalOnly => Err(RoutingDefect::NoLocalListener(reaction)),
        R::LocalAndGlobal if !local => Err(RoutingDefect::NoLocalListener(reaction)),
        R::LocalAndGlobal if !global => Err(RoutingDefect::NoGlobalHandler(reaction)),
        R::LocalAndGlobal => Ok(Delivery::BOTH),
        R::LocalThenGlobalFallback if local => Ok(Delivery::LOCAL),
        R::LocalThenGlobalFallback => Ok(Delivery::GLOBAL),
        R::ThrowIfUnhandled if local => Ok(Delivery::LOCAL),
        R::ThrowIfUnhandled if global => Ok(Delivery::GLOBAL),
        R::ThrowIfUnhandled => Ok(Delivery::RETHROW),
        R::ThrowIfNoLocal if local => Ok(Delivery::LOCAL),
        R::ThrowIfNoLocal => Ok(Delivery::RETHROW),
        R::Defer => Err(RoutingDefect::Unresolved),
    }
}
