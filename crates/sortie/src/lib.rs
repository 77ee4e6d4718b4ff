#![forbid(unsafe_code)]

//! Sortie: single-flight reactive commands.
//!
//! A [`Command`] wraps a unit of work (synchronous or asynchronous), runs it
//! at most once at a time, and publishes every state transition through
//! [`Observable`] cells. Failures are classified by an [`ErrorFilter`] into an
//! [`ErrorReaction`] and routed to the command's own error cell, to the
//! [`CommandHub`]'s global handler and broadcast stream, or back to the
//! caller.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//! use sortie::{Command, CommandHub};
//!
//! let hub = CommandHub::new();
//! let double = Command::sync(&hub, 0, |x: i32| Ok::<_, Infallible>(x * 2))
//!     .name("double")
//!     .build();
//!
//! double.run(21);
//! assert_eq!(double.value().get(), 42);
//! assert!(double.can_run().get());
//! ```
//!
//! # Modules
//!
//! - [`command`]: the execution engine and its builder.
//! - [`filter`] / [`routing`]: error classification and the routing table.
//! - [`hub`]: the explicit process-wide context (global handler, default
//!   filter, configuration, executor).
//! - [`undo`]: undo-stack extension.
//! - [`progress`]: progress reporting and cooperative cancellation.
//! - [`work`]: the synchronous/asynchronous work abstraction.

pub mod command;
pub mod config;
pub mod error;
pub mod filter;
pub mod hub;
pub mod progress;
pub mod result;
pub mod routing;
pub mod undo;
pub mod work;

pub use command::{Command, CommandBuilder};
pub use config::HubConfig;
pub use error::{AwaitError, ErrorHandle, SortieError, Trace};
pub use filter::{ErrorFilter, ErrorReaction, FilterChain, classify};
pub use hub::{CommandHub, GlobalError};
pub use progress::Progress;
pub use result::{CommandError, CommandResult};
pub use routing::{Delivery, Presence, RoutingDefect, route};
pub use undo::{UndoStack, UndoableBuilder, UndoableCommand};
pub use work::{AsyncWork, Outcome, SyncWork, WorkFuture, WorkUnit};

pub use sortie_reactive::{Computed, NotifyMode, Observable, Subscription};
