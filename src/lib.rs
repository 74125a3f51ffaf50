//! # EPS Control Core
//!
//! Command dispatch core for a latch-controlled satellite power
//! distribution unit reachable over a slow, single-master bus. Any number
//! of subsystem threads submit commands concurrently; a single dispatcher
//! thread owns the bus and executes them one transaction at a time.
//!
//! ## Features
//!
//! - **Bounded FIFO command queue**: 255 pending requests, strict arrival
//!   order, rejection (never corruption) at capacity
//! - **Synchronous request/response**: submitters block on a per-request
//!   wait handle with a configurable bound
//! - **Single-consumer bus access**: at most one in-flight transaction,
//!   enforced structurally
//! - **Watchdog refresh loop**: periodic hardware watchdog resets on a
//!   dedicated low-priority thread
//! - **Broadcast-wake shutdown**: no thread ever blocks past shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use epscore::{CoreConfig, EpsCore, LatchId, SimulatedEps};
//!
//! let core = EpsCore::spawn(SimulatedEps::new(), CoreConfig::default()).unwrap();
//!
//! // Ping the board and switch a rail on.
//! let status = core.ping().unwrap();
//! assert_eq!(status, 0);
//! core.set_latch(LatchId::Rail3V1, true).unwrap();
//!
//! // Read back output-side housekeeping.
//! let (_, out) = core.housekeeping_out().unwrap();
//! assert_eq!(out.output_state[3], 1);
//!
//! core.shutdown();
//! ```
//!
//! ## Architecture
//!
//! - [`eps`] - the [`EpsCore`] orchestrator, watchdog loop and shutdown
//!   coordination
//! - [`command`] - command model and per-request wait protocol
//! - [`queue`] - bounded FIFO work queue
//! - [`dispatcher`] - the single consumer thread
//! - [`device`] - the hardware access boundary
//! - [`telemetry`] - housekeeping and configuration records
//! - [`sim`] - deterministic simulated device for tests and the console

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod command;
pub mod device;
pub mod dispatcher;
pub mod eps;
pub mod error;
pub mod queue;
pub mod sim;
pub mod telemetry;

// Re-export the main public types for convenience
pub use command::{Batch, CommandKind, LatchId, Outcome, Outcomes, MAX_BATCH_COMMANDS};
pub use device::{is_bus_failure, BusStatus, EpsDevice};
pub use dispatcher::DispatcherState;
pub use eps::{
    CoreConfig, CoreStatsSnapshot, EpsCore, DEFAULT_COMMAND_TIMEOUT, DEFAULT_WATCHDOG_PERIOD,
};
pub use error::{EpsError, EpsResult};
pub use queue::MAX_QUEUE_DEPTH;
pub use sim::{SimControls, SimulatedEps};
pub use telemetry::{EpsConfig, Housekeeping, HousekeepingOut, ResetCause};
