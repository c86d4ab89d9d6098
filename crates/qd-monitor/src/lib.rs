//! Background lifecycle jobs.
//!
//! Three periodic loops keep match and stake state honest without any
//! in-process bookkeeping:
//!
//! - the *disconnect monitor* resolves matches whose players stopped
//!   heartbeating,
//! - the *timeout/orphan sweeper* voids stuck matchmaking and frees
//!   never-matched deposits, and
//! - the *expiry sweep* closes unclaimed payouts after their deadline.
//!
//! Every action is a conditional guarded UPDATE in `qd-db`, so a slow tick
//! overlapping the next one (or a second daemon instance running the same
//! loops) double-applies nothing. The loops hold no state between ticks; the
//! database is re-read every time.

pub mod disconnect;
pub mod expiry;
pub mod sweep;

pub use disconnect::{disconnect_tick, resolve_liveness, spawn_disconnect_monitor, DisconnectOutcome};
pub use expiry::expiry_tick;
pub use sweep::{orphan_tick, spawn_sweeper, waiting_timeout_tick};
