//! Domain types: bars, snapshots, the validated input and tick rounding.

pub mod bar;
pub mod input;
pub mod snapshot;
pub mod tick;

pub use bar::PriceBar;
pub use input::{InputError, MarketInput};
pub use snapshot::{RawSnapshot, Snapshot};
pub use tick::{round_to_tick, TickPolicy, TickTable, TickTier};
