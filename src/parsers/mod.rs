//! Parsers for the TS layer carried inside received frames

pub mod ts;

pub use ts::{TsHeader, is_pes_start, next_continuity};
