//! Stream combinators for telemetry consumers

mod coalesce;

pub use coalesce::{Coalesce, CoalesceExt};
