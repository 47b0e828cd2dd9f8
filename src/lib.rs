//! Wayfarer is a journey-planning engine for multimodal public transport.
//!
//! The engine answers origin-to-destination queries over a read-only
//! transit dataset combined with a street network: a round-based transit
//! search ([`raptor`]) is wrapped by street or crow-fly access legs computed
//! by the street pathfinder ([`streets`]), while the disruption engine
//! ([`realtime`]) folds trip updates into realtime vehicle journeys the
//! search can see. The [`worker`] module ties it together behind a typed
//! request dispatcher and a swappable dataset holder.

pub mod model;
pub mod raptor;
pub mod realtime;
pub mod schedules;
pub mod shared;
pub mod streets;
pub mod worker;

pub mod prelude {
    pub use crate::model::{Dataset, RtLevel, builder::DatasetBuilder};
    pub use crate::raptor::{Journey, Query, Raptor};
    pub use crate::shared::{Coordinate, DateTime, Distance, Duration, Time};
    pub use crate::streets::{Mode, StreetNetwork, StreetWorker};
    pub use crate::worker::{DataManager, Request, Response, Worker, WorkerConfig};
}
