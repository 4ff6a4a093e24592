pub mod config;
pub mod consumption;
pub mod embodied;
pub mod error;
pub mod matrix;
pub mod mineral;
pub mod model;
pub mod production;
pub mod reconcile;
pub mod region;
pub mod registry;
pub mod report;
pub mod schema;
pub mod trade;

#[cfg(feature = "python")]
mod python;

pub use config::MfaConfig;
pub use consumption::{ConsumptionMethod, OriginTracing, TracingDiagnostics, TracingOptions};
pub use error::MfaError;
pub use matrix::{FlowMatrix, TradeCache};
pub use mineral::{Mineral, TradeFlow};
pub use model::MfaModel;
pub use region::{Axis, RegionGrouping, RegionMatrix};
pub use registry::{Area, EntityRegistry};
