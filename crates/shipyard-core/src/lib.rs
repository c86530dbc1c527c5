mod errors;
mod gateway;
mod models;

pub mod manifest;
pub mod test;

pub use errors::{GatewayError, PublishError, ValidationError};
pub use gateway::{ClusterGateway, ClusterGatewayFactory};
pub use models::*;

/// Scale requests must satisfy `0 < replicas <= MAX_REPLICAS`.
pub const MAX_REPLICAS: i32 = 32;
