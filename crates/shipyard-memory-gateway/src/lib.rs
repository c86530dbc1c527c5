mod memory;

pub use memory::{MemoryClusterGateway, MemoryGatewayFactory};
