mod factory;
mod gateway;
mod registry;

pub use factory::KubeGatewayFactory;
pub use gateway::KubeClusterGateway;
pub use registry::{ClusterRegistration, ClusterRegistry};
