pub mod breaker;
pub mod factory;
pub mod registry;
pub mod transport;

pub use breaker::{BreakerStatus, CircuitBreakers};
pub use factory::ConnectorFactory;
pub use registry::ConnectionRegistry;
pub use transport::TransportConfig;
