pub mod jsonrpc;
pub mod near;
pub mod solver_bus;
pub mod transaction;

pub use jsonrpc::{JsonRpcClient, RpcError};
pub use near::NearRpcClient;
pub use solver_bus::SolverBusClient;
