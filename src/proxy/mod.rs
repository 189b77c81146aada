pub mod chain;
pub mod context;
pub mod filter;
mod handler;

pub use chain::{GatewayFilterChain, OrderedFilter};
pub use context::{BoxBody, ServerExchange};
pub use handler::{handle_request, GatewayHandler};
