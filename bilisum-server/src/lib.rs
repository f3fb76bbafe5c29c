pub mod http;
pub mod pipeline;
pub mod session;
