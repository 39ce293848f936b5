pub mod config;
pub mod logging;

pub mod cache;
pub mod control;
pub mod orchestrator;
pub mod request;
pub mod retry;
pub mod transport;
pub mod validate;

pub use orchestrator::{Delivery, OrchestratorBuilder, ReprocessReport, RequestOrchestrator};
pub use request::{Method, Request, Response};
pub use retry::{ErrorKind, RequestError};
