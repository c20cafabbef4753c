pub mod config;
pub mod error;
pub mod exchange;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use pipeline::{consume, Handler, TransactionSink};
pub use registry::Registry;
pub use source::{TickSource, TickTable};
pub use types::*;
