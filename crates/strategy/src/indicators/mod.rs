pub mod sma;

pub use sma::RollingWindow;
