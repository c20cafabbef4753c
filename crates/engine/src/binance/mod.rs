pub mod csv_file;
pub mod klines;

pub use klines::KlinesQuery;
