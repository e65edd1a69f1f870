pub mod candle;
pub mod config;
pub mod error;
pub mod granularity;
pub mod records;
pub mod resample;
pub mod study;
pub mod summary;
pub mod trade;
