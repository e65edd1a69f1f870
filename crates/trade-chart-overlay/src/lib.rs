pub mod chart;
pub mod error;
pub mod memory;
pub mod surface;
pub mod synchronizer;
pub mod visibility;
