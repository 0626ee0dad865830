pub mod engineer;
pub mod indicators;
pub mod rolling;
