pub mod artifacts;
pub mod http;
pub mod mock;
pub mod persistence;
pub mod yahoo;
