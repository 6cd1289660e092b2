pub mod audit;
pub mod engine;
pub mod memory;
pub mod player;
pub mod snapshot;
pub mod state;
pub mod worker;
