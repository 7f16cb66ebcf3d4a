pub mod combat;
pub mod constants;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod rng;
pub mod rooms;
pub mod session;
pub mod store;
pub mod types;
