pub mod auth;
pub mod classify;
pub mod graph;
pub mod inbox;
pub mod scheduler;
pub mod status;
