pub mod engine;
pub mod logging;
pub mod runtime;
pub mod sampling;
pub mod script;
pub mod simulate;
pub mod verify;
