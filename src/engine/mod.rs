//! Paged presentation controller with deterministic replay semantics.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Keys/Clicks  │────►│  Event Bus   │────►│   Reducer    │
//! │ Gate timers  │     │  (ordered)   │     │  (pure fn)   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        ▲                                         │
//!        │                                         ▼
//!        │             ┌──────────────┐     ┌──────────────┐
//!        └─────────────│   Effects    │◄────│    State     │
//!                      │ render/timer │     │  (hashed)    │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! The reducer never touches a clock, a timer or a render target; it returns
//! [`events::Effect`]s and the host (a [`session::Session`] or the live
//! runtime) carries them out.

pub mod bus;
pub mod config;
pub mod events;
pub mod reducer;
pub mod session;
pub mod state;
pub mod view;
