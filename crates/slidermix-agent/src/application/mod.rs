//! Application layer use cases for the agent.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure routing state in `slidermix-core`) and the infrastructure (serial
//! ports, audio APIs, files).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "slider 2
//!   moved, set Spotify's volume").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the infrastructure can be swapped without changing this code.
//!
//! # Sub-modules
//!
//! - **`route_slider`** – The routing engine.  Runs once per slider event and
//!   once per user reassignment.
//!
//! - **`resolvers`** – The get/set strategy for each kind of target, and the
//!   [`HostAudio`](resolvers::HostAudio) seam the platform backends implement.
//!
//! - **`drain`** – The periodic task that moves queued serial lines through
//!   the parser into the routing engine.

pub mod drain;
pub mod resolvers;
pub mod route_slider;
