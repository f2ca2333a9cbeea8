//! # Mesh Gateway Test Suite
//!
//! Cross-crate scenarios that run a real [`mesh_gateway::Gateway`] against
//! the in-memory bus, scripted mesh services and live HTTP upstreams.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/           # Registry resolution and tracker throughput
//! └── src/integration/
//!     ├── support.rs     # Gateway harness, fake services, upstreams
//!     ├── bus_flows.rs   # Bus round trip, timeouts, late responses
//!     ├── rest_flows.rs  # REST forwarding through the reqwest proxy
//!     ├── registry_flows.rs  # Registry convergence via bus events
//!     └── races.rs       # Completion orderings
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo bench -p gateway-tests
//! ```

pub mod integration;
