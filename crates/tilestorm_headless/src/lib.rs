//! Headless scenario runner for determinism checks and CI.
//!
//! Runs scripted scenarios on a host session, optionally mirrored by a
//! replica, with no rendering or input. This enables:
//!
//! - **Determinism checks**: the replica's state hash is compared every tick
//! - **Replay recording**: any run can be saved and verified later
//! - **Data validation**: game data files are parsed and linked up front
//!
//! # Example
//!
//! ```bash
//! # Run a scenario with a replica alongside
//! cargo run -p tilestorm_headless -- run \
//!     --scenario crates/tilestorm_headless/scenarios/duel.ron \
//!     --data assets/data/game.ron --replica
//!
//! # Verify a recorded replay
//! cargo run -p tilestorm_headless -- replay --input duel.replay
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod runner;
pub mod scenario;

pub use runner::{run_scenario, RunOptions, RunSummary, ScenarioRunner};
pub use scenario::{Scenario, ScenarioError};
