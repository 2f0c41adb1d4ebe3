// # -----------------------------
// # crates/cli/src/lib.rs
// # -----------------------------
pub mod scenario;
pub mod sim_host;

pub use scenario::{load_scenario, RunReport, Runner, Scenario, Step};
