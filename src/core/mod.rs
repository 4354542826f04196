mod engine;
mod types;

pub use engine::run_simulation;
pub use types::{
    RebalanceLedgerEntry, ScenarioRequest, SimulationResult, Strategy, WithdrawalEvent,
    WithdrawalKind,
};
