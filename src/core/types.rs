use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Strategy {
    A,
    B,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalKind {
    Usd,
    Pct,
}

/// One discrete withdrawal taken in a given simulation year from one
/// strategy's balance. Events are applied in the order they were supplied;
/// that ordering is significant for stacked percentage withdrawals.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WithdrawalEvent {
    pub year: u32,
    pub strategy: Strategy,
    pub kind: WithdrawalKind,
    pub value: f64,
}

/// Validated scenario consumed read-only by the simulation. Constructed once
/// per invocation; no state outlives a single run.
#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub initial_investment: f64,
    pub allocation_a: f64,
    pub returns_a: Vec<f64>,
    pub returns_b: Vec<f64>,
    pub withdrawals: Vec<WithdrawalEvent>,
}

impl ScenarioRequest {
    /// Number of simulated years.
    pub fn horizon(&self) -> usize {
        self.returns_a.len()
    }

    pub fn allocation_b(&self) -> f64 {
        100.0 - self.allocation_a
    }
}

/// Per-year record for the annual-rebalance scenario: balances after growth
/// and withdrawals but before the transfer, each side's share of the total,
/// and the total carried through the transfer (which redistributes but never
/// creates or destroys capital).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RebalanceLedgerEntry {
    pub year: u32,
    pub pre_a: f64,
    pub pre_a_pct: f64,
    pub pre_b: f64,
    pub pre_b_pct: f64,
    pub post_total: f64,
}

/// Year-end total balances for the four scenarios, one entry per simulated
/// year, plus the rebalancing ledger. Field names match the wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub full_a: Vec<f64>,
    pub full_b: Vec<f64>,
    pub no_rebalance: Vec<f64>,
    pub annual_rebalance: Vec<f64>,
    pub annual_rebalance_details: Vec<RebalanceLedgerEntry>,
}
