use super::types::{
    RebalanceLedgerEntry, ScenarioRequest, SimulationResult, Strategy, WithdrawalEvent,
    WithdrawalKind,
};

/// Runs the four scenarios over the configured horizon and assembles the
/// result. Pure function of the request: validation runs in full up front and
/// no partial result is ever produced.
pub fn run_simulation(request: &ScenarioRequest) -> Result<SimulationResult, String> {
    validate_request(request)?;

    let horizon = request.horizon();
    let mut full_a = Vec::with_capacity(horizon);
    let mut full_b = Vec::with_capacity(horizon);
    let mut no_rebalance = Vec::with_capacity(horizon);
    let mut annual_rebalance = Vec::with_capacity(horizon);
    let mut annual_rebalance_details = Vec::with_capacity(horizon);

    let mut pure_a = request.initial_investment;
    let mut pure_b = request.initial_investment;

    let seed_a = request.initial_investment * request.allocation_a / 100.0;
    let seed_b = request.initial_investment * request.allocation_b() / 100.0;
    let mut drift_a = seed_a;
    let mut drift_b = seed_b;
    let mut rebal_a = seed_a;
    let mut rebal_b = seed_b;

    for (index, (&return_a, &return_b)) in
        request.returns_a.iter().zip(&request.returns_b).enumerate()
    {
        let year = index as u32 + 1;

        // Events targeting the absent strategy are ignored in the pure
        // scenarios; a B withdrawal has nothing to draw on when 100% is in A.
        (pure_a, _) = apply_year(
            pure_a,
            return_a,
            events_for(&request.withdrawals, year, Strategy::A),
        );
        (pure_b, _) = apply_year(
            pure_b,
            return_b,
            events_for(&request.withdrawals, year, Strategy::B),
        );
        full_a.push(pure_a);
        full_b.push(pure_b);

        (drift_a, _) = apply_year(
            drift_a,
            return_a,
            events_for(&request.withdrawals, year, Strategy::A),
        );
        (drift_b, _) = apply_year(
            drift_b,
            return_b,
            events_for(&request.withdrawals, year, Strategy::B),
        );
        no_rebalance.push(drift_a + drift_b);

        (rebal_a, _) = apply_year(
            rebal_a,
            return_a,
            events_for(&request.withdrawals, year, Strategy::A),
        );
        (rebal_b, _) = apply_year(
            rebal_b,
            return_b,
            events_for(&request.withdrawals, year, Strategy::B),
        );
        let (next_a, next_b, entry) = rebalance(rebal_a, rebal_b, request.allocation_a, year);
        rebal_a = next_a;
        rebal_b = next_b;
        annual_rebalance.push(entry.post_total);
        annual_rebalance_details.push(entry);
    }

    Ok(SimulationResult {
        full_a,
        full_b,
        no_rebalance,
        annual_rebalance,
        annual_rebalance_details,
    })
}

/// One strategy-year: growth first, then the year's withdrawals in supplied
/// order. A percentage event draws on the current, possibly already-reduced,
/// balance, so stacked percentages compound. Any withdrawal that would
/// overdraw is capped at the available balance; the balance never goes
/// negative and the engine never borrows. Returns the new balance and the
/// total actually withdrawn.
fn apply_year<'a>(
    balance: f64,
    return_pct: f64,
    events: impl IntoIterator<Item = &'a WithdrawalEvent>,
) -> (f64, f64) {
    // A -100% return floors the balance at exactly 0.
    let mut balance = (balance * (1.0 + return_pct / 100.0)).max(0.0);
    let mut withdrawn = 0.0;

    for event in events {
        let requested = match event.kind {
            WithdrawalKind::Usd => event.value,
            WithdrawalKind::Pct => balance * event.value / 100.0,
        };
        let taken = requested.min(balance).max(0.0);
        balance -= taken;
        withdrawn += taken;
    }

    (balance, withdrawn)
}

/// Redistributes the combined capital to the target split after both sides
/// have taken their growth-and-withdrawal step. `new_b` is derived by
/// subtraction so the transfer conserves the total exactly.
fn rebalance(
    balance_a: f64,
    balance_b: f64,
    target_a_pct: f64,
    year: u32,
) -> (f64, f64, RebalanceLedgerEntry) {
    let total = balance_a + balance_b;
    let (pre_a_pct, pre_b_pct) = if total > 0.0 {
        (balance_a / total * 100.0, balance_b / total * 100.0)
    } else {
        (0.0, 0.0)
    };

    let entry = RebalanceLedgerEntry {
        year,
        pre_a: balance_a,
        pre_a_pct,
        pre_b: balance_b,
        pre_b_pct,
        post_total: total,
    };

    let new_a = total * target_a_pct / 100.0;
    let new_b = total - new_a;
    (new_a, new_b, entry)
}

fn events_for(
    withdrawals: &[WithdrawalEvent],
    year: u32,
    strategy: Strategy,
) -> impl Iterator<Item = &WithdrawalEvent> {
    withdrawals
        .iter()
        .filter(move |event| event.year == year && event.strategy == strategy)
}

fn validate_request(request: &ScenarioRequest) -> Result<(), String> {
    if !request.initial_investment.is_finite() || request.initial_investment <= 0.0 {
        return Err(format!(
            "initial_investment must be > 0; got {}",
            request.initial_investment
        ));
    }

    if !request.allocation_a.is_finite() || !(0.0..=100.0).contains(&request.allocation_a) {
        return Err(format!(
            "allocation_a must be between 0 and 100; got {}",
            request.allocation_a
        ));
    }

    if request.returns_a.len() != request.returns_b.len() {
        return Err(format!(
            "returns_a and returns_b must have the same length; got {} and {}",
            request.returns_a.len(),
            request.returns_b.len()
        ));
    }

    if request.returns_a.is_empty() {
        return Err("horizon must be at least 1 year".to_string());
    }

    for (label, series) in [
        ("Strategy A", &request.returns_a),
        ("Strategy B", &request.returns_b),
    ] {
        for (index, &rate) in series.iter().enumerate() {
            if !rate.is_finite() || !(-100.0..=100.0).contains(&rate) {
                return Err(format!(
                    "{label} return for year {} out of range [-100, 100]; got {rate}",
                    index + 1
                ));
            }
        }
    }

    let horizon = request.horizon() as u32;
    for event in &request.withdrawals {
        if event.year < 1 || event.year > horizon {
            return Err(format!(
                "withdrawal year must be between 1 and {horizon}; got {}",
                event.year
            ));
        }
        if !event.value.is_finite() || event.value < 0.0 {
            return Err(format!(
                "withdrawal value must be >= 0; got {}",
                event.value
            ));
        }
        if event.kind == WithdrawalKind::Pct && event.value > 100.0 {
            return Err(format!(
                "percentage withdrawal must be <= 100; got {}",
                event.value
            ));
        }
    }

    Ok(())
}
