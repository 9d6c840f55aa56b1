/// Flat energy price in VND per kWh.
pub const RATE_VND_PER_KWH: f64 = 4000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub energy_needed_kwh: f64,
    pub price_vnd: f64,
}

/// Linear estimate for charging from `current_soc` to `target_soc`.
///
/// Returns `None` unless the target is strictly above the current level and
/// the capacity is a positive finite number.
pub fn estimate_cost(
    current_soc: u8,
    target_soc: u8,
    battery_capacity_kwh: f64,
    rate_vnd_per_kwh: f64,
) -> Option<CostEstimate> {
    if target_soc <= current_soc || !battery_capacity_kwh.is_finite() || battery_capacity_kwh <= 0.0
    {
        return None;
    }

    let energy_needed_kwh = f64::from(target_soc - current_soc) / 100.0 * battery_capacity_kwh;

    Some(CostEstimate {
        energy_needed_kwh,
        price_vnd: energy_needed_kwh * rate_vnd_per_kwh,
    })
}
