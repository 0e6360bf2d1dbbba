use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Rough pre-enrichment cost: 1.5 credits per lead (email + verification),
/// 9 USD per 2000 credits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub leads: u64,
    pub credits: u64,
    pub usd: Decimal,
}

impl CostEstimate {
    pub fn for_leads(leads: u64) -> Self {
        let credits = leads.saturating_mul(3) / 2;
        let usd = (Decimal::from(credits) * Decimal::from(9) / Decimal::from(2_000))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self { leads, credits, usd }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CostEstimate;

    #[test]
    fn estimates_credits_and_dollars() {
        let estimate = CostEstimate::for_leads(1_200);

        assert_eq!(estimate.credits, 1_800);
        assert_eq!(estimate.usd, Decimal::new(810, 2));
    }

    #[test]
    fn odd_lead_counts_round_credits_down() {
        let estimate = CostEstimate::for_leads(1);

        assert_eq!(estimate.credits, 1);
        assert_eq!(estimate.usd, Decimal::new(0, 2));
    }
}
