//! Token budget allocation across macro-stages.
//!
//! A sprint has one total budget. When a stage budget specification is
//! present, each budgeted stage gets `max(total * share / 100, min_tokens)`;
//! if those floors push the sum of all stages above the total, every stage is
//! scaled by `total / sum` (integer arithmetic, rounding loss not corrected).
//! Without a specification the stage budget is the whole sprint budget.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::Stage;

/// Share used when a stage's configured share is missing or non-positive.
pub const DEFAULT_SHARE_PCT: u32 = 20;
/// Floor used when a stage's configured minimum is missing or non-positive.
pub const DEFAULT_MIN_TOKENS: u64 = 1_000;

/// Default total budget for a complexity tier (1-5). Out-of-range tiers get
/// the tier-5 value.
pub fn default_budget(complexity: i64) -> u64 {
    match complexity {
        1 => 50_000,
        2 => 100_000,
        3 => 250_000,
        4 => 500_000,
        _ => 1_000_000,
    }
}

/// `max(total * share_pct / 100, min_tokens)` with floor division.
pub fn allocate(total: u64, share_pct: u32, min_tokens: u64) -> u64 {
    let proportional = u128::from(total) * u128::from(share_pct) / 100;
    let proportional = u64::try_from(proportional).unwrap_or(u64::MAX);
    proportional.max(min_tokens)
}

/// Tokens left in `budget` after `spent`. Never negative.
pub fn remaining(budget: u64, spent: u64) -> u64 {
    budget.saturating_sub(spent)
}

/// Scale each allocation by `total / sum` when the allocations overshoot
/// `total`. Each entry is scaled independently; the result is not
/// renormalised afterwards.
pub fn cap_allocations(total: u64, allocations: &[u64]) -> Vec<u64> {
    let sum: u128 = allocations.iter().map(|&a| u128::from(a)).sum();
    if sum == 0 || sum <= u128::from(total) {
        return allocations.to_vec();
    }
    allocations
        .iter()
        .map(|&a| scale(a, total, sum))
        .collect()
}

fn scale(allocation: u64, total: u64, sum: u128) -> u64 {
    // sum > total here, so the quotient is below `allocation` and fits in u64
    (u128::from(allocation) * u128::from(total) / sum) as u64
}

/// One stage's entry in the budget specification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudget {
    #[serde(default)]
    pub share: i64,
    #[serde(default)]
    pub min_tokens: i64,
}

impl StageBudget {
    pub fn new(share: i64, min_tokens: i64) -> Self {
        Self { share, min_tokens }
    }

    /// Share and floor with non-positive values replaced by the defaults.
    pub fn normalized(&self) -> (u32, u64) {
        let share = if self.share <= 0 {
            DEFAULT_SHARE_PCT
        } else {
            u32::try_from(self.share).unwrap_or(u32::MAX)
        };
        let min_tokens = if self.min_tokens <= 0 {
            DEFAULT_MIN_TOKENS
        } else {
            self.min_tokens as u64
        };
        (share, min_tokens)
    }

    /// Uncapped allocation for this stage out of `total`.
    pub fn allocate(&self, total: u64) -> u64 {
        let (share, min_tokens) = self.normalized();
        allocate(total, share, min_tokens)
    }
}

/// Per-stage budget specification. Stages without an entry are not
/// partitioned and fall back to the whole sprint budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageBudgets {
    stages: BTreeMap<Stage, StageBudget>,
}

impl StageBudgets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Stage, budget: StageBudget) -> Self {
        self.insert(stage, budget);
        self
    }

    pub fn insert(&mut self, stage: Stage, budget: StageBudget) {
        self.stages.insert(stage, budget);
    }

    pub fn get(&self, stage: Stage) -> Option<&StageBudget> {
        self.stages.get(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sum of the uncapped allocations of every configured budgeted stage.
    pub fn uncapped_sum(&self, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        Stage::BUDGETED
            .iter()
            .filter_map(|stage| self.get(*stage))
            .fold(0u64, |acc, sb| acc.saturating_add(sb.allocate(total)))
    }

    /// Tokens allocated to `stage` out of `total`, after the overallocation cap.
    ///
    /// A total of 0 means "unknown" and allocates nothing.
    pub fn allocated(&self, total: u64, stage: Stage) -> u64 {
        if total == 0 {
            return 0;
        }
        let Some(sb) = self.get(stage) else {
            return total;
        };
        let allocation = sb.allocate(total);
        let sum = self.uncapped_sum(total);
        if sum > total {
            scale(allocation, total, u128::from(sum))
        } else {
            allocation
        }
    }

    /// Capped allocation for every budgeted stage, in stage order.
    pub fn plan(&self, total: u64) -> Vec<(Stage, u64)> {
        Stage::BUDGETED
            .iter()
            .map(|stage| (*stage, self.allocated(total, *stage)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_reference_values() {
        assert_eq!(allocate(250_000, 20, 1_000), 50_000);
        assert_eq!(allocate(10_000, 20, 5_000), 5_000);
        assert_eq!(allocate(1, 50, 1_000), 1_000);
    }

    #[test]
    fn test_allocate_zero_total_returns_floor() {
        assert_eq!(allocate(0, 20, 1_000), 1_000);
    }

    #[test]
    fn test_allocate_never_below_floor() {
        for total in [0, 1, 99, 4_999, 5_000, 123_456, 10_000_000] {
            for share in [1, 10, 20, 33, 100] {
                let alloc = allocate(total, share, 2_500);
                assert!(alloc >= 2_500);
                let proportional = total * u64::from(share) / 100;
                if proportional > 2_500 {
                    assert_eq!(alloc, proportional);
                }
            }
        }
    }

    #[test]
    fn test_allocate_does_not_overflow_on_huge_totals() {
        assert_eq!(allocate(u64::MAX, 100, 0), u64::MAX);
        assert_eq!(allocate(u64::MAX, 200, 0), u64::MAX);
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(100, 40), 60);
        assert_eq!(remaining(100, 100), 0);
        assert_eq!(remaining(100, 1_000_000), 0);
        assert_eq!(remaining(0, 5), 0);
        assert_eq!(remaining(250_000, u64::MAX), 0);
        assert_eq!(remaining(u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn test_cap_allocations_scales_when_overallocated() {
        let uncapped = vec![30_000, 30_000, 30_000, 30_000, 30_000];
        let capped = cap_allocations(100_000, &uncapped);
        assert_eq!(capped, vec![20_000; 5]);
        for (c, u) in capped.iter().zip(&uncapped) {
            assert!(c < u);
        }
        assert!(capped.iter().sum::<u64>() <= 100_000);
    }

    #[test]
    fn test_cap_allocations_rounding_loss_not_corrected() {
        let capped = cap_allocations(10, &[7, 7, 7]);
        assert_eq!(capped, vec![3, 3, 3]);
        assert_eq!(capped.iter().sum::<u64>(), 9);
    }

    #[test]
    fn test_cap_allocations_untouched_when_within_total() {
        let allocations = vec![10, 20, 30];
        assert_eq!(cap_allocations(60, &allocations), allocations);
        assert_eq!(cap_allocations(1_000, &allocations), allocations);
        assert_eq!(cap_allocations(0, &[0, 0]), vec![0, 0]);
    }

    #[test]
    fn test_stage_budget_normalizes_non_positive_values() {
        assert_eq!(StageBudget::new(0, 0).normalized(), (20, 1_000));
        assert_eq!(StageBudget::new(-5, -1).normalized(), (20, 1_000));
        assert_eq!(StageBudget::new(35, 7_000).normalized(), (35, 7_000));
    }

    #[test]
    fn test_unconfigured_stage_gets_full_total() {
        let budgets = StageBudgets::new();
        assert!(budgets.is_empty());
        assert_eq!(budgets.allocated(250_000, Stage::Build), 250_000);

        let partial = StageBudgets::new().with_stage(Stage::Design, StageBudget::new(30, 1_000));
        assert_eq!(partial.allocated(250_000, Stage::Build), 250_000);
        assert_eq!(partial.allocated(250_000, Stage::Design), 75_000);
    }

    #[test]
    fn test_zero_total_allocates_nothing_at_stage_level() {
        let budgets = StageBudgets::new().with_stage(Stage::Build, StageBudget::new(40, 5_000));
        assert_eq!(budgets.allocated(0, Stage::Build), 0);
        assert_eq!(budgets.uncapped_sum(0), 0);
    }

    #[test]
    fn test_stage_allocation_within_total() {
        let budgets = StageBudgets::new()
            .with_stage(Stage::Discover, StageBudget::new(10, 1_000))
            .with_stage(Stage::Design, StageBudget::new(25, 1_000))
            .with_stage(Stage::Build, StageBudget::new(40, 1_000))
            .with_stage(Stage::Ship, StageBudget::new(20, 1_000))
            .with_stage(Stage::Reflect, StageBudget::new(5, 1_000));
        let plan = budgets.plan(200_000);
        assert_eq!(
            plan,
            vec![
                (Stage::Discover, 20_000),
                (Stage::Design, 50_000),
                (Stage::Build, 80_000),
                (Stage::Ship, 40_000),
                (Stage::Reflect, 10_000),
            ]
        );
    }

    #[test]
    fn test_floors_trigger_proportional_cap() {
        let budgets = StageBudgets::new()
            .with_stage(Stage::Discover, StageBudget::new(20, 5_000))
            .with_stage(Stage::Design, StageBudget::new(20, 5_000))
            .with_stage(Stage::Build, StageBudget::new(20, 5_000))
            .with_stage(Stage::Ship, StageBudget::new(20, 5_000))
            .with_stage(Stage::Reflect, StageBudget::new(20, 5_000));
        // Every stage floors at 5000; sum 25000 > 10000 total.
        assert_eq!(budgets.uncapped_sum(10_000), 25_000);
        let plan = budgets.plan(10_000);
        for (_, tokens) in &plan {
            assert_eq!(*tokens, 2_000);
            assert!(*tokens < 5_000);
        }
        assert!(plan.iter().map(|(_, t)| t).sum::<u64>() <= 10_000);
    }

    #[test]
    fn test_default_budget_tiers() {
        assert_eq!(default_budget(1), 50_000);
        assert_eq!(default_budget(2), 100_000);
        assert_eq!(default_budget(3), 250_000);
        assert_eq!(default_budget(4), 500_000);
        assert_eq!(default_budget(5), 1_000_000);
        assert_eq!(default_budget(0), 1_000_000);
        assert_eq!(default_budget(9), 1_000_000);
        assert_eq!(default_budget(-1), 1_000_000);
    }
}
