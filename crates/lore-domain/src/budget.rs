//! Per-run cost ceilings for oracle-dependent work

use thiserror::Error;

/// Raised when a charge would exceed the run's ceiling
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Budget exceeded: spent {spent:.2} of {limit:.2}, requested {requested:.2}")]
pub struct BudgetExceeded {
    /// Configured ceiling
    pub limit: f64,
    /// Amount spent before the rejected charge
    pub spent: f64,
    /// Rejected charge
    pub requested: f64,
}

/// Cumulative cost tracker for one run
///
/// Charges that would cross the limit are refused and leave the tracker
/// unchanged. Work already paid for is never rolled back.
///
/// # Examples
///
/// ```
/// use lore_domain::CostBudget;
///
/// let mut budget = CostBudget::new(Some(2.0));
/// assert!(budget.try_charge(1.0).is_ok());
/// assert!(budget.try_charge(1.0).is_ok());
/// assert!(budget.try_charge(1.0).is_err());
/// assert_eq!(budget.calls(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CostBudget {
    limit: Option<f64>,
    spent: f64,
    calls: u64,
    exhausted: bool,
}

impl CostBudget {
    /// Create a tracker; `None` means no ceiling
    pub fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            spent: 0.0,
            calls: 0,
            exhausted: false,
        }
    }

    /// A tracker without a ceiling
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Reserve `cost` for one oracle call
    pub fn try_charge(&mut self, cost: f64) -> Result<(), BudgetExceeded> {
        if let Some(limit) = self.limit {
            if self.spent + cost > limit + f64::EPSILON {
                self.exhausted = true;
                return Err(BudgetExceeded {
                    limit,
                    spent: self.spent,
                    requested: cost,
                });
            }
        }
        self.spent += cost;
        self.calls += 1;
        Ok(())
    }

    /// Total charged so far
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Number of successful charges
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Configured ceiling
    pub fn limit(&self) -> Option<f64> {
        self.limit
    }

    /// Whether a charge has been refused
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_budget() {
        let mut budget = CostBudget::unlimited();
        for _ in 0..1000 {
            assert!(budget.try_charge(1.0).is_ok());
        }
        assert!(!budget.is_exhausted());
        assert_eq!(budget.calls(), 1000);
    }

    #[test]
    fn test_refused_charge_leaves_state() {
        let mut budget = CostBudget::new(Some(1.5));
        budget.try_charge(1.0).unwrap();
        let err = budget.try_charge(1.0).unwrap_err();
        assert_eq!(err.spent, 1.0);
        assert_eq!(budget.spent(), 1.0);
        assert!(budget.is_exhausted());
        assert!(budget.try_charge(0.5).is_ok());
    }

    #[test]
    fn test_zero_limit_refuses_everything() {
        let mut budget = CostBudget::new(Some(0.0));
        assert!(budget.try_charge(1.0).is_err());
        assert_eq!(budget.calls(), 0);
    }
}
