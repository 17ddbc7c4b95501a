//! Calculation history
//!
//! Bounded, insertion-ordered record of results. Results are shared as
//! `Arc` and never mutated after they are recorded.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{CalculationResult, CalculationType};

#[derive(Debug, Clone)]
pub struct CalculationHistory {
    capacity: usize,
    results: VecDeque<Arc<CalculationResult>>,
}

impl CalculationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            results: VecDeque::new(),
        }
    }

    /// Append a result, evicting the oldest when at capacity
    pub fn record(&mut self, result: CalculationResult) -> Arc<CalculationResult> {
        if self.results.len() == self.capacity {
            if let Some(evicted) = self.results.pop_front() {
                debug!(result_id = %evicted.id, "Evicted oldest calculation");
            }
        }

        let result = Arc::new(result);
        self.results.push_back(Arc::clone(&result));
        result
    }

    pub fn latest(&self) -> Option<&Arc<CalculationResult>> {
        self.results.back()
    }

    pub fn latest_of(&self, calculation_type: CalculationType) -> Option<&Arc<CalculationResult>> {
        self.results
            .iter()
            .rev()
            .find(|r| r.calculation_type == calculation_type)
    }

    /// Most recent projected fund (timeline or scenario total)
    pub fn latest_projected_fund(&self) -> Option<f64> {
        self.results.iter().rev().find_map(|r| r.projected_fund())
    }

    pub fn get(&self, id: Uuid) -> Option<&Arc<CalculationResult>> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CalculationResult>> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CalculationEngine, EngineAssumptions};

    fn withdrawal(fund: f64) -> CalculationResult {
        CalculationEngine::new(EngineAssumptions::default())
            .compute_withdrawal(fund, 1_000.0, None)
            .unwrap()
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut history = CalculationHistory::new(2);
        let first = history.record(withdrawal(100_000.0));
        history.record(withdrawal(200_000.0));
        let third = history.record(withdrawal(300_000.0));

        assert_eq!(history.len(), 2);
        assert!(history.get(first.id).is_none());
        assert_eq!(history.latest().unwrap().id, third.id);
        assert_eq!(history.iter().next().unwrap().output("fund_amount"), Some(200_000.0));
    }

    #[test]
    fn test_latest_of_type_and_fund() {
        let mut history = CalculationHistory::new(5);
        history.record(withdrawal(100_000.0));

        assert!(history.latest_of(CalculationType::Timeline).is_none());
        assert!(history.latest_of(CalculationType::Withdrawal).is_some());
        assert_eq!(history.latest_projected_fund(), None);

        history.clear();
        assert!(history.is_empty());
    }
}
