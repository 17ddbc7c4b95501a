//! Calculation audit and replay
//!
//! Every result carries a hash of its input snapshot. Replaying the snapshot
//! through the engine must reproduce both the hash and the outputs.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::warn;
use uuid::Uuid;

use crate::engine::evaluate;
use crate::models::{CalculationResult, InputsSnapshot};
use crate::Result;

/// SHA-256 of the snapshot's JSON form, hex encoded
pub fn snapshot_hash(snapshot: &InputsSnapshot) -> String {
    fingerprint(snapshot)
}

/// Empty when the value cannot be serialized
fn fingerprint<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON straight into the hasher
    if let Err(e) = serde_json::to_writer(&mut HashWriter(&mut hasher), value) {
        warn!(error = %e, "Could not fingerprint input snapshot");
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReplayReport {
    pub result_id: Uuid,
    pub hash_matches: bool,
    pub outputs_match: bool,
    pub replayed_outputs: BTreeMap<String, f64>,
}

impl ReplayReport {
    pub fn is_reproducible(&self) -> bool {
        self.hash_matches && self.outputs_match
    }
}

/// Re-evaluate a stored result from its snapshot and compare
pub fn verify_reproducible(result: &CalculationResult) -> Result<ReplayReport> {
    let evaluation = evaluate(&result.inputs_snapshot)?;

    let report = ReplayReport {
        result_id: result.id,
        hash_matches: snapshot_hash(&result.inputs_snapshot) == result.inputs_hash,
        outputs_match: evaluation.outputs == result.outputs && evaluation.trace == result.trace,
        replayed_outputs: evaluation.outputs,
    };

    if !report.is_reproducible() {
        warn!(
            result_id = %result.id,
            hash_matches = report.hash_matches,
            outputs_match = report.outputs_match,
            "Replay did not reproduce stored result"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CalculationEngine, EngineAssumptions};
    use crate::models::TimelineInputs;

    fn inputs() -> TimelineInputs {
        TimelineInputs {
            age: 40,
            retirement_age: 67,
            current_savings: 80_000.0,
            monthly_savings: 900.0,
            expected_return: 0.06,
            inflation_rate: 0.03,
        }
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = snapshot_hash(&InputsSnapshot::Timeline(inputs()));
        let b = snapshot_hash(&InputsSnapshot::Timeline(inputs()));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut changed = inputs();
        changed.monthly_savings = 901.0;
        assert_ne!(a, snapshot_hash(&InputsSnapshot::Timeline(changed)));
    }

    #[test]
    fn test_unserializable_value_has_no_fingerprint() {
        // JSON object keys must be strings
        let mut bad: BTreeMap<(u8, u8), u8> = BTreeMap::new();
        bad.insert((1, 2), 3);
        assert_eq!(fingerprint(&bad), "");
    }

    #[test]
    fn test_replay_reproduces_withdrawal() {
        let engine = CalculationEngine::new(EngineAssumptions::default());
        let result = engine.compute_withdrawal(400_000.0, 2_500.0, None).unwrap();

        let report = verify_reproducible(&result).unwrap();
        assert!(report.is_reproducible());
        assert_eq!(report.replayed_outputs, result.outputs);
    }

    #[test]
    fn test_replay_detects_tampering() {
        let engine = CalculationEngine::new(EngineAssumptions::default());
        let mut result = engine.compute_withdrawal(400_000.0, 2_500.0, None).unwrap();
        result.outputs.insert("sustainable_monthly".into(), 1.0);

        let report = verify_reproducible(&result).unwrap();
        assert!(report.hash_matches);
        assert!(!report.outputs_match);
    }
}
