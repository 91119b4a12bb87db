use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Per-operation invocation counters.
#[derive(Debug, Default)]
pub struct Calls {
    counts: Mutex<BTreeMap<&'static str, usize>>,
}

impl Calls {
    pub(crate) fn record(&self, op: &'static str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(op).or_default() += 1;
    }

    pub fn get(&self, op: &str) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(op).copied().unwrap_or(0)
    }
}
