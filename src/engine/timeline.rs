use crate::domain::{
    DecodeIssue, Decimal, Operation, OperationKind, RecordSource, TimelineEntry, UnixSecs,
};
use tracing::warn;

use super::PriceIndex;

/// Orders operations and folds them into running balances.
///
/// The builder owns ordering: callers may hand operations over in any order.
/// Operations with equal timestamps keep their relative input order.
/// An operation that would overflow the running balances or their valuation
/// is left off the timeline and reported instead.
pub struct TimelineBuilder<'a> {
    index: &'a PriceIndex,
    cumulative_stable: Decimal,
    cumulative_volatile: Decimal,
    entries: Vec<TimelineEntry>,
    rejected: Vec<DecodeIssue>,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(index: &'a PriceIndex) -> Self {
        Self {
            index,
            cumulative_stable: Decimal::zero(),
            cumulative_volatile: Decimal::zero(),
            entries: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Build a timeline in one call.
    pub fn build(operations: Vec<Operation>, index: &'a PriceIndex) -> Vec<TimelineEntry> {
        Self::build_with_rejections(operations, index).0
    }

    /// Like [`TimelineBuilder::build`], also returning the operations that
    /// were left off.
    pub fn build_with_rejections(
        operations: Vec<Operation>,
        index: &'a PriceIndex,
    ) -> (Vec<TimelineEntry>, Vec<DecodeIssue>) {
        let mut builder = Self::new(index);
        builder.extend(operations);
        builder.finish_with_rejections()
    }

    /// Sort a batch and append it. Every entry's balances cover exactly the
    /// operations before and including it.
    pub fn extend(&mut self, mut operations: Vec<Operation>) {
        // sort_by_key is stable.
        operations.sort_by_key(|op| op.timestamp);
        if let (Some(last), Some(first)) = (self.entries.last(), operations.first()) {
            if first.timestamp < last.timestamp() {
                // Out-of-order batch: rebuild from scratch with everything.
                let mut all: Vec<Operation> = std::mem::take(&mut self.entries)
                    .into_iter()
                    .map(TimelineEntry::into_operation)
                    .collect();
                all.extend(operations);
                all.sort_by_key(|op| op.timestamp);
                self.cumulative_stable = Decimal::zero();
                self.cumulative_volatile = Decimal::zero();
                operations = all;
            }
        }
        self.entries.reserve(operations.len());
        for op in operations {
            self.push(op);
        }
    }

    fn push(&mut self, op: Operation) {
        let balances = self
            .cumulative_stable
            .checked_add(op.stable_change)
            .zip(self.cumulative_volatile.checked_add(op.volatile_change));
        let Some((stable, volatile)) = balances else {
            self.reject(&op, "running balance overflows");
            return;
        };

        let price = self.index.lookup(op.timestamp);
        match TimelineEntry::derive(op, stable, volatile, price) {
            Ok(entry) => {
                self.cumulative_stable = stable;
                self.cumulative_volatile = volatile;
                self.entries.push(entry);
            }
            Err(op) => self.reject(&op, "valuation overflows"),
        }
    }

    fn reject(&mut self, op: &Operation, reason: &str) {
        warn!("Leaving {} off the timeline: {}", op.key, reason);
        self.rejected.push(DecodeIssue {
            source: record_source(op),
            record_id: op.key.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn rejected(&self) -> &[DecodeIssue] {
        &self.rejected
    }

    pub fn finish(self) -> Vec<TimelineEntry> {
        self.entries
    }

    pub fn finish_with_rejections(self) -> (Vec<TimelineEntry>, Vec<DecodeIssue>) {
        (self.entries, self.rejected)
    }
}

fn record_source(op: &Operation) -> RecordSource {
    match op.kind {
        OperationKind::Swap if op.details.manual => RecordSource::Seed,
        OperationKind::Swap => RecordSource::Swap,
        OperationKind::PositionOpen | OperationKind::PositionClose => RecordSource::Position,
    }
}

/// Time window that the price series must cover for a set of operations:
/// from the earliest operation (or `now` when there are none) to the later of
/// the latest operation and `now`.
pub fn price_window(operations: &[Operation], now: UnixSecs) -> (UnixSecs, UnixSecs) {
    let start = operations
        .iter()
        .map(|op| op.timestamp)
        .min()
        .unwrap_or(now);
    let end = operations
        .iter()
        .map(|op| op.timestamp)
        .max()
        .map_or(now, |latest| latest.max(now));
    (start.min(end), end)
}
