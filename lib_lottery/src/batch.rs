//! # Batch Scheduler
//!
//! Partitions the ordered record sequence into envelopes of at most
//! `batch_max_amount` bets and paces the transmission between them.
//!
//! Pacing happens after every envelope except the last one, whatever its size,
//! so the aggregator is throttled without delaying the end of the session.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::SessionError;
use crate::loggers::loggerlocal::{LoggerLocal, DEBUG};
use crate::loggers::logrecord::Logrecord;
use crate::protocol::BetRecord;

/// One bounded group of bets sent as a single `BATCH` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEnvelope {
    /// 1-based position in the schedule.
    pub sequence: usize,
    pub records: Vec<BetRecord>,
    /// True for the final envelope of the schedule.
    pub is_last: bool,
}

impl BatchEnvelope {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the scheduler pauses after this envelope.
    pub fn pause_after(&self) -> bool {
        !self.is_last
    }
}

/// Splits `records` into `ceil(len / max_size)` envelopes preserving order.
///
/// An empty input yields no envelopes. `max_size == 0` is a configuration
/// error.
pub fn chunks(records: Vec<BetRecord>, max_size: usize) -> Result<Vec<BatchEnvelope>, SessionError> {
    if max_size == 0 {
        return Err(SessionError::InvalidConfig(
            "batch_max_amount must be greater than zero".to_string(),
        ));
    }

    Ok(partition(records, max_size))
}

fn partition(records: Vec<BetRecord>, max_size: usize) -> Vec<BatchEnvelope> {
    let total = records.len().div_ceil(max_size);
    let mut envelopes = Vec::with_capacity(total);
    let mut iter = records.into_iter().peekable();
    let mut sequence = 0;
    while iter.peek().is_some() {
        sequence += 1;
        let chunk: Vec<BetRecord> = iter.by_ref().take(max_size).collect();
        envelopes.push(BatchEnvelope {
            sequence,
            records: chunk,
            is_last: sequence == total,
        });
    }
    envelopes
}

/// # BatchScheduler
///
/// Holds the validated batch size and the pacing interval for one session.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    max_size: usize,
    pacing: Duration,
}

impl BatchScheduler {
    pub fn new(max_size: usize, pacing: Duration) -> Result<Self, SessionError> {
        if max_size == 0 {
            return Err(SessionError::InvalidConfig(
                "batch_max_amount must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_size, pacing })
    }

    /// See [`chunks`].
    pub fn schedule(&self, records: Vec<BetRecord>) -> Vec<BatchEnvelope> {
        partition(records, self.max_size)
    }

    /// Sleeps the pacing interval after `envelope` when it is not the last.
    ///
    /// Returns `Some(true)` when a pause was taken, `Some(false)` when none was
    /// due, and `None` when shutdown cut the pause short.
    pub async fn pace(
        &self,
        envelope: &BatchEnvelope,
        agency: &str,
        cancel: &CancellationToken,
        logger: &LoggerLocal,
    ) -> Option<bool> {
        if !envelope.pause_after() {
            return Some(false);
        }

        logger
            .event(
                DEBUG,
                Logrecord::action("batch_pacing", "in_progress")
                    .field("client_id", agency)
                    .field("after_batch", envelope.sequence)
                    .field("sleep_ms", self.pacing.as_millis()),
            )
            .await;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(self.pacing) => Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loggers::loggerlocal::LoggerLocalOptions;
    use proptest::prelude::*;

    fn bets(n: usize) -> Vec<BetRecord> {
        (0..n)
            .map(|i| BetRecord::new("1", "Ana", "Diaz", format!("{}", 30_000_000 + i), "1990-01-01", "7"))
            .collect()
    }

    #[test]
    fn test_seven_records_by_three() {
        let envelopes = chunks(bets(7), 3).unwrap();
        let sizes: Vec<usize> = envelopes.iter().map(BatchEnvelope::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        let pauses: Vec<usize> = envelopes.iter().filter(|e| e.pause_after()).map(|e| e.sequence).collect();
        assert_eq!(pauses, vec![1, 2]);
        assert!(envelopes[2].is_last);
    }

    #[test]
    fn test_exact_multiple_has_no_short_tail() {
        let sizes: Vec<usize> = chunks(bets(6), 3).unwrap().iter().map(BatchEnvelope::len).collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn test_empty_input_yields_no_envelope() {
        assert!(chunks(Vec::new(), 4).unwrap().is_empty());
    }

    #[test]
    fn test_zero_max_size_is_invalid_config() {
        assert!(matches!(chunks(bets(2), 0), Err(SessionError::InvalidConfig(_))));
        assert!(matches!(
            BatchScheduler::new(0, Duration::ZERO),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_pace_skips_last_envelope_and_honours_cancel() {
        let logger = LoggerLocal::new("batch-test".to_string(), Some(LoggerLocalOptions::capture_only()));
        let scheduler = BatchScheduler::new(2, Duration::from_secs(30)).unwrap();
        let envelopes = scheduler.schedule(bets(3));
        let cancel = CancellationToken::new();

        assert_eq!(scheduler.pace(&envelopes[1], "1", &cancel, &logger).await, Some(false));

        cancel.cancel();
        // A 30s pause must not hold up shutdown.
        assert_eq!(scheduler.pace(&envelopes[0], "1", &cancel, &logger).await, None);
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_count_and_order(len in 1usize..200, max in 1usize..50) {
            let records = bets(len);
            let envelopes = chunks(records.clone(), max).unwrap();
            prop_assert_eq!(envelopes.len(), len.div_ceil(max));
            prop_assert!(envelopes.iter().all(|e| !e.is_empty() && e.len() <= max));
            let flat: Vec<BetRecord> = envelopes.iter().flat_map(|e| e.records.clone()).collect();
            prop_assert_eq!(flat, records.clone());

            let scheduler = BatchScheduler::new(max, Duration::ZERO).unwrap();
            prop_assert_eq!(scheduler.schedule(records), envelopes);
        }
    }
}
