use crate::{ExtractionError, ExtractionResult};
use mel_primitives::{batch_data_hash, kind, BatchPostingReport, DelayedInboxMessage};

/// Returns the batch posting reports delivered in the block, one per batch, in delivery order.
pub(crate) fn batch_posting_reports(
    delayed_messages: &[DelayedInboxMessage],
    batches: usize,
) -> ExtractionResult<Vec<BatchPostingReport>> {
    let reports: Vec<_> = delayed_messages
        .iter()
        .filter(|delayed| delayed.message.header.kind == kind::BATCH_POSTING_REPORT)
        .collect();
    if reports.len() != batches {
        tracing::error!(target: "mel::extraction", reports = reports.len(), batches, "batch posting report count mismatch");
        return Err(ExtractionError::ReportCountMismatch { reports: reports.len(), batches })
    }

    Ok(reports
        .into_iter()
        .map(|delayed| BatchPostingReport::parse(&delayed.message.l2_msg))
        .collect::<Result<_, _>>()?)
}

/// Checks that the report commits to the serialized batch.
pub(crate) fn verify_batch_data_hash(
    report: &BatchPostingReport,
    sequence_number: u64,
    serialized: &[u8],
) -> ExtractionResult<()> {
    let got = batch_data_hash(serialized);
    if got != report.data_hash {
        tracing::error!(target: "mel::extraction", sequence_number, expected = ?report.data_hash, ?got, "batch data hash incorrect");
        return Err(ExtractionError::BatchDataHashMismatch {
            sequence_number,
            expected: report.data_hash,
            got,
        })
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};
    use mel_primitives::L1IncomingMessage;

    fn delayed(kind: u8, l2_msg: alloy_primitives::Bytes) -> DelayedInboxMessage {
        let mut message = DelayedInboxMessage::default();
        message.message = L1IncomingMessage { l2_msg, ..Default::default() };
        message.message.header.kind = kind;
        message
    }

    fn report(data: &[u8]) -> BatchPostingReport {
        BatchPostingReport {
            batch_timestamp: U256::from(1),
            batch_poster: Address::repeat_byte(1),
            data_hash: batch_data_hash(data),
            batch_number: 0,
            l1_base_fee: U256::from(7),
            extra_gas: 0,
        }
    }

    #[test]
    fn test_reports_are_matched_to_batches() -> eyre::Result<()> {
        // Given
        let messages = vec![
            delayed(kind::ETH_DEPOSIT, Default::default()),
            delayed(kind::BATCH_POSTING_REPORT, report(b"one").encode()),
            delayed(kind::BATCH_POSTING_REPORT, report(b"two").encode()),
        ];

        // When
        let reports = batch_posting_reports(&messages, 2)?;

        // Then
        assert_eq!(reports, vec![report(b"one"), report(b"two")]);
        verify_batch_data_hash(&reports[1], 1, b"two")?;
        assert!(matches!(
            verify_batch_data_hash(&reports[1], 1, b"one"),
            Err(ExtractionError::BatchDataHashMismatch { sequence_number: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_report_count_mismatch() {
        let messages = vec![delayed(kind::BATCH_POSTING_REPORT, report(b"one").encode())];
        assert!(matches!(
            batch_posting_reports(&messages, 2),
            Err(ExtractionError::ReportCountMismatch { reports: 1, batches: 2 })
        ));
        assert!(matches!(
            batch_posting_reports(&[], 0).map(|reports| reports.len()),
            Ok(0)
        ));
    }

    #[test]
    fn test_truncated_report_is_rejected() {
        let messages =
            vec![delayed(kind::BATCH_POSTING_REPORT, B256::ZERO.to_vec().into())];
        assert!(matches!(
            batch_posting_reports(&messages, 1),
            Err(ExtractionError::InvalidReport(_))
        ));
    }
}
