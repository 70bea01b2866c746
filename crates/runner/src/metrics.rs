use mel_extraction::ExtractionOutput;
use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// The metrics for the [`super::MelRunner`].
#[derive(Metrics, Clone)]
#[metrics(scope = "mel_runner")]
pub struct RunnerMetrics {
    /// A counter on the parent chain blocks processed.
    pub blocks_processed: Counter,
    /// A counter on the messages extracted.
    pub messages_extracted: Counter,
    /// A counter on the delayed messages seen.
    pub delayed_messages_seen: Counter,
    /// A counter on the sequencer batches seen.
    pub batches_seen: Counter,
    /// A counter on the parent chain reorgs.
    pub reorgs: Counter,
    /// The parent chain block number of the head state.
    pub head_block_number: Gauge,
    /// The number of consecutive failed steps.
    pub stuck_steps: Gauge,
    /// The duration of the extraction of a parent chain block.
    pub extraction_duration: Histogram,
}

impl RunnerMetrics {
    /// Records a saved extraction output.
    pub(crate) fn record_output(&self, output: &ExtractionOutput) {
        self.blocks_processed.increment(1);
        self.messages_extracted.increment(output.messages.len() as u64);
        self.delayed_messages_seen.increment(output.delayed_messages.len() as u64);
        self.batches_seen.increment(output.batch_metas.len() as u64);
        self.head_block_number.set(output.state.parent_chain_block_number as f64);
    }
}
