use serde::Deserialize;
use zkseq_common::resources::BatchConstraints;

fn default_batch_max_open_duration_secs() -> u64 {
    // Matches the upstream trusted sequencer's batch deadline.
    120
}

/// Tunables of the batch finalizer.
#[derive(Clone, Debug, Deserialize)]
pub struct FinalizerConfig {
    /// Percentage of a resource's maximum at which the batch closes early,
    /// leaving headroom for the final L2 block's fixed overhead. Must be
    /// below 100 to be useful.
    pub resource_percentage_to_close_batch: u64,

    /// Run the full-batch sanity reprocess inline, halting on any failure.
    /// When false the reprocess runs on its own task and failures are only
    /// logged.
    pub sequential_reprocess_full_batch: bool,

    pub batch_constraints: BatchConstraints,

    /// Wall-clock deadline after which an open batch closes with the
    /// `Timeout` reason.
    #[serde(default = "default_batch_max_open_duration_secs")]
    pub batch_max_open_duration_secs: u64,
}
