//! Metrics emitted by pipeline stages.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};

static REGISTER_METRICS: Once = Once::new();

/// Label carrying the stage name.
pub const STAGE_LABEL: &str = "stage";

/// Counter of values a stage delivered to its output channel.
pub const STAGEPIPE_VALUES_EMITTED_TOTAL: &str = "stagepipe_values_emitted_total";

/// Counter of stages that stopped because cancellation fired.
pub const STAGEPIPE_STAGES_CANCELLED_TOTAL: &str = "stagepipe_stages_cancelled_total";

/// Gauge of stage and forwarding tasks currently alive.
pub const STAGEPIPE_ACTIVE_TASKS: &str = "stagepipe_active_tasks";

/// Registers descriptions for the pipeline metrics.
///
/// Safe to call multiple times, registration happens only once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            STAGEPIPE_VALUES_EMITTED_TOTAL,
            Unit::Count,
            "Values delivered by a stage to its output channel, labeled by stage"
        );

        describe_counter!(
            STAGEPIPE_STAGES_CANCELLED_TOTAL,
            Unit::Count,
            "Stages that stopped because the cancellation signal fired, labeled by stage"
        );

        describe_gauge!(
            STAGEPIPE_ACTIVE_TASKS,
            Unit::Count,
            "Stage and merge forwarding tasks currently alive"
        );
    });
}
