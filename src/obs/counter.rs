// self
use crate::obs::{Outcome, Stage};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_outcome(stage: Stage, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"resilient_client_outcome_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}
