use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

/// Zero-argument teardown callback.
pub type Callback = Box<dyn FnOnce() + Send>;

/// Runs every callback, isolating panics so one failure cannot skip the rest.
///
/// Returns the number of callbacks that panicked.
pub fn run_isolated(scope: &str, callbacks: impl IntoIterator<Item = (String, Callback)>) -> usize {
	let mut panicked = 0;
	for (name, callback) in callbacks {
		if catch_unwind(AssertUnwindSafe(callback)).is_err() {
			warn!(scope, callback = %name, "callback panicked");
			panicked += 1;
		}
	}
	panicked
}
