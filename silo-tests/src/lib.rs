//! Test support for the silo workspace.
//!
//! The centerpiece is [`FakeDriver`]: an in-memory backend with one variant
//! per connection family, scriptable failures and observable counters, so
//! pool, registry and transaction-manager behavior can be exercised
//! without a server.

mod fake;

pub use fake::*;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test logging once per process.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
