// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Trace switch for debugging the lowering.
//!
//! `TARN_LOWER_TRACE=1` prints PC allocation, state promotion, and
//! candidate outcomes to stderr. The variable is read once per process.

use std::sync::OnceLock;

static ENABLED: OnceLock<bool> = OnceLock::new();

pub(crate) fn enabled() -> bool {
    *ENABLED.get_or_init(|| std::env::var("TARN_LOWER_TRACE").is_ok())
}
