//! Script console output
//!
//! `print` never writes to stdout; each call becomes one `tracing` event under the
//! `pyscript::print` target so hosts can filter or redirect script output.

use tracing::info;

/// Emit one line of script output
pub fn print(session: u64, line: &str) {
    info!(target: "pyscript::print", session, "{}", line);
}
