//! signal.rs
//! Ctrl-C → running flag.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::info;

/// Install a Ctrl-C handler and return the running flag it clears.
/// The handler only flips the flag; the station does the actual shutdown.
pub fn setup_ctrl_c_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        if flag.swap(false, Ordering::AcqRel) {
            info!("[Signal] interrupt received, shutting down");
        }
    })?;
    Ok(running)
}
