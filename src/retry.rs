use std::thread;
use std::time::Duration;

use log::warn;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(20);

/// Call `operation` until it returns `Ok`, sleeping `delay` after every failure.
///
/// Failures are never inspected: a bad argument or revoked credential loops forever exactly like a
/// dropped connection does. There is no attempt limit and no timeout.
pub fn retry_forever<T, F>(delay: Duration, mut operation: F) -> T
where
    F: FnMut() -> anyhow::Result<T>,
{
    let mut attempt: u64 = 1;
    loop {
        match operation() {
            Ok(value) => return value,
            Err(err) => {
                warn!("Attempt {attempt} failed: {err:#}");
                warn!("Retrying in {} seconds", delay.as_secs());
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
