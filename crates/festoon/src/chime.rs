//! The celebratory chime played at reveal time.
//!
//! The terminal bell is the whole of our audio subsystem. Playing it is best-effort: a terminal
//! that doesn't support the bell, or a closed STDOUT, must never take the card down with it.

use std::io::Write as _;

/// Ring the terminal bell. Failure is logged and swallowed.
pub fn play() {
    if let Err(error) = ring() {
        tracing::debug!("Couldn't ring the celebratory bell: {error:?}");
    }
}

/// The fallible half of [`play`].
fn ring() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(b"\x07")?;
    stdout.flush()
}
