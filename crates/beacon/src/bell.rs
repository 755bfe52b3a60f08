//! Terminal bell as the alert sound output.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use async_trait::async_trait;

use beacon_core::{PlaybackOutcome, Priority, SoundCue, SoundPlayer};

const RING_GAP: Duration = Duration::from_millis(300);

/// Rings BEL on stderr: three times for CRITICAL, twice for HIGH, once
/// otherwise.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl TerminalBell {
    fn rings(priority: Priority) -> u32 {
        match priority {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Medium | Priority::Low => 1,
        }
    }
}

#[async_trait]
impl SoundPlayer for TerminalBell {
    async fn play(&self, cue: &SoundCue) -> PlaybackOutcome {
        if !io::stderr().is_terminal() {
            return PlaybackOutcome::Blocked {
                reason: "stderr is not a terminal".into(),
            };
        }
        for _ in 0..Self::rings(cue.priority) {
            let rung = {
                let mut err = io::stderr().lock();
                err.write_all(b"\x07").and_then(|()| err.flush())
            };
            if let Err(e) = rung {
                return PlaybackOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            tokio::time::sleep(RING_GAP).await;
        }
        PlaybackOutcome::Completed
    }

    // A ring cannot be cut short; cancelling `play` ends the pass.
    fn stop(&self) {}
}
