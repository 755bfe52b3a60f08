// ── Alert delivery ──
//
// Priority tiers, the sound state machine, per-view alert ownership, and
// the dispatcher tying them together.

mod config;
mod dispatcher;
mod ownership;
mod sound;

pub use config::{AlertConfig, AlertProfile, ToastChannel};
pub use dispatcher::{Alert, AlertDispatcher, DispatchOutcome, Toast, ToastAction};
pub use ownership::{AlertOwnership, OwnershipGuard};
pub use sound::{PlaybackOutcome, SilentPlayer, SoundController, SoundCue, SoundPlayer, SoundState};
