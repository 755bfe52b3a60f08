//! `beacon sound on|off|status`.

use crate::cli::{GlobalOpts, OutputFormat, SoundArgs, SoundCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &SoundArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let prefs = config::sound_preference();
    let user = config::user_for(global);

    let enabled = match args.command {
        SoundCommand::On => {
            prefs.save(&user, true)?;
            true
        }
        SoundCommand::Off => {
            prefs.save(&user, false)?;
            false
        }
        SoundCommand::Status => prefs.load(&user)?,
    };

    let rendered = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::json!({ "user": user, "enabled": enabled }).to_string()
        }
        OutputFormat::Table | OutputFormat::Plain => {
            format!("sound {}", if enabled { "enabled" } else { "disabled" })
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
