//! `beacon config path|show`.

use beacon_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let rendered = match args.command {
        ConfigCommand::Path => format!(
            "config: {}\nstate:  {}",
            beacon_config::config_path().display(),
            beacon_config::state_path().display()
        ),
        ConfigCommand::Show => {
            let mut cfg = beacon_config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some(REDACTED.into());
                }
            }
            toml::to_string_pretty(&cfg).map_err(ConfigError::from)?
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
