pub mod broadcast;
pub mod config_cmd;
pub mod incidents;
pub mod sound;
pub mod watch;
