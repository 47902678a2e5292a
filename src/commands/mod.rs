pub mod organize_commands;
pub mod organize_pipeline;
pub mod settings_commands;
