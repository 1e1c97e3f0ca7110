// Trainyard - experiment project manager for ML training runs
// Module declarations

pub mod cli;
pub mod logtail;
pub mod pages;
pub mod registry;
pub mod scaffold;
pub mod settings;
pub mod state;
