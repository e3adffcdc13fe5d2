pub mod budget;
pub mod checkpoint;
pub mod children;
pub mod claim;
pub mod complexity;
pub mod context;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod sprint_config;
pub mod store;
pub mod tracker;
