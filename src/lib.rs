pub mod config;
pub mod control_loop;
pub mod diagnostic_log;
pub mod gpio_cdev;
pub mod hardware_line;
pub mod relay_engine;
pub mod relay_types;
pub mod simulated_line;
pub mod state_store;
