pub mod clock;
pub mod config;
pub mod context;
pub mod simulator;

// Re-export commonly used types
pub use clock::ClockListener;
pub use config::SimulatorConfig;
pub use context::SimulatorContext;
pub use simulator::Simulator;
