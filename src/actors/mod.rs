pub mod load_coordinator;

pub use load_coordinator::{LoadCoordinator, LoadCoordinatorMessage, LoadStats};
