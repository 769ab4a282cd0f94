pub mod controller;

pub use controller::{CommandOutput, ComposeController, ContainerSnapshot, ProcessControl};
