pub mod controller;
pub mod probe;

pub use controller::ControllerClient;
pub use probe::HttpProbe;
