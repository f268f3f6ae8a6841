pub mod controller;
pub mod registry;
pub mod state;

pub use controller::SessionController;
pub use registry::SessionRegistry;
pub use state::SessionState;
