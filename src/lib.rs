pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod fade;
pub mod heal;
pub mod model;
pub mod narrative;
pub mod navigation;
pub mod player;
pub mod queue;
pub mod reconcile;
pub mod session;
pub mod strategy;
pub mod transport;
pub mod trigger;

pub use player::{Collaborators, CommandOutcome, Player, TransitionStyle};
pub use reconcile::{ReconcileEvent, ReconcileOutcome};
pub use session::SessionContext;
