pub mod notifications;
pub mod orders;
pub mod pickup;
pub mod system;
