pub mod active_notes;
pub mod app;
pub mod ipc;
pub mod manager;
pub mod note_off;
pub mod scheduler;

pub use active_notes::*;
pub use app::*;
pub use ipc::*;
pub use manager::*;
pub use note_off::*;
pub use scheduler::*;
