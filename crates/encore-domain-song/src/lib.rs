pub mod builders;
pub mod midi_export;
pub mod midi_import;
pub mod model;
pub mod timeline;
pub mod tracker;

pub use builders::*;
pub use midi_export::*;
pub use midi_import::*;
pub use model::*;
pub use timeline::*;
pub use tracker::*;
