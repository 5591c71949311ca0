pub mod event;
pub mod track_point;

pub use event::{Event, EventInput, TrainingSample};
pub use track_point::TrackPoint;
