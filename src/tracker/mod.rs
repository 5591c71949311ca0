pub mod controller;

pub use controller::EventTracker;
