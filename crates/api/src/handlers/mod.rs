pub mod breakouts;
pub mod events;
pub mod recordings;
