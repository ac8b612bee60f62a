pub mod api;
pub mod control;
pub mod delta;
pub mod history;
pub mod live;
pub mod persistence;
pub mod poller;
pub mod reconciler;
pub mod stream;
pub mod types;
pub mod window;
