pub mod drift;
pub mod engine;
pub mod presence;
pub mod ui;
pub mod widget;
