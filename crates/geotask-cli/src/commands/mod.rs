pub mod config;
pub mod control;
pub mod history;
pub mod run;
pub mod switch;
pub mod task;
