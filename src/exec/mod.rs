//! Application loop and entry point.

pub mod app_main;
pub mod update_loop;

pub use app_main::{app_main, init_logging};
pub use update_loop::{
    run_update_loop, single_loop_iteration, LoopClock, Updatable, UpdateLoopStatus, UpdateRequests,
};
