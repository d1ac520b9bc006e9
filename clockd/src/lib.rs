#![forbid(unsafe_code)]

mod ctl;
mod daemon;

pub use ctl::main as ctl_main;
pub use daemon::main as daemon_main;
