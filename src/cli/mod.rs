//! Process lifecycle: a root cancellation token shared by every background
//! task, tripped by SIGINT/SIGTERM, with SIGHUP reserved for a route-file
//! reload that does not tear anything down.

pub mod shutdown;

pub use shutdown::ShutdownController;
