//! Side-effecting adapters: processes, package managers, configuration and
//! the external collaborators the healer talks to.

pub mod config;
pub mod distro;
pub mod inference;
pub mod installer;
pub mod memory;
pub mod process;
pub mod runner;
