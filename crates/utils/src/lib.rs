//! Helpers shared by the build controller binaries: logging setup and the
//! version string embedded at build time.

mod build_info;
pub mod logging;
pub mod version;
