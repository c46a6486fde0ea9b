//! permwait CLI library: terminal platform and session driver.

pub mod dialog;
pub mod session;
