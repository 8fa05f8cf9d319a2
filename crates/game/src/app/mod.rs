pub(crate) mod bootstrap;
mod digest;
mod harness;
pub(crate) mod loop_runner;
mod replay;
mod sim;
