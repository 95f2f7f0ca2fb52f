//! Domain logic: templating, message building and the dispatch engine

pub mod communication;
pub mod dispatch;
