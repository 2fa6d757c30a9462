//! Ports - interfaces the scene sync core depends on

pub mod outbound;
