// Domain layer: per-job models and the archive port.

pub mod model;
pub mod ports;
