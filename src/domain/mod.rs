// Domain layer: core records and the ports (interfaces) the pipeline is written against.

pub mod model;
pub mod ports;
