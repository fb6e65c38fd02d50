mod host;

pub use host::{headroom, jitter, memory_pressure, HostSensors};
