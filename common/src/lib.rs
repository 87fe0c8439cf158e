pub mod metrics;
pub mod tracer;

pub type AtomicNumber = u32;
pub type MassNumber = u32;
pub type Real = f64;

/// Kinetic energies and energy losses, in MeV.
pub type Energy = Real;

pub type EventId = u64;

/// Separator used to build `"<layer>.<signal>"` parameter keys.
pub const PARAMETER_SEPARATOR: char = '.';

pub fn parameter_key(layer: &str, signal: &str) -> String {
    format!("{layer}{PARAMETER_SEPARATOR}{signal}")
}
