//! Shared numeric constants for transport, scoring and run control.

/// Electron rest energy in MeV.
pub const ELECTRON_REST_ENERGY: f64 = 0.510_998_95;

/// Hard ceiling on the intersection buffer before the geometry is rejected.
pub const MAX_INTERSECTIONS: usize = 16_384;
pub const INITIAL_INTERSECTIONS: usize = 512;

/// Floor on |cos| between a scoring ray and the detector normal.
pub const GRAZING_COSINE_FLOOR: f64 = 0.08;

/// Optical depths at or above this transmit nothing.
pub const MAX_OPTICAL_DEPTH: f64 = 80.0;

/// Mean free path assigned to vacuum segments.
pub const VACUUM_MFP: f64 = 1.0e15;
pub const INFINITE_DISTANCE: f64 = 1.0e30;

/// Default particle stack capacity; splitting past this is fatal.
pub const DEFAULT_MAX_STACK: usize = 50_000;

pub const DEFAULT_NBATCH: usize = 10;
pub const DEFAULT_NCHUNK: usize = 10;

/// Splitter importance bounds, as split numbers.
pub const DEFAULT_MIN_SPLITTING: u32 = 10;
pub const DEFAULT_MAX_SPLITTING: u32 = 1000;

/// Job control file locking: rounds × attempts per round, one second apart.
pub const LOCK_ROUNDS: u32 = 5;
pub const LOCK_ATTEMPTS_PER_ROUND: u32 = 12;
pub const CONTROL_FILE_OPEN_ATTEMPTS: u32 = 15;
pub const CONTROL_FILE_BUFFER: usize = 1024;

/// Sibling checkpoints are searched as `<output>_w1` through `<output>_w499`.
pub const MAX_COMBINED_JOBS: u32 = 499;

pub const DEFAULT_WATCHER_RETRIES: u32 = 10;
pub const DEFAULT_WATCHER_INTERVAL_SECONDS: f64 = 5.0;
