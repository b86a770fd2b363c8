pub mod color;
pub mod math;
pub mod motion;
pub mod progress;
pub mod replay;
pub mod rng;

/// Simulation frame counter. The world advances in discrete steps at
/// [`FPS`] frames per second; every duration in the engine is a frame count.
pub type Frame = i32;

/// Simulation rate in frames per second.
pub const FPS: i32 = 60;
