pub mod classifier;
pub mod color;
pub mod mask;
pub mod orientation;

pub use classifier::{PassThroughList, ReconstructionStrategy, classify};
pub use color::{ColorPath, to_rgb};
pub use mask::{MaskCandidate, normalize_mask};
pub use orientation::{CompositeScore, Orientation, Resolution, ResolverConfig, resolve};
