pub mod rasterize;
pub mod grid;
pub mod quality;
pub mod projection;

pub use rasterize::*;
pub use grid::*;
pub use quality::*;
pub use projection::*;
