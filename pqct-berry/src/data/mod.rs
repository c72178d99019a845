//! 二维扫描与标签栅格.

mod grid;
mod save;
mod window;

pub use grid::{Connectivity, Geometry, LabelImage, ScanImage};
pub use save::{ImgWriteRaw, ImgWriteVis};
pub use window::CtWindow;
