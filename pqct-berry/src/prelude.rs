//! 🦴欢迎光临🦴
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx2dF};

pub use crate::data::{CtWindow, Geometry, ImgWriteRaw, ImgWriteVis, LabelImage, ScanImage};

pub use crate::consts::label::{
    AIR, BONE_4PCT, BONE_MARROW, CORT_BONE, FAT, H_CORT_BONE, IM_FAT, MUSCLE, SUB_FAT,
    TOT_AREA, TRAB_BONE,
};
pub use crate::consts::TissueClass;

pub use crate::error::{PqctError, PqctResult};
pub use crate::params::{FatSeparation, SegmentationParams};
pub use crate::pipeline::{analyze, analyze_by_id, Analysis, Workflow};
pub use crate::stats::QuantRecord;
