//! 图像的持久化存储 (调试 / 可视化用途).

use super::{CtWindow, LabelImage, ScanImage};
use crate::consts::label::*;
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好"
/// 的方式保存, 而不是 "as is" 的方式. 对于 [`LabelImage`]
/// 这类仅存在少量离散组织编码的图像, 在保存时会映射到肉眼较易区分的灰度;
/// 对于 [`ScanImage`] 这类以密度值存储的扫描, 在保存时会用骨窗口规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 对于 [`LabelImage`] 这类图像可以直接按组织编码存储;
/// 以密度值存储的扫描无法按原样写入 8-bit 灰度图.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使组织编码更有利于单通道可视化.
///
/// 编码按 `TOT_AREA` 为最大值等距拉伸到 0..=255, 空气保持黑色.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    debug_assert!(label <= TOT_AREA, "非法组织编码 `{label}`");
    ((label as u16 * 255) / TOT_AREA as u16) as u8
}

/// 组织编码会被等距拉伸为灰度, 空气为黑色.
impl ImgWriteVis for LabelImage {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
        }
        buf.save(path)
    }
}

/// 按原样存储组织编码.
impl ImgWriteRaw for LabelImage {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
        }
        buf.save(path)
    }
}

/// 窗位 400, 窗宽 1800 (骨窗).
impl ImgWriteVis for ScanImage {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        const WINDOW: CtWindow = CtWindow::from_bone_visual();
        for ((h, w), &hu) in self.indexed_iter() {
            let gray = WINDOW.eval(hu).unwrap_or(0);
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;
    use ndarray::Array2;

    #[test]
    fn test_pretty_monotonic() {
        assert_eq!(pretty(AIR), 0);
        assert_eq!(pretty(TOT_AREA), 255);
        for pair in (AIR..=TOT_AREA).collect::<Vec<_>>().windows(2) {
            assert!(pretty(pair[0]) < pretty(pair[1]));
        }
    }

    #[test]
    fn test_save_label_png() {
        let mut img = LabelImage::filled_air((4, 4), Geometry::default());
        img[(1, 1)] = SUB_FAT;
        img[(2, 2)] = CORT_BONE;
        let path = std::env::temp_dir().join("pqct_berry_label_vis_test.png");
        img.save(&path).unwrap();
        img.save_raw(&path).unwrap();
        let scan = ScanImage::new(Array2::zeros((4, 4)), Geometry::default());
        scan.save(&path).unwrap();
        std::fs::remove_file(&path).ok();
    }
}
