//! 连通区域分析.
//!
//! 提供 8-相邻 (或 4-相邻) 连通分量提取, 按像素数排名,
//! 以及带物理面积下限的肢体选择.

use crate::consts::{LEG_PHYSICAL_SIZE_THRESHOLD, PADDING_LENGTH};
use crate::data::Connectivity;
use crate::{Area2d, Geometry, Idx2d, Idx2dF, LabelImage, Predicate, ScanImage};
use ndarray::Array2;
use num::ToPrimitive;

/// 一个连通区域及其几何属性.
///
/// 区域只在单次分析调用内存活, 不做任何持久化.
#[derive(Clone, Debug)]
pub struct Region {
    /// 区域编号. 提取时按发现顺序从 1 开始; 排名后 1 恒为最大区域.
    pub id: usize,
    pixels: Area2d,
    geometry: Geometry,
}

impl Region {
    /// 成员像素索引.
    #[inline]
    pub fn pixels(&self) -> &[Idx2d] {
        &self.pixels
    }

    /// 像素个数.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// 物理面积 (mm^2).
    #[inline]
    pub fn physical_area(&self) -> f64 {
        self.pixel_count() as f64 * self.geometry.pixel_area()
    }

    /// 物理质心 (mm), `(高向, 宽向)` 次序.
    pub fn centroid_mm(&self) -> Idx2dF {
        debug_assert!(!self.pixels.is_empty());
        let n = self.pixels.len().to_f64().unwrap();
        let (sum_h, sum_w) = self
            .pixels
            .iter()
            .map(|&pos| self.geometry.physical_point(pos))
            .fold((0.0, 0.0), |(ah, aw), (h, w)| (ah + h, aw + w));
        (sum_h / n, sum_w / n)
    }

    /// 像素包围盒, 返回 `(左上角索引, 尺寸)`.
    pub fn bounding_box(&self) -> (Idx2d, Idx2d) {
        debug_assert!(!self.pixels.is_empty());
        let (mut min_h, mut min_w) = self.pixels[0];
        let (mut max_h, mut max_w) = self.pixels[0];
        for &(h, w) in &self.pixels {
            min_h = min_h.min(h);
            min_w = min_w.min(w);
            max_h = max_h.max(h);
            max_w = max_w.max(w);
        }
        ((min_h, min_w), (max_h - min_h + 1, max_w - min_w + 1))
    }

    /// 向外扩展 `padding` 个像素并钳制在 `shape` 内的包围盒.
    pub fn padded_bounding_box(&self, padding: usize, shape: Idx2d) -> (Idx2d, Idx2d) {
        let ((min_h, min_w), (size_h, size_w)) = self.bounding_box();
        let start = (min_h.saturating_sub(padding), min_w.saturating_sub(padding));
        let end_h = (min_h + size_h + padding).min(shape.0);
        let end_w = (min_w + size_w + padding).min(shape.1);
        (start, (end_h - start.0, end_w - start.1))
    }
}

/// 提取满足 `pred` 的所有连通分量, 按发现顺序编号 (从 1 开始).
pub fn extract_components(
    labels: &LabelImage,
    pred: Predicate,
    conn: Connectivity,
) -> Vec<Region> {
    let geometry = labels.geometry();
    labels
        .areas(pred, conn)
        .into_iter()
        .enumerate()
        .map(|(idx, pixels)| Region {
            id: idx + 1,
            pixels,
            geometry,
        })
        .collect()
}

/// 按像素数从大到小重排并重新编号, 编号 1 恒为最大区域.
///
/// 像素数相同的区域保持原有 (发现顺序) 先后关系.
pub fn rank_components(mut regions: Vec<Region>) -> Vec<Region> {
    regions.sort_by(|a, b| b.pixel_count().cmp(&a.pixel_count()));
    for (idx, region) in regions.iter_mut().enumerate() {
        region.id = idx + 1;
    }
    debug_assert!(regions
        .windows(2)
        .all(|pair| pair[0].pixel_count() >= pair[1].pixel_count()));
    regions
}

/// 提取并排名: [`extract_components`] + [`rank_components`].
#[inline]
pub fn ranked_components(
    labels: &LabelImage,
    pred: Predicate,
    conn: Connectivity,
) -> Vec<Region> {
    rank_components(extract_components(labels, pred, conn))
}

/// 肢体选择结果.
#[derive(Debug)]
pub struct LegSelection {
    /// 每个像素的连通分量编号, 0 为背景. 编号与发现顺序一致.
    pub component_map: Array2<u32>,

    /// 被选中肢体的分量编号.
    pub leg_id: u32,

    /// 裁剪区域左上角索引 (已含外扩).
    pub crop_offset: Idx2d,

    /// 裁剪区域尺寸 (已含外扩并钳制在图像内).
    pub crop_size: Idx2d,
}

/// 二值掩膜前景谓词.
fn binary_fg(p: u8) -> bool {
    p == 1
}

/// 肢体选择: 移除检查床并挑出目标肢体.
///
/// 密度不低于 `threshold` 的像素构成前景, 按 8-相邻提取连通分量.
/// 物理面积低于 [`LEG_PHYSICAL_SIZE_THRESHOLD`] 的区域, 其比较键被强制置
/// 0 (几何信息仍被记录); 其余区域按宽向物理质心取最大者.
/// 选中区域的包围盒向外扩展 [`PADDING_LENGTH`] 个像素供下游裁剪.
///
/// 没有任何前景分量时返回 `None`.
///
/// 质心最大规则作用在图像坐标系上; 它是否对应解剖学左侧取决于采集方位,
/// 本函数不做解剖学解释.
pub fn select_leg(scan: &ScanImage, threshold: f32) -> Option<LegSelection> {
    let foreground = LabelImage::new(
        scan.array_view().map(|&v| u8::from(v >= threshold)),
        scan.geometry(),
    );
    let regions = extract_components(&foreground, binary_fg, Connectivity::Eight);
    if regions.is_empty() {
        log::warn!("前景阈值 {threshold} 下没有任何连通分量");
        return None;
    }

    let mut component_map = Array2::<u32>::zeros(scan.shape());
    for region in &regions {
        for &pos in region.pixels() {
            component_map[pos] = region.id as u32;
        }
    }

    // 小区域的比较键置 0, 从而在选择中被淘汰; 其余区域比较宽向质心.
    let mut best = 0usize;
    let mut best_key = f64::NEG_INFINITY;
    for (idx, region) in regions.iter().enumerate() {
        let area = region.physical_area();
        let key = if area < LEG_PHYSICAL_SIZE_THRESHOLD {
            0.0
        } else {
            region.centroid_mm().1
        };
        log::debug!(
            "候选肢体 {}: 面积 {:.3} mm^2, 质心 {:?}, 比较键 {:.3}",
            region.id,
            area,
            region.centroid_mm(),
            key
        );
        // 严格大于: 键相同时保留先出现的区域.
        if key > best_key {
            best_key = key;
            best = idx;
        }
    }

    let leg = &regions[best];
    let (crop_offset, crop_size) = leg.padded_bounding_box(PADDING_LENGTH, scan.shape());
    log::info!(
        "选中肢体分量 {}, 裁剪范围 {:?} + {:?}",
        leg.id,
        crop_offset,
        crop_size
    );

    Some(LegSelection {
        leg_id: leg.id as u32,
        component_map,
        crop_offset,
        crop_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::*;
    use ndarray::Array2;

    /// 在 `img` 上放置一个实心矩形.
    fn fill_rect(img: &mut LabelImage, top_left: Idx2d, size: Idx2d, value: u8) {
        for h in top_left.0..top_left.0 + size.0 {
            for w in top_left.1..top_left.1 + size.1 {
                img[(h, w)] = value;
            }
        }
    }

    #[test]
    fn test_ranking_two_blobs() {
        // 30 像素与 10 像素的两个 8-相邻斑块.
        let mut img = LabelImage::filled_air((20, 20), Geometry::default());
        fill_rect(&mut img, (1, 1), (5, 6), FAT); // 30 像素
        fill_rect(&mut img, (10, 10), (2, 5), FAT); // 10 像素
        let ranked = ranked_components(&img, is_fat, Connectivity::Eight);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, 1);
        assert_eq!(ranked[0].pixel_count(), 30);
        assert_eq!(ranked[1].id, 2);
        assert_eq!(ranked[1].pixel_count(), 10);
    }

    #[test]
    fn test_ranking_monotonic_and_stable() {
        let mut img = LabelImage::filled_air((16, 16), Geometry::default());
        fill_rect(&mut img, (0, 0), (2, 2), FAT); // 先发现, 4 像素
        fill_rect(&mut img, (4, 4), (1, 4), FAT); // 4 像素, 与上面并列
        fill_rect(&mut img, (8, 8), (3, 3), FAT); // 9 像素
        let ranked = ranked_components(&img, is_fat, Connectivity::Eight);
        let counts: Vec<_> = ranked.iter().map(Region::pixel_count).collect();
        assert!(counts.windows(2).all(|p| p[0] >= p[1]));
        // 并列时保持发现顺序: (0,0) 区域先于 (4,4) 区域.
        assert_eq!(ranked[1].pixels()[0], (0, 0));
        assert_eq!(ranked[2].pixels()[0], (4, 4));
    }

    #[test]
    fn test_region_attributes() {
        let mut img = LabelImage::filled_air((8, 8), Geometry::new((0.5, 0.5), (0.0, 0.0)));
        fill_rect(&mut img, (2, 4), (2, 2), MUSCLE);
        let regions = extract_components(&img, is_muscle, Connectivity::Eight);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.physical_area(), 4.0 * 0.25);
        // 质心位于 2x2 方块的中央.
        let (ch, cw) = region.centroid_mm();
        assert!((ch - 1.25).abs() < 1e-12);
        assert!((cw - 2.25).abs() < 1e-12);
        assert_eq!(region.bounding_box(), ((2, 4), (2, 2)));
        assert_eq!(region.padded_bounding_box(2, (8, 8)), ((0, 2), (6, 6)));
        // 钳制在图像范围内.
        assert_eq!(region.padded_bounding_box(100, (8, 8)), ((0, 0), (8, 8)));
    }

    #[test]
    fn test_select_leg_size_floor() {
        // 小区域质心更靠宽向远端, 但面积低于下限, 必须落选.
        let g = Geometry::new((10.0, 10.0), (0.0, 0.0));
        let mut data = Array2::<f32>::from_elem((12, 12), -1000.0);
        // 大区域: 50 像素 = 5000 mm^2, 靠左.
        for h in 1..6 {
            for w in 1..11 {
                data[(h, w)] = 100.0;
            }
        }
        // 小区域: 1 像素 = 100 mm^2 < 500 mm^2, 靠右下.
        data[(10, 11)] = 100.0;
        let scan = ScanImage::new(data, g);
        let selection = select_leg(&scan, -200.0).unwrap();
        assert_eq!(selection.leg_id, 1);
        // 包围盒外扩 2 像素.
        assert_eq!(selection.crop_offset, (0, 0));
        assert_eq!(selection.crop_size, (8, 12));
    }

    #[test]
    fn test_select_leg_max_width_centroid() {
        // 两个达标区域, 取宽向质心更大者.
        let g = Geometry::new((10.0, 10.0), (0.0, 0.0));
        let mut data = Array2::<f32>::from_elem((12, 24), -1000.0);
        for h in 2..8 {
            for w in 2..8 {
                data[(h, w)] = 50.0;
            }
        }
        for h in 2..8 {
            for w in 14..20 {
                data[(h, w)] = 50.0;
            }
        }
        let scan = ScanImage::new(data, g);
        let selection = select_leg(&scan, -200.0).unwrap();
        assert_eq!(selection.leg_id, 2);
    }

    #[test]
    fn test_select_leg_empty() {
        let scan = ScanImage::new(
            Array2::from_elem((4, 4), -1000.0f32),
            Geometry::default(),
        );
        assert!(select_leg(&scan, -200.0).is_none());
    }
}
