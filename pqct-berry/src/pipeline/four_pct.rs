//! 胫骨 4% 部位分析.

use super::{apply_kmeans, total_area_pass, Analysis, Workflow};
use crate::consts::label::*;
use crate::data::Connectivity;
use crate::levelset::{segment_from_seed, signed_distance_sq};
use crate::morph::fill_holes;
use crate::params::SegmentationParams;
use crate::regions::ranked_components;
use crate::stats::{
    append_elapsed, append_header_info, append_intensity_attributes, append_shape_attributes,
    QuantRecord,
};
use crate::{Idx2d, LabelImage, PqctResult, ScanImage};
use ordered_float::NotNan;
use std::time::Instant;

/// 聚类输出中的骨像素 (松质骨到高密度皮质骨).
fn is_bone_cluster(p: u8) -> bool {
    matches!(p, TRAB_BONE..=H_CORT_BONE)
}

/// 4% 部位的完整阶段序列.
///
/// 聚类 → 最大骨分量 → 孔洞填充 → 以骨掩膜中位点为种子的水平集精化 →
/// 整骨统计 → 最内侧 50% / 10% 面积统计 → 总截面统计 → 耗时.
/// 输出标签图为整骨与两个面积分数的逐像素最大值叠加.
pub(super) fn analyze(
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    let start = Instant::now();
    let (cluster_labels, _) = apply_kmeans(&scan, Workflow::TibiaFourPercent, params);

    // 骨类别的最大 8-相邻分量作为候选骨区域, 其余一切归空气.
    let ranked = ranked_components(&cluster_labels, is_bone_cluster, Connectivity::Eight);
    let mut labels = LabelImage::air_like(&scan);
    match ranked.first() {
        Some(largest) => {
            labels.fill_batch(largest.pixels().iter().copied(), BONE_4PCT);
        }
        None => log::warn!("没有检测到任何骨分量, 后续统计将为空"),
    }

    // 骨掩膜孔洞填充: 填充结果之内的一切像素都属于骨区域.
    let filled = fill_holes(&labels.mask_where(|p| p == BONE_4PCT));
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        *pix = if filled[pos] != 0 { BONE_4PCT } else { AIR };
    }

    // 以粗骨掩膜的逐坐标中位点为种子做水平集边界精化.
    if let Some(seed) = median_pixel(&labels, BONE_4PCT) {
        log::info!("水平集种子点: {seed:?}");
        labels = segment_from_seed(&scan, seed, BONE_4PCT, params);
    } else {
        log::warn!("骨掩膜为空, 跳过水平集精化");
    }

    let mut record = QuantRecord::new();
    append_header_info(&mut record, subject_id, Workflow::TibiaFourPercent.site_name());
    append_shape_attributes(&mut record, &labels);
    append_intensity_attributes(&mut record, &labels, &scan);

    // 最内侧 50% 与 10% 面积分数.
    let frac50 = select_area_fraction(&labels, BONE_4PCT_50PCT, 0.5);
    append_shape_attributes(&mut record, &frac50);
    append_intensity_attributes(&mut record, &frac50, &scan);

    let frac10 = select_area_fraction(&labels, BONE_4PCT_10PCT, 0.1);
    append_shape_attributes(&mut record, &frac10);
    append_intensity_attributes(&mut record, &frac10, &scan);

    total_area_pass(&mut record, &cluster_labels, &scan);
    append_elapsed(&mut record, start.elapsed().as_secs_f64());

    // 展示用标签图: 整骨与两个面积分数的逐像素最大值.
    let mut output = labels;
    overlay_max(&mut output, &frac50);
    overlay_max(&mut output, &frac10);

    Ok(Analysis {
        labels: output,
        record,
    })
}

/// 值为 `target` 的像素的逐坐标中位点. 没有此类像素时返回 `None`.
///
/// 横纵坐标分别取中位数; 偶数个样本时取中间两数的平均 (向下取整).
fn median_pixel(labels: &LabelImage, target: u8) -> Option<Idx2d> {
    let mut hs = Vec::new();
    let mut ws = Vec::new();
    for (pos, &pix) in labels.indexed_iter() {
        if pix == target {
            hs.push(pos.0);
            ws.push(pos.1);
        }
    }
    if hs.is_empty() {
        return None;
    }
    hs.sort_unstable();
    ws.sort_unstable();
    let mid = |v: &[usize]| {
        let n = v.len();
        if n % 2 == 0 {
            (v[n / 2 - 1] + v[n / 2]) / 2
        } else {
            v[n / 2]
        }
    };
    Some((mid(&hs), mid(&ws)))
}

/// 选取骨区域最内侧 `fraction` 比例的面积, 输出标注为 `fraction_label`
/// 的新标签图.
///
/// "最内侧" 按前景掩膜的符号距离度量: 距离值升序 (最负即最深) 排序,
/// 取前 `floor(n * fraction)` 个骨像素. 距离并列时按行优先顺序.
fn select_area_fraction(labels: &LabelImage, fraction_label: u8, fraction: f64) -> LabelImage {
    let sdf = signed_distance_sq(
        &labels.mask_where(is_foreground).view(),
        labels.geometry().spacing,
    );

    let mut candidates: Vec<(NotNan<f32>, Idx2d)> = labels
        .indexed_iter()
        .filter(|(_, &pix)| pix == BONE_4PCT)
        .map(|(pos, _)| (NotNan::new(sdf[pos]).unwrap(), pos))
        .collect();
    // 稳定排序: 距离相同时保持行优先顺序.
    candidates.sort_by_key(|&(dist, _)| dist);

    let take = (candidates.len() as f64 * fraction) as usize;
    let mut out = LabelImage::filled_air(labels.shape(), labels.geometry());
    out.fill_batch(
        candidates.iter().take(take).map(|&(_, pos)| pos),
        fraction_label,
    );
    out
}

/// 逐像素取最大值的标签叠加.
fn overlay_max(base: &mut LabelImage, other: &LabelImage) {
    for (pos, pix) in base.array_view_mut().indexed_iter_mut() {
        *pix = (*pix).max(other[pos]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;
    use ndarray::Array2;

    #[test]
    fn test_median_pixel() {
        let mut labels = LabelImage::filled_air((9, 9), Geometry::default());
        for h in 2..7 {
            for w in 3..8 {
                labels[(h, w)] = BONE_4PCT;
            }
        }
        assert_eq!(median_pixel(&labels, BONE_4PCT), Some((4, 5)));
        assert_eq!(median_pixel(&labels, CORT_BONE), None);
    }

    #[test]
    fn test_select_area_fraction_innermost() {
        // 圆盘骨区域: 50% 分数应从最深处 (圆心) 向外生长.
        let size = 21usize;
        let mut labels = LabelImage::filled_air((size, size), Geometry::default());
        let center = 10isize;
        for h in 0..size {
            for w in 0..size {
                let dh = h as isize - center;
                let dw = w as isize - center;
                if dh * dh + dw * dw <= 64 {
                    labels[(h, w)] = BONE_4PCT;
                }
            }
        }
        let total = labels.count(BONE_4PCT);
        let frac = select_area_fraction(&labels, BONE_4PCT_50PCT, 0.5);
        assert_eq!(frac.count(BONE_4PCT_50PCT), total / 2);
        // 圆心属于最内侧集合, 圆盘边缘不属于.
        assert_eq!(frac[(10, 10)], BONE_4PCT_50PCT);
        assert_eq!(frac[(10, 18)], AIR);

        let frac10 = select_area_fraction(&labels, BONE_4PCT_10PCT, 0.1);
        assert!(frac10.count(BONE_4PCT_10PCT) < frac.count(BONE_4PCT_50PCT));
    }

    #[test]
    fn test_analyze_four_pct_smoke() {
        // 空气背景上的高密度骨盘.
        let size = 28usize;
        let mut data = Array2::from_elem((size, size), -400.0f32);
        let center = 14isize;
        for h in 0..size {
            for w in 0..size {
                let dh = h as isize - center;
                let dw = w as isize - center;
                if dh * dh + dw * dw <= 36 {
                    data[(h, w)] = 600.0;
                }
            }
        }
        let scan = ScanImage::new(data, Geometry::isotropic(0.5));
        let mut params = SegmentationParams::default();
        params.levelset_max_iterations = 30;
        params.fast_marching_stopping_time = 4.0;

        let analysis = analyze(scan.clone(), "subj_4pct", &params).unwrap();
        assert_eq!(analysis.labels.shape(), scan.shape());
        // 圆心被标注为骨区域 (可能被面积分数标签覆盖).
        assert!(analysis.labels[(14, 14)] >= BONE_4PCT);
        assert_eq!(analysis.record.get("Subject_ID"), Some("subj_4pct"));
        assert_eq!(analysis.record.get("Tibia_Site"), Some("4_PCT"));
        assert!(analysis.record.get("Elapsed_Time").is_some());
        assert!(analysis.record.get("12-TOT_AR[Area(mm^2)]").is_some());
        // 每个像素恰好一个标签: 各类像素数之和等于总像素数.
        let sum: usize = (AIR..=TOT_AREA)
            .map(|code| analysis.labels.count(code))
            .sum();
        assert_eq!(sum, analysis.labels.size());
    }

    #[test]
    fn test_analyze_four_pct_no_bone_degrades() {
        // 全空气图像: 不产生骨统计, 但不报错.
        let scan = ScanImage::new(
            Array2::from_elem((12, 12), -400.0f32),
            Geometry::isotropic(0.5),
        );
        let mut params = SegmentationParams::default();
        params.levelset_max_iterations = 5;
        let analysis = analyze(scan, "empty", &params).unwrap();
        assert!(analysis.record.get("9-BO_4%[Area(mm^2)]").is_none());
        assert_eq!(analysis.labels.count(AIR), 144);
    }
}
