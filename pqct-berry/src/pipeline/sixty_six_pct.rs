//! 胫骨 66% 部位分析.

use super::fat::{keep_largest_bone, separate_sat_imfat};
use super::{apply_kmeans, total_area_pass, Analysis, Workflow};
use crate::morph::identify_bone_marrow;
use crate::params::SegmentationParams;
use crate::stats::{
    append_elapsed, append_header_info, append_intensity_attributes, append_shape_attributes,
    QuantRecord,
};
use crate::{PqctResult, ScanImage};
use std::time::Instant;

/// 66% 部位的完整阶段序列.
///
/// 聚类 → SAT/IMFAT 分离 (策略可选, 分离后合并回统一脂肪) →
/// 骨髓识别 → 移除腓骨 → 统计 → 总截面统计 → 耗时.
pub(super) fn analyze(
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    let start = Instant::now();
    let (cluster_labels, mut labels) = apply_kmeans(&scan, Workflow::TibiaSixtySix, params);

    // 66% 部位只为填补皮下脂肪孔洞而做分离, 结束后合并回统一脂肪.
    separate_sat_imfat(&mut labels, &cluster_labels, &scan, params, true);

    identify_bone_marrow(&mut labels, &cluster_labels);
    keep_largest_bone(&mut labels);

    let mut record = QuantRecord::new();
    append_header_info(&mut record, subject_id, Workflow::TibiaSixtySix.site_name());
    append_shape_attributes(&mut record, &labels);
    append_intensity_attributes(&mut record, &labels, &scan);

    total_area_pass(&mut record, &cluster_labels, &scan);
    append_elapsed(&mut record, start.elapsed().as_secs_f64());

    Ok(Analysis { labels, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::*;
    use crate::Geometry;
    use ndarray::Array2;

    /// 外圈脂肪 + 肌肉 + 骨的小腿横断面.
    fn calf_scene() -> ScanImage {
        let size = 48usize;
        let mut data = Array2::from_elem((size, size), -400.0f32);
        let center = 24isize;
        for h in 0..size {
            for w in 0..size {
                let dh = h as isize - center;
                let dw = w as isize - center;
                let d2 = dh * dh + dw * dw;
                if d2 <= 400 {
                    data[(h, w)] = if d2 <= 36 {
                        993.0 // 胫骨
                    } else if d2 <= 256 {
                        72.0 // 肌肉
                    } else {
                        -22.0 // 皮下脂肪层
                    };
                }
            }
        }
        ScanImage::new(data, Geometry::isotropic(0.5))
    }

    #[test]
    fn test_analyze_sixty_six_merges_fat() {
        let scan = calf_scene();
        let analysis = analyze(scan.clone(), "subj_66", &SegmentationParams::default()).unwrap();

        assert_eq!(analysis.labels.shape(), scan.shape());
        // 分离只是中间步骤, 输出中两类脂肪已合并.
        assert_eq!(analysis.labels.count(SUB_FAT), 0);
        assert_eq!(analysis.labels.count(IM_FAT), 0);
        assert!(analysis.labels.count(FAT) > 0);
        // 骨保留.
        assert_eq!(analysis.labels[(24, 24)], CORT_BONE);

        assert_eq!(analysis.record.get("Tibia_Site"), Some("66_PCT"));
        assert!(analysis.record.get("1-FAT[Area(mm^2)]").is_some());
        assert!(analysis.record.get("2-MUSCLE[Den.M.]").is_some());
        assert!(analysis.record.get("Elapsed_Time").is_some());

        // 每个像素恰好一个标签.
        let sum: usize = (AIR..=TOT_AREA)
            .map(|code| analysis.labels.count(code))
            .sum();
        assert_eq!(sum, analysis.labels.size());
    }
}
