//! 胫骨 38% 部位分析.

use super::{apply_kmeans, fat::keep_largest_bone, total_area_pass, Analysis, Workflow};
use crate::consts::label::*;
use crate::morph::identify_bone_marrow;
use crate::params::SegmentationParams;
use crate::stats::{
    append_elapsed, append_header_info, append_intensity_attributes, append_shape_attributes,
    QuantRecord,
};
use crate::{PqctResult, ScanImage};
use std::time::Instant;

/// 38% 部位的完整阶段序列.
///
/// 聚类 → 骨髓识别 → 移除腓骨 → 仅保留皮质骨与骨髓 →
/// 统计 → 总截面统计 → 耗时. 该部位只报告骨相关组织.
pub(super) fn analyze(
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    let start = Instant::now();
    let (cluster_labels, mut labels) = apply_kmeans(&scan, Workflow::TibiaThirtyEight, params);

    // 骨内部孔洞即骨髓.
    identify_bone_marrow(&mut labels, &cluster_labels);

    // 较大的骨为胫骨, 较小的为腓骨; 只保留前者.
    keep_largest_bone(&mut labels);

    // 皮质骨与骨髓之外的组织一律归空气.
    for pix in labels.iter_mut() {
        if !matches!(*pix, CORT_BONE | BONE_MARROW) {
            *pix = AIR;
        }
    }

    let mut record = QuantRecord::new();
    append_header_info(&mut record, subject_id, Workflow::TibiaThirtyEight.site_name());
    append_shape_attributes(&mut record, &labels);
    append_intensity_attributes(&mut record, &labels, &scan);

    total_area_pass(&mut record, &cluster_labels, &scan);
    append_elapsed(&mut record, start.elapsed().as_secs_f64());

    Ok(Analysis { labels, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;
    use ndarray::Array2;

    /// 骨环 (内含低密度腔) + 远处小腓骨的合成扫描.
    fn tibia_scene() -> ScanImage {
        let size = 40usize;
        let mut data = Array2::from_elem((size, size), -400.0f32);
        let center = (15isize, 15isize);
        for h in 0..size {
            for w in 0..size {
                let dh = h as isize - center.0;
                let dw = w as isize - center.1;
                let d2 = dh * dh + dw * dw;
                if d2 <= 100 {
                    // 环壁为高密度骨, 内腔为脂肪密度 (骨髓).
                    data[(h, w)] = if d2 <= 16 { -22.0 } else { 993.0 };
                }
            }
        }
        // 小腓骨.
        for h in 32..36 {
            for w in 32..36 {
                data[(h, w)] = 993.0;
            }
        }
        ScanImage::new(data, Geometry::isotropic(0.5))
    }

    #[test]
    fn test_analyze_thirty_eight() {
        let scan = tibia_scene();
        let analysis = analyze(scan.clone(), "subj_38", &SegmentationParams::default()).unwrap();

        assert_eq!(analysis.labels.shape(), scan.shape());
        // 输出只含空气, 皮质骨与骨髓.
        for &pix in analysis.labels.iter() {
            assert!(matches!(pix, AIR | CORT_BONE | BONE_MARROW));
        }
        // 胫骨环壁保留, 内腔识别为骨髓.
        assert_eq!(analysis.labels[(15, 6)], CORT_BONE);
        assert_eq!(analysis.labels[(15, 15)], BONE_MARROW);
        // 腓骨被移除.
        assert_eq!(analysis.labels[(33, 33)], AIR);

        assert_eq!(analysis.record.get("Tibia_Site"), Some("38_PCT"));
        assert!(analysis.record.get("4-COR_BO[Area(mm^2)]").is_some());
        assert!(analysis.record.get("6-BO_INT[Den.M.]").is_some());
        assert!(analysis.record.get("Elapsed_Time").is_some());
        // 总截面统计排除空气.
        assert!(analysis.record.get("12-TOT_AR[Area(mm^2)]").is_some());
        assert!(analysis.record.get("0-AIR[Area(mm^2)]").is_none());
    }
}
