//! CT 大腿中段分析.

use super::fat::separate_sat_imfat;
use super::{apply_kmeans, total_area_pass, Analysis, Workflow};
use crate::cluster::reclassify_by_clustering;
use crate::consts::label::*;
use crate::consts::MUSCLE_IMFAT_PRIOR_MEANS;
use crate::morph::{dilate_subfat_for_pve, identify_bone_marrow, DiskElement};
use crate::params::SegmentationParams;
use crate::regions::{select_leg, LegSelection};
use crate::stats::{
    append_header_info, append_intensity_attributes, append_shape_attributes, QuantRecord,
};
use crate::{LabelImage, PqctResult, ScanImage};

/// 大腿中段的完整阶段序列.
///
/// 肢体选择 (移除检查床, 挑出目标大腿并裁剪) → 聚类 →
/// SAT/IMFAT 分离 → 骨髓识别 → 肌肉/肌间脂肪重聚类 →
/// 皮下脂肪部分容积修正 → 以肢体分量掩膜裁边 → 统计 →
/// 总截面统计 → 标签写回未裁剪几何.
pub(super) fn analyze(
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    // 输出标签图保持输入的完整几何, 与裁剪无关.
    let mut output = LabelImage::air_like(&scan);

    let selection = select_leg(&scan, params.leg_threshold);
    let (working, crop_offset) = match &selection {
        Some(sel) => (scan.crop(sel.crop_offset, sel.crop_size), sel.crop_offset),
        None => {
            log::warn!("肢体选择失败, 退化为分析整幅图像");
            (scan.clone(), (0, 0))
        }
    };

    let (cluster_labels, mut labels) = apply_kmeans(&working, Workflow::MidThighCt, params);

    // 皮下脂肪与肌间脂肪分离 (该部位保留两个脂肪亚类).
    separate_sat_imfat(&mut labels, &cluster_labels, &working, params, false);

    // 股骨内部孔洞即骨髓.
    identify_bone_marrow(&mut labels, &cluster_labels);

    // 主聚类对肌肉与肌间脂肪的分辨率不足, 在该像素子集上重聚类修正.
    let prior: Vec<f64> = MUSCLE_IMFAT_PRIOR_MEANS.iter().map(|&v| v as f64).collect();
    reclassify_by_clustering(
        &working,
        &mut labels,
        is_muscle_or_imfat,
        &prior,
        &[IM_FAT, MUSCLE],
    );

    // 皮下脂肪膨胀, 修正部分容积效应.
    dilate_subfat_for_pve(&mut labels, &DiskElement::default_radius());

    // 选中肢体分量之外的一切像素归空气 (移除另一条腿与残余床板).
    if let Some(sel) = &selection {
        mask_by_leg(&mut labels, sel, crop_offset);
    }

    let mut record = QuantRecord::new();
    append_header_info(&mut record, subject_id, Workflow::MidThighCt.site_name());
    append_shape_attributes(&mut record, &labels);
    append_intensity_attributes(&mut record, &labels, &working);

    total_area_pass(&mut record, &cluster_labels, &working);

    // 裁剪空间的标签写回完整几何.
    for (pos, &pix) in labels.indexed_iter() {
        output[(pos.0 + crop_offset.0, pos.1 + crop_offset.1)] = pix;
    }

    Ok(Analysis {
        labels: output,
        record,
    })
}

/// 把选中肢体分量之外的像素置为空气.
///
/// `component_map` 在完整图像坐标系中, `labels` 在裁剪坐标系中.
fn mask_by_leg(labels: &mut LabelImage, selection: &LegSelection, crop_offset: (usize, usize)) {
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        let full_pos = (pos.0 + crop_offset.0, pos.1 + crop_offset.1);
        if selection.component_map[full_pos] != selection.leg_id {
            *pix = AIR;
        }
    }
}
