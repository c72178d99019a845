//! 38% / 66% / 大腿中段共享的脂肪与骨修正步骤.

use crate::consts::label::*;
use crate::data::Connectivity;
use crate::levelset::segment_from_roi;
use crate::morph::{self, DiskElement};
use crate::params::{FatSeparation, SegmentationParams};
use crate::regions::ranked_components;
use crate::{LabelImage, ScanImage};

/// GAC 策略内部使用的非皮下区域掩膜编码.
const NON_SUBCUTANEOUS: u8 = 1;

/// 皮下脂肪 / 肌间脂肪分离.
///
/// 按参数表选择连通分量策略或 GAC 策略; 两者共享后续的皮下脂肪闭合与
/// 腐蚀去皮. `merge_fat` 为真时 (66% 部位), 最后把两类脂肪合并回
/// 统一的脂肪类别 (先分离只是为了在皮下脂肪上填洞).
pub(super) fn separate_sat_imfat(
    labels: &mut LabelImage,
    cluster_labels: &LabelImage,
    scan: &ScanImage,
    params: &SegmentationParams,
    merge_fat: bool,
) {
    log::info!("SAT/IMFAT 分离策略: {}", params.fat_separation);
    match params.fat_separation {
        FatSeparation::ConnectedComponents => by_connected_components(labels, cluster_labels),
        FatSeparation::Gac => by_gac(labels, scan, params),
    }

    // 皮下脂肪区域闭合, 再腐蚀整肢掩膜去皮.
    morph::close_subfat_region(labels);
    morph::remove_skin_by_erosion(labels, &DiskElement::default_radius());

    if merge_fat {
        merge_fat_classes(labels);
    }
}

/// 连通分量策略: 最大脂肪分量为皮下脂肪, 其余为肌间脂肪.
fn by_connected_components(labels: &mut LabelImage, cluster_labels: &LabelImage) {
    let ranked = ranked_components(cluster_labels, is_fat, Connectivity::Eight);
    if ranked.is_empty() {
        log::warn!("没有任何脂肪分量, 跳过 SAT/IMFAT 分离");
        return;
    }
    for region in &ranked {
        let new = if region.id == 1 { SUB_FAT } else { IM_FAT };
        labels.fill_batch(region.pixels().iter().copied(), new);
    }
}

/// GAC 策略: 腐蚀后的整肢掩膜经水平集演化得到非皮下区域;
/// 区域之外的脂肪/肌肉像素为皮下脂肪, 区域之内的脂肪像素为肌间脂肪.
fn by_gac(labels: &mut LabelImage, scan: &ScanImage, params: &SegmentationParams) {
    let eroded = crate::morph::erode(
        &labels.mask_where(is_foreground),
        &DiskElement::default_radius(),
    );
    let non_subcutaneous = segment_from_roi(scan, &eroded, NON_SUBCUTANEOUS, params);

    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        let inside = non_subcutaneous[pos] == NON_SUBCUTANEOUS;
        if !inside && is_fat_or_muscle(*pix) {
            *pix = SUB_FAT;
        } else if inside && is_fat(*pix) {
            *pix = IM_FAT;
        }
    }
}

/// 把皮下脂肪与肌间脂肪合并回统一的脂肪类别.
pub(super) fn merge_fat_classes(labels: &mut LabelImage) {
    for pix in labels.iter_mut() {
        if matches!(*pix, SUB_FAT | IM_FAT) {
            *pix = FAT;
        }
    }
}

/// 移除腓骨: 骨像素 (皮质骨, 高密度皮质骨, 骨髓) 的最大 8-相邻分量保留,
/// 其余骨分量整体回退为空气.
pub(super) fn keep_largest_bone(labels: &mut LabelImage) {
    let ranked = ranked_components(labels, is_bone, Connectivity::Eight);
    if ranked.is_empty() {
        log::warn!("没有任何骨分量");
        return;
    }
    for region in ranked.iter().filter(|r| r.id > 1) {
        labels.fill_batch(region.pixels().iter().copied(), AIR);
    }
}
