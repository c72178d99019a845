//! 组织聚类.
//!
//! 以部位相关的密度先验均值为种子的一维 Lloyd 迭代.
//! 没有任何随机初始化: 相同输入与相同先验下, 输出逐像素一致.
//!
//! 主聚类把 (平滑后的) 整幅图像划分为 K 个组织簇;
//! 二次重聚类只在肌肉/肌间脂肪像素子集上重新划分两类,
//! 用于弥补主聚类在这两类之间分辨率不足造成的误分.

mod imp;

use crate::{LabelImage, Predicate, ScanImage};
use imp::KmeansImp;
use ndarray::{Array2, ArrayView2};

/// 在样本上运行 Lloyd 迭代, 返回最终均值.
///
/// 收敛条件: 所有簇的均值移动量恰好为 0, 或达到
/// [`crate::consts::KMEANS_MAX_ITERATIONS`] 次迭代.
/// 空簇保留上一轮均值. `initial_means` 不能为空.
pub fn kmeans_fit(samples: &[f32], initial_means: &[f64]) -> Vec<f64> {
    KmeansImp::new(initial_means).fit(samples)
}

/// 最近均值规则: 返回与 `value` 绝对差最小的簇下标.
/// 距离相同时取下标较小的簇.
#[inline]
pub fn nearest_cluster(value: f32, means: &[f64]) -> usize {
    KmeansImp::nearest(value as f64, means)
}

/// 以最近均值规则对整幅图像分类, 输出每个像素的簇下标.
pub fn classify_image(data: &ArrayView2<f32>, means: &[f64]) -> Array2<u8> {
    debug_assert!(means.len() <= u8::MAX as usize);
    data.map(|&v| KmeansImp::nearest(v as f64, means) as u8)
}

/// 对满足 `sample_pred` 的像素子集做独立重聚类, 并把
/// `class_map[簇下标]` 写回标签图. 返回被重新标注的像素个数.
///
/// 样本取自 **原始** 扫描强度 (不做预平滑). 子集为空时记录告警并保持
/// 标签图不变 (柔性降级, 不视为错误).
pub fn reclassify_by_clustering(
    scan: &ScanImage,
    labels: &mut LabelImage,
    sample_pred: Predicate,
    initial_means: &[f64],
    class_map: &[u8],
) -> usize {
    assert_eq!(initial_means.len(), class_map.len());

    let mut sample_indices = Vec::with_capacity(64);
    let mut samples = Vec::with_capacity(64);
    for (pos, &pix) in labels.indexed_iter() {
        if sample_pred(pix) {
            sample_indices.push(pos);
            samples.push(scan[pos]);
        }
    }

    if samples.is_empty() {
        log::warn!("重聚类样本集为空, 跳过该步骤");
        return 0;
    }

    let means = kmeans_fit(&samples, initial_means);
    log::debug!("重聚类收敛均值: {means:?}");

    for (pos, value) in sample_indices.iter().zip(samples.iter()) {
        labels[*pos] = class_map[nearest_cluster(*value, &means)];
    }
    sample_indices.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::*;
    use crate::consts::MUSCLE_IMFAT_PRIOR_MEANS;
    use crate::Geometry;

    #[test]
    fn test_nearest_cluster_tie_breaks_low() {
        // 0.0 与两个均值等距, 取下标较小者.
        let means = [-1.0, 1.0];
        assert_eq!(nearest_cluster(0.0, &means), 0);
        assert_eq!(nearest_cluster(0.5, &means), 1);
        assert_eq!(nearest_cluster(-0.5, &means), 0);
    }

    #[test]
    fn test_kmeans_deterministic() {
        let samples: Vec<f32> = (0..100)
            .map(|i| if i % 3 == 0 { -940.0 } else { -20.0 + (i % 7) as f32 })
            .collect();
        let init = [-940.0, -20.0, 50.0];
        let a = kmeans_fit(&samples, &init);
        let b = kmeans_fit(&samples, &init);
        assert_eq!(a, b);
    }

    #[test]
    fn test_kmeans_exact_convergence_on_separated_data() {
        let mut samples = vec![-940.0f32; 84];
        samples.extend(std::iter::repeat(-20.0).take(16));
        let means = kmeans_fit(&samples, &[-940.0, -20.0, 50.0, 700.0, 1200.0]);
        assert_eq!(means[0], -940.0);
        assert_eq!(means[1], -20.0);
        // 没有样本落入的簇保留初始均值.
        assert_eq!(means[2], 50.0);
        assert_eq!(means[4], 1200.0);
    }

    /// 10x10 空气背景 + 4x4 脂肪块, 大腿中段先验下整块被分为脂肪,
    /// 对应的物理面积为 16 * 0.25 = 4 mm^2.
    #[test]
    fn test_fat_block_classification_and_area() {
        let g = Geometry::new((0.5, 0.5), (0.0, 0.0));
        let mut data = ndarray::Array2::from_elem((10, 10), -940.0f32);
        for h in 3..7 {
            for w in 3..7 {
                data[(h, w)] = -20.0;
            }
        }
        let grid = classify_image(&data.view(), &[-940.0, -20.0, 50.0, 700.0, 1200.0]);
        let labels = LabelImage::new(grid, g);
        assert_eq!(labels.count(FAT), 16);
        assert_eq!(labels.count(AIR), 84);
        assert_eq!(labels[(3, 3)], FAT);

        let shapes = crate::stats::shape_attributes(&labels, AIR);
        assert_eq!(shapes.len(), 1);
        assert!((shapes[0].physical_area - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_classify_image() {
        let data = ndarray::array![[-940.0f32, -20.0], [45.0, 1150.0]];
        let out = classify_image(&data.view(), &[-940.0, -20.0, 50.0, 700.0, 1200.0]);
        assert_eq!(out, ndarray::array![[0u8, 1], [2, 4]]);
    }

    #[test]
    fn test_reclassify_subset() {
        let scan = ScanImage::new(
            ndarray::array![[-25.0f32, 60.0], [40.0, -900.0]],
            Geometry::default(),
        );
        let mut labels = LabelImage::new(
            ndarray::array![[MUSCLE, MUSCLE], [IM_FAT, AIR]],
            Geometry::default(),
        );
        let means: Vec<f64> = MUSCLE_IMFAT_PRIOR_MEANS.iter().map(|&v| v as f64).collect();
        let n = reclassify_by_clustering(
            &scan,
            &mut labels,
            is_muscle_or_imfat,
            &means,
            &[IM_FAT, MUSCLE],
        );
        assert_eq!(n, 3);
        // 低密度像素归入肌间脂肪, 高密度像素归入肌肉.
        assert_eq!(labels[(0, 0)], IM_FAT);
        assert_eq!(labels[(0, 1)], MUSCLE);
        assert_eq!(labels[(1, 0)], MUSCLE);
        // 空气像素不在取样范围, 保持不变.
        assert_eq!(labels[(1, 1)], AIR);
    }

    #[test]
    fn test_reclassify_empty_subset_is_noop() {
        let scan = ScanImage::new(ndarray::Array2::zeros((2, 2)), Geometry::default());
        let mut labels = LabelImage::filled_air((2, 2), Geometry::default());
        let before = labels.clone();
        let n = reclassify_by_clustering(
            &scan,
            &mut labels,
            is_muscle_or_imfat,
            &[-20.0, 50.0],
            &[IM_FAT, MUSCLE],
        );
        assert_eq!(n, 0);
        assert_eq!(labels.array_view(), before.array_view());
    }
}
