//! Lloyd 迭代的实际实现.

use crate::consts::KMEANS_MAX_ITERATIONS;
use itertools::izip;

/// 一维 k-means 估计器. 除均值外不保存其它状态.
pub(super) struct KmeansImp {
    means: Vec<f64>,
}

impl KmeansImp {
    #[inline]
    pub fn new(initial_means: &[f64]) -> Self {
        assert!(!initial_means.is_empty(), "先验均值不能为空");
        Self {
            means: initial_means.to_vec(),
        }
    }

    /// 最近均值规则. 距离相同时取下标较小的簇.
    #[inline]
    pub fn nearest(value: f64, means: &[f64]) -> usize {
        debug_assert!(!means.is_empty());
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (idx, &mean) in means.iter().enumerate() {
            let dist = (value - mean).abs();
            // 严格小于: 等距时保留先出现的 (下标更小的) 簇.
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }

    /// 运行 Lloyd 迭代直至完全收敛 (均值移动量为 0) 或达到迭代上限.
    pub fn fit(mut self, samples: &[f32]) -> Vec<f64> {
        let k = self.means.len();
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];

        for iteration in 0..KMEANS_MAX_ITERATIONS {
            for (sum, count) in izip!(&mut sums, &mut counts) {
                *sum = 0.0;
                *count = 0;
            }

            // 指派步: 按最近均值累加.
            // 按样本顺序串行累加, 保证浮点求和次序固定.
            for &value in samples {
                let cluster = Self::nearest(value as f64, &self.means);
                sums[cluster] += value as f64;
                counts[cluster] += 1;
            }

            // 更新步: 重算均值, 空簇保留上一轮均值.
            let mut max_shift = 0.0f64;
            for (mean, &sum, &count) in izip!(&mut self.means, &sums, &counts) {
                if count == 0 {
                    continue;
                }
                let new_mean = sum / count as f64;
                max_shift = max_shift.max((new_mean - *mean).abs());
                *mean = new_mean;
            }

            if max_shift == 0.0 {
                log::debug!("k-means 在第 {iteration} 轮完全收敛");
                break;
            }
        }
        self.means
    }
}
