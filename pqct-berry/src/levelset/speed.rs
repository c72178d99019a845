//! 速度 / 边缘势图.

use crate::smoothing::gaussian_blur;
use ndarray::{Array2, ArrayView2};

/// 高斯梯度幅值: 先以 `sigma` 做可分离高斯模糊, 再做中心差分.
///
/// 差分在索引空间进行, 与快速行进的时间量纲保持一致.
pub fn gradient_magnitude(data: &ArrayView2<f32>, sigma: f64) -> Array2<f32> {
    let blurred = gaussian_blur(data, sigma);
    let (height, width) = data.dim();
    Array2::from_shape_fn((height, width), |(h, w)| {
        let up = blurred[(h.saturating_sub(1), w)] as f64;
        let down = blurred[((h + 1).min(height - 1), w)] as f64;
        let left = blurred[(h, w.saturating_sub(1))] as f64;
        let right = blurred[(h, (w + 1).min(width - 1))] as f64;
        let gh = (down - up) / 2.0;
        let gw = (right - left) / 2.0;
        (gh * gh + gw * gw).sqrt() as f32
    })
}

/// sigmoid 映射: `1 / (1 + exp(-(g - beta) / alpha))`, 输出范围 \[0, 1\].
///
/// `alpha` 取负值时, 梯度幅值越大输出越小, 即强边缘对应低速度.
pub fn sigmoid_speed(grad: &ArrayView2<f32>, alpha: f64, beta: f64) -> Array2<f32> {
    debug_assert!(alpha != 0.0);
    grad.map(|&g| {
        let x = (g as f64 - beta) / alpha;
        (1.0 / (1.0 + (-x).exp())) as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_gradient_magnitude_flat_is_zero() {
        let data = Array2::from_elem((6, 6), 5.0f32);
        let grad = gradient_magnitude(&data.view(), 0.5);
        for v in grad.iter() {
            assert!(v.abs() < 1e-5);
        }
    }

    #[test]
    fn test_gradient_magnitude_peaks_at_edge() {
        // 垂直阶跃边缘: 梯度在边缘列附近最大.
        let mut data = Array2::zeros((8, 8));
        for h in 0..8 {
            for w in 4..8 {
                data[(h, w)] = 100.0f32;
            }
        }
        let grad = gradient_magnitude(&data.view(), 0.5);
        assert!(grad[(4, 4)] > grad[(4, 0)]);
        assert!(grad[(4, 3)] > grad[(4, 7)]);
    }

    #[test]
    fn test_sigmoid_low_speed_at_strong_edge() {
        let grad = ndarray::array![[0.0f32, 30.0, 300.0]];
        // alpha 为负: 梯度越大速度越小.
        let speed = sigmoid_speed(&grad.view(), -12.0, 55.0);
        assert!(speed[(0, 0)] > speed[(0, 1)]);
        assert!(speed[(0, 1)] > speed[(0, 2)]);
        for v in speed.iter() {
            assert!((0.0..=1.0).contains(v));
        }
        // 远低于 beta 的平坦区速度接近 1.
        assert!(speed[(0, 0)] > 0.95);
    }
}
