//! 输入图像的预平滑.
//!
//! 三种方式可选: 线性高斯模糊, 非线性各向异性扩散, 统计中值滤波.
//! 聚类前使用中值滤波, 水平集速度图使用各向异性扩散.

use crate::consts::{DIFFUSION_CONDUCTANCE, DIFFUSION_ITERATIONS, DIFFUSION_TIME_STEP};
use crate::levelset::anisotropic_diffusion;
use crate::params::SegmentationParams;
use crate::ScanImage;
use ndarray::{Array2, ArrayView2};

/// 平滑方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmoothingMethod {
    /// 线性高斯模糊.
    Gaussian,

    /// 曲率保持的非线性扩散.
    Diffusion,

    /// 统计中值滤波.
    Median,
}

/// 按 `method` 平滑输入扫描, 返回新的浮点栅格. 原图不被修改.
pub fn smooth_scan(
    scan: &ScanImage,
    method: SmoothingMethod,
    params: &SegmentationParams,
) -> Array2<f32> {
    let out = match method {
        SmoothingMethod::Gaussian => {
            // 与扩散平滑的总时长对齐的等效 sigma.
            let sigma = DIFFUSION_TIME_STEP * DIFFUSION_ITERATIONS as f64;
            gaussian_blur(&scan.array_view(), sigma)
        }
        SmoothingMethod::Diffusion => anisotropic_diffusion(
            &scan.array_view(),
            DIFFUSION_ITERATIONS,
            DIFFUSION_TIME_STEP,
            DIFFUSION_CONDUCTANCE,
        ),
        SmoothingMethod::Median => median_filter(&scan.array_view(), params.median_filter_radius),
    };
    log::debug!("{method:?} 平滑完成");
    out
}

/// 中值滤波. 边界处窗口按图像范围截断.
pub fn median_filter(data: &ArrayView2<f32>, radius: usize) -> Array2<f32> {
    if radius == 0 {
        return data.to_owned();
    }
    let (height, width) = data.dim();
    let r = radius as isize;
    let mut window = Vec::with_capacity((2 * radius + 1).pow(2));

    Array2::from_shape_fn((height, width), |(h, w)| {
        window.clear();
        for dh in -r..=r {
            for dw in -r..=r {
                let nh = h as isize + dh;
                let nw = w as isize + dw;
                if nh >= 0 && nh < height as isize && nw >= 0 && nw < width as isize {
                    window.push(data[(nh as usize, nw as usize)]);
                }
            }
        }
        window.sort_unstable_by(f32::total_cmp);
        window[window.len() / 2]
    })
}

/// 归一化的一维高斯核, 半径为 `ceil(3 * sigma)`.
pub(crate) fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// 可分离高斯模糊. 边界按最近像素复制延拓.
pub fn gaussian_blur(data: &ArrayView2<f32>, sigma: f64) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let (height, width) = data.dim();

    // 先沿宽度方向, 再沿高度方向.
    let horizontal = Array2::from_shape_fn((height, width), |(h, w)| {
        kernel
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let col = (w + i).saturating_sub(radius).min(width - 1);
                k * data[(h, col)] as f64
            })
            .sum::<f64>()
    });
    Array2::from_shape_fn((height, width), |(h, w)| {
        kernel
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let row = (h + i).saturating_sub(radius).min(height - 1);
                k * horizontal[(row, w)]
            })
            .sum::<f64>() as f32
    })
}
