//! 水平集边界精化.
//!
//! 流程依次为:
//!
//! 1. 各向异性扩散平滑输入图像;
//! 2. 计算高斯梯度幅值;
//! 3. 经 sigmoid 映射为 \[0, 1\] 速度/边缘势图 (强边缘对应低速度);
//! 4. 快速行进从种子点传播前沿, 生成初始 ROI 掩膜;
//! 5. 对 ROI 掩膜计算 (平方, 间距感知的) 符号距离, 作为初始水平集函数;
//! 6. 测地主动轮廓 (GAC) 演化: 膨胀 + 曲率 + 平流三个独立缩放的力;
//! 7. 在零水平面阈值化, 得到最终二值分割.

mod diffusion;
mod distance;
mod fast_marching;
mod gac;
mod speed;

pub use diffusion::anisotropic_diffusion;
pub use distance::signed_distance_sq;
pub use fast_marching::{fast_marching, roi_from_arrival};
pub use gac::{evolve, GacOutcome, GacParams};
pub use speed::{gradient_magnitude, sigmoid_speed};

use crate::consts::{DIFFUSION_CONDUCTANCE, DIFFUSION_ITERATIONS, DIFFUSION_TIME_STEP};
use crate::params::SegmentationParams;
use crate::{Idx2d, LabelImage, ScanImage};
use ndarray::Array2;

/// 由参数表构建 GAC 演化参数.
impl From<&SegmentationParams> for GacParams {
    fn from(p: &SegmentationParams) -> Self {
        GacParams {
            propagation_scaling: p.propagation_scaling,
            curvature_scaling: p.curvature_scaling,
            advection_scaling: p.advection_scaling,
            max_iterations: p.levelset_max_iterations,
            max_rms_error: p.levelset_max_rms_error,
        }
    }
}

/// 计算扫描的速度/边缘势图: 扩散平滑 → 梯度幅值 → sigmoid.
pub fn speed_image(scan: &ScanImage, params: &SegmentationParams) -> Array2<f32> {
    let smoothed = anisotropic_diffusion(
        &scan.array_view(),
        DIFFUSION_ITERATIONS,
        DIFFUSION_TIME_STEP,
        DIFFUSION_CONDUCTANCE,
    );
    let grad = gradient_magnitude(&smoothed.view(), params.smoothing_sigma);
    sigmoid_speed(&grad.view(), params.sigmoid_alpha(), params.sigmoid_beta)
}

/// 从单个种子点出发的水平集分割.
///
/// 快速行进以 `params.fast_marching_stopping_time` 为停止时间生成初始
/// ROI, 再经 GAC 演化并在零水平面阈值化. 演化内部区域标注为 `label`,
/// 其余为空气.
pub fn segment_from_seed(
    scan: &ScanImage,
    seed: Idx2d,
    label: u8,
    params: &SegmentationParams,
) -> LabelImage {
    let speed = speed_image(scan, params);
    let arrival = fast_marching(&speed.view(), &[seed], params.fast_marching_stopping_time);
    let roi = roi_from_arrival(&arrival.view(), params.fast_marching_stopping_time);
    segment_from_roi_with_speed(scan, &roi, &speed, label, params)
}

/// 从给定初始 ROI 掩膜出发的水平集分割 (跳过快速行进).
pub fn segment_from_roi(
    scan: &ScanImage,
    roi: &Array2<u8>,
    label: u8,
    params: &SegmentationParams,
) -> LabelImage {
    let speed = speed_image(scan, params);
    segment_from_roi_with_speed(scan, roi, &speed, label, params)
}

/// 公共尾段: 符号距离初始化 + GAC 演化 + 零水平面阈值化.
fn segment_from_roi_with_speed(
    scan: &ScanImage,
    roi: &Array2<u8>,
    speed: &Array2<f32>,
    label: u8,
    params: &SegmentationParams,
) -> LabelImage {
    let phi0 = signed_distance_sq(&roi.view(), scan.geometry().spacing);
    let outcome = evolve(phi0, &speed.view(), &GacParams::from(params));
    log::info!(
        "GAC 演化结束: {} 轮, RMS 变化 {:.6}",
        outcome.iterations,
        outcome.rms_change
    );

    let mut out = LabelImage::air_like(scan);
    for (pos, pix) in out.array_view_mut().indexed_iter_mut() {
        if outcome.phi[pos] <= 0.0 {
            *pix = label;
        }
    }
    out
}

/// PDE 模板逐像素计算. 在启用 `rayon` feature 时并行执行;
/// 逐像素运算只读取上一轮栅格, 结果与执行顺序无关.
pub(crate) fn stencil_map<F>(shape: Idx2d, f: F) -> Array2<f32>
where
    F: Fn(Idx2d) -> f32 + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        let (height, width) = shape;
        let buf: Vec<f32> = (0..height * width)
            .into_par_iter()
            .map(|i| f((i / width, i % width)))
            .collect();
        Array2::from_shape_vec(shape, buf).unwrap()
    }
    #[cfg(not(feature = "rayon"))]
    {
        Array2::from_shape_fn(shape, f)
    }
}
