//! 分割算法参数表.
//!
//! 参数来源是一个扁平的 `名称 数值` 文本文件. 文件缺失不是错误,
//! 此时回退到编译期默认值; 数值非法或选择器取值非法则是配置错误,
//! 将中止当前对象的分析.

use crate::{PqctError, PqctResult};
use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 皮下脂肪 / 肌间脂肪分离策略.
///
/// 两种策略是同一概念步骤的互斥实现, 输出不保证一致.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FatSeparation {
    /// 基于连通分量排名: 最大脂肪分量为皮下脂肪, 其余为肌间脂肪.
    ConnectedComponents = 1,

    /// 基于测地主动轮廓: 腐蚀后的整肢掩膜经水平集演化得到非皮下区域.
    Gac = 2,
}

impl FatSeparation {
    /// 从参数表的整数选择器构建.
    pub fn from_code(code: i64) -> Option<FatSeparation> {
        match code {
            1 => Some(Self::ConnectedComponents),
            2 => Some(Self::Gac),
            _ => None,
        }
    }
}

impl fmt::Display for FatSeparation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectedComponents => write!(f, "connected-components"),
            Self::Gac => write!(f, "gac"),
        }
    }
}

/// 分割算法参数.
///
/// 字段与参数文件的键一一对应, 见 [`SegmentationParams::parse`].
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentationParams {
    /// 原始探测器计数到密度的标定斜率 (由上游 I/O 方消费).
    pub au_to_density_slope: f64,

    /// 原始探测器计数到密度的标定截距 (由上游 I/O 方消费).
    pub au_to_density_intercept: f64,

    /// 梯度幅值计算的高斯 sigma.
    pub smoothing_sigma: f64,

    /// 中值滤波半径 (像素).
    pub median_filter_radius: usize,

    /// 水平集速度图 sigmoid 的 beta.
    pub sigmoid_beta: f64,

    /// beta 与 alpha 的比值. `alpha = -(beta / ratio)`.
    pub sigmoid_beta_alpha_ratio: f64,

    /// 快速行进的停止时间.
    pub fast_marching_stopping_time: f64,

    /// 水平集膨胀力缩放.
    pub propagation_scaling: f64,

    /// 水平集曲率力缩放.
    pub curvature_scaling: f64,

    /// 水平集平流力缩放.
    pub advection_scaling: f64,

    /// 水平集迭代次数上限.
    pub levelset_max_iterations: u32,

    /// 水平集收敛的 RMS 变化阈值.
    pub levelset_max_rms_error: f64,

    /// 皮下/肌间脂肪分离策略.
    pub fat_separation: FatSeparation,

    /// 肢体前景阈值 (密度).
    pub leg_threshold: f32,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            au_to_density_slope: 1724.0,
            au_to_density_intercept: -322.0,
            smoothing_sigma: 0.5,
            median_filter_radius: 2,
            sigmoid_beta: 55.0,
            sigmoid_beta_alpha_ratio: 4.5,
            fast_marching_stopping_time: 10.0,
            propagation_scaling: 0.5,
            curvature_scaling: 0.1,
            advection_scaling: 1.5,
            levelset_max_iterations: 250,
            levelset_max_rms_error: 0.0015,
            fat_separation: FatSeparation::ConnectedComponents,
            leg_threshold: -200.0,
        }
    }
}

impl SegmentationParams {
    /// sigmoid 的 alpha. 恒为负值, 使强边缘对应低速度.
    #[inline]
    pub fn sigmoid_alpha(&self) -> f64 {
        -(self.sigmoid_beta / self.sigmoid_beta_alpha_ratio)
    }

    /// 从参数文件构建.
    ///
    /// 文件不存在时回退到默认值并记录告警; 文件内容非法时返回配置错误.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PqctResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "参数文件 {} 不存在, 使用默认参数值",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 从 `名称 数值` 文本解析. 未知键被忽略, 未出现的键保持默认值.
    ///
    /// 可识别的键:
    /// `AUtoDensitySlope`, `AUtoDensityIntercept`, `SmoothingSigma`,
    /// `MedianFilterRadius`, `LevelSetSigmoidBeta`, `SigmoidBetaAlphaRatio`,
    /// `FastMarchingStoppingTime`, `LevelSetPropagationScalingFactor`,
    /// `LevelSetCurvatureScalingFactor`, `LevelSetAdvectionScalingFactor`,
    /// `LevelsetMaximumIterations`, `LevelsetMaximumRMSError`,
    /// `SAT_IMFAT_SeparationAlgorithm`, `CT_LegThreshold`.
    pub fn parse(text: &str) -> PqctResult<Self> {
        let mut params = Self::default();
        let mut tokens = text.split_whitespace();

        while let Some(key) = tokens.next() {
            let Some(raw) = tokens.next() else {
                return Err(PqctError::Config(format!("参数 `{key}` 缺少数值")));
            };
            let value: f64 = raw.parse().map_err(|_| {
                PqctError::Config(format!("参数 `{key}` 的值 `{raw}` 不是数字"))
            })?;
            params.assign(key, value)?;
        }
        Ok(params)
    }

    /// 将单个键值写入参数表.
    fn assign(&mut self, key: &str, value: f64) -> PqctResult<()> {
        match key {
            "AUtoDensitySlope" => self.au_to_density_slope = value,
            "AUtoDensityIntercept" => self.au_to_density_intercept = value,
            "SmoothingSigma" => self.smoothing_sigma = value,
            "MedianFilterRadius" => {
                if value < 0.0 {
                    return Err(PqctError::Config(format!(
                        "MedianFilterRadius 不能为负: {value}"
                    )));
                }
                self.median_filter_radius = value as usize;
            }
            "LevelSetSigmoidBeta" => self.sigmoid_beta = value,
            "SigmoidBetaAlphaRatio" => self.sigmoid_beta_alpha_ratio = value,
            "FastMarchingStoppingTime" => self.fast_marching_stopping_time = value,
            "LevelSetPropagationScalingFactor" => self.propagation_scaling = value,
            "LevelSetCurvatureScalingFactor" => self.curvature_scaling = value,
            "LevelSetAdvectionScalingFactor" => self.advection_scaling = value,
            "LevelsetMaximumIterations" => self.levelset_max_iterations = value as u32,
            "LevelsetMaximumRMSError" => self.levelset_max_rms_error = value,
            "SAT_IMFAT_SeparationAlgorithm" => {
                self.fat_separation =
                    FatSeparation::from_code(value as i64).ok_or_else(|| {
                        PqctError::Config(format!(
                            "SAT_IMFAT_SeparationAlgorithm 取值非法: {value}"
                        ))
                    })?;
            }
            "CT_LegThreshold" => self.leg_threshold = value as f32,
            unknown => {
                log::debug!("忽略未知参数 `{unknown}`");
            }
        }
        Ok(())
    }
}
