//! 流水线编排.
//!
//! 每个工作流 (解剖部位) 对应一条固定的阶段序列, 单遍执行,
//! 对象之间完全无状态. 标签图由编排器独占持有,
//! 以独占可变引用逐阶段传入, 阶段之间不存在别名.

mod fat;
mod four_pct;
mod mid_thigh;
mod sixty_six_pct;
mod thirty_eight_pct;

use crate::cluster::classify_image;
use crate::consts::label;
use crate::params::SegmentationParams;
use crate::smoothing::{smooth_scan, SmoothingMethod};
use crate::stats::{append_intensity_attributes, append_shape_attributes, QuantRecord};
use crate::{LabelImage, PqctError, PqctResult, ScanImage};

/// 工作流 (解剖部位).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Workflow {
    /// 胫骨 4% 部位.
    TibiaFourPercent,

    /// 胫骨 38% 部位.
    TibiaThirtyEight,

    /// 胫骨 66% 部位.
    TibiaSixtySix,

    /// CT 大腿中段.
    MidThighCt,

    /// 仅匿名化 (字节级拷贝由 I/O 协作方完成, 本 crate 不做任何分析).
    AnonymizeOnly,
}

impl Workflow {
    /// 从整数编号构建. 编号不在 0..=4 内时返回配置错误.
    pub fn from_id(id: u16) -> PqctResult<Workflow> {
        Ok(match id {
            0 => Self::TibiaFourPercent,
            1 => Self::TibiaThirtyEight,
            2 => Self::TibiaSixtySix,
            3 => Self::MidThighCt,
            4 => Self::AnonymizeOnly,
            _ => return Err(PqctError::UnknownWorkflow(id)),
        })
    }

    /// 部位名称, 用于定量记录.
    pub const fn site_name(self) -> &'static str {
        match self {
            Self::TibiaFourPercent => "4_PCT",
            Self::TibiaThirtyEight => "38_PCT",
            Self::TibiaSixtySix => "66_PCT",
            Self::MidThighCt => "MID_THIGH",
            Self::AnonymizeOnly => "UNUSED",
        }
    }

    /// 聚类的先验均值 (密度), 簇下标与组织编码一致.
    pub const fn prior_means(self) -> &'static [f64] {
        match self {
            // 空气, 脂肪, 肌肉, 松质骨, 皮质骨, 高密度皮质骨.
            Self::TibiaFourPercent => &[-400.0, -22.0, 72.0, 200.0, 500.0, 750.0],
            // 空气, 脂肪, 肌肉, 低密度胫骨, 高密度胫骨.
            Self::TibiaThirtyEight | Self::TibiaSixtySix => {
                &[-400.0, -22.0, 72.0, 514.0, 993.0]
            }
            // 空气, 脂肪, 肌肉, 低密度股骨, 高密度股骨.
            Self::MidThighCt => &[-940.0, -20.0, 50.0, 700.0, 1200.0],
            Self::AnonymizeOnly => &[],
        }
    }

    /// 是否在记录中追加耗时列.
    pub const fn is_timed(self) -> bool {
        matches!(
            self,
            Self::TibiaFourPercent | Self::TibiaThirtyEight | Self::TibiaSixtySix
        )
    }
}

/// 一次分析的输出: 与输入同几何的标签图, 以及扁平的定量记录.
#[derive(Debug)]
pub struct Analysis {
    /// 组织标签图.
    pub labels: LabelImage,

    /// 定量记录.
    pub record: QuantRecord,
}

/// 按工作流执行完整分析.
///
/// 每个对象独立, 调用之间不携带任何状态. 配置与 I/O
/// 错误中止分析并向上传播; 可容忍的退化输入在内部柔性降级.
pub fn analyze(
    workflow: Workflow,
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    log::info!(
        "开始分析对象 `{subject_id}`, 部位 {}, 图像 {:?}",
        workflow.site_name(),
        scan.shape()
    );
    match workflow {
        Workflow::TibiaFourPercent => four_pct::analyze(scan, subject_id, params),
        Workflow::TibiaThirtyEight => thirty_eight_pct::analyze(scan, subject_id, params),
        Workflow::TibiaSixtySix => sixty_six_pct::analyze(scan, subject_id, params),
        Workflow::MidThighCt => mid_thigh::analyze(scan, subject_id, params),
        Workflow::AnonymizeOnly => {
            // 匿名化只涉及文件字节拷贝, 不产生分割或定量结果.
            log::info!("匿名化工作流不执行任何分析阶段");
            Ok(Analysis {
                labels: LabelImage::air_like(&scan),
                record: QuantRecord::new(),
            })
        }
    }
}

/// 按整数工作流编号执行完整分析. 编号非法时不执行任何阶段.
pub fn analyze_by_id(
    workflow_id: u16,
    scan: ScanImage,
    subject_id: &str,
    params: &SegmentationParams,
) -> PqctResult<Analysis> {
    analyze(Workflow::from_id(workflow_id)?, scan, subject_id, params)
}

/// 主聚类: 中值平滑后按先验均值分类, 再做工作流相关的类别映射.
///
/// 返回 `(聚类标签图, 组织标签图)`; 组织标签图初始为聚类结果的副本,
/// 由后续阶段就地修正.
pub(crate) fn apply_kmeans(
    scan: &ScanImage,
    workflow: Workflow,
    params: &SegmentationParams,
) -> (LabelImage, LabelImage) {
    let smoothed = smooth_scan(scan, SmoothingMethod::Median, params);
    let means = crate::cluster::kmeans_fit(
        smoothed.as_slice().unwrap(),
        workflow.prior_means(),
    );
    log::info!("k-means 收敛均值: {means:?}");

    let mut grid = classify_image(&smoothed.view(), &means);
    // 非 4% 部位不单独报告低密度骨, 并入皮质骨.
    if workflow != Workflow::TibiaFourPercent {
        grid.iter_mut()
            .filter(|p| **p == label::TRAB_BONE)
            .for_each(|p| *p = label::CORT_BONE);
    }

    let cluster_labels = LabelImage::new(grid, scan.geometry());
    let tissue_labels = cluster_labels.clone();
    (cluster_labels, tissue_labels)
}

/// 前景总截面统计: 聚类标签图中所有非空气像素构成 `TOT_AREA` 区域,
/// 其形状与密度属性追加到记录.
pub(crate) fn total_area_pass(
    record: &mut QuantRecord,
    cluster_labels: &LabelImage,
    scan: &ScanImage,
) {
    let mut total = LabelImage::filled_air(cluster_labels.shape(), cluster_labels.geometry());
    for (pos, pix) in total.array_view_mut().indexed_iter_mut() {
        if cluster_labels[pos] != label::AIR {
            *pix = label::TOT_AREA;
        }
    }
    append_shape_attributes(record, &total);
    append_intensity_attributes(record, &total, scan);
}
