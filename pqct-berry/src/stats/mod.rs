//! 组织统计引擎.
//!
//! 对标签图中每个 (未被排除的) 组织类别计算形状属性
//! (物理面积, 质心, 主惯性矩, 等效半径) 与密度属性 (均值, 标准差),
//! 并聚合到一条有序的定量记录中. 多次追加不会覆盖已有条目,
//! 最终渲染为定宽的 "表头 + 数值" 两行文本表格.

use crate::consts::{label, TissueClass, COLUMN_WIDTH, FLOAT_PRECISION};
use crate::{Idx2dF, LabelImage, ScanImage};
use num::ToPrimitive;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单个组织类别的形状属性.
#[derive(Clone, Debug)]
pub struct ShapeAttributes {
    /// 组织类别.
    pub tissue: TissueClass,

    /// 成员像素个数.
    pub pixel_count: usize,

    /// 物理面积 (mm^2).
    pub physical_area: f64,

    /// 物理质心 (mm), `(高向, 宽向)` 次序.
    pub centroid_mm: Idx2dF,

    /// 主惯性矩 (中心二阶矩矩阵的特征值, 升序).
    pub principal_moments: (f64, f64),

    /// 等效半径: 与区域面积相等的圆的半径 (mm).
    pub equivalent_radius: f64,
}

/// 单个组织类别的密度属性.
#[derive(Clone, Debug)]
pub struct IntensityAttributes {
    /// 组织类别.
    pub tissue: TissueClass,

    /// 密度均值.
    pub mean: f64,

    /// 密度样本标准差. 像素数不足 2 时为 0.
    pub std_dev: f64,
}

/// 2x2 对称矩阵的特征值 (升序).
fn symmetric_eigenvalues(a: f64, b: f64, c: f64) -> (f64, f64) {
    let mid = (a + c) / 2.0;
    let radius = (((a - c) / 2.0).powi(2) + b * b).sqrt();
    (mid - radius, mid + radius)
}

/// 计算标签图中每个类别的形状属性, 按标签值升序返回.
///
/// 值为 `background` 的像素被排除. 未知标签编码会被记录告警并跳过.
pub fn shape_attributes(labels: &LabelImage, background: u8) -> Vec<ShapeAttributes> {
    let geometry = labels.geometry();

    // 逐标签累积一阶与二阶矩.
    #[derive(Default)]
    struct Acc {
        count: usize,
        sum: Idx2dF,
        sum_sq: (f64, f64, f64), // (hh, hw, ww)
    }
    let mut accs: BTreeMap<u8, Acc> = BTreeMap::new();
    for (pos, &pix) in labels.indexed_iter() {
        if pix == background {
            continue;
        }
        let (h, w) = geometry.physical_point(pos);
        let acc = accs.entry(pix).or_default();
        acc.count += 1;
        acc.sum.0 += h;
        acc.sum.1 += w;
        acc.sum_sq.0 += h * h;
        acc.sum_sq.1 += h * w;
        acc.sum_sq.2 += w * w;
    }

    let mut ans = Vec::with_capacity(accs.len());
    for (pix, acc) in accs {
        let Some(tissue) = TissueClass::from_label(pix) else {
            log::warn!("跳过未知组织编码 {pix}");
            continue;
        };
        let n = acc.count.to_f64().unwrap();
        let centroid = (acc.sum.0 / n, acc.sum.1 / n);
        // 中心二阶矩.
        let mu_hh = acc.sum_sq.0 / n - centroid.0 * centroid.0;
        let mu_hw = acc.sum_sq.1 / n - centroid.0 * centroid.1;
        let mu_ww = acc.sum_sq.2 / n - centroid.1 * centroid.1;
        let physical_area = n * geometry.pixel_area();
        ans.push(ShapeAttributes {
            tissue,
            pixel_count: acc.count,
            physical_area,
            centroid_mm: centroid,
            principal_moments: symmetric_eigenvalues(mu_hh, mu_hw, mu_ww),
            equivalent_radius: (physical_area / std::f64::consts::PI).sqrt(),
        });
    }
    ans
}

/// 计算标签图中每个类别的密度属性, 按标签值升序返回.
///
/// 密度取自与标签图同尺寸的扫描 `scan`;
/// 值为 `background` 的像素被排除.
pub fn intensity_attributes(
    labels: &LabelImage,
    scan: &ScanImage,
    background: u8,
) -> Vec<IntensityAttributes> {
    assert_eq!(labels.shape(), scan.shape());

    #[derive(Default)]
    struct Acc {
        count: usize,
        sum: f64,
        sum_sq: f64,
    }
    let mut accs: BTreeMap<u8, Acc> = BTreeMap::new();
    for (pos, &pix) in labels.indexed_iter() {
        if pix == background {
            continue;
        }
        let value = scan[pos] as f64;
        let acc = accs.entry(pix).or_default();
        acc.count += 1;
        acc.sum += value;
        acc.sum_sq += value * value;
    }

    let mut ans = Vec::with_capacity(accs.len());
    for (pix, acc) in accs {
        let Some(tissue) = TissueClass::from_label(pix) else {
            log::warn!("跳过未知组织编码 {pix}");
            continue;
        };
        let n = acc.count.to_f64().unwrap();
        let mean = acc.sum / n;
        let std_dev = if acc.count > 1 {
            ((acc.sum_sq - n * mean * mean).max(0.0) / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        ans.push(IntensityAttributes { tissue, mean, std_dev });
    }
    ans
}

/// 有序的定量记录: `(列名, 已格式化数值)` 对的追加式列表.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuantRecord {
    headers: Vec<String>,
    values: Vec<String>,
}

impl QuantRecord {
    /// 空记录.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 条目个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// 判断是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// 追加一个文本条目.
    pub fn push_text(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.headers.push(header.into());
        self.values.push(value.into());
    }

    /// 追加一个浮点条目, 按固定精度格式化.
    pub fn push_float(&mut self, header: impl Into<String>, value: f64) {
        self.headers.push(header.into());
        self.values.push(format!("{value:.FLOAT_PRECISION$}"));
    }

    /// 按列名查找数值. 同名列取第一个.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == header)
            .map(|idx| self.values[idx].as_str())
    }

    /// 获取能迭代全部 `(列名, 数值)` 的迭代器.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    /// 渲染为定宽两行文本表格 (表头行 + 数值行).
    pub fn to_table(&self) -> String {
        let mut header_line = String::new();
        let mut value_line = String::new();
        for (header, value) in self.iter() {
            let _ = write!(header_line, "{header:>COLUMN_WIDTH$}");
            let _ = write!(value_line, "{value:>COLUMN_WIDTH$}");
        }
        format!("{header_line}\n{value_line}\n")
    }
}

/// 组织列名: `<编码>-<短名>[<度量>]`.
fn column(tissue: TissueClass, metric: &str) -> String {
    format!("{}-{}[{}]", tissue.as_label(), tissue.short_name(), metric)
}

/// 追加对象与部位信息列.
pub fn append_header_info(record: &mut QuantRecord, subject_id: &str, site: &str) {
    record.push_text("Subject_ID", subject_id);
    record.push_text("Tibia_Site", site);
}

/// 追加标签图的形状属性列 (面积, 两个主惯性矩, 等效半径).
///
/// 空气像素被排除. 质心只记录到日志, 不进入表格.
pub fn append_shape_attributes(record: &mut QuantRecord, labels: &LabelImage) {
    for shape in shape_attributes(labels, label::AIR) {
        log::info!(
            "{} [{}]: 面积 {:.3} mm^2, 质心 ({:.3}, {:.3})",
            shape.tissue.as_label(),
            shape.tissue.short_name(),
            shape.physical_area,
            shape.centroid_mm.0,
            shape.centroid_mm.1,
        );
        record.push_float(column(shape.tissue, "Area(mm^2)"), shape.physical_area);
        record.push_float(column(shape.tissue, "Princ.Mom.1"), shape.principal_moments.0);
        record.push_float(column(shape.tissue, "Princ.Mom.2"), shape.principal_moments.1);
        record.push_float(column(shape.tissue, "Eq.Radius"), shape.equivalent_radius);
    }
}

/// 追加标签图的密度属性列 (均值, 标准差).
pub fn append_intensity_attributes(
    record: &mut QuantRecord,
    labels: &LabelImage,
    scan: &ScanImage,
) {
    for intensity in intensity_attributes(labels, scan, label::AIR) {
        log::info!(
            "{} [{}]: 密度均值 {:.3}, 标准差 {:.3}",
            intensity.tissue.as_label(),
            intensity.tissue.short_name(),
            intensity.mean,
            intensity.std_dev,
        );
        record.push_float(column(intensity.tissue, "Den.M."), intensity.mean);
        record.push_float(column(intensity.tissue, "Den.SD."), intensity.std_dev);
    }
}

/// 追加耗时列 (秒).
pub fn append_elapsed(record: &mut QuantRecord, seconds: f64) {
    record.push_float("Elapsed_Time", seconds);
}
