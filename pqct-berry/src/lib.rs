#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对单层 pQCT / CT 横断面扫描进行组织分割与定量分析.
//!
//! 输入是一幅已完成密度标定的二维扫描 (带像素物理间距与原点),
//! 输出是同尺寸的组织标签图和一条扁平的定量记录 (面积, 质心, 主惯性矩,
//! 等效半径, 密度均值/标准差). 文件解析与落盘由外部协作方负责,
//! 本 crate 不读写任何专有格式.
//!
//! # 注意
//!
//! 1. 四个解剖部位 (胫骨 4% / 38% / 66%, 大腿中段) 各有固定的流水线编排,
//!    见 [`pipeline`] 模块.
//! 2. 全部迭代算法都有硬性迭代上限或收敛容差, 保证终止.
//! 3. 相同输入与相同先验均值下, 输出逐像素一致 (无任何随机初始化).
//!
//! # 功能总览
//!
//! ### 组织聚类 ✅
//!
//! 以各部位的密度先验为种子的一维 Lloyd 迭代, 以及肌肉/肌间脂肪的
//! 二次重聚类.
//!
//! 实现位于 `pqct-berry/src/cluster`.
//!
//! ### 连通区域分析 ✅
//!
//! 8-相邻连通分量提取, 按像素数排名, 以及带物理面积下限的肢体选择.
//!
//! 实现位于 `pqct-berry/src/regions.rs`.
//!
//! ### 形态学修正 ✅
//!
//! 圆盘结构元的膨胀/腐蚀, 迭代投票孔洞填充, 二值孔洞填充,
//! 以及皮下脂肪/骨髓相关的组织级修正.
//!
//! 实现位于 `pqct-berry/src/morph.rs`.
//!
//! ### 水平集边界精化 ✅
//!
//! 各向异性扩散 → 梯度幅值 → sigmoid 速度图 → 快速行进初始化 →
//! 符号距离 → 测地主动轮廓演化.
//!
//! 实现位于 `pqct-berry/src/levelset`.
//!
//! ### 统计引擎 ✅
//!
//! 逐标签的形状与密度属性, 以及定宽两行文本表格的聚合输出.
//!
//! 实现位于 `pqct-berry/src/stats`.
//!
//! ### 流水线编排 ✅
//!
//! 工作流枚举, 参数表, 以及逐部位的阶段序列.
//!
//! 实现位于 `pqct-berry/src/pipeline`.

/// 二维索引 (高, 宽), 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 高精度通用索引 / 向量, 多用于物理坐标 (mm).
pub type Idx2dF = (f64, f64);

/// 标签像素谓词.
type Predicate = fn(u8) -> bool;

/// 一个连通区域的像素索引集合.
type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

pub mod consts;

/// 二维扫描 / 标签栅格基础数据结构.
mod data;

pub use data::{Connectivity, CtWindow, Geometry, ImgWriteRaw, ImgWriteVis, LabelImage, ScanImage};

mod error;
pub use error::{PqctError, PqctResult};

pub mod cluster;
pub mod levelset;
pub mod morph;
pub mod params;
pub mod pipeline;
pub mod regions;
pub mod smoothing;
pub mod stats;

pub mod prelude;
