use crate::{Area2d, Areas2d, Idx2d, Idx2dF, Predicate};
use ndarray::iter::{Iter, IterMut};
use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 栅格的物理几何: 像素间距与原点, 均为 `(高, 宽)` 次序, 单位 mm.
///
/// 位置 `(h, w)` 的物理坐标为 `origin + (h, w) * spacing`.
/// 裁剪子图时原点随之平移, 物理坐标在裁剪前后保持一致.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Geometry {
    /// 像素间距 (行距, 列距), 单位 mm. 必须为正.
    pub spacing: Idx2dF,

    /// 位置 `(0, 0)` 的物理坐标, 单位 mm.
    pub origin: Idx2dF,
}

impl Geometry {
    /// 以给定间距和原点构建. 间距必须为正, 否则 panic.
    pub fn new(spacing: Idx2dF, origin: Idx2dF) -> Self {
        assert!(
            spacing.0 > 0.0 && spacing.1 > 0.0,
            "像素间距必须为正: {spacing:?}"
        );
        Self { spacing, origin }
    }

    /// 以各向同性间距 `mm` 和零原点构建.
    #[inline]
    pub fn isotropic(mm: f64) -> Self {
        Self::new((mm, mm), (0.0, 0.0))
    }

    /// 单个像素的物理面积 (mm^2).
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.spacing.0 * self.spacing.1
    }

    /// 位置 `(h, w)` 的物理坐标 (mm).
    #[inline]
    pub fn physical_point(&self, (h, w): Idx2d) -> Idx2dF {
        (
            self.origin.0 + h as f64 * self.spacing.0,
            self.origin.1 + w as f64 * self.spacing.1,
        )
    }

    /// 原点平移 `offset` 个像素后的几何. 用于裁剪.
    #[inline]
    pub fn shifted(&self, offset: Idx2d) -> Geometry {
        Geometry {
            spacing: self.spacing,
            origin: self.physical_point(offset),
        }
    }
}

impl Default for Geometry {
    /// 1mm 各向同性间距, 零原点.
    fn default() -> Self {
        Self::isotropic(1.0)
    }
}

/// 连通性规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// 4-相邻 (上下左右).
    Four,

    /// 8-相邻 (含对角).
    Eight,
}

/// `pos` 的 4-邻域候选索引. 上/左方向借助 usize 回绕越界, 由调用方过滤.
#[inline]
fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h + 1, w),
        (h, w.wrapping_sub(1)),
        (h, w + 1),
    ]
}

/// `pos` 的 8-邻域候选索引. 由调用方过滤越界项.
#[inline]
fn neighbour8((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w.wrapping_sub(1)),
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w + 1),
        (h, w.wrapping_sub(1)),
        (h, w + 1),
        (h + 1, w.wrapping_sub(1)),
        (h + 1, w),
        (h + 1, w + 1),
    ]
}

/// 所有栅格共有的只读几何方法.
macro_rules! impl_grid_common {
    ($grid: ty, $elem: ty) => {
        impl $grid {
            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 图像的物理几何.
            #[inline]
            pub fn geometry(&self) -> Geometry {
                self.geometry
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 判断一个索引是否位于图像的边缘.
            #[inline]
            pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
                h == 0
                    || h.saturating_add(1) == self.height()
                    || w == 0
                    || w.saturating_add(1) == self.width()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&$elem> {
                self.data.get(pos)
            }

            /// 获取给定位置的像素值, 并可就地修改. 越界时返回 `None`.
            #[inline]
            pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut $elem> {
                self.data.get_mut(pos)
            }

            /// 获得底层数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<$elem> {
                self.data.view()
            }

            /// 获得底层数据的一份可变 shallow copy.
            #[inline]
            pub fn array_view_mut(&mut self) -> ArrayViewMut2<$elem> {
                self.data.view_mut()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, $elem, Ix2> {
                self.data.iter()
            }

            /// 获取可以迭代并修改图像像素的迭代器.
            #[inline]
            pub fn iter_mut(&mut self) -> IterMut<'_, $elem, Ix2> {
                self.data.iter_mut()
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &$elem)> {
                self.data.indexed_iter()
            }

            /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                let (h, w) = self.shape();
                (0..h).flat_map(move |first| (0..w).map(move |second| (first, second)))
            }

            /// 获得 `pos` 的 4-邻域像素索引. 保证返回的索引都不越界.
            pub fn n4_positions(&self, pos: Idx2d) -> Vec<Idx2d> {
                neighbour4(pos)
                    .into_iter()
                    .filter(|p| self.check(*p))
                    .collect()
            }

            /// 获得 `pos` 的 8-邻域像素索引. 保证返回的索引都不越界.
            pub fn n8_positions(&self, pos: Idx2d) -> Vec<Idx2d> {
                neighbour8(pos)
                    .into_iter()
                    .filter(|p| self.check(*p))
                    .collect()
            }

            /// 直接获得底层数据.
            #[inline]
            pub fn into_raw(self) -> Array2<$elem> {
                self.data
            }
        }

        impl Index<Idx2d> for $grid {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx2d) -> &Self::Output {
                &self.data[index]
            }
        }

        impl IndexMut<Idx2d> for $grid {
            #[inline]
            fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
                &mut self.data[index]
            }
        }
    };
}

/// 拥有所有权的二维扫描栅格, 像素值为标定后的密度 (HU 量纲).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanImage {
    data: Array2<f32>,
    geometry: Geometry,
}

impl_grid_common!(ScanImage, f32);

impl ScanImage {
    /// 由底层数据和几何信息直接构建.
    #[inline]
    pub fn new(data: Array2<f32>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// 裁剪出从 `offset` 开始, 尺寸为 `size` 的子图.
    /// 子图原点随偏移平移. 越界时 panic.
    pub fn crop(&self, offset: Idx2d, size: Idx2d) -> ScanImage {
        let (h0, w0) = offset;
        let (hs, ws) = size;
        assert!(
            h0 + hs <= self.height() && w0 + ws <= self.width(),
            "裁剪范围越界"
        );
        ScanImage {
            data: self.data.slice(s![h0..h0 + hs, w0..w0 + ws]).to_owned(),
            geometry: self.geometry.shifted(offset),
        }
    }
}

/// 拥有所有权的二维组织标签栅格.
///
/// 每个像素恰好持有一个 [`crate::consts::label`] 组织编码 (完全划分,
/// 不存在未标注像素). 初始为全空气, 由各阶段通过独占可变引用就地修改.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelImage {
    data: Array2<u8>,
    geometry: Geometry,
}

impl_grid_common!(LabelImage, u8);

impl LabelImage {
    /// 构建与 `scan` 同尺寸, 同几何的全空气标签图.
    #[inline]
    pub fn air_like(scan: &ScanImage) -> Self {
        Self {
            data: Array2::zeros(scan.shape()),
            geometry: scan.geometry(),
        }
    }

    /// 由底层数据和几何信息直接构建.
    #[inline]
    pub fn new(data: Array2<u8>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// 以给定尺寸和几何构建全空气标签图.
    #[inline]
    pub fn filled_air(shape: Idx2d, geometry: Geometry) -> Self {
        Self {
            data: Array2::zeros(shape),
            geometry,
        }
    }

    /// 统计图像中值为 `label` 的像素总个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|&p| *p == label).count()
    }

    /// 统计满足谓词 `pred` 的像素总个数.
    #[inline]
    pub fn count_by(&self, pred: Predicate) -> usize {
        self.data.iter().filter(|&p| pred(*p)).count()
    }

    /// 将值为 `old` 的像素全部替换为 `new`. 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u8, new: u8) -> usize {
        let mut cnt = 0usize;
        self.data.iter_mut().filter(|pix| **pix == old).for_each(|p| {
            cnt += 1;
            *p = new;
        });
        cnt
    }

    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self.data[pos] = new;
        }
    }

    /// 生成满足谓词 `pred` 的 0/1 二值掩膜.
    pub fn mask_where(&self, pred: Predicate) -> Array2<u8> {
        self.data.map(|&p| u8::from(pred(p)))
    }

    /// 按照给定相邻规则获取所有区域. 两个像素 `p1` 和 `p2` 属于同一个区域,
    /// 当且仅当存在一条从 `p1` 到 `p2` 的相邻路径, 且路径上的所有像素
    /// (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
    ///
    /// 区域按首次遇到 (行优先) 的顺序返回.
    pub fn areas(&self, pred: Predicate, conn: Connectivity) -> Areas2d {
        self.areas_from_local(self.pos_iter(), pred, conn)
    }

    /// 同 [`Self::areas`], 但 BFS 的出发点由 `it` 指定.
    pub fn areas_from_local<I: IntoIterator<Item = Idx2d>>(
        &self,
        it: I,
        pred: Predicate,
        conn: Connectivity,
    ) -> Areas2d {
        let mut ans = Areas2d::with_capacity(1);
        let mut bfs_q = VecDeque::with_capacity(4);
        let mut set = HashSet::with_capacity(16);

        for pos in it.into_iter() {
            if set.contains(&pos) || !pred(self[pos]) {
                continue;
            }
            bfs_q.push_back(pos);
            let mut this_area = Area2d::with_capacity(1);
            while let Some(cur_pos) = bfs_q.pop_front() {
                if set.contains(&cur_pos) {
                    continue;
                }
                set.insert(cur_pos);
                this_area.push(cur_pos);

                // bfs
                let push = |q: &mut VecDeque<Idx2d>, p: Idx2d| {
                    if self.check(p) && pred(self[p]) && !set.contains(&p) {
                        q.push_back(p);
                    }
                };
                match conn {
                    Connectivity::Four => {
                        for p in neighbour4(cur_pos) {
                            push(&mut bfs_q, p);
                        }
                    }
                    Connectivity::Eight => {
                        for p in neighbour8(cur_pos) {
                            push(&mut bfs_q, p);
                        }
                    }
                }
            }
            ans.push(this_area);
        }
        ans
    }

    /// 判断 `positions` 的索引是否全部都在图像的内部 (不触边).
    #[inline]
    pub fn all_within(&self, positions: &[Idx2d]) -> bool {
        positions.iter().all(|p| !self.is_at_border(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label::*;

    fn label_3x3(values: [u8; 9]) -> LabelImage {
        LabelImage::new(
            Array2::from_shape_vec((3, 3), values.to_vec()).unwrap(),
            Geometry::default(),
        )
    }

    #[test]
    fn test_geometry_physical_point() {
        let g = Geometry::new((0.5, 0.5), (10.0, 20.0));
        assert_eq!(g.physical_point((2, 4)), (11.0, 22.0));
        assert_eq!(g.pixel_area(), 0.25);

        let shifted = g.shifted((2, 0));
        assert_eq!(shifted.origin, (11.0, 20.0));
        assert_eq!(shifted.physical_point((0, 4)), g.physical_point((2, 4)));
    }

    #[test]
    fn test_crop_keeps_physical_coordinates() {
        let data = Array2::from_shape_fn((4, 4), |(h, w)| (h * 4 + w) as f32);
        let scan = ScanImage::new(data, Geometry::isotropic(0.8));
        let sub = scan.crop((1, 2), (2, 2));
        assert_eq!(sub.shape(), (2, 2));
        assert_eq!(sub[(0, 0)], scan[(1, 2)]);
        assert_eq!(
            sub.geometry().physical_point((0, 0)),
            scan.geometry().physical_point((1, 2)),
        );
    }

    #[test]
    fn test_areas_connectivity() {
        // 两个前景像素仅对角相邻.
        let img = label_3x3([FAT, AIR, AIR, AIR, FAT, AIR, AIR, AIR, AIR]);
        assert_eq!(img.areas(is_fat, Connectivity::Four).len(), 2);
        assert_eq!(img.areas(is_fat, Connectivity::Eight).len(), 1);
    }

    #[test]
    fn test_replace_and_count() {
        let mut img = label_3x3([FAT, FAT, AIR, MUSCLE, AIR, AIR, AIR, AIR, FAT]);
        assert_eq!(img.count(FAT), 3);
        assert_eq!(img.replace(FAT, SUB_FAT), 3);
        assert_eq!(img.count(FAT), 0);
        assert_eq!(img.count(SUB_FAT), 3);
        assert_eq!(img.count_by(is_foreground), 4);
    }

    #[test]
    fn test_mask_and_border() {
        let img = label_3x3([AIR, AIR, AIR, AIR, MUSCLE, AIR, AIR, AIR, AIR]);
        let mask = img.mask_where(is_muscle);
        assert_eq!(mask.iter().map(|&v| v as usize).sum::<usize>(), 1);
        assert!(!img.is_at_border((1, 1)));
        assert!(img.is_at_border((0, 1)));
        assert!(img.all_within(&[(1, 1)]));
        assert!(!img.all_within(&[(1, 1), (2, 2)]));
    }
}
