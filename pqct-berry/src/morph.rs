//! 形态学修正.
//!
//! 以圆盘结构元为核的二值膨胀/腐蚀, 迭代投票孔洞填充,
//! 二值孔洞填充, 以及组织级的修正操作 (皮下脂肪部分容积修正,
//! 去皮, 皮下脂肪闭合, 骨髓识别).

use crate::consts::label::*;
use crate::consts::STRUCTURE_ELEMENT_RADIUS;
use crate::LabelImage;
use ndarray::Array2;
use std::collections::VecDeque;

/// 投票孔洞填充的窗口半径.
const VOTING_RADIUS: usize = 5;

/// 投票孔洞填充的多数票裕量 (超出邻域半数的票数).
const VOTING_MAJORITY: usize = 5;

/// 投票孔洞填充的迭代上限.
const VOTING_MAX_ITERATIONS: u32 = 5;

/// 圆盘 (球) 结构元: 半径为 `radius` 的欧氏圆盘内的所有整数偏移.
#[derive(Clone, Debug)]
pub struct DiskElement {
    radius: usize,
    offsets: Vec<(isize, isize)>,
}

impl DiskElement {
    /// 构建半径为 `radius` 的圆盘结构元.
    pub fn new(radius: usize) -> Self {
        let r = radius as isize;
        let r2 = r * r;
        let mut offsets = Vec::with_capacity((2 * radius + 1).pow(2));
        for dh in -r..=r {
            for dw in -r..=r {
                if dh * dh + dw * dw <= r2 {
                    offsets.push((dh, dw));
                }
            }
        }
        Self { radius, offsets }
    }

    /// 默认半径 ([`STRUCTURE_ELEMENT_RADIUS`]) 的圆盘结构元.
    #[inline]
    pub fn default_radius() -> Self {
        Self::new(STRUCTURE_ELEMENT_RADIUS)
    }

    /// 结构元半径.
    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// 结构元包含的偏移集合.
    #[inline]
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }
}

/// 越界安全取值: 图像之外按背景 (0) 处理.
#[inline]
fn at(mask: &Array2<u8>, h: isize, w: isize) -> u8 {
    if h < 0 || w < 0 {
        return 0;
    }
    *mask.get((h as usize, w as usize)).unwrap_or(&0)
}

/// 0/1 掩膜的二值膨胀.
pub fn dilate(mask: &Array2<u8>, element: &DiskElement) -> Array2<u8> {
    let (height, width) = mask.dim();
    Array2::from_shape_fn((height, width), |(h, w)| {
        let found = element
            .offsets()
            .iter()
            .any(|&(dh, dw)| at(mask, h as isize + dh, w as isize + dw) != 0);
        u8::from(found)
    })
}

/// 0/1 掩膜的二值腐蚀. 图像边界外按背景处理, 因此贴边前景会被剥除.
pub fn erode(mask: &Array2<u8>, element: &DiskElement) -> Array2<u8> {
    let (height, width) = mask.dim();
    Array2::from_shape_fn((height, width), |(h, w)| {
        let all = element
            .offsets()
            .iter()
            .all(|&(dh, dw)| at(mask, h as isize + dh, w as isize + dw) != 0);
        u8::from(all)
    })
}

/// 0/1 掩膜的孔洞填充.
///
/// 从图像边界出发对背景做 4-相邻泛洪; 未被触及的背景像素即内部孔洞,
/// 填充为前景.
pub fn fill_holes(mask: &Array2<u8>) -> Array2<u8> {
    let (height, width) = mask.dim();
    let mut reachable = Array2::<u8>::zeros((height, width));
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    for h in 0..height {
        for w in [0, width - 1] {
            if mask[(h, w)] == 0 && reachable[(h, w)] == 0 {
                reachable[(h, w)] = 1;
                queue.push_back((h, w));
            }
        }
    }
    for w in 0..width {
        for h in [0, height - 1] {
            if mask[(h, w)] == 0 && reachable[(h, w)] == 0 {
                reachable[(h, w)] = 1;
                queue.push_back((h, w));
            }
        }
    }

    while let Some((h, w)) = queue.pop_front() {
        let neighbours = [
            (h.wrapping_sub(1), w),
            (h + 1, w),
            (h, w.wrapping_sub(1)),
            (h, w + 1),
        ];
        for (nh, nw) in neighbours {
            if nh < height && nw < width && mask[(nh, nw)] == 0 && reachable[(nh, nw)] == 0 {
                reachable[(nh, nw)] = 1;
                queue.push_back((nh, nw));
            }
        }
    }

    Array2::from_shape_fn((height, width), |pos| {
        u8::from(mask[pos] != 0 || reachable[pos] == 0)
    })
}

/// 迭代投票孔洞填充.
///
/// 每轮扫描中, 背景像素若在 `(2 * radius + 1)^2` 窗口内 (不含自身)
/// 拥有至少 `邻域半数 + majority` 个前景邻居, 则翻转为前景.
/// 无像素翻转或达到 `max_iterations` 轮后停止.
pub fn voting_fill(
    mask: &Array2<u8>,
    radius: usize,
    majority: usize,
    max_iterations: u32,
) -> Array2<u8> {
    let (height, width) = mask.dim();
    let r = radius as isize;
    let neighbours = (2 * radius + 1).pow(2) - 1;
    let birth_threshold = neighbours / 2 + majority;

    let mut current = mask.clone();
    for iteration in 0..max_iterations {
        let next = Array2::from_shape_fn((height, width), |(h, w)| {
            if current[(h, w)] != 0 {
                return 1u8;
            }
            let mut votes = 0usize;
            for dh in -r..=r {
                for dw in -r..=r {
                    if (dh, dw) == (0, 0) {
                        continue;
                    }
                    if at(&current, h as isize + dh, w as isize + dw) != 0 {
                        votes += 1;
                    }
                }
            }
            if votes >= birth_threshold {
                1
            } else {
                0
            }
        });
        let flipped = next
            .iter()
            .zip(current.iter())
            .filter(|(a, b)| a != b)
            .count();
        current = next;
        if flipped == 0 {
            log::debug!("投票填充在第 {iteration} 轮后稳定");
            break;
        }
    }
    current
}

/// 皮下脂肪的部分容积修正.
///
/// 膨胀皮下脂肪掩膜; 落在膨胀范围内且当前为肌间脂肪的像素改判为
/// 皮下脂肪. 该操作不触碰任何其它类别.
pub fn dilate_subfat_for_pve(labels: &mut LabelImage, element: &DiskElement) {
    let dilated = dilate(&labels.mask_where(|p| p == SUB_FAT), element);
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        if dilated[pos] != 0 && *pix == IM_FAT {
            *pix = SUB_FAT;
        }
    }
}

/// 腐蚀去皮.
///
/// 腐蚀整肢前景掩膜 (所有非空气像素); 落在腐蚀结果之外的皮下脂肪像素
/// 回退为空气.
pub fn remove_skin_by_erosion(labels: &mut LabelImage, element: &DiskElement) {
    let eroded = erode(&labels.mask_where(is_foreground), element);
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        if eroded[pos] == 0 && *pix == SUB_FAT {
            *pix = AIR;
        }
    }
}

/// 皮下脂肪区域的投票闭合.
///
/// 对皮下脂肪二值掩膜做迭代投票孔洞填充, 填充结果中的前景像素
/// 全部标注为皮下脂肪.
pub fn close_subfat_region(labels: &mut LabelImage) {
    let filled = voting_fill(
        &labels.mask_where(|p| p == SUB_FAT),
        VOTING_RADIUS,
        VOTING_MAJORITY,
        VOTING_MAX_ITERATIONS,
    );
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        if filled[pos] != 0 {
            *pix = SUB_FAT;
        }
    }
}

/// 骨髓识别.
///
/// 在聚类标签图上取皮质骨掩膜并做孔洞填充; 在原掩膜之外,
/// 填充结果之内的像素即骨内部孔洞 (候选骨髓), 在组织标签图上标注为
/// 骨髓.
pub fn identify_bone_marrow(labels: &mut LabelImage, cluster_labels: &LabelImage) {
    let bone = cluster_labels.mask_where(|p| p == CORT_BONE);
    let filled = fill_holes(&bone);
    for (pos, pix) in labels.array_view_mut().indexed_iter_mut() {
        if bone[pos] == 0 && filled[pos] != 0 {
            *pix = BONE_MARROW;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Geometry;

    #[test]
    fn test_disk_element_offsets() {
        let e = DiskElement::new(2);
        assert!(e.offsets().contains(&(0, 0)));
        assert!(e.offsets().contains(&(2, 0)));
        assert!(e.offsets().contains(&(1, 1)));
        assert!(!e.offsets().contains(&(2, 1)));
        assert_eq!(e.radius(), 2);
        // 半径 1 的圆盘是 4-邻域十字.
        assert_eq!(DiskElement::new(1).offsets().len(), 5);
    }

    #[test]
    fn test_dilate_erode_roundtrip() {
        let mut mask = Array2::<u8>::zeros((11, 11));
        for h in 4..7 {
            for w in 4..7 {
                mask[(h, w)] = 1;
            }
        }
        let e = DiskElement::new(1);
        let dilated = dilate(&mask, &e);
        assert_eq!(dilated[(3, 5)], 1);
        assert_eq!(dilated[(3, 3)], 0);
        // 膨胀后腐蚀回到原始方块 (闭运算对凸形状不变).
        assert_eq!(erode(&dilated, &e), mask);
    }

    #[test]
    fn test_erode_strips_border() {
        let mask = Array2::<u8>::ones((5, 5));
        let eroded = erode(&mask, &DiskElement::new(1));
        assert_eq!(eroded[(0, 0)], 0);
        assert_eq!(eroded[(2, 0)], 0);
        assert_eq!(eroded[(2, 2)], 1);
    }

    #[test]
    fn test_fill_holes() {
        // 3x3 环, 中心为洞.
        let mut mask = Array2::<u8>::zeros((5, 5));
        for h in 1..4 {
            for w in 1..4 {
                mask[(h, w)] = 1;
            }
        }
        mask[(2, 2)] = 0;
        let filled = fill_holes(&mask);
        assert_eq!(filled[(2, 2)], 1);
        // 外部背景不变.
        assert_eq!(filled[(0, 0)], 0);
    }

    #[test]
    fn test_voting_fill_small_hole() {
        // 大前景块中的单像素洞: 邻域 120 个像素中 119 个为前景, 翻转.
        let mut mask = Array2::<u8>::ones((13, 13));
        mask[(6, 6)] = 0;
        let filled = voting_fill(&mask, 5, 5, 5);
        assert_eq!(filled[(6, 6)], 1);
        // 全背景图不发生任何翻转.
        let empty = Array2::<u8>::zeros((13, 13));
        assert_eq!(voting_fill(&empty, 5, 5, 5), empty);
    }

    /// 圆盘 + 紧贴环 + 远处环的部分容积修正行为.
    #[test]
    fn test_pve_dilation_rings() {
        let size = 31usize;
        let center = 15isize;
        let mut labels = LabelImage::filled_air((size, size), Geometry::default());
        let dist2 = |h: usize, w: usize| {
            let dh = h as isize - center;
            let dw = w as isize - center;
            dh * dh + dw * dw
        };
        // 半径 5 的皮下脂肪圆盘.
        for h in 0..size {
            for w in 0..size {
                if dist2(h, w) <= 25 {
                    labels[(h, w)] = SUB_FAT;
                }
            }
        }
        // 紧贴圆盘的 1 像素宽肌间脂肪环 (圆盘的 8-邻域).
        let mut ring_near = vec![];
        for h in 0..size {
            for w in 0..size {
                if labels[(h, w)] == SUB_FAT {
                    continue;
                }
                if labels
                    .n8_positions((h, w))
                    .iter()
                    .any(|&p| labels[p] == SUB_FAT)
                {
                    ring_near.push((h, w));
                }
            }
        }
        labels.fill_batch(ring_near.iter().copied(), IM_FAT);
        // 距圆盘 3 像素以上的第二个环.
        let mut ring_far = vec![];
        for h in 0..size {
            for w in 0..size {
                let d2 = dist2(h, w);
                if (100..=121).contains(&d2) {
                    ring_far.push((h, w));
                }
            }
        }
        labels.fill_batch(ring_far.iter().copied(), IM_FAT);
        // 一个不应被触碰的肌肉像素, 位于膨胀范围内但不属于任何环.
        labels[(15, 22)] = MUSCLE;

        dilate_subfat_for_pve(&mut labels, &DiskElement::new(2));

        for &pos in &ring_near {
            assert_eq!(labels[pos], SUB_FAT, "紧贴环应被并入皮下脂肪: {pos:?}");
        }
        for &pos in &ring_far {
            assert_eq!(labels[pos], IM_FAT, "远处环不应被触碰: {pos:?}");
        }
        assert_eq!(labels[(15, 22)], MUSCLE);
    }

    #[test]
    fn test_remove_skin() {
        // 5x5 前景块, 外圈标注为皮下脂肪.
        let mut labels = LabelImage::filled_air((9, 9), Geometry::default());
        for h in 2..7 {
            for w in 2..7 {
                labels[(h, w)] = if h == 2 || h == 6 || w == 2 || w == 6 {
                    SUB_FAT
                } else {
                    MUSCLE
                };
            }
        }
        remove_skin_by_erosion(&mut labels, &DiskElement::new(1));
        // 腐蚀后的前景不含外圈, 外圈皮下脂肪被回退为空气.
        assert_eq!(labels[(2, 4)], AIR);
        // 肌肉像素不受该操作影响.
        assert_eq!(labels[(4, 4)], MUSCLE);
    }

    #[test]
    fn test_identify_bone_marrow() {
        let mut cluster = LabelImage::filled_air((7, 7), Geometry::default());
        // 骨环, 中心两个像素为洞.
        for h in 1..6 {
            for w in 1..6 {
                cluster[(h, w)] = CORT_BONE;
            }
        }
        cluster[(3, 3)] = FAT;
        cluster[(3, 4)] = FAT;
        let mut labels = cluster.clone();
        identify_bone_marrow(&mut labels, &cluster);
        assert_eq!(labels[(3, 3)], BONE_MARROW);
        assert_eq!(labels[(3, 4)], BONE_MARROW);
        assert_eq!(labels[(1, 1)], CORT_BONE);
        assert_eq!(labels[(0, 0)], AIR);
    }
}
