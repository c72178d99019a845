//! 快速行进前沿传播.

use crate::Idx2d;
use binary_heap_plus::BinaryHeap;
use ndarray::{Array2, ArrayView2};

/// 速度下限, 防止除零.
const MIN_SPEED: f64 = 1e-8;

/// 快速行进: 从 `seeds` 出发在速度图上传播前沿, 返回每个像素的到达时间.
///
/// 求解程函方程 `|grad T| = 1 / F`, 采用逐轴上风二次更新.
/// 到达时间超过 `stopping_time` 后前沿不再扩展, 未到达像素为
/// `f32::INFINITY`. 计算在索引空间进行 (单位间距).
pub fn fast_marching(
    speed: &ArrayView2<f32>,
    seeds: &[Idx2d],
    stopping_time: f64,
) -> Array2<f32> {
    let (height, width) = speed.dim();
    let mut arrival = Array2::from_elem((height, width), f64::INFINITY);
    let mut alive = Array2::from_elem((height, width), false);

    // 堆顶为到达时间最小的试探点.
    let mut trial: BinaryHeap<(f64, Idx2d), _> =
        BinaryHeap::new_by(|a: &(f64, Idx2d), b: &(f64, Idx2d)| b.0.total_cmp(&a.0));

    for &seed in seeds {
        assert!(seed.0 < height && seed.1 < width, "种子点越界: {seed:?}");
        arrival[seed] = 0.0;
        trial.push((0.0, seed));
    }

    while let Some((time, pos)) = trial.pop() {
        // 滞后删除: 跳过已过期的堆元素.
        if alive[pos] || time > arrival[pos] {
            continue;
        }
        if time > stopping_time {
            break;
        }
        alive[pos] = true;

        let (h, w) = pos;
        let neighbours = [
            (h.wrapping_sub(1), w),
            (h + 1, w),
            (h, w.wrapping_sub(1)),
            (h, w + 1),
        ];
        for (nh, nw) in neighbours {
            if nh >= height || nw >= width || alive[(nh, nw)] {
                continue;
            }
            let updated = eikonal_update(&arrival, &alive, (nh, nw), speed[(nh, nw)]);
            if updated < arrival[(nh, nw)] {
                arrival[(nh, nw)] = updated;
                trial.push((updated, (nh, nw)));
            }
        }
    }

    arrival.map(|&t| t as f32)
}

/// 逐轴上风二次更新: 取每个轴上已确定邻居的最小到达时间参与求解.
fn eikonal_update(
    arrival: &Array2<f64>,
    alive: &Array2<bool>,
    (h, w): Idx2d,
    speed: f32,
) -> f64 {
    let (height, width) = arrival.dim();
    let cost = 1.0 / (speed as f64).max(MIN_SPEED);

    let axis_min = |a: Option<Idx2d>, b: Option<Idx2d>| -> f64 {
        let pick = |p: Option<Idx2d>| {
            p.filter(|&idx| alive[idx])
                .map(|idx| arrival[idx])
                .unwrap_or(f64::INFINITY)
        };
        pick(a).min(pick(b))
    };

    let up = (h > 0).then(|| (h - 1, w));
    let down = (h + 1 < height).then(|| (h + 1, w));
    let left = (w > 0).then(|| (h, w - 1));
    let right = (w + 1 < width).then(|| (h, w + 1));

    let a = axis_min(up, down);
    let b = axis_min(left, right);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    debug_assert!(lo.is_finite(), "更新点至少有一个已确定的邻居");

    // 单轴解; 若不超过另一轴的值则即为解.
    let single = lo + cost;
    if single <= hi {
        return single;
    }
    // 双轴二次方程 (T - lo)^2 + (T - hi)^2 = cost^2.
    let discriminant = 2.0 * cost * cost - (lo - hi) * (lo - hi);
    debug_assert!(discriminant >= 0.0);
    (lo + hi + discriminant.sqrt()) / 2.0
}

/// 到达时间在 `[0, stopping_time]` 内的像素构成 ROI 掩膜.
pub fn roi_from_arrival(arrival: &ArrayView2<f32>, stopping_time: f64) -> Array2<u8> {
    arrival.map(|&t| u8::from((0.0..=stopping_time as f32).contains(&t)))
}
