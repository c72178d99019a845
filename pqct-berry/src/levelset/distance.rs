//! 间距感知的符号平方距离变换.

use crate::Idx2dF;
use ndarray::{Array2, ArrayView2};

/// "无站点" 哨兵值. 足够大, 且平方组合运算仍在 f64 范围内.
const NO_SITE: f64 = 1e20;

/// 符号平方欧氏距离变换.
///
/// 前景像素取到最近背景像素距离平方的相反数 (内部为负),
/// 背景像素取到最近前景像素的距离平方. 距离按物理间距度量 (mm^2).
/// 掩膜全前景或全背景时, 对应一侧取大哨兵值.
pub fn signed_distance_sq(mask: &ArrayView2<u8>, spacing: Idx2dF) -> Array2<f32> {
    let to_fg = distance_sq_to_sites(mask, spacing, true);
    let to_bg = distance_sq_to_sites(mask, spacing, false);
    let (height, width) = mask.dim();
    Array2::from_shape_fn((height, width), |pos| {
        if mask[pos] != 0 {
            -to_bg[pos] as f32
        } else {
            to_fg[pos] as f32
        }
    })
}

/// 到最近站点 (前景或背景像素) 的平方距离场.
fn distance_sq_to_sites(mask: &ArrayView2<u8>, spacing: Idx2dF, site_is_fg: bool) -> Array2<f64> {
    let (height, width) = mask.dim();
    let mut field = Array2::from_shape_fn((height, width), |pos| {
        let is_site = (mask[pos] != 0) == site_is_fg;
        if is_site {
            0.0
        } else {
            NO_SITE
        }
    });

    // 先沿宽度方向逐行变换, 再沿高度方向逐列变换.
    let mut buf = vec![0.0f64; width.max(height)];
    let mut out = vec![0.0f64; width.max(height)];
    for h in 0..height {
        for w in 0..width {
            buf[w] = field[(h, w)];
        }
        dt1d(&buf[..width], spacing.1, &mut out[..width]);
        for w in 0..width {
            field[(h, w)] = out[w];
        }
    }
    for w in 0..width {
        for h in 0..height {
            buf[h] = field[(h, w)];
        }
        dt1d(&buf[..height], spacing.0, &mut out[..height]);
        for h in 0..height {
            field[(h, w)] = out[h].min(NO_SITE);
        }
    }
    field
}

/// 一维平方距离变换 (下包络抛物线法), 采样点位于 `i * s`.
fn dt1d(f: &[f64], s: f64, out: &mut [f64]) {
    let n = f.len();
    debug_assert!(n > 0 && out.len() >= n);
    if n == 1 {
        out[0] = f[0];
        return;
    }

    // v: 下包络抛物线的顶点下标; z: 相邻抛物线的分界坐标.
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    let x = |i: usize| i as f64 * s;
    for q in 1..n {
        loop {
            let p = v[k];
            // 抛物线 q 与 p 的交点横坐标.
            let intersect =
                ((f[q] + x(q) * x(q)) - (f[p] + x(p) * x(p))) / (2.0 * x(q) - 2.0 * x(p));
            if intersect <= z[k] {
                debug_assert!(k > 0);
                k -= 1;
            } else {
                k += 1;
                v[k] = q;
                z[k] = intersect;
                z[k + 1] = f64::INFINITY;
                break;
            }
        }
    }

    let mut k = 0usize;
    for q in 0..n {
        while z[k + 1] < x(q) {
            k += 1;
        }
        let d = x(q) - x(v[k]);
        out[q] = d * d + f[v[k]];
    }
}
