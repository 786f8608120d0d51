//! Geometric grouping of sorted runs.
//!
//! Given run sizes normalized by the write buffer size and a target group
//! count, partitions the runs into contiguous groups whose post-compaction
//! sizes approximate a geometric sequence with a common ratio solved by
//! Newton–Raphson.

/// One contiguous group of sorted runs. `ratio` holds the group's normalized
/// size sum (a tail singleton holds its own size).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct SortedRunGroup {
    pub(crate) start: usize,
    pub(crate) count: usize,
    pub(crate) ratio: f64,
}

/// Solves `F(q, g) = S` for the common ratio `q`, where
/// `F(q, g) = q + q^2 + ... + q^g` and `S` is the sum of `sizes`.
fn solve_common_ratio(sizes: &[f64], g: usize) -> f64 {
    let s: f64 = sizes.iter().sum();
    let f = |q: f64, n: usize| (q.powi(n as i32 + 1) - q) / (q - 1.0);
    let mut q = s.powf(1.0 / g as f64);
    if s <= g as f64 + 1.0 {
        // near-uniform sizes make F ill-conditioned around q = 1
        q = 1.0;
    } else {
        for _ in 0..8 {
            let mut fp = q;
            let mut q_k = q;
            for k in 2..=g {
                q_k *= q;
                fp += k as f64 * q_k;
            }
            q -= (f(q, g) - s) / fp;
        }
    }
    q
}

/// Partitions `sizes` into `group` contiguous groups. Returns the groups and
/// the common ratio solved over the full input.
///
/// Oversized tail runs are split off as singleton groups whenever regrouping
/// the remaining prefix with fewer groups yields a smaller ratio. The prefix
/// is then swept right to left, advancing a group boundary whenever adding
/// the next run would move the group sum further from its target `q^i`.
pub(crate) fn gen_sorted_run_group(sizes: &[f64], group: usize) -> (Vec<SortedRunGroup>, f64) {
    debug_assert!(group > 0 && group <= sizes.len());
    let mut o = vec![SortedRunGroup::default(); group];
    let ret_q = solve_common_ratio(sizes, group);

    let mut sr_size = sizes.len();
    let mut g = group;
    let mut q = ret_q;
    let mut i = group - 1;
    while q > 1.0 && i > 0 {
        let e = g - i;
        let new_q = solve_common_ratio(&sizes[..sr_size - e], g - e);
        if new_q < q {
            for (j, slot) in o.iter_mut().enumerate().take(g).skip(i) {
                let start = j + sr_size - g;
                *slot = SortedRunGroup {
                    start,
                    count: 1,
                    ratio: sizes[start],
                };
            }
            sr_size -= e;
            g -= e;
            q = new_q;
        }
        i -= 1;
    }

    let mut sr_acc = sizes[sr_size - 1];
    let mut q_acc = q.powi(g as i32);
    let mut q_i = g as isize - 1;
    o[q_i as usize].ratio = sr_acc;
    o[0].start = 0;
    let mut i = sr_size as isize - 2;
    while i >= 0 {
        let iu = i as usize;
        let new_acc = sr_acc + sizes[iu];
        if (i < q_i
            || sr_acc > q_acc
            || (new_acc - q_acc).abs() > (sr_acc - q_acc).abs())
            && q_i > 0
        {
            o[q_i as usize].start = iu + 1;
            q_acc += q.powf(q_i as f64);
            q_i -= 1;
            o[q_i as usize].ratio = 0.0;
        }
        sr_acc = new_acc;
        o[q_i as usize].ratio += sizes[iu];
        i -= 1;
    }
    for i in 1..g {
        o[i - 1].count = o[i].start - o[i - 1].start;
    }
    o[g - 1].count = sr_size - o[g - 1].start;
    (o, ret_q)
}
