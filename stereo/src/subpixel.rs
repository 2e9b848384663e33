//! Sub-pixel refinement of an integer disparity winner.

/// Result of one refinement run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefineOutcome {
    pub x: f32,
    pub cost: f32,
    pub rejected: bool,
}

/// Coordinate-to-cost memo scoped to one point's refinement.
///
/// Zero marks a slot as unknown, so a genuinely zero-cost coordinate is
/// simply re-evaluated; it stays a perfect match either way.
struct CostCache {
    entries: Vec<(f32, f32)>,
}

impl CostCache {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn get(&self, x: f32) -> f32 {
        self.entries
            .iter()
            .find(|(k, _)| *k == x)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    fn insert(&mut self, x: f32, cost: f32) {
        self.entries.push((x, cost));
    }
}

/// Derivative-free step-halving line search along x.
///
/// Starting from the integer winner `start_x` with cost `start_cost`, probe
/// `xc +- step` (step begins at half a pixel), move to a strictly improving
/// neighbor, otherwise halve the step; the cost of an abandoned position is
/// memoized. The estimate must stay strictly inside
/// `(start_x - 1, start_x + 1)`: touching either end rejects the point,
/// unless the landing is a perfect zero-cost match. The search is local and
/// can settle in a local minimum; within one pixel of a discrete winner the
/// cost profile of a textured patch is assumed unimodal.
pub(crate) fn refine_along_x<F>(
    start_x: f32,
    start_cost: f32,
    budget: usize,
    mut eval_cost: F,
) -> RefineOutcome
where
    F: FnMut(f32) -> f32,
{
    let mut xc = start_x;
    let mut vc = start_cost;
    let mut step = 0.5f32;
    let mut cache = CostCache::new();

    for _ in 0..budget {
        let x1 = xc - step;
        let x2 = xc + step;
        let mut v1 = cache.get(x1);
        if v1 == 0.0 {
            v1 = eval_cost(x1);
        }
        let mut v2 = cache.get(x2);
        if v2 == 0.0 {
            v2 = eval_cost(x2);
        }

        let previous_xc = xc;
        let previous_vc = vc;
        if v1 < vc && v1 < v2 {
            xc = x1;
            vc = v1;
        } else if v2 < vc && v2 < v1 {
            xc = x2;
            vc = v2;
        }

        if previous_xc == xc {
            step /= 2.0;
        } else {
            cache.insert(previous_xc, previous_vc);
        }

        if (xc <= start_x - 1.0 || xc >= start_x + 1.0) && vc != 0.0 {
            return RefineOutcome {
                x: xc,
                cost: vc,
                rejected: true,
            };
        }
    }

    RefineOutcome {
        x: xc,
        cost: vc,
        rejected: false,
    }
}
