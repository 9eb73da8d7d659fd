/// Delay policy applied to every scheduling decision.
///
/// During warm-up every delay collapses to zero so the initial composition
/// drains as fast as the queue allows; afterwards fast-forward pins delays to
/// 1 ms, otherwise the requested delay passes through. Must be evaluated at
/// each scheduling point since the warm-up flag flips mid-run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    pub warming_up: bool,
    pub fast_forward: bool,
}

impl Pacing {
    pub fn delay(self, requested_ms: i64) -> i64 {
        if self.warming_up {
            0
        } else if self.fast_forward {
            1
        } else {
            requested_ms
        }
    }
}
