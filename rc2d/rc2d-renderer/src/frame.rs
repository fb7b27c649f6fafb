//! Frame orchestration without a device: resolve the settings, check the texture limit,
//! acquire working targets, then hand plan and targets to the recorder.

use render_api::GiSettings;

use crate::error::{GiError, Result};
use crate::graph::FramePlan;
use crate::resolve::{resolve, Resolved, SkipReason};
use crate::resources::{FrameTargets, TargetAllocator, TargetPool};

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No GPU work was recorded; the host color target is untouched.
    Skipped(SkipReason),
    Rendered(FramePlan),
}

/// Run one frame against `pool`.
///
/// A skipped or rejected frame allocates nothing and never calls `record`. Targets are
/// acquired only once the resolution is known to fit `max_texture_dim`.
pub fn run_frame<A: TargetAllocator>(
    pool: &mut TargetPool<A::Target>,
    alloc: &mut A,
    settings: Option<&GiSettings>,
    viewport: (u32, u32),
    max_texture_dim: u32,
    record: impl FnOnce(&FramePlan, &FrameTargets<A::Target>) -> Result<()>,
) -> Result<FrameOutcome> {
    let params = match resolve(settings, viewport)? {
        Resolved::Skip(reason) => {
            log::debug!("GI frame skipped: {:?}", reason);
            return Ok(FrameOutcome::Skipped(reason));
        }
        Resolved::Run(params) => params,
    };

    let res = params.resolution;
    if res.width > max_texture_dim || res.height > max_texture_dim {
        return Err(GiError::ResolutionTooLarge { width: res.width, height: res.height, limit: max_texture_dim });
    }

    let targets = pool.acquire(alloc, res)?;
    let plan = FramePlan::build(&params);
    record(&plan, targets)?;
    log::trace!(
        "GI frame encoded: {}x{}, {} cascades, {} flood steps",
        res.width,
        res.height,
        params.cascade_count,
        params.flood_steps
    );
    Ok(FrameOutcome::Rendered(plan))
}
