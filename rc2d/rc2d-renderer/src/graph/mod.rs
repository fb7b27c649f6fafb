//! Frame plan: the ordered pass list of one GI frame, with every ping-pong buffer
//! choice made up front. Encoding replays the list through a [`PassEncoder`].

use crate::error::Result;
use crate::resolve::{jump_flood_step_size, FrameParams};

/// A working texture as named by the plan. Ping-pong pairs carry their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Color,
    Distance,
    Flood(usize),
    Cascade(usize),
    /// The host's color target.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassNode {
    /// Rasterize the scene into `Color`.
    SceneMask,
    /// Seed the flood buffer `dst` from the color alpha.
    ScreenUv { dst: usize },
    JumpFlood { step: u32, step_size: f32, src: usize, dst: usize },
    /// Resolve the flood buffer `src` into `Distance`.
    DistanceField { src: usize },
    /// Bind the frame-constant GI inputs. Records no GPU work of its own.
    CascadeGlobals,
    Cascade { level: u32, upper: usize, lower: usize },
    Merge { src: usize },
    Composite,
}

impl PassNode {
    /// Kernel label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            PassNode::SceneMask => "SceneMask",
            PassNode::ScreenUv { .. } => "ScreenUV",
            PassNode::JumpFlood { .. } => "JumpFlood",
            PassNode::DistanceField { .. } => "DistanceField",
            PassNode::CascadeGlobals => "CascadeGlobals",
            PassNode::Cascade { .. } => "CascadeGI",
            PassNode::Merge { .. } => "CascadeMerge",
            PassNode::Composite => "Composite",
        }
    }

    /// Textures this pass reads and writes.
    pub fn usage(&self) -> Vec<(Slot, ResourceUsage)> {
        use ResourceUsage::{Read, Write};
        match *self {
            PassNode::SceneMask => vec![(Slot::Color, Write)],
            PassNode::ScreenUv { dst } => vec![(Slot::Color, Read), (Slot::Flood(dst), Write)],
            PassNode::JumpFlood { src, dst, .. } => vec![(Slot::Flood(src), Read), (Slot::Flood(dst), Write)],
            PassNode::DistanceField { src } => vec![(Slot::Flood(src), Read), (Slot::Distance, Write)],
            PassNode::CascadeGlobals => vec![],
            PassNode::Cascade { upper, lower, .. } => vec![
                (Slot::Color, Read),
                (Slot::Distance, Read),
                (Slot::Cascade(upper), Read),
                (Slot::Cascade(lower), Write),
            ],
            PassNode::Merge { src } => vec![(Slot::Cascade(src), Read), (Slot::Color, Write)],
            PassNode::Composite => vec![(Slot::Color, Read), (Slot::Output, Write)],
        }
    }
}

/// `(src, dst)` flood buffers of jump-flood step `n`. The seed pass writes buffer 0.
pub fn flood_slots(step: u32) -> (usize, usize) {
    let src = (step & 1) as usize;
    (src, src ^ 1)
}

/// `(upper, lower)` cascade arrays of `level`: even levels write array 0, odd levels array 1.
pub fn cascade_slots(level: u32) -> (usize, usize) {
    let lower = (level & 1) as usize;
    (lower ^ 1, lower)
}

/// Records the GPU work of one pass node.
pub trait PassEncoder {
    fn encode_pass(&mut self, node: &PassNode, params: &FrameParams) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    params: FrameParams,
    passes: Vec<PassNode>,
}

impl FramePlan {
    pub fn build(params: &FrameParams) -> Self {
        let steps = params.flood_steps;
        let mut passes = Vec::with_capacity(steps as usize + params.cascade_count as usize + 6);
        passes.push(PassNode::SceneMask);
        passes.push(PassNode::ScreenUv { dst: 0 });
        for step in 0..steps {
            let (src, dst) = flood_slots(step);
            passes.push(PassNode::JumpFlood { step, step_size: jump_flood_step_size(step), src, dst });
        }
        // After `steps` swaps the latest result is in buffer `steps & 1`.
        passes.push(PassNode::DistanceField { src: (steps & 1) as usize });
        passes.push(PassNode::CascadeGlobals);
        for level in (0..params.cascade_count).rev() {
            let (upper, lower) = cascade_slots(level);
            passes.push(PassNode::Cascade { level, upper, lower });
        }
        passes.push(PassNode::Merge { src: cascade_slots(0).1 });
        passes.push(PassNode::Composite);
        Self { params: params.clone(), passes }
    }

    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    pub fn passes(&self) -> &[PassNode] {
        &self.passes
    }

    /// Replay the plan in order. The first failing pass aborts the frame.
    pub fn encode(&self, encoder: &mut dyn PassEncoder) -> Result<()> {
        for node in &self.passes {
            log::trace!("encoding {}", node.name());
            encoder.encode_pass(node, &self.params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GiError;
    use crate::kernels::KernelId;
    use crate::resolve::{resolve, Resolved};
    use render_api::{GiSettings, Overridable};

    fn params(count: i32, viewport: (u32, u32)) -> FrameParams {
        let s = GiSettings { cascade_count: Overridable::overridden(count), ..GiSettings::active() };
        match resolve(Some(&s), viewport) {
            Ok(Resolved::Run(p)) => p,
            other => panic!("expected a runnable frame, got {:?}", other),
        }
    }

    fn cascades(plan: &FramePlan) -> Vec<(u32, usize, usize)> {
        plan.passes()
            .iter()
            .filter_map(|p| match *p {
                PassNode::Cascade { level, upper, lower } => Some((level, upper, lower)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pass_order() {
        let p = params(3, (64, 32));
        let plan = FramePlan::build(&p);
        let names: Vec<_> = plan.passes().iter().map(|n| n.name()).collect();
        let mut expected = vec!["SceneMask", "ScreenUV"];
        expected.extend(std::iter::repeat("JumpFlood").take(p.flood_steps as usize));
        expected.extend(["DistanceField", "CascadeGlobals", "CascadeGI", "CascadeGI", "CascadeGI"]);
        expected.extend(["CascadeMerge", "Composite"]);
        assert_eq!(names, expected);
    }

    #[test]
    fn cascade_levels_descend_to_zero() {
        for count in 1..=12 {
            let plan = FramePlan::build(&params(count, (640, 480)));
            let levels: Vec<u32> = cascades(&plan).iter().map(|c| c.0).collect();
            let expected: Vec<u32> = (0..count as u32).rev().collect();
            assert_eq!(levels, expected);
        }
    }

    #[test]
    fn cascade_parity_alternates() {
        let plan = FramePlan::build(&params(6, (256, 256)));
        for (level, upper, lower) in cascades(&plan) {
            assert_ne!(upper, lower);
            assert_eq!(lower, (level % 2) as usize);
        }
        // Level 0 writes array 0 and reads array 1.
        assert_eq!(cascade_slots(0), (1, 0));
        assert_eq!(cascade_slots(1), (0, 1));
    }

    #[test]
    fn each_level_reads_what_the_previous_wrote() {
        let plan = FramePlan::build(&params(7, (512, 512)));
        let levels = cascades(&plan);
        for pair in levels.windows(2) {
            assert_eq!(pair[1].1, pair[0].2);
        }
    }

    #[test]
    fn single_cascade() {
        let plan = FramePlan::build(&params(1, (100, 100)));
        assert_eq!(cascades(&plan), vec![(0, 1, 0)]);
        assert!(plan.passes().contains(&PassNode::Merge { src: 0 }));
    }

    #[test]
    fn merge_reads_finest_level() {
        let plan = FramePlan::build(&params(5, (300, 200)));
        let last = *cascades(&plan).last().unwrap();
        assert_eq!(last.0, 0);
        let merge = plan.passes().iter().find(|p| matches!(p, PassNode::Merge { .. })).unwrap();
        assert_eq!(*merge, PassNode::Merge { src: last.2 });
    }

    #[test]
    fn no_pass_reads_what_it_writes() {
        for count in [1, 2, 6, 9] {
            let plan = FramePlan::build(&params(count, (1920, 1080)));
            for node in plan.passes() {
                let usage = node.usage();
                for (slot, u) in &usage {
                    if *u == ResourceUsage::Write {
                        assert!(
                            !usage.contains(&(*slot, ResourceUsage::Read)),
                            "{} reads and writes {:?}",
                            node.name(),
                            slot
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn flood_chain_ping_pongs() {
        let p = params(4, (1000, 300));
        let plan = FramePlan::build(&p);
        let mut latest = match plan.passes()[1] {
            PassNode::ScreenUv { dst } => dst,
            ref other => panic!("expected ScreenUV, got {:?}", other),
        };
        let mut step_count = 0;
        for node in plan.passes() {
            match *node {
                PassNode::JumpFlood { step, step_size, src, dst } => {
                    assert_eq!(step, step_count);
                    assert_eq!(step_size, 0.5f32.powi(step as i32 + 1));
                    assert_eq!(src, latest);
                    assert_ne!(src, dst);
                    latest = dst;
                    step_count += 1;
                }
                PassNode::DistanceField { src } => assert_eq!(src, latest),
                _ => {}
            }
        }
        assert_eq!(step_count, p.flood_steps);
    }

    #[test]
    fn build_is_deterministic() {
        let p = params(6, (800, 600));
        assert_eq!(FramePlan::build(&p), FramePlan::build(&p));
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<PassNode>,
        fail_on: Option<&'static str>,
    }

    impl PassEncoder for Recorder {
        fn encode_pass(&mut self, node: &PassNode, _params: &FrameParams) -> Result<()> {
            if self.fail_on == Some(node.name()) {
                return Err(GiError::Kernel { kernel: KernelId::CascadeGi, message: "dispatch failed".into() });
            }
            self.seen.push(node.clone());
            Ok(())
        }
    }

    #[test]
    fn encode_replays_plan() {
        let plan = FramePlan::build(&params(2, (128, 128)));
        let mut rec = Recorder::default();
        plan.encode(&mut rec).unwrap();
        assert_eq!(rec.seen, plan.passes());
    }

    #[test]
    fn failing_pass_aborts_frame() {
        let plan = FramePlan::build(&params(3, (128, 128)));
        let mut rec = Recorder { fail_on: Some("CascadeGI"), ..Default::default() };
        let err = plan.encode(&mut rec).unwrap_err();
        assert!(matches!(err, GiError::Kernel { kernel: KernelId::CascadeGi, .. }));
        assert_eq!(rec.seen.last(), Some(&PassNode::CascadeGlobals));
        assert!(!rec.seen.iter().any(|n| matches!(n, PassNode::Merge { .. } | PassNode::Composite)));
    }
}
