//! Frame settings resolver: turns the host's settings snapshot and viewport into the
//! frame-constant parameters every pass reads.

use render_api::GiSettings;

use crate::error::{GiError, Result};

/// Cascade count used when the host has not overridden `cascade_count`.
pub const FALLBACK_CASCADE_COUNT: u32 = 6;
/// Upper clamp for the cascade count; `2^count` is the resolution granularity.
pub const MAX_CASCADE_COUNT: u32 = 12;
pub const MIN_RENDER_SCALE: f32 = 0.1;
pub const MAX_RENDER_SCALE: f32 = 1.0;
pub const MAX_SUN_ANGLE: f32 = 6.28;

/// Working resolution of every GI texture. Both sides are non-zero multiples of
/// `2^cascade_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameResolution {
    pub width: u32,
    pub height: u32,
}

impl FrameResolution {
    /// Scale the viewport and round each side up to a multiple of `2^cascade_count`.
    /// Returns `Ok(None)` for an empty viewport, and `ResolutionTooLarge` when a rounded
    /// side does not fit in a `u32`.
    pub fn from_viewport(viewport: (u32, u32), render_scale: f32, cascade_count: u32) -> Result<Option<Self>> {
        let (w, h) = viewport;
        if w == 0 || h == 0 {
            return Ok(None);
        }
        let granule = 1u32 << cascade_count;
        let scale = |side: u32| ((side as f32) * render_scale).ceil().max(1.0) as u32;
        let (sw, sh) = (scale(w), scale(h));
        let round = |side: u32| side.div_ceil(granule).checked_mul(granule);
        match (round(sw), round(sh)) {
            (Some(width), Some(height)) => Ok(Some(Self { width, height })),
            _ => Err(GiError::ResolutionTooLarge { width: sw, height: sh, limit: u32::MAX / granule * granule }),
        }
    }

    pub fn max_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// `resolution / max(width, height)`: maps UV into a space where the longest side is 1.
    pub fn aspect(&self) -> [f32; 2] {
        let m = self.max_side() as f32;
        [self.width as f32 / m, self.height as f32 / m]
    }

    /// Number of 8x8 workgroups covering the frame.
    pub fn tiles(&self) -> (u32, u32) {
        (self.width.div_ceil(TILE_SIZE), self.height.div_ceil(TILE_SIZE))
    }

    pub fn as_f32(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// Compute tile edge, matches `@workgroup_size(8, 8, 1)` in the WGSL kernels.
pub const TILE_SIZE: u32 = 8;

/// `ceil(log2(max_side))`, exact in integers. Zero for a 1-pixel frame.
pub fn jump_flood_steps(max_side: u32) -> u32 {
    if max_side <= 1 {
        return 0;
    }
    u32::BITS - (max_side - 1).leading_zeros()
}

/// Step size of flood iteration `n`, as a fraction of the longest side: `0.5^(n+1)`.
pub fn jump_flood_step_size(n: u32) -> f32 {
    0.5f32.powi(n as i32 + 1)
}

/// Everything the passes need for one frame. Built once, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameParams {
    pub cascade_count: u32,
    pub render_scale: f32,
    pub resolution: FrameResolution,
    /// Shared by the flood and GI kernels.
    pub aspect: [f32; 2],
    pub flood_steps: u32,
    pub sky_radiance: bool,
    pub sky_color: [f32; 4],
    pub sun_color: [f32; 4],
    pub sun_angle: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    EmptyViewport,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Skip(SkipReason),
    Run(FrameParams),
}

/// Resolve the settings snapshot for this frame.
///
/// A missing snapshot is a host misconfiguration and fails before any GPU work.
/// An inactive snapshot or an empty viewport skip the frame.
pub fn resolve(settings: Option<&GiSettings>, viewport: (u32, u32)) -> Result<Resolved> {
    let settings = settings.ok_or(GiError::MissingSettings)?;
    if !settings.is_active {
        return Ok(Resolved::Skip(SkipReason::Inactive));
    }

    let requested = settings.cascade_count.get_or(FALLBACK_CASCADE_COUNT as i32);
    let cascade_count = requested.clamp(1, MAX_CASCADE_COUNT as i32) as u32;
    if cascade_count as i32 != requested {
        log::warn!("cascade count {} clamped to {}", requested, cascade_count);
    }

    let requested_scale = settings.render_scale.get_or(MAX_RENDER_SCALE);
    let render_scale = if requested_scale.is_nan() {
        MAX_RENDER_SCALE
    } else {
        requested_scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE)
    };
    if render_scale != requested_scale {
        log::warn!("render scale {} clamped to {}", requested_scale, render_scale);
    }

    let sun_angle = if settings.sun_angle.is_nan() { 0.0 } else { settings.sun_angle.clamp(0.0, MAX_SUN_ANGLE) };
    if sun_angle != settings.sun_angle {
        log::warn!("sun angle {} clamped to {}", settings.sun_angle, sun_angle);
    }

    let Some(resolution) = FrameResolution::from_viewport(viewport, render_scale, cascade_count)? else {
        return Ok(Resolved::Skip(SkipReason::EmptyViewport));
    };

    Ok(Resolved::Run(FrameParams {
        cascade_count,
        render_scale,
        resolution,
        aspect: resolution.aspect(),
        flood_steps: jump_flood_steps(resolution.max_side()),
        sky_radiance: settings.sky_radiance,
        sky_color: settings.sky_color,
        sun_color: settings.sun_color,
        sun_angle,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_api::Overridable;

    fn run(settings: &GiSettings, viewport: (u32, u32)) -> FrameParams {
        match resolve(Some(settings), viewport) {
            Ok(Resolved::Run(p)) => p,
            other => panic!("expected a runnable frame, got {:?}", other),
        }
    }

    fn with_count(count: i32) -> GiSettings {
        GiSettings { cascade_count: Overridable::overridden(count), ..GiSettings::active() }
    }

    #[test]
    fn missing_settings_is_fatal() {
        assert!(matches!(resolve(None, (800, 600)), Err(GiError::MissingSettings)));
    }

    #[test]
    fn inactive_skips() {
        let s = GiSettings::default();
        assert_eq!(resolve(Some(&s), (800, 600)).unwrap(), Resolved::Skip(SkipReason::Inactive));
    }

    #[test]
    fn empty_viewport_skips() {
        let s = GiSettings::active();
        assert_eq!(resolve(Some(&s), (0, 600)).unwrap(), Resolved::Skip(SkipReason::EmptyViewport));
        assert_eq!(resolve(Some(&s), (800, 0)).unwrap(), Resolved::Skip(SkipReason::EmptyViewport));
    }

    #[test]
    fn unoverridden_count_uses_fallback() {
        let p = run(&GiSettings::active(), (800, 600));
        assert_eq!(p.cascade_count, FALLBACK_CASCADE_COUNT);
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(run(&with_count(0), (64, 64)).cascade_count, 1);
        assert_eq!(run(&with_count(-3), (64, 64)).cascade_count, 1);
        assert_eq!(run(&with_count(40), (64, 64)).cascade_count, MAX_CASCADE_COUNT);
        assert_eq!(run(&with_count(9), (64, 64)).cascade_count, 9);
    }

    #[test]
    fn render_scale_and_sun_are_clamped() {
        let s = GiSettings {
            render_scale: Overridable::overridden(0.01),
            sun_angle: 9.0,
            ..GiSettings::active()
        };
        let p = run(&s, (1000, 1000));
        assert_eq!(p.render_scale, MIN_RENDER_SCALE);
        assert_eq!(p.sun_angle, MAX_SUN_ANGLE);
        // 1000 * 0.1 = 100 -> next multiple of 64
        assert_eq!(p.resolution, FrameResolution { width: 128, height: 128 });
    }

    #[test]
    fn unoverridden_scale_is_full_resolution() {
        let s = GiSettings { render_scale: Overridable::inherit(0.25), ..GiSettings::active() };
        assert_eq!(run(&s, (640, 640)).render_scale, 1.0);
    }

    #[test]
    fn odd_resolution_rounds_up_to_granule() {
        let p = run(&with_count(6), (511, 511));
        assert_eq!(p.resolution, FrameResolution { width: 512, height: 512 });
        let p = run(&with_count(6), (513, 300));
        assert_eq!(p.resolution, FrameResolution { width: 576, height: 320 });
    }

    #[test]
    fn resolution_divisible_and_not_smaller() {
        for count in 1..=MAX_CASCADE_COUNT {
            for &(w, h) in &[(1, 1), (7, 3), (511, 511), (800, 600), (1920, 1080), (333, 4097)] {
                for &scale in &[0.1f32, 0.37, 0.5, 1.0] {
                    let r = FrameResolution::from_viewport((w, h), scale, count).unwrap().unwrap();
                    let granule = 1u32 << count;
                    assert!(r.width > 0 && r.height > 0);
                    assert_eq!(r.width % granule, 0);
                    assert_eq!(r.height % granule, 0);
                    assert!(r.width as f32 >= w as f32 * scale);
                    assert!(r.height as f32 >= h as f32 * scale);
                }
            }
        }
    }

    #[test]
    fn oversized_viewport_is_an_error() {
        let res = resolve(Some(&GiSettings::active()), (u32::MAX, 16));
        assert!(matches!(res, Err(GiError::ResolutionTooLarge { width: u32::MAX, height: 16, .. })));
        let res = FrameResolution::from_viewport((16, u32::MAX - 3), 1.0, 4);
        assert!(matches!(res, Err(GiError::ResolutionTooLarge { .. })));
        let fits = FrameResolution::from_viewport((1 << 20, 1), 1.0, 12).unwrap();
        assert_eq!(fits, Some(FrameResolution { width: 1 << 20, height: 1 << 12 }));
    }

    #[test]
    fn flood_steps_match_log2() {
        assert_eq!(jump_flood_steps(1), 0);
        assert_eq!(jump_flood_steps(2), 1);
        assert_eq!(jump_flood_steps(3), 2);
        assert_eq!(jump_flood_steps(512), 9);
        assert_eq!(jump_flood_steps(513), 10);
        assert_eq!(jump_flood_steps(1920), 11);
    }

    #[test]
    fn flood_steps_monotonic() {
        let mut prev = 0;
        for side in 1..5000 {
            let steps = jump_flood_steps(side);
            assert!(steps >= prev);
            prev = steps;
        }
    }

    #[test]
    fn flood_step_sizes_halve() {
        assert_eq!(jump_flood_step_size(0), 0.5);
        assert_eq!(jump_flood_step_size(1), 0.25);
        assert_eq!(jump_flood_step_size(9), 1.0 / 1024.0);
    }

    #[test]
    fn aspect_uses_longest_side() {
        let p = run(&with_count(2), (800, 400));
        assert_eq!(p.resolution, FrameResolution { width: 800, height: 400 });
        assert_eq!(p.aspect, [1.0, 0.5]);
        assert_eq!(p.flood_steps, 10);
        assert_eq!(p.resolution.tiles(), (100, 50));
    }
}
