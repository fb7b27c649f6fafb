//! Radiance cascades GI settings snapshot. Owned by the host configuration system and
//! handed to the renderer once per frame; the renderer only reads it.

/// Settings default for `cascade_count`.
pub const DEFAULT_CASCADE_COUNT: i32 = 9;

/// A settings value together with the host's override state.
///
/// Values the host has not overridden resolve to a renderer-side fallback rather than
/// to `value` (see `rc2d_renderer::resolve`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Overridable<T> {
    pub value: T,
    pub overridden: bool,
}

impl<T: Copy> Overridable<T> {
    /// Not overridden: the renderer fallback applies.
    pub const fn inherit(value: T) -> Self {
        Self { value, overridden: false }
    }

    pub const fn overridden(value: T) -> Self {
        Self { value, overridden: true }
    }

    pub fn get_or(&self, fallback: T) -> T {
        if self.overridden { self.value } else { fallback }
    }
}

/// Per-frame GI settings. Colors are linear RGBA; `sun_color` is HDR and unclamped.
#[derive(Clone, Debug, PartialEq)]
pub struct GiSettings {
    pub is_active: bool,
    pub cascade_count: Overridable<i32>,
    /// Clamped to [0.1, 1] by the renderer.
    pub render_scale: Overridable<f32>,
    pub sky_radiance: bool,
    pub sky_color: [f32; 4],
    pub sun_color: [f32; 4],
    /// Radians, clamped to [0, 6.28] by the renderer.
    pub sun_angle: f32,
}

impl Default for GiSettings {
    fn default() -> Self {
        Self {
            is_active: false,
            cascade_count: Overridable::inherit(DEFAULT_CASCADE_COUNT),
            render_scale: Overridable::inherit(1.0),
            sky_radiance: false,
            sky_color: [0.2, 0.5, 1.0, 1.0],
            sun_color: [10.0, 7.0, 1.0, 1.0],
            sun_angle: 2.0,
        }
    }
}

impl GiSettings {
    /// Default settings with the pipeline switched on.
    pub fn active() -> Self {
        Self { is_active: true, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_volume() {
        let s = GiSettings::default();
        assert!(!s.is_active);
        assert_eq!(s.cascade_count.value, 9);
        assert!(!s.cascade_count.overridden);
        assert_eq!(s.render_scale.value, 1.0);
        assert!(!s.sky_radiance);
        assert_eq!(s.sky_color, [0.2, 0.5, 1.0, 1.0]);
        assert_eq!(s.sun_color, [10.0, 7.0, 1.0, 1.0]);
        assert_eq!(s.sun_angle, 2.0);
    }

    #[test]
    fn overridable_fallback() {
        assert_eq!(Overridable::inherit(9).get_or(6), 6);
        assert_eq!(Overridable::overridden(3).get_or(6), 3);
    }
}
