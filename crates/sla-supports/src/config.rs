//! Support generation configuration.
//!
//! All lengths are in millimeters and all angles in radians.
//!
//! # Example
//!
//! ```
//! use sla_supports::{PillarConnectionMode, SupportConfig};
//!
//! // Start from defaults and customize
//! let config = SupportConfig::default()
//!     .with_object_elevation(3.0)
//!     .with_connection_mode(PillarConnectionMode::Cross);
//! assert!(config.validate().is_ok());
//!
//! // Or use struct update syntax
//! let config = SupportConfig {
//!     head_back_radius_mm: 0.8,
//!     ..Default::default()
//! };
//! ```

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::error::{SupportError, SupportResult};

/// How neighbouring pillars are braced to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "config-serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PillarConnectionMode {
    /// Alternating bridges that zig-zag down between the two pillars.
    ZigZag,
    /// Zig-zag plus the opposite diagonal on every step (X bracing).
    Cross,
    /// Zig-zag for close pillars, X bracing once they are further apart
    /// than the base diameter.
    #[default]
    Dynamic,
}

/// Parameters controlling the generated support tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "config-serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SupportConfig {
    /// Radius of the pin sphere that touches the model.
    ///
    /// Default: `0.2`
    pub head_front_radius_mm: f64,

    /// How deep the pin sinks into the model surface.
    ///
    /// Default: `0.5`
    pub head_penetration_mm: f64,

    /// Radius of the back sphere where the pillar or bridge attaches.
    ///
    /// Default: `0.5`
    pub head_back_radius_mm: f64,

    /// Length of the shaft between the pin and the back sphere.
    ///
    /// Default: `1.0`
    pub head_width_mm: f64,

    /// Requested pillar radius. Clamped to the head back radius.
    ///
    /// Default: `0.5`
    pub pillar_radius_mm: f64,

    /// Radius of the conical foot on the print bed.
    ///
    /// Default: `2.0`
    pub base_radius_mm: f64,

    /// Height of the conical foot.
    ///
    /// Default: `1.0`
    pub base_height_mm: f64,

    /// Minimum angle between a bridge and the horizontal plane.
    ///
    /// Default: `pi/4`
    pub bridge_slope: f64,

    /// Maximum length of a bridge from a head to a pillar.
    ///
    /// Default: `10.0`
    pub max_bridge_length_mm: f64,

    /// Maximum horizontal distance between braced pillars.
    ///
    /// Default: `10.0`
    pub max_pillar_link_distance_mm: f64,

    /// Pillars taller than this need at least one link.
    ///
    /// Default: `15.0`
    pub max_solo_pillar_height_mm: f64,

    /// Pillars taller than this need at least two links.
    ///
    /// Default: `35.0`
    pub max_dual_pillar_height_mm: f64,

    /// Upper bound of links on a single pillar.
    ///
    /// Default: `3`
    pub pillar_cascade_neighbors: u32,

    /// Upper bound of bridges attached to a single pillar.
    ///
    /// Default: `3`
    pub max_bridges_on_pillar: u32,

    /// Points whose surface normal deviates from straight down by more
    /// than this angle get headless supports.
    ///
    /// Default: `150 degrees`
    pub normal_cutoff_angle: f64,

    /// Radius of the compact bridges used for headless points.
    ///
    /// Default: `0.4`
    pub headless_pillar_radius_mm: f64,

    /// Clearance kept between supports and the model in collision casts.
    ///
    /// Default: `0.1`
    pub safety_distance_mm: f64,

    /// Extra clearance between a pillar base and the model.
    ///
    /// Default: `0.5`
    pub pillar_base_safety_distance_mm: f64,

    /// Distance the model is lifted above the print bed.
    ///
    /// Default: `5.0`
    pub object_elevation_mm: f64,

    /// Bracing style for neighbouring pillars.
    ///
    /// Default: [`PillarConnectionMode::Dynamic`]
    pub pillar_connection_mode: PillarConnectionMode,

    /// Only support points that can reach the bed; heads blocked by the
    /// model are dropped instead of anchored on it.
    ///
    /// Default: `false`
    pub ground_facing_only: bool,

    /// Budget of candidate directions tried when a head does not fit
    /// along the surface normal.
    ///
    /// Default: `100`
    pub optimizer_max_iterations: u32,

    /// Number of segments used for circles in the output mesh.
    ///
    /// Default: `45`
    pub mesh_steps: u32,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            head_front_radius_mm: 0.2,
            head_penetration_mm: 0.5,
            head_back_radius_mm: 0.5,
            head_width_mm: 1.0,
            pillar_radius_mm: 0.5,
            base_radius_mm: 2.0,
            base_height_mm: 1.0,
            bridge_slope: FRAC_PI_4,
            max_bridge_length_mm: 10.0,
            max_pillar_link_distance_mm: 10.0,
            max_solo_pillar_height_mm: 15.0,
            max_dual_pillar_height_mm: 35.0,
            pillar_cascade_neighbors: 3,
            max_bridges_on_pillar: 3,
            normal_cutoff_angle: 150.0_f64.to_radians(),
            headless_pillar_radius_mm: 0.4,
            safety_distance_mm: 0.1,
            pillar_base_safety_distance_mm: 0.5,
            object_elevation_mm: 5.0,
            pillar_connection_mode: PillarConnectionMode::Dynamic,
            ground_facing_only: false,
            optimizer_max_iterations: 100,
            mesh_steps: 45,
        }
    }
}

impl SupportConfig {
    /// Coarse output mesh and a smaller search budget.
    pub fn for_fast_preview() -> Self {
        Self {
            optimizer_max_iterations: 20,
            mesh_steps: 12,
            ..Default::default()
        }
    }

    /// Thinner heads, denser bracing and a finer output mesh.
    pub fn for_fine_detail() -> Self {
        Self {
            head_front_radius_mm: 0.15,
            head_back_radius_mm: 0.4,
            head_width_mm: 0.8,
            pillar_radius_mm: 0.4,
            head_penetration_mm: 0.3,
            max_solo_pillar_height_mm: 10.0,
            max_dual_pillar_height_mm: 25.0,
            optimizer_max_iterations: 200,
            mesh_steps: 64,
            ..Default::default()
        }
    }

    /// Set the object elevation.
    pub fn with_object_elevation(mut self, elevation_mm: f64) -> Self {
        self.object_elevation_mm = elevation_mm;
        self
    }

    /// Set the pillar bracing mode.
    pub fn with_connection_mode(mut self, mode: PillarConnectionMode) -> Self {
        self.pillar_connection_mode = mode;
        self
    }

    /// Set the head dimensions.
    pub fn with_head(mut self, front_radius: f64, back_radius: f64, width: f64) -> Self {
        self.head_front_radius_mm = front_radius;
        self.head_back_radius_mm = back_radius;
        self.head_width_mm = width;
        self
    }

    /// Set the pillar base foot.
    pub fn with_base(mut self, radius: f64, height: f64) -> Self {
        self.base_radius_mm = radius;
        self.base_height_mm = height;
        self
    }

    /// Set the minimum bridge slope in radians.
    pub fn with_bridge_slope(mut self, slope: f64) -> Self {
        self.bridge_slope = slope;
        self
    }

    /// Set the maximum bridge length.
    pub fn with_max_bridge_length(mut self, length_mm: f64) -> Self {
        self.max_bridge_length_mm = length_mm;
        self
    }

    /// Set the collision safety distance.
    pub fn with_safety_distance(mut self, distance_mm: f64) -> Self {
        self.safety_distance_mm = distance_mm;
        self
    }

    /// Only support points that can reach the bed.
    pub fn with_ground_facing_only(mut self, enabled: bool) -> Self {
        self.ground_facing_only = enabled;
        self
    }

    /// Set the output circle resolution.
    pub fn with_mesh_steps(mut self, steps: u32) -> Self {
        self.mesh_steps = steps;
        self
    }

    /// Full length of a head from pin tip to the back of the back sphere.
    pub fn head_fullwidth(&self) -> f64 {
        2.0 * self.head_front_radius_mm + self.head_width_mm + 2.0 * self.head_back_radius_mm
            - self.head_penetration_mm
    }

    /// Check every value for range and consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SupportError::InvalidConfig`] naming the first offending
    /// parameter.
    pub fn validate(&self) -> SupportResult<()> {
        let non_negative = [
            ("head_front_radius_mm", self.head_front_radius_mm),
            ("head_penetration_mm", self.head_penetration_mm),
            ("head_back_radius_mm", self.head_back_radius_mm),
            ("head_width_mm", self.head_width_mm),
            ("pillar_radius_mm", self.pillar_radius_mm),
            ("base_radius_mm", self.base_radius_mm),
            ("base_height_mm", self.base_height_mm),
            ("max_bridge_length_mm", self.max_bridge_length_mm),
            ("max_pillar_link_distance_mm", self.max_pillar_link_distance_mm),
            ("max_solo_pillar_height_mm", self.max_solo_pillar_height_mm),
            ("max_dual_pillar_height_mm", self.max_dual_pillar_height_mm),
            ("headless_pillar_radius_mm", self.headless_pillar_radius_mm),
            ("safety_distance_mm", self.safety_distance_mm),
            (
                "pillar_base_safety_distance_mm",
                self.pillar_base_safety_distance_mm,
            ),
            ("object_elevation_mm", self.object_elevation_mm),
        ];

        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SupportError::invalid_param(
                    name,
                    value,
                    format!("{name} must be finite and non-negative"),
                ));
            }
        }

        if !(self.bridge_slope > 0.0 && self.bridge_slope < FRAC_PI_2) {
            return Err(SupportError::invalid_param(
                "bridge_slope",
                self.bridge_slope,
                "bridge_slope must lie in (0, pi/2)",
            ));
        }

        if !(0.0..=PI).contains(&self.normal_cutoff_angle) {
            return Err(SupportError::invalid_param(
                "normal_cutoff_angle",
                self.normal_cutoff_angle,
                "normal_cutoff_angle must lie in [0, pi]",
            ));
        }

        if self.max_dual_pillar_height_mm < self.max_solo_pillar_height_mm {
            return Err(SupportError::invalid_param(
                "max_dual_pillar_height_mm",
                self.max_dual_pillar_height_mm,
                "max_dual_pillar_height_mm must not be below max_solo_pillar_height_mm",
            ));
        }

        if self.mesh_steps < 3 {
            return Err(SupportError::invalid_param(
                "mesh_steps",
                self.mesh_steps,
                "mesh_steps must be at least 3",
            ));
        }

        Ok(())
    }

    /// Load configuration from a JSON string.
    #[cfg(feature = "config-serde")]
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize to a JSON string.
    #[cfg(feature = "config-serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
