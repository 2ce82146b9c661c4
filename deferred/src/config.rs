use serde::{Deserialize, Serialize};

use crate::binding_model::MaterialTextureType;
use crate::error::{RendererError, RendererResult};
use strum::EnumCount;

/// Fixed capacities and frame parameters of the renderer.
///
/// Capacities bound every descriptor pool and buffer the renderer creates;
/// registration that would exceed them fails instead of growing them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfiguration {
    pub max_uniform_buffers: u32,
    pub max_storage_buffers: u32,
    pub max_material_instances: u32,
    pub combined_image_sampler_headroom: u32,
    pub max_registered_models: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub fence_timeout_ns: u64,
    /// Per-vertex storage channels exposed in the heap set.
    pub vertex_channels: u32,
}

impl Default for RendererConfiguration {
    fn default() -> Self {
        Self {
            max_uniform_buffers: 5,
            max_storage_buffers: 30,
            max_material_instances: 30,
            combined_image_sampler_headroom: 10,
            max_registered_models: 3,
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            fence_timeout_ns: u64::MAX,
            vertex_channels: 4,
        }
    }
}

impl RendererConfiguration {
    pub fn max_combined_image_samplers(&self) -> u32 {
        self.max_material_instances
            .saturating_mul(MaterialTextureType::COUNT as u32)
            .saturating_add(self.combined_image_sampler_headroom)
    }

    pub fn validate(&self) -> RendererResult<()> {
        let capacities = [
            ("uniform buffers", self.max_uniform_buffers),
            ("storage buffers", self.max_storage_buffers),
            ("material instances", self.max_material_instances),
            ("registered models", self.max_registered_models),
        ];
        for (resource, capacity) in capacities {
            if capacity == 0 {
                return Err(RendererError::CapacityExceeded {
                    resource,
                    requested: 1,
                    capacity,
                });
            }
        }

        let derived = [
            (
                "combined image samplers",
                self.max_material_instances
                    .checked_mul(MaterialTextureType::COUNT as u32)
                    .and_then(|samplers| samplers.checked_add(self.combined_image_sampler_headroom)),
            ),
            ("descriptor sets", self.max_registered_models.checked_add(1)),
            (
                "storage buffers per model",
                self.vertex_channels.checked_add(4),
            ),
        ];
        for (resource, value) in derived {
            if value.is_none() {
                return Err(RendererError::Configuration(format!(
                    "{resource} overflow a 32-bit count"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_capacity_covers_every_texture_type() {
        let config = RendererConfiguration::default();
        assert_eq!(config.max_combined_image_samplers(), 30 * 5 + 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_toml_keys_use_defaults() {
        let config: RendererConfiguration = toml::from_str(
            r#"
            max_registered_models = 8
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_registered_models, 8);
        assert_eq!(config.max_storage_buffers, 30);
        approx::assert_relative_eq!(config.clear_color[2], 0.3);
        approx::assert_relative_eq!(config.clear_depth, 1.0);
    }

    #[test]
    fn ron_configuration_round_trips() {
        let config = RendererConfiguration {
            max_material_instances: 12,
            ..Default::default()
        };
        let text = ron::to_string(&config).unwrap();
        let parsed: RendererConfiguration = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let config = RendererConfiguration {
            max_registered_models: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RendererError::CapacityExceeded {
                resource: "registered models",
                ..
            })
        ));
    }

    #[test]
    fn overflowing_capacities_are_rejected() {
        let config = RendererConfiguration {
            max_material_instances: u32::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RendererError::Configuration(message)) if message.contains("combined image samplers")
        ));
        assert_eq!(config.max_combined_image_samplers(), u32::MAX);

        let config = RendererConfiguration {
            max_registered_models: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RendererError::Configuration(_))));

        let config = RendererConfiguration {
            combined_image_sampler_headroom: u32::MAX - 149,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(RendererError::Configuration(
                "combined image samplers overflow a 32-bit count".into()
            ))
        );
    }
}
