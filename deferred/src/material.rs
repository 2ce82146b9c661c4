//! A [`MaterialProvider`] that loads material textures through a
//! [`TextureProvider`] and substitutes a fallback texture for anything that
//! can't be loaded.

use std::path::PathBuf;

use dgpu::{
    DescriptorImage, Device, Format, GpuResult, Sampler, ShaderModule, ShaderModuleDescription,
};
use log::{debug, info, warn};
use strum::{EnumCount, IntoEnumIterator};

use crate::binding_model::MaterialTextureType;
use crate::pipelines::PassKind;
use crate::providers::{MaterialProvider, PassShaders, Texture, TextureProvider};
use crate::uniform_buffer::MaterialConstants;

/// SPIR-V words of one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Produces shader code for a pass, compiling it if needed. Called again
/// for every pass on each shader reload.
pub type ShaderSource = Box<dyn FnMut(PassKind) -> GpuResult<PassShaderCode>>;

#[derive(Clone, Debug, Default)]
pub struct MaterialInstanceBuilder {
    pub name: String,
    pub directory: PathBuf,
    /// Texture file names relative to `directory`. An empty name means the
    /// material has no texture of that type.
    pub textures: Vec<(MaterialTextureType, String)>,
    pub constants: MaterialConstants,
}

impl MaterialInstanceBuilder {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            ..Default::default()
        }
    }

    pub fn texture(mut self, ty: MaterialTextureType, file_name: impl Into<String>) -> Self {
        self.textures.push((ty, file_name.into()));
        self
    }

    pub fn constants(mut self, constants: MaterialConstants) -> Self {
        self.constants = constants;
        self
    }
}

#[derive(Clone, Debug)]
struct MaterialInstance {
    name: String,
    /// `None` slots use the fallback texture.
    textures: [Option<Texture>; MaterialTextureType::COUNT],
    constants: MaterialConstants,
}

fn texture_format(ty: MaterialTextureType) -> Format {
    match ty {
        MaterialTextureType::Diffuse
        | MaterialTextureType::Ambient
        | MaterialTextureType::Specular => Format::Rgba8Srgb,
        MaterialTextureType::Normal | MaterialTextureType::Roughness => Format::Rgba8Unorm,
    }
}

pub struct MaterialLibrary<T: TextureProvider> {
    textures: T,
    shader_source: ShaderSource,
    sampler: Sampler,
    fallback: Option<Texture>,
    instances: Vec<MaterialInstance>,
    shaders: [Option<PassShaders>; PassKind::COUNT],
}

impl<T: TextureProvider> MaterialLibrary<T> {
    /// `sampler` is used for every texture the library loads.
    pub fn new(textures: T, sampler: Sampler, shader_source: ShaderSource) -> Self {
        Self {
            textures,
            shader_source,
            sampler,
            fallback: None,
            instances: vec![],
            shaders: [None; PassKind::COUNT],
        }
    }

    pub fn texture_provider(&self) -> &T {
        &self.textures
    }

    pub fn texture_provider_mut(&mut self) -> &mut T {
        &mut self.textures
    }

    pub fn fallback_texture(&self) -> Option<Texture> {
        self.fallback
    }

    pub fn instance_name(&self, index: u32) -> Option<&str> {
        self.instances
            .get(index as usize)
            .map(|instance| instance.name.as_str())
    }

    /// Loads the instance's textures and returns its index. Textures that are
    /// unnamed, missing or fail to load fall back to the fallback texture.
    pub fn add_instance(&mut self, device: &Device, builder: MaterialInstanceBuilder) -> u32 {
        let mut textures = [None; MaterialTextureType::COUNT];
        for (ty, file_name) in &builder.textures {
            if file_name.is_empty() {
                continue;
            }
            let path = builder.directory.join(file_name);
            match self
                .textures
                .load_texture_2d(device, &path, texture_format(*ty), self.sampler)
            {
                Ok(Some(texture)) => {
                    debug!("Loaded {:?} texture {}", ty, path.display());
                    if let Some(previous) = textures[*ty as usize].replace(texture) {
                        self.release_texture(device, previous);
                    }
                }
                Ok(None) => warn!(
                    "Texture {} of material {} does not exist, using the fallback texture",
                    path.display(),
                    builder.name
                ),
                Err(e) => warn!(
                    "Failed to load texture {} of material {}: {e}, using the fallback texture",
                    path.display(),
                    builder.name
                ),
            }
        }
        for ty in MaterialTextureType::iter() {
            if textures[ty as usize].is_none() {
                debug!("Material {} has no {:?} texture", builder.name, ty);
            }
        }

        self.instances.push(MaterialInstance {
            name: builder.name,
            textures,
            constants: builder.constants,
        });
        self.instances.len() as u32 - 1
    }

    fn release_texture(&mut self, device: &Device, texture: Texture) {
        if let Err(e) = self.textures.destroy_texture(device, texture) {
            warn!("Failed to destroy texture {:?}: {e}", texture.image);
        }
    }

    fn compile(&mut self, device: &Device, pass: PassKind) -> GpuResult<PassShaders> {
        let code = (self.shader_source)(pass)?;
        let vertex = device.create_shader_module(&ShaderModuleDescription {
            label: Some(pass.label()),
            source: &code.vertex,
        })?;
        let fragment = match device.create_shader_module(&ShaderModuleDescription {
            label: Some(pass.label()),
            source: &code.fragment,
        }) {
            Ok(fragment) => fragment,
            Err(e) => {
                device.destroy_shader_module(vertex)?;
                return Err(e);
            }
        };
        Ok(PassShaders { vertex, fragment })
    }

    fn destroy_shaders(
        device: &Device,
        shaders: impl IntoIterator<Item = Option<PassShaders>>,
    ) -> GpuResult<()> {
        for shaders in shaders.into_iter().flatten() {
            destroy_modules(device, [shaders.vertex, shaders.fragment])?;
        }
        Ok(())
    }
}

fn destroy_modules(device: &Device, modules: [ShaderModule; 2]) -> GpuResult<()> {
    for module in modules {
        device.destroy_shader_module(module)?;
    }
    Ok(())
}

impl<T: TextureProvider> MaterialProvider for MaterialLibrary<T> {
    fn material_constants(&self) -> Vec<MaterialConstants> {
        self.instances
            .iter()
            .map(|instance| instance.constants)
            .collect()
    }

    fn material_instances_count(&self) -> u32 {
        self.instances.len() as u32
    }

    fn descriptor_image_infos(&self, ty: MaterialTextureType) -> Vec<DescriptorImage> {
        self.instances
            .iter()
            .filter_map(|instance| instance.textures[ty as usize].or(self.fallback))
            .map(|texture| texture.descriptor_image())
            .collect()
    }

    fn set_fallback_texture(&mut self, texture: Texture) {
        self.fallback = Some(texture);
    }

    fn pass_shaders(&mut self, device: &Device, pass: PassKind) -> GpuResult<PassShaders> {
        if let Some(shaders) = self.shaders[pass as usize] {
            return Ok(shaders);
        }
        let shaders = self.compile(device, pass)?;
        self.shaders[pass as usize] = Some(shaders);
        Ok(shaders)
    }

    /// Recompiles every pass. On failure the previous modules are kept.
    fn reload_all_shaders(&mut self, device: &Device) -> GpuResult<()> {
        let mut reloaded = [None; PassKind::COUNT];
        for pass in PassKind::iter() {
            match self.compile(device, pass) {
                Ok(shaders) => reloaded[pass as usize] = Some(shaders),
                Err(e) => {
                    Self::destroy_shaders(device, reloaded)?;
                    return Err(e);
                }
            }
        }
        let previous = std::mem::replace(&mut self.shaders, reloaded);
        Self::destroy_shaders(device, previous)?;
        info!("Reloaded shaders of {} passes", PassKind::COUNT);
        Ok(())
    }

    fn destroy(&mut self, device: &Device) -> GpuResult<()> {
        let shaders = std::mem::replace(&mut self.shaders, [None; PassKind::COUNT]);
        Self::destroy_shaders(device, shaders)?;
        let textures = self
            .instances
            .drain(..)
            .flat_map(|instance| instance.textures)
            .flatten()
            .collect::<Vec<_>>();
        for texture in textures {
            self.textures.destroy_texture(device, texture)?;
        }
        Ok(())
    }
}
