//! Control plane of a three-subpass deferred renderer: G-buffer store,
//! shading and tonemapping, recorded once per swapchain image and replayed
//! every frame.

pub mod attachment;
pub mod binding_model;
pub mod config;
mod error;
pub mod frame_targets;
pub mod fullscreen_quad;
pub mod material;
mod orchestrator;
pub mod pipelines;
pub mod providers;
pub mod render_graph;
pub mod sequencer;
pub mod teardown;
pub mod uniform_buffer;

pub use config::RendererConfiguration;
pub use error::{PresentationError, RendererError, RendererResult};
pub use orchestrator::{FrameOrchestrator, ModelId, RendererProviders, RendererState};
pub use providers::{
    Camera, LightSource, MaterialProvider, Model, PassShaders, Texture, TextureData,
    TextureProvider,
};
