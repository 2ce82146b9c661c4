use dgpu::GpuError;
use thiserror::Error;

use crate::render_graph::RenderGraphError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationError {
    #[error("the swapchain is out of date and must be recreated")]
    OutOfDate,
    #[error("the swapchain no longer matches the surface")]
    Suboptimal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RendererError {
    #[error("failed to create {object}: {source}")]
    Construction {
        object: &'static str,
        #[source]
        source: GpuError,
    },
    #[error("presentation failed: {0}")]
    Presentation(#[from] PresentationError),
    #[error("{resource}: {requested} requested, but only {capacity} available")]
    CapacityExceeded {
        resource: &'static str,
        requested: u32,
        capacity: u32,
    },
    #[error("invalid renderer configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    RenderGraph(#[from] RenderGraphError),
    #[error("cannot {operation} while the renderer is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

pub type RendererResult<T> = Result<T, RendererError>;

impl RendererError {
    /// Recoverable errors are cleared by recreating the swapchain and its
    /// dependent objects.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RendererError::Presentation(_))
    }

    /// Maps swapchain results to [`RendererError::Presentation`], keeping any
    /// other error as is.
    pub fn from_swapchain(error: GpuError) -> Self {
        match error {
            GpuError::SwapchainOutOfDate => PresentationError::OutOfDate.into(),
            GpuError::SwapchainSuboptimal => PresentationError::Suboptimal.into(),
            other => other.into(),
        }
    }
}

/// Attaches the name of the object being created to a GPU error.
pub(crate) trait ConstructionContext<T> {
    fn creating(self, object: &'static str) -> RendererResult<T>;
}

impl<T> ConstructionContext<T> for Result<T, GpuError> {
    fn creating(self, object: &'static str) -> RendererResult<T> {
        self.map_err(|source| RendererError::Construction { object, source })
    }
}
