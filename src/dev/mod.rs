//! The device object and everything it owns directly: resource wrappers,
//! shaders, the pipeline state mirror, and the swap chain.

mod buffer;
mod constants;
mod device;
mod shader;
mod state;
mod state_cache;
mod surface;
mod swapchain;
mod texture;

pub use buffer::{IndexBuffer, VertexBuffer};
pub use device::Device;
pub use shader::{PixelShader, VertexDeclaration, VertexShader};
pub use state::StateBlock;
pub use surface::{Surface, SurfaceData};
pub use swapchain::SwapChain;
pub use texture::Texture;
