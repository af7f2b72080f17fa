// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu-backed graphics context.

GPU handles name `wgpu::Texture`s owned by the context.  Fences are queue submissions: each
[GraphicsContext::insert_fence] submits an empty batch, so the fence is ordered after every
command buffer submitted before it.  A submission is visible to the device as soon as `submit`
returns, which makes verification a bookkeeping step rather than a round-trip.

Contexts created with [WgpuContext::sharing_queue] submit to the same queue and share a command
buffer id.  Tokens from such contexts are already ordered by the queue, so waiting on them issues
nothing.  wgpu offers no way to import a foreign fence, so waiting on any other token drains the
device.

Software handles are heap buffers owned by the context.  Their names mean nothing outside this
process, so a [HandleKind::SharedMemory] handle from a `WgpuContext` can only be received by
another context in the same process.  Crossing a process boundary needs a context that backs
software handles with real shared memory.

Sizes are checked against the device's `max_texture_dimension_2d`; empty or larger surfaces fail
with [ContextError::UnsupportedSize].
*/

mod pixel_format;

use crate::context::{
    ContextError, GraphicsContext, HandleKind, HandleName, HandleRequest, TransferHandle,
};
use crate::sync_token::{CommandBufferNamespace, SyncToken};
use pixel_format::WgpuPixelFormat;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use wgpu::{Limits, PollType, Trace};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A [GraphicsContext] over a wgpu device.
///
/// Software handles it mints are process-local; see the module docs.
#[derive(Debug)]
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    context_id: u64,
    command_buffer_id: u64,
    next_serial: u64,
    release_count: u64,
    textures: HashMap<HandleName, wgpu::Texture>,
    //not shared memory; see the module docs
    local_bitmaps: HashMap<HandleName, Box<[u8]>>,
}

impl WgpuContext {
    /// Wraps an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuContext {
            device,
            queue,
            context_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            command_buffer_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            next_serial: 1,
            release_count: 0,
            textures: HashMap::new(),
            local_bitmaps: HashMap::new(),
        }
    }

    /// Requests a device from the default adapter.
    pub async fn request() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|_| ContextError::NoSuchAdapter)?;
        let mut limits = Limits::downlevel_webgl2_defaults();
        //webGL is quite serious about enforcing these, which
        //by default are rather small
        limits.max_texture_dimension_1d = 4096;
        limits.max_texture_dimension_2d = 4096;
        let descriptor = wgpu::DeviceDescriptor {
            label: wgpu::Label::from("surface_transfer"),
            required_features: Default::default(),
            required_limits: limits,
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        Ok(Self::new(device, queue))
    }

    /// A second context submitting to the same queue, e.g. for a peer in the same process.
    ///
    /// Handle names are not shared; each context releases only what it materialized.
    pub fn sharing_queue(&self) -> Self {
        WgpuContext {
            device: self.device.clone(),
            queue: self.queue.clone(),
            context_id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            command_buffer_id: self.command_buffer_id,
            next_serial: 1,
            release_count: self.release_count,
            textures: HashMap::new(),
            local_bitmaps: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The texture behind a GPU handle this context materialized.
    pub fn texture(&self, name: &HandleName) -> Result<&wgpu::Texture, ContextError> {
        self.textures
            .get(name)
            .ok_or(ContextError::UnknownHandle(*name))
    }

    fn check_size(&self, request: &HandleRequest) -> Result<(), ContextError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let fits = !request.size.is_empty()
            && request.size.width <= max
            && request.size.height <= max
            && request.size.byte_len(request.format).is_some();
        if fits {
            Ok(())
        } else {
            Err(ContextError::UnsupportedSize(request.size))
        }
    }

    fn next_name(&mut self) -> HandleName {
        let name = HandleName::from_serial(self.context_id, self.next_serial);
        self.next_serial += 1;
        name
    }
}

impl GraphicsContext for WgpuContext {
    fn materialize_handle(&mut self, request: &HandleRequest) -> Result<TransferHandle, ContextError> {
        self.check_size(request)?;
        let name = self.next_name();
        if request.is_software {
            let len = request
                .size
                .byte_len(request.format)
                .ok_or(ContextError::UnsupportedSize(request.size))?;
            let bytes = vec![0u8; len].into_boxed_slice();
            self.local_bitmaps.insert(name, bytes);
            return Ok(TransferHandle {
                kind: HandleKind::SharedMemory,
                name,
            });
        }
        let label = name.to_string();
        let descriptor = wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width: request.size.width,
                height: request.size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: request.format.wgpu_format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        };
        let texture = self.device.create_texture(&descriptor);
        self.textures.insert(name, texture);
        Ok(TransferHandle {
            kind: HandleKind::Gpu,
            name,
        })
    }

    fn insert_fence(&mut self) -> Result<SyncToken, ContextError> {
        let _submission = self.queue.submit(std::iter::empty());
        self.release_count += 1;
        Ok(SyncToken::new(
            CommandBufferNamespace::Gpu,
            self.command_buffer_id,
            self.release_count,
        ))
    }

    fn verify_tokens(&mut self, tokens: &[SyncToken]) -> Result<Vec<SyncToken>, ContextError> {
        Ok(tokens.iter().map(|t| t.into_verified()).collect())
    }

    fn wait_on_token(&mut self, token: &SyncToken) -> Result<(), ContextError> {
        if token.namespace == CommandBufferNamespace::Gpu
            && token.command_buffer_id == self.command_buffer_id
        {
            //same queue; submission order already covers it
            return Ok(());
        }
        if token.namespace == CommandBufferNamespace::Software {
            return Ok(());
        }
        logwise::trace_sync!(
            "draining device for foreign token {cb}:{release}",
            cb = token.command_buffer_id,
            release = token.release_count
        );
        self.device.poll(PollType::Wait)?;
        Ok(())
    }

    fn release_handle(&mut self, handle: &TransferHandle) {
        match handle.kind {
            HandleKind::Gpu => match self.textures.remove(&handle.name) {
                Some(texture) => texture.destroy(),
                None => {
                    logwise::warn_sync!(
                        "release of unknown texture {name}",
                        name = logwise::privacy::LogIt(&handle.name)
                    );
                }
            },
            HandleKind::SharedMemory => {
                if self.local_bitmaps.remove(&handle.name).is_none() {
                    logwise::warn_sync!(
                        "release of unknown bitmap {name}",
                        name = logwise::privacy::LogIt(&handle.name)
                    );
                }
            }
        }
    }
}
