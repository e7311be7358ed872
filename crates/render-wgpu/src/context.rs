use scenegraph_render::RenderError;

/// The wgpu instance, adapter, device and queue shared by every GPU object.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .finish_non_exhaustive()
    }
}

impl GpuContext {
    /// Acquire an adapter able to present to `surface` (if given) and open
    /// a device on it.
    pub fn new(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, RenderError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::AdapterNotFound)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("scenegraph_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Device(e.to_string()))?;

        tracing::info!(
            "GPU initialized with {} backend on {}",
            adapter.get_info().backend.to_str(),
            adapter.get_info().name
        );
        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// A context without a surface, for offscreen rendering and tests.
    pub fn headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self::new(instance, None)
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Run `f` inside a validation error scope and return the first
    /// validation error it raised, if any.
    pub fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::GpuContext;

    /// Headless context, or `None` on machines without any adapter.
    pub fn gpu() -> Option<GpuContext> {
        match GpuContext::headless() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!("skipping GPU test: {e}");
                None
            }
        }
    }
}
