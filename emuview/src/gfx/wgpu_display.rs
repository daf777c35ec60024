use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, error, info, trace, warn};
use winit::window::Window as PlatformWindow;

use super::renderer::{DisplayError, Drawable, GpuDisplay, PixelFormat};
use super::support::{ContextAttributes, DriverQuery, ProcAddress};
use super::task::RendererCommands;
use crate::base::window::WindowId;
use crate::framework::util::HashMap;

struct WindowSurface {
    window: Arc<PlatformWindow>,
    surface: wgpu::Surface<'static>,
    config: Option<wgpu::SurfaceConfiguration>,
    drawable: Option<Drawable>,
    configured: bool,
}

/// Adapter facts exposed through the driver capability queries.
struct AdapterDriver {
    info: wgpu::AdapterInfo,
    downlevel: wgpu::DownlevelCapabilities,
    limits: wgpu::Limits,
    features: wgpu::Features,
}

impl AdapterDriver {
    fn new(adapter: &wgpu::Adapter) -> Self {
        Self {
            info: adapter.get_info(),
            downlevel: adapter.get_downlevel_capabilities(),
            limits: adapter.limits(),
            features: adapter.features(),
        }
    }

    fn is_full_profile(&self) -> bool {
        self.downlevel.is_webgpu_compliant()
    }

    fn has_flag(&self, flag: wgpu::DownlevelFlags) -> bool {
        self.downlevel.flags.contains(flag)
    }
}

impl DriverQuery for AdapterDriver {
    fn version(&self) -> String {
        let version = if self.is_full_profile() { "4.6" } else { "3.0" };
        format!("{} wgpu {:?}", version, self.info.backend)
    }

    fn renderer_name(&self) -> String {
        format!("{} ({})", self.info.name, self.info.driver)
    }

    fn indexed_extensions(&self) -> Vec<String> {
        let mut extensions = vec!["GL_ARB_texture_storage"];
        if self.has_flag(wgpu::DownlevelFlags::ANISOTROPIC_FILTERING) {
            extensions.push("GL_EXT_texture_filter_anisotropic");
        }
        if self.has_flag(
            wgpu::DownlevelFlags::NON_POWER_OF_TWO_MIPMAPPED_TEXTURES,
        ) {
            extensions.push("GL_ARB_texture_non_power_of_two");
        }
        if self
            .features
            .contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS)
        {
            extensions.push("GL_ARB_buffer_storage");
        }
        if cfg!(debug_assertions) {
            extensions.push("GL_KHR_debug");
        }
        extensions.push("GL_ARB_framebuffer_object");
        extensions.into_iter().map(String::from).collect()
    }

    fn extension_string(&self) -> String {
        let mut extensions = self.indexed_extensions();
        extensions.push("GL_EXT_texture_format_BGRA8888".to_string());
        extensions.join(" ")
    }

    fn display_extensions(&self) -> String {
        if self.info.backend == wgpu::Backend::Gl {
            "EGL_KHR_fence_sync EGL_KHR_wait_sync".to_string()
        } else {
            String::new()
        }
    }

    fn max_texture_size(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    fn max_anisotropy(&self) -> f32 {
        if self.has_flag(wgpu::DownlevelFlags::ANISOTROPIC_FILTERING) {
            16.0
        } else {
            0.0
        }
    }

    // wgpu does not hand out raw entry points.
    fn proc_address(&self, _name: &str) -> Option<ProcAddress> {
        None
    }
}

/// [`GpuDisplay`] backed by one wgpu device shared by every window.
///
/// Platform windows are registered on the event loop thread, which also
/// creates their surfaces. Drawables are configured surfaces.
pub struct WgpuDisplay {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    driver: AdapterDriver,
    windows: Mutex<HashMap<WindowId, WindowSurface>>,
    next_drawable: AtomicU64,
}

impl WgpuDisplay {
    /// Opens the device against the surface of the first window.
    pub fn new(
        id: WindowId,
        window: Arc<PlatformWindow>,
    ) -> Result<Self, DisplayError> {
        let instance =
            wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .map_err(|err| DisplayError::Surface(err.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            },
        ))
        .map_err(|_| DisplayError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("emuview-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
            },
        ))
        .map_err(|err| DisplayError::Surface(err.to_string()))?;

        let driver = AdapterDriver::new(&adapter);
        info!(
            "using adapter {} on {:?}",
            driver.info.name, driver.info.backend
        );

        let display = Self {
            instance,
            adapter,
            device,
            queue,
            driver,
            windows: Mutex::new(HashMap::default()),
            next_drawable: AtomicU64::new(1),
        };
        display.windows().insert(
            id,
            WindowSurface {
                window,
                surface,
                config: None,
                drawable: None,
                configured: false,
            },
        );
        Ok(display)
    }

    pub fn register_window(
        &self,
        id: WindowId,
        window: Arc<PlatformWindow>,
    ) -> Result<(), DisplayError> {
        let surface = self
            .instance
            .create_surface(window.clone())
            .map_err(|err| DisplayError::Surface(err.to_string()))?;

        self.windows().insert(
            id,
            WindowSurface {
                window,
                surface,
                config: None,
                drawable: None,
                configured: false,
            },
        );
        Ok(())
    }

    pub fn unregister_window(&self, id: WindowId) {
        if self.windows().remove(&id).is_some() {
            debug!("unregistered window:{}", id.0);
        }
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<WindowId, WindowSurface>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_drawable(
        &self,
        drawable: Drawable,
        f: impl FnOnce(&wgpu::Device, &mut WindowSurface),
    ) {
        let mut windows = self.windows();
        let Some(entry) =
            windows.values_mut().find(|w| w.drawable == Some(drawable))
        else {
            warn!("{}", DisplayError::UnknownDrawable(drawable.id()));
            return;
        };
        f(&self.device, entry);
    }
}

impl GpuDisplay for WgpuDisplay {
    fn driver(&self) -> &dyn DriverQuery {
        &self.driver
    }

    fn make_context(
        &self,
        attrs: ContextAttributes,
        format: PixelFormat,
    ) -> Result<(), DisplayError> {
        if attrs.major >= 3 && !self.driver.is_full_profile() {
            return Err(DisplayError::UnsupportedContext {
                major: attrs.major,
                minor: attrs.minor,
            });
        }

        debug!(
            "{:?} context format:{:?} debug:{}",
            attrs.api, format, attrs.debug
        );
        Ok(())
    }

    fn make_drawable(
        &self,
        window: WindowId,
        format: PixelFormat,
        size: [u32; 2],
    ) -> Result<Drawable, DisplayError> {
        let mut windows = self.windows();
        let entry = windows
            .get_mut(&window)
            .ok_or(DisplayError::UnknownWindow(window))?;

        let caps = entry.surface.get_capabilities(&self.adapter);
        let texture_format = choose_surface_format(&caps.formats, format)
            .ok_or_else(|| {
                DisplayError::Surface("no supported formats".to_string())
            })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size[0].max(1),
            height: size[1].max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        entry.surface.configure(&self.device, &config);

        let raw = self.next_drawable.fetch_add(1, Ordering::Relaxed);
        let drawable =
            Drawable::new(raw).ok_or(DisplayError::UnknownDrawable(raw))?;
        entry.config = Some(config);
        entry.drawable = Some(drawable);
        entry.configured = true;
        Ok(drawable)
    }

    fn destroy_drawable(&self, drawable: Drawable) {
        self.with_drawable(drawable, |_, entry| {
            entry.drawable = None;
            entry.config = None;
            entry.configured = false;
        });
    }

    fn resize_drawable(&self, drawable: Drawable, size: [u32; 2]) {
        self.with_drawable(drawable, |device, entry| {
            let Some(config) = entry.config.as_mut() else {
                return;
            };
            config.width = size[0].max(1);
            config.height = size[1].max(1);
            if entry.configured {
                entry.surface.configure(device, config);
            }
        });
    }

    fn free_caches(&self, drawable: Drawable) {
        self.with_drawable(drawable, |_, entry| entry.configured = false);
    }

    fn restore_caches(&self, drawable: Drawable) {
        self.with_drawable(drawable, |device, entry| {
            if let Some(config) = entry.config.as_ref() {
                entry.surface.configure(device, config);
                entry.configured = true;
            }
        });
    }

    fn present(
        &self,
        drawable: Drawable,
        commands: &RendererCommands,
        present_time: Option<Instant>,
    ) {
        let mut windows = self.windows();
        let Some(entry) =
            windows.values_mut().find(|w| w.drawable == Some(drawable))
        else {
            return;
        };
        if !entry.configured {
            return;
        }
        let Some(config) = entry.config.as_ref() else {
            return;
        };

        let output = match entry.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                entry.surface.configure(&self.device, config);
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout while acquiring frame");
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory");
                return;
            }
            Err(wgpu::SurfaceError::Other) => {
                warn!("surface error while acquiring frame");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("emuview-present"),
            },
        );

        let [r, g, b, a] = commands.resolved_color();
        {
            let _pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("emuview-clear"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            depth_slice: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: r as f64,
                                    g: g as f64,
                                    b: b as f64,
                                    a: a as f64,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                        },
                    )],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
        }

        self.queue.submit(Some(encoder.finish()));
        entry.window.pre_present_notify();
        output.present();

        if let Some(time) = present_time {
            trace!(
                "presented drawable:{} {:?} after target",
                drawable.id(),
                Instant::now().saturating_duration_since(time)
            );
        }
    }

    fn finish(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait);
    }

    fn release(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait);
        self.windows().clear();
        info!("released GPU display");
    }
}

fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    requested: PixelFormat,
) -> Option<wgpu::TextureFormat> {
    let preferred = match requested {
        PixelFormat::Bgra8888 => wgpu::TextureFormat::Bgra8UnormSrgb,
        PixelFormat::Rgba8888 | PixelFormat::Rgb565 => {
            wgpu::TextureFormat::Rgba8UnormSrgb
        }
    };

    formats
        .iter()
        .copied()
        .find(|f| *f == preferred)
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|f| *f == wgpu::TextureFormat::Bgra8UnormSrgb)
        })
        .or_else(|| formats.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_format_wins_when_available() {
        let formats = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        assert_eq!(
            choose_surface_format(&formats, PixelFormat::Rgba8888),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&formats[..1], PixelFormat::Rgba8888),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(choose_surface_format(&[], PixelFormat::Bgra8888), None);
    }
}
