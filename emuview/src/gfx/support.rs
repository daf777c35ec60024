//! Driver capability probing.
//!
//! The probe runs once after the first context is current and produces a
//! [`DrawContextSupport`] record that is read-only from then on.

use std::num::NonZeroUsize;

use log::{debug, info, warn};

/// Which client API family a context speaks.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GlApi {
    OpenGl,
    OpenGlEs,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContextAttributes {
    pub api: GlApi,
    pub major: u32,
    pub minor: u32,
    pub debug: bool,
}

impl ContextAttributes {
    pub fn new(api: GlApi, major: u32, minor: u32) -> Self {
        Self {
            api,
            major,
            minor,
            debug: cfg!(debug_assertions),
        }
    }

    /// Versions to try in order, most capable first.
    pub fn candidates(api: GlApi) -> [ContextAttributes; 2] {
        match api {
            GlApi::OpenGl => [Self::new(api, 3, 3), Self::new(api, 1, 3)],
            GlApi::OpenGlEs => [Self::new(api, 3, 0), Self::new(api, 2, 0)],
        }
    }
}

/// Resolved driver entry point.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ProcAddress(pub NonZeroUsize);

/// Read-only queries against the current driver context.
pub trait DriverQuery {
    fn version(&self) -> String;

    fn renderer_name(&self) -> String;

    /// Extensions from the indexed query, available from version 3.0.
    fn indexed_extensions(&self) -> Vec<String>;

    /// Space separated extension string.
    fn extension_string(&self) -> String;

    /// Extensions of the display connection rather than the context.
    fn display_extensions(&self) -> String;

    fn max_texture_size(&self) -> u32;

    fn max_anisotropy(&self) -> f32;

    fn proc_address(&self, name: &str) -> Option<ProcAddress>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TextureSizeSupport {
    pub non_pow2: bool,
    pub non_pow2_can_mipmap: bool,
    pub non_pow2_can_repeat: bool,
    pub max_size: [u32; 2],
}

/// Negotiated feature set of the rendering context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawContextSupport {
    is_configured: bool,
    pub has_vbo_funcs: bool,
    pub has_vao_funcs: bool,
    pub has_texture_swizzle: bool,
    pub has_rg_formats: bool,
    pub has_sampler_objects: bool,
    pub has_fbo_funcs: bool,
    pub has_pbo_funcs: bool,
    pub has_fence_sync: bool,
    pub has_apple_fence_sync: bool,
    pub has_egl_fence_sync: bool,
    pub has_server_wait_sync: bool,
    pub has_buffer_storage: bool,
    pub has_immutable_tex_storage: bool,
    pub has_unpack_row_length: bool,
    pub has_bgr_pixels: bool,
    pub has_debug_output: bool,
    pub has_egl_images: bool,
    pub has_external_egl_images: bool,
    pub has_multisample: bool,
    pub has_multisample_hints: bool,
    pub has_draw_read_buffers: bool,
    pub use_legacy_glsl: bool,
    pub texture_size: TextureSizeSupport,
    pub max_anisotropy: f32,
    pub map_buffer_range: Option<ProcAddress>,
    pub unmap_buffer: Option<ProcAddress>,
    pub flush_mapped_buffer_range: Option<ProcAddress>,
    pub egl_image_target_tex_storage: Option<ProcAddress>,
}

impl DrawContextSupport {
    pub fn is_configured(&self) -> bool {
        self.is_configured
    }

    pub(crate) fn mark_configured(&mut self) {
        self.is_configured = true;
    }

    pub fn has_sync_fences(&self) -> bool {
        self.has_fence_sync
            || self.has_apple_fence_sync
            || self.has_egl_fence_sync
    }

    pub fn has_immutable_buffer_storage(&self) -> bool {
        self.has_buffer_storage
    }

    pub fn has_draw_read_buffers(&self) -> bool {
        self.has_draw_read_buffers
    }

    /// Fills the record from `driver`. Returns false without touching
    /// anything once the record is configured.
    pub fn probe(&mut self, driver: &dyn DriverQuery, api: GlApi) -> bool {
        if self.is_configured {
            warn!("ignoring capability probe on configured renderer");
            return false;
        }

        let version = driver.version();
        info!("version: {} ({})", version, driver.renderer_name());
        let gl_version = gl_version_from_str(&version);

        match api {
            GlApi::OpenGl => self.probe_desktop(driver, gl_version),
            GlApi::OpenGlEs => self.probe_es(driver, gl_version),
        }

        let tex_size = driver.max_texture_size().max(1);
        self.texture_size.max_size = [tex_size, tex_size];

        debug!("features: {}", self.feature_summary());
        true
    }

    fn probe_desktop(&mut self, driver: &dyn DriverQuery, gl_version: u32) {
        let mut use_fbo_funcs = false;

        if gl_version >= 15 {
            self.has_vbo_funcs = true;
        }
        if gl_version >= 20 {
            self.setup_non_pow2_mipmap_repeat();
            self.has_draw_read_buffers = true;
        }
        if gl_version >= 21 {
            self.has_pbo_funcs = true;
        }
        if gl_version >= 30 {
            self.has_vao_funcs = true;
            self.has_texture_swizzle = true;
            self.has_rg_formats = true;
            self.has_sampler_objects = true;
            self.setup_fbo_funcs(&mut use_fbo_funcs);
        }
        if gl_version >= 32 {
            self.has_fence_sync = true;
        }

        if gl_version >= 30 {
            let extensions = driver.indexed_extensions();
            debug!("extensions: {}", extensions.join(" "));
            for extension in &extensions {
                self.check_extension(
                    driver,
                    GlApi::OpenGl,
                    extension,
                    &mut use_fbo_funcs,
                );
            }
        } else {
            self.check_extension_string(
                driver,
                GlApi::OpenGl,
                &mut use_fbo_funcs,
            );
        }
    }

    fn probe_es(&mut self, driver: &dyn DriverQuery, gl_version: u32) {
        let mut use_fbo_funcs = false;

        if gl_version >= 30 {
            self.setup_non_pow2_mipmap_repeat();
        } else {
            self.texture_size.non_pow2 = true;
        }
        self.setup_fbo_funcs(&mut use_fbo_funcs);

        if gl_version >= 30 {
            self.map_buffer_range = driver.proc_address("glMapBufferRange");
            self.unmap_buffer = driver.proc_address("glUnmapBuffer");
            self.flush_mapped_buffer_range =
                driver.proc_address("glFlushMappedBufferRange");
            self.has_immutable_tex_storage = true;
            self.has_texture_swizzle = true;
            self.has_rg_formats = true;
            self.has_sampler_objects = true;
            self.has_pbo_funcs = true;
            self.has_fence_sync = true;
            self.has_draw_read_buffers = true;
            self.has_unpack_row_length = true;
        } else {
            self.use_legacy_glsl = true;
            let display_extensions = driver.display_extensions();
            if has_token(&display_extensions, "EGL_KHR_fence_sync") {
                self.has_egl_fence_sync = true;
                self.has_server_wait_sync =
                    has_token(&display_extensions, "EGL_KHR_wait_sync");
            }
        }

        self.check_extension_string(
            driver,
            GlApi::OpenGlEs,
            &mut use_fbo_funcs,
        );
    }

    fn check_extension_string(
        &mut self,
        driver: &dyn DriverQuery,
        api: GlApi,
        use_fbo_funcs: &mut bool,
    ) {
        let extensions = driver.extension_string();
        debug!("extensions: {}", extensions);
        for extension in extensions.split_whitespace() {
            self.check_extension(driver, api, extension, use_fbo_funcs);
        }
    }

    // Tokens outside the table are ignored.
    fn check_extension(
        &mut self,
        driver: &dyn DriverQuery,
        api: GlApi,
        extension: &str,
        use_fbo_funcs: &mut bool,
    ) {
        let es = api == GlApi::OpenGlEs;
        match extension {
            "GL_ARB_texture_non_power_of_two" => {
                self.setup_non_pow2_mipmap_repeat()
            }
            "GL_OES_texture_npot" if es => self.setup_non_pow2_mipmap_repeat(),
            "GL_NV_texture_npot_2D_mipmap" if es => {
                self.texture_size.non_pow2 = true;
                self.texture_size.non_pow2_can_mipmap = true;
            }
            "GL_APPLE_texture_2D_limited_npot" | "GL_IMG_texture_npot"
                if es =>
            {
                self.texture_size.non_pow2 = true;
            }
            "GL_KHR_debug" if cfg!(debug_assertions) => {
                self.has_debug_output = true;
            }
            "GL_EXT_unpack_subimage" if es => {
                self.has_unpack_row_length = true;
            }
            "GL_APPLE_texture_format_BGRA8888"
            | "GL_EXT_texture_format_BGRA8888"
                if es =>
            {
                self.has_bgr_pixels = true;
            }
            "GL_EXT_texture_storage" | "GL_ARB_texture_storage" => {
                self.has_immutable_tex_storage = true;
            }
            "GL_APPLE_sync" if es => {
                if !self.has_sync_fences() {
                    self.has_apple_fence_sync = true;
                }
            }
            "GL_ARB_sync" => {
                if !self.has_sync_fences() {
                    self.has_fence_sync = true;
                }
            }
            "GL_OES_EGL_image" if es => self.has_egl_images = true,
            "GL_OES_EGL_image_external" if es => {
                self.has_external_egl_images = true;
            }
            "GL_EXT_EGL_image_storage" if es => {
                self.egl_image_target_tex_storage =
                    driver.proc_address("glEGLImageTargetTexStorageEXT");
            }
            "GL_NV_pixel_buffer_object" if es => self.has_pbo_funcs = true,
            "GL_ARB_pixel_buffer_object" => self.has_pbo_funcs = true,
            "GL_NV_map_buffer_range" if es => {
                if self.map_buffer_range.is_none() {
                    self.map_buffer_range =
                        driver.proc_address("glMapBufferRangeNV");
                }
                self.setup_unmap_buffer(driver);
            }
            "GL_EXT_map_buffer_range" if es => {
                if self.map_buffer_range.is_none() {
                    self.map_buffer_range =
                        driver.proc_address("glMapBufferRangeEXT");
                }
                self.setup_unmap_buffer(driver);
            }
            "GL_EXT_buffer_storage" if es => self.has_buffer_storage = true,
            "GL_ARB_buffer_storage" => self.has_buffer_storage = true,
            "GL_EXT_texture_filter_anisotropic" => {
                self.max_anisotropy = driver.max_anisotropy();
            }
            "GL_ARB_multisample" => self.has_multisample = true,
            "GL_NV_multisample_filter_hint" => {
                self.has_multisample_hints = true;
            }
            "GL_EXT_framebuffer_object" | "GL_ARB_framebuffer_object"
            | "GL_OES_framebuffer_object" => {
                if !*use_fbo_funcs {
                    self.setup_fbo_funcs(use_fbo_funcs);
                }
            }
            _ => {}
        }
    }

    fn setup_non_pow2_mipmap_repeat(&mut self) {
        self.texture_size.non_pow2 = true;
        self.texture_size.non_pow2_can_mipmap = true;
        self.texture_size.non_pow2_can_repeat = true;
    }

    fn setup_fbo_funcs(&mut self, use_fbo_funcs: &mut bool) {
        *use_fbo_funcs = true;
        self.has_fbo_funcs = true;
    }

    fn setup_unmap_buffer(&mut self, driver: &dyn DriverQuery) {
        if self.unmap_buffer.is_none() {
            self.unmap_buffer = driver
                .proc_address("glUnmapBuffer")
                .or_else(|| driver.proc_address("glUnmapBufferOES"));
        }
    }

    pub fn feature_summary(&self) -> String {
        let mut features = Vec::new();
        let mut push = |on: bool, name: &'static str| {
            if on {
                features.push(name);
            }
        };
        push(self.texture_size.non_pow2, "NPOT textures");
        push(self.has_bgr_pixels, "BGRA format");
        push(self.has_texture_swizzle, "texture swizzle");
        push(self.has_immutable_tex_storage, "immutable texture storage");
        push(self.has_immutable_buffer_storage(), "immutable buffer storage");
        push(self.has_unpack_row_length, "unpack sub-images");
        push(self.has_sampler_objects, "sampler objects");
        push(self.has_pbo_funcs, "PBOs");
        push(self.has_sync_fences(), "sync fences");
        push(self.max_anisotropy > 0.0, "anisotropic filtering");
        push(self.has_debug_output, "debug output");

        format!(
            "{} (max texture {}x{})",
            features.join(", "),
            self.texture_size.max_size[0],
            self.texture_size.max_size[1]
        )
    }
}

/// `"4.6.0 NVIDIA"` becomes 46. Unparsable strings count as 1.0.
pub fn gl_version_from_str(version: &str) -> u32 {
    let digits = version.trim_start_matches(|c: char| !c.is_ascii_digit());
    let mut parts = digits.splitn(2, '.');
    let major = parts.next().and_then(|s| s.parse::<u32>().ok());
    let minor = parts.next().and_then(|s| {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        s[..end].parse::<u32>().ok()
    });

    match (major, minor) {
        (Some(major), Some(minor)) => 10 * major + minor,
        _ => {
            warn!("unable to parse GL version string: {:?}", version);
            10
        }
    }
}

fn has_token(extensions: &str, token: &str) -> bool {
    extensions.split_whitespace().any(|t| t == token)
}
