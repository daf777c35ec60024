mod support;

use std::sync::Arc;
use std::time::Instant;

use emuview::base::events::control_channel;
use emuview::base::host::PlatformKind;
use emuview::base::window::{DrawParams, WindowId};
use emuview::gfx::renderer::FORCE_SINGLE_DRAW_CONTEXT_FILE;
use emuview::gfx::{
    DrawTarget, GlApi, PixelFormat, Projection, Renderer, RendererError,
    ThreadMode, Viewport,
};
use serial_test::serial;
use support::{FakeDisplay, RecordingHost};

fn configured(
    version: &str,
    mode: ThreadMode,
    host: &RecordingHost,
) -> (Renderer, Arc<FakeDisplay>) {
    let display = Arc::new(FakeDisplay::new(version));
    let (events, _receiver) = control_channel();
    let renderer = Renderer::make_configured(
        display.clone(),
        GlApi::OpenGl,
        PixelFormat::Rgba8888,
        mode,
        host,
        events,
    )
    .expect("configured renderer");
    (renderer, display)
}

fn linux_host(storage: Option<std::path::PathBuf>) -> RecordingHost {
    RecordingHost::new(PlatformKind::Linux, true, storage)
}

#[test]
fn configure_runs_once() {
    let host = linux_host(None);
    let (mut renderer, _display) =
        configured("3.3.0 FakeGL", ThreadMode::Multi, &host);
    let support = renderer.support().clone();
    assert!(renderer.is_configured());
    assert_eq!(renderer.thread_mode(), ThreadMode::Multi);

    let result = renderer.configure(ThreadMode::Single, &host);
    assert!(matches!(result, Err(RendererError::AlreadyConfigured)));
    assert_eq!(renderer.support(), &support);
    assert_eq!(renderer.thread_mode(), ThreadMode::Multi);
}

#[test]
fn context_without_fences_forces_single_draw_context() {
    let host = linux_host(None);
    let (renderer, _display) =
        configured("2.1 FakeGL", ThreadMode::Multi, &host);
    assert!(!renderer.supports_thread_mode());
    assert_eq!(renderer.thread_mode(), ThreadMode::Single);
}

#[test]
fn auto_resolves_to_a_concrete_mode() {
    let host = linux_host(None);
    let (renderer, _display) =
        configured("3.3.0 FakeGL", ThreadMode::Auto, &host);
    assert!(renderer.supports_thread_mode());
    assert_eq!(renderer.thread_mode(), ThreadMode::Multi);
    assert!(renderer.support().has_draw_read_buffers());
}

#[test]
#[serial]
fn override_file_forces_single_draw_context() {
    let dir = support::scratch_dir("override");
    let host = linux_host(Some(dir.clone()));
    let (renderer, _display) =
        configured("3.3.0 FakeGL", ThreadMode::Multi, &host);
    assert_eq!(renderer.thread_mode(), ThreadMode::Multi);

    support::touch(&dir, FORCE_SINGLE_DRAW_CONTEXT_FILE);
    let (renderer, _display) =
        configured("3.3.0 FakeGL", ThreadMode::Multi, &host);
    assert_eq!(renderer.thread_mode(), ThreadMode::Single);
}

#[test]
fn separate_context_presents_without_blocking_the_caller() {
    let host = linux_host(None);
    let (renderer, display) =
        configured("3.3.0 FakeGL", ThreadMode::Multi, &host);
    let window = WindowId(1);
    let drawable = renderer
        .task()
        .run_sync(move |ctx| {
            let format = PixelFormat::Rgba8888;
            ctx.display().make_drawable(window, format, [4, 4])
        })
        .expect("task running")
        .expect("drawable");

    let viewport = Viewport::from_size([4, 4]);
    let target = DrawTarget {
        window,
        drawable,
        present_time: Some(Instant::now()),
    };
    let params = DrawParams {
        timestamp: Instant::now(),
        was_resized: false,
        needs_sync: false,
    };
    renderer.task().draw(
        target,
        params,
        viewport,
        Projection::for_viewport(&viewport),
        |cmds| {
            cmds.clear();
            cmds.present();
        },
    );
    renderer.task().await_pending();
    assert_eq!(display.presents_for(window).len(), 1);
}

#[test]
fn full_exit_releases_the_display_once() {
    let host = linux_host(None);
    let (mut renderer, display) =
        configured("3.3.0 FakeGL", ThreadMode::Single, &host);

    renderer.on_exit(true);
    assert_eq!(display.ops(), vec!["finish"]);
    assert!(!renderer.is_released());

    renderer.on_exit(false);
    renderer.on_exit(false);
    assert_eq!(display.count("release"), 1);
    assert!(renderer.is_released());
    assert!(!renderer.task().run(|_| {}));
}

#[test]
fn gpu_probe_is_opt_in() {
    if !support::gpu_tests_enabled() {
        eprintln!(
            "Skipping GPU smoke probe. Set EMUVIEW_RUN_GPU_TESTS=1 to run."
        );
        return;
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(
        &wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: true,
            compatible_surface: None,
        },
    ))
    .expect("expected a headless adapter for GPU smoke probe");

    let info = adapter.get_info();
    assert!(!info.name.is_empty());
}
