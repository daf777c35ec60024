mod support;

use emuview::base::lifecycle::LifecycleHook;
use support::{Harness, HostCall, TaskCall, screen};

#[test]
fn backgrounding_keeps_the_drawable_but_frees_caches() {
    let mut h = Harness::builder()
        .renderer_time()
        .content("/roms/game.rom")
        .build();
    let main = h.main();
    h.controller.show_emulation();

    let bound = {
        let data = h.controller.state().window_data(main).expect("main data");
        assert!(data.drawable.frame_notify_armed());
        data.drawable.drawable().expect("bound drawable")
    };

    h.controller.on_app_exit(true);
    h.await_render();
    let data = h.controller.state().window_data(main).expect("main data");
    assert_eq!(data.drawable.drawable(), Some(bound));
    assert!(data.drawable.caches_freed());
    assert!(!data.drawable.frame_notify_armed());
    assert!(h.host.calls().contains(&HostCall::CancelDraw(main)));
    assert_eq!(h.display.count("free_caches"), 1);
    assert_eq!(h.display.count("finish"), 1);
    assert!(!h.controller.state().renderer().is_released());

    h.controller.on_app_resume(true);
    h.await_render();
    let data = h.controller.state().window_data(main).expect("main data");
    assert_eq!(data.drawable.drawable(), Some(bound));
    assert!(!data.drawable.caches_freed());
    assert_eq!(h.display.count("restore_caches"), 1);
}

#[test]
fn renderer_time_frames_continue_after_resume() {
    let mut h = Harness::builder()
        .renderer_time()
        .content("/roms/game.rom")
        .build();
    let main = h.main();
    h.controller.show_emulation();
    for _ in 0..64 {
        if h.controller.state().frame_update_armed() {
            break;
        }
        assert!(h.controller.dispatch_draw(main, false), "draw posted");
    }
    assert!(h.controller.dispatch_draw(main, false));
    assert_eq!(h.frame_requests().len(), 1);

    h.controller.on_app_exit(true);
    h.controller.on_app_resume(true);
    h.await_render();
    let data = h.controller.state().window_data(main).expect("main data");
    assert!(data.drawable.frame_notify_armed());

    for expected in 2..5 {
        h.finish_video_frame();
        assert!(h.controller.dispatch_draw(main, false));
        assert_eq!(h.frame_requests().len(), expected);
    }
}

#[test]
fn resume_restarts_emulation_paused_while_away() {
    let mut h = Harness::builder().content("/roms/game.rom").build();
    let main = h.main();
    h.controller.show_emulation();
    h.controller.dispatch_focus_change(main, false);
    h.controller.on_app_exit(true);

    h.controller.on_app_resume(false);
    assert!(h.controller.state().system().is_paused());

    h.controller.on_app_resume(true);
    assert!(!h.controller.state().system().is_paused());
    assert_eq!(h.task_calls().last(), Some(&TaskCall::Start));
}

#[test]
fn full_exit_stops_the_system_and_releases_the_renderer() {
    let mut h = Harness::builder().content("/roms/game.rom").build();
    let main = h.main();
    h.controller.show_emulation();

    h.controller.on_app_exit(false);
    assert_eq!(h.task_calls().last(), Some(&TaskCall::Stop));

    let state = h.controller.state();
    assert!(state.renderer().is_released());
    assert!(!state.renderer().task().is_running());
    let data = state.window_data(main).expect("main data");
    assert!(!data.drawable.is_bound());
    assert!(
        !state
            .lifecycle_hooks()
            .has_hooks_for(LifecycleHook::Drawable(main))
    );

    let ops = h.display.ops();
    assert_eq!(ops[ops.len() - 2..], ["destroy_drawable", "release"]);
}

#[test]
fn window_hooks_follow_the_window() {
    let mut h = Harness::new();
    let main = h.main();
    let hooks = h.controller.state().lifecycle_hooks();
    assert!(hooks.has_hooks_for(LifecycleHook::Window(main)));
    assert!(hooks.has_hooks_for(LifecycleHook::Drawable(main)));
    assert!(hooks.has_hooks_for(LifecycleHook::ViewController));
    assert!(hooks.has_hooks_for(LifecycleHook::Renderer));

    h.controller.add_screen(screen(1));
    let extra = h.controller.state().extra_window().expect("extra window");
    let hooks = h.controller.state().lifecycle_hooks();
    assert!(hooks.has_hooks_for(LifecycleHook::Window(extra)));
    // no surface yet
    assert!(!hooks.has_hooks_for(LifecycleHook::Drawable(extra)));

    h.controller.on_surface_created(extra, [800, 600]);
    let hooks = h.controller.state().lifecycle_hooks();
    assert!(hooks.has_hooks_for(LifecycleHook::Drawable(extra)));

    h.controller.dispatch_dismiss_request(extra);
    let hooks = h.controller.state().lifecycle_hooks();
    assert!(!hooks.has_hooks_for(LifecycleHook::Window(extra)));
    assert!(!hooks.has_hooks_for(LifecycleHook::Drawable(extra)));
}

#[test]
fn destroyed_surface_unbinds_the_drawable() {
    let mut h = Harness::new();
    let main = h.main();

    h.controller.on_surface_destroyed(main);
    h.await_render();
    let state = h.controller.state();
    let data = state.window_data(main).expect("main data");
    assert!(!data.drawable.is_bound());
    assert!(
        !state
            .lifecycle_hooks()
            .has_hooks_for(LifecycleHook::Drawable(main))
    );
    assert_eq!(h.display.count("destroy_drawable"), 1);
    assert!(!h.controller.dispatch_draw(main, false));
}
