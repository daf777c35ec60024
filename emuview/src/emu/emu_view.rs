use log::trace;

use super::video::EmuVideoLayer;
use crate::base::events::{ControlEvent, ControlEventSender};
use crate::base::window::WindowId;
use crate::framework::util::HashSet;
use crate::gfx::{Bounds, RendererCommands};
use crate::input::{Event, Key};

pub const TOAST_HEIGHT: i32 = 64;

/// Largest rect with the aspect of `content` centered in `rect`.
pub fn aspect_fit(rect: Bounds, content: [u32; 2]) -> Bounds {
    let [x, y, w, h] = rect;
    if content[0] == 0 || content[1] == 0 || w <= 0 || h <= 0 {
        return rect;
    }

    let content_aspect = content[0] as f64 / content[1] as f64;
    let rect_aspect = w as f64 / h as f64;
    let (fit_w, fit_h) = if content_aspect > rect_aspect {
        (w, (w as f64 / content_aspect).round() as i32)
    } else {
        ((h as f64 * content_aspect).round() as i32, h)
    };
    [x + (w - fit_w) / 2, y + (h - fit_h) / 2, fit_w, fit_h]
}

/// The live emulation surface. Hosted by exactly one window at a time.
#[derive(Debug)]
pub struct EmuView {
    layer: EmuVideoLayer,
    window: WindowId,
    rect: Bounds,
    video_rect: Bounds,
}

impl EmuView {
    pub fn new(layer: EmuVideoLayer, window: WindowId) -> Self {
        Self {
            layer,
            window,
            rect: [0, 0, 0, 0],
            video_rect: [0, 0, 0, 0],
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn set_window(&mut self, window: WindowId) {
        self.window = window;
    }

    pub fn layer(&self) -> &EmuVideoLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut EmuVideoLayer {
        &mut self.layer
    }

    pub fn view_rect(&self) -> Bounds {
        self.rect
    }

    pub fn set_view_rect(&mut self, rect: Bounds) {
        self.rect = rect;
    }

    pub fn video_rect(&self) -> Bounds {
        self.video_rect
    }

    pub fn place(&mut self) {
        self.video_rect = aspect_fit(self.rect, self.layer.video().size());
        trace!("placed emu video at {:?}", self.video_rect);
    }

    pub fn draw(&self, cmds: &mut RendererCommands) {
        self.layer.draw(cmds, self.video_rect);
    }
}

/// Receives input while emulation is showing. Always lives on the main
/// window.
#[derive(Debug)]
pub struct EmuInputView {
    window: WindowId,
    rect: Bounds,
    pressed: HashSet<Key>,
    touch_controls: bool,
}

impl EmuInputView {
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            rect: [0, 0, 0, 0],
            pressed: HashSet::default(),
            touch_controls: false,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn set_window(&mut self, window: WindowId) {
        self.window = window;
    }

    pub fn set_view_rect(&mut self, rect: Bounds) {
        self.rect = rect;
    }

    pub fn place(&mut self) {}

    pub fn touch_controls_are_on(&self) -> bool {
        self.touch_controls
    }

    pub fn set_touch_controls_on(&mut self, on: bool) {
        self.touch_controls = on;
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    pub fn reset_input(&mut self) {
        self.pressed.clear();
    }

    /// The cancel and menu keys leave emulation; other keys go to the
    /// core's key state.
    pub fn input_event(
        &mut self,
        event: &Event,
        events: &ControlEventSender,
    ) -> bool {
        if event.pushed()
            && (event.is_default_cancel_button() || event.is_menu_dismiss_key())
        {
            let _ = events.send(ControlEvent::ShowUi);
            return true;
        }

        if !event.is_key() {
            return self.touch_controls && event.is_pointer();
        }

        if event.pushed() {
            self.pressed.insert(event.key);
        } else if event.released() {
            self.pressed.remove(&event.key);
        }
        true
    }

    pub fn draw(&self, cmds: &mut RendererCommands) {
        if self.touch_controls {
            cmds.draw_view("Touch Controls", self.rect);
        }
    }
}

/// Short status message drawn along the bottom of its window.
#[derive(Debug)]
pub struct ToastView {
    window: WindowId,
    rect: Bounds,
    message: Option<String>,
}

impl ToastView {
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            rect: [0, 0, 0, 0],
            message: None,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn set_window(&mut self, window: WindowId) {
        self.window = window;
    }

    pub fn set_view_rect(&mut self, rect: Bounds) {
        self.rect = rect;
    }

    pub fn place(&mut self) {}

    pub fn post(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn clear(&mut self) {
        self.message = None;
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn draw(&self, cmds: &mut RendererCommands) {
        let Some(message) = self.message.as_deref() else {
            return;
        };
        let [x, y, w, h] = self.rect;
        let height = TOAST_HEIGHT.min(h);
        let bounds = [x, y + h - height, w, height];
        cmds.draw_view(format!("Toast: {}", message), bounds);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::base::events::control_channel;
    use crate::emu::video::EmuVideo;
    use crate::input::{Action, keycode};

    #[test]
    fn video_is_letterboxed_to_its_aspect() {
        let wide = aspect_fit([0, 0, 800, 400], [320, 240]);
        assert_eq!(wide, [133, 0, 533, 400]);
        let tall = aspect_fit([0, 0, 400, 800], [320, 240]);
        assert_eq!(tall, [0, 250, 400, 300]);
        assert_eq!(aspect_fit([0, 0, 10, 10], [0, 0]), [0, 0, 10, 10]);
    }

    #[test]
    fn emu_view_places_video_inside_its_rect() {
        let layer = EmuVideoLayer::new(EmuVideo::new([256, 256]));
        let mut view = EmuView::new(layer, WindowId(1));
        view.set_view_rect([0, 0, 640, 480]);
        view.place();
        assert_eq!(view.video_rect(), [80, 0, 480, 480]);
    }

    #[test]
    fn menu_key_leaves_emulation_and_keys_are_tracked() {
        let (tx, rx) = control_channel();
        let mut input = EmuInputView::new(WindowId(1));
        let now = Instant::now();

        let a = Event::key(None, keycode::A, Action::Pushed, 0, now);
        assert!(input.input_event(&a, &tx));
        assert!(input.is_pressed(keycode::A));
        input.reset_input();
        assert!(!input.is_pressed(keycode::A));

        let menu = Event::key(None, keycode::MENU, Action::Pushed, 0, now);
        assert!(input.input_event(&menu, &tx));
        assert_eq!(rx.try_recv().expect("event"), ControlEvent::ShowUi);
    }
}
