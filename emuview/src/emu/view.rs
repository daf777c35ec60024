use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::base::events::{ControlEvent, ControlEventSender};
use crate::gfx::{Bounds, RendererCommands};
use crate::input::{Event, keycode};

pub const MAIN_MENU_NAME: &str = "Main Menu";
pub const SYSTEM_ACTIONS_NAME: &str = "System Actions";
pub const FILE_PICKER_NAME: &str = "File Picker";
pub const EXIT_CONFIRM_NAME: &str = "Exit";
pub const AUTO_STATE_CONFIRM_NAME: &str = "Auto-save State";

pub const NAV_BAR_HEIGHT: i32 = 48;
const MENU_ROW_HEIGHT: i32 = 40;

/// A screen of UI shown on the view stack.
///
/// Views never reach into the controller. Anything beyond their own state
/// goes out as a [`ControlEvent`].
pub trait View {
    fn name(&self) -> &str;

    fn input_event(
        &mut self,
        event: &Event,
        events: &ControlEventSender,
    ) -> bool;

    fn on_show(&mut self) {}

    fn on_hide(&mut self) {}

    fn place(&mut self, _bounds: Bounds) {}

    fn draw(&self, cmds: &mut RendererCommands, bounds: Bounds) {
        cmds.draw_view(self.name(), bounds);
    }
}

/// Views the controller knows how to build by identity.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewId {
    MainMenu,
    SystemActions,
    FilePicker(PathBuf),
    ExitConfirm,
    AutoStateConfirm { modified: String, add_to_recent: bool },
}

pub trait ViewFactory {
    fn make_view(&mut self, id: ViewId) -> Box<dyn View>;
}

#[derive(Debug, Default)]
pub struct DefaultViewFactory;

impl ViewFactory for DefaultViewFactory {
    fn make_view(&mut self, id: ViewId) -> Box<dyn View> {
        match id {
            ViewId::MainMenu => Box::new(MenuView::main_menu()),
            ViewId::SystemActions => Box::new(MenuView::system_actions()),
            ViewId::FilePicker(dir) => Box::new(MenuView::file_picker(&dir)),
            ViewId::ExitConfirm => Box::new(ConfirmView::exit()),
            ViewId::AutoStateConfirm {
                modified,
                add_to_recent,
            } => Box::new(ConfirmView::auto_state(&modified, add_to_recent)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MenuItem {
    pub label: String,
    pub event: ControlEvent,
}

impl MenuItem {
    pub fn new(label: impl Into<String>, event: ControlEvent) -> Self {
        Self {
            label: label.into(),
            event,
        }
    }
}

/// Vertical list of items. Up/Down move the selection, Enter or a click
/// posts the selected item's event.
#[derive(Clone, Debug)]
pub struct MenuView {
    name: String,
    items: Vec<MenuItem>,
    selected: usize,
    rect: Bounds,
}

impl MenuView {
    pub fn new(name: impl Into<String>, items: Vec<MenuItem>) -> Self {
        Self {
            name: name.into(),
            items,
            selected: 0,
            rect: [0, 0, 0, 0],
        }
    }

    pub fn main_menu() -> Self {
        Self::new(
            MAIN_MENU_NAME,
            vec![
                MenuItem::new("Return to Game", ControlEvent::ShowEmulation),
                MenuItem::new(
                    "System Actions",
                    ControlEvent::ShowSystemActions,
                ),
                MenuItem::new("Exit", ControlEvent::Exit),
            ],
        )
    }

    pub fn system_actions() -> Self {
        Self::new(
            SYSTEM_ACTIONS_NAME,
            vec![
                MenuItem::new("Resume", ControlEvent::ShowEmulation),
                MenuItem::new(
                    "Close Content",
                    ControlEvent::CloseSystem {
                        allow_autosave: true,
                    },
                ),
            ],
        )
    }

    /// One item per directory entry, sorted by name.
    pub fn file_picker(dir: &Path) -> Self {
        let mut paths: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => {
                entries.filter_map(|e| e.ok()).map(|e| e.path()).collect()
            }
            Err(err) => {
                debug!("can't list {}: {}", dir.display(), err);
                Vec::new()
            }
        };
        paths.sort();

        let items = paths
            .into_iter()
            .map(|path| {
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                MenuItem::new(label, ControlEvent::OpenFile(path))
            })
            .collect();
        Self::new(FILE_PICKER_NAME, items)
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    fn select_item(&mut self, idx: usize, events: &ControlEventSender) {
        let Some(item) = self.items.get(idx) else {
            return;
        };
        self.selected = idx;
        trace!("selected menu item {}", item.label);
        let _ = events.send(item.event.clone());
    }
}

impl View for MenuView {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_event(
        &mut self,
        event: &Event,
        events: &ControlEventSender,
    ) -> bool {
        if !event.pushed() {
            return false;
        }

        if event.is_pointer() {
            let row = (event.pos[1] - self.rect[1]) / MENU_ROW_HEIGHT;
            if row < 0 {
                return false;
            }
            self.select_item(row as usize, events);
            return true;
        }

        match event.key {
            keycode::UP if !self.items.is_empty() => {
                self.selected = self.selected.saturating_sub(1);
                true
            }
            keycode::DOWN if !self.items.is_empty() => {
                self.selected = (self.selected + 1).min(self.items.len() - 1);
                true
            }
            keycode::ENTER => {
                self.select_item(self.selected, events);
                true
            }
            _ => false,
        }
    }

    fn on_show(&mut self) {
        if self.selected >= self.items.len() {
            self.selected = 0;
        }
    }

    fn place(&mut self, bounds: Bounds) {
        self.rect = bounds;
    }
}

/// Two-choice alert. Left/Right pick, Enter confirms.
#[derive(Clone, Debug)]
pub struct ConfirmView {
    name: String,
    label: String,
    accept: MenuItem,
    reject: MenuItem,
    accept_selected: bool,
}

impl ConfirmView {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        accept: MenuItem,
        reject: MenuItem,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            accept,
            reject,
            accept_selected: true,
        }
    }

    pub fn exit() -> Self {
        Self::new(
            EXIT_CONFIRM_NAME,
            "Really Exit?",
            MenuItem::new("Yes", ControlEvent::Exit),
            MenuItem::new("No", ControlEvent::PopView),
        )
    }

    pub fn auto_state(modified: &str, add_to_recent: bool) -> Self {
        Self::new(
            AUTO_STATE_CONFIRM_NAME,
            format!("Auto-save state exists from:\n{}", modified),
            MenuItem::new(
                "Continue",
                ControlEvent::LaunchSystem {
                    load_autosave: true,
                    add_to_recent,
                },
            ),
            MenuItem::new(
                "Restart Game",
                ControlEvent::LaunchSystem {
                    load_autosave: false,
                    add_to_recent,
                },
            ),
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn accept(&self) -> &MenuItem {
        &self.accept
    }

    pub fn reject(&self) -> &MenuItem {
        &self.reject
    }
}

impl View for ConfirmView {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_event(
        &mut self,
        event: &Event,
        events: &ControlEventSender,
    ) -> bool {
        if !event.pushed() || !event.is_key() {
            return false;
        }

        match event.key {
            keycode::LEFT | keycode::RIGHT => {
                self.accept_selected = !self.accept_selected;
                true
            }
            keycode::ENTER => {
                let item = if self.accept_selected {
                    &self.accept
                } else {
                    &self.reject
                };
                let _ = events.send(item.event.clone());
                true
            }
            _ => false,
        }
    }

    fn on_show(&mut self) {
        self.accept_selected = true;
    }
}

/// Title bar over the stack. The right button returns to a running game.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavBar {
    pub title: String,
    pub right_button: bool,
    pub back_button: bool,
}

struct StackEntry {
    view: Box<dyn View>,
    needs_nav: bool,
    modal: bool,
}

/// Ordered UI views; only the top one receives input.
///
/// A modal view blocks [`ViewStack::dismiss_view`] for every view beneath
/// it. Explicit pops still remove modals.
#[derive(Default)]
pub struct ViewStack {
    entries: Vec<StackEntry>,
    rect: Bounds,
    nav: NavBar,
    show_nav: bool,
}

impl ViewStack {
    pub fn new() -> Self {
        Self {
            show_nav: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self) -> Option<&dyn View> {
        self.entries.last().map(|e| e.view.as_ref())
    }

    pub fn top_mut(&mut self) -> Option<&mut (dyn View + 'static)> {
        self.entries.last_mut().map(|e| e.view.as_mut())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.view.name()).collect()
    }

    pub fn view_idx(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.view.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.view_idx(name).is_some()
    }

    pub fn has_modal_view(&self) -> bool {
        self.entries.iter().any(|e| e.modal)
    }

    pub fn nav(&self) -> &NavBar {
        &self.nav
    }

    pub fn show_nav_view(&mut self, show: bool) {
        self.show_nav = show;
        self.place(self.rect);
    }

    pub fn nav_view_shown(&self) -> bool {
        self.show_nav
    }

    pub fn set_nav_right_button(&mut self, show: bool) {
        self.nav.right_button = show;
    }

    pub fn set_nav_back_button(&mut self, show: bool) {
        self.nav.back_button = show;
    }

    pub fn push(&mut self, view: Box<dyn View>, needs_nav: bool, modal: bool) {
        if let Some(top) = self.top_mut() {
            top.on_hide();
        }
        debug!("pushed view {}", view.name());
        self.entries.push(StackEntry {
            view,
            needs_nav,
            modal,
        });
    }

    pub fn push_and_show(
        &mut self,
        view: Box<dyn View>,
        needs_nav: bool,
        modal: bool,
    ) {
        self.push(view, needs_nav, modal);
        self.show();
    }

    pub fn pop(&mut self) {
        if let Some(mut entry) = self.entries.pop() {
            entry.view.on_hide();
            debug!("popped view {}", entry.view.name());
        }
        self.update_nav_title();
    }

    pub fn pop_and_show(&mut self) {
        self.pop();
        self.show();
    }

    /// Pops until the view at `idx` is on top.
    pub fn pop_to(&mut self, idx: usize) {
        let mut popped = false;
        while self.entries.len() > idx + 1 {
            self.pop();
            popped = true;
        }
        if popped {
            self.show();
        }
    }

    pub fn pop_to_root(&mut self) {
        self.pop_to(0);
    }

    pub fn pop_modal_views(&mut self) {
        let mut popped = false;
        while self.entries.last().is_some_and(|e| e.modal) {
            self.pop();
            popped = true;
        }
        if popped {
            self.show();
        }
    }

    /// Removes the view at `idx` and everything above it. Refused while a
    /// modal view sits above `idx`.
    pub fn dismiss_view(&mut self, idx: usize, refresh_layout: bool) -> bool {
        if idx >= self.entries.len() {
            return false;
        }
        if self.entries[idx + 1..].iter().any(|e| e.modal) {
            debug!(
                "not dismissing {} under a modal view",
                self.entries[idx].view.name()
            );
            return false;
        }

        while self.entries.len() > idx {
            self.pop();
        }
        if refresh_layout {
            self.show();
        }
        true
    }

    pub fn show(&mut self) {
        self.update_nav_title();
        let rect = self.rect;
        if let Some(top) = self.top_mut() {
            top.on_show();
        }
        self.place(rect);
    }

    fn update_nav_title(&mut self) {
        self.nav.title = self
            .top()
            .map(|v| v.name().to_string())
            .unwrap_or_default();
    }

    fn nav_shown_for_top(&self) -> bool {
        self.show_nav && self.entries.last().is_some_and(|e| e.needs_nav)
    }

    fn top_rect(&self) -> Bounds {
        let [x, y, w, h] = self.rect;
        if self.nav_shown_for_top() {
            [x, y + NAV_BAR_HEIGHT, w, (h - NAV_BAR_HEIGHT).max(0)]
        } else {
            self.rect
        }
    }

    pub fn place(&mut self, bounds: Bounds) {
        self.rect = bounds;
        let rect = self.top_rect();
        if let Some(top) = self.top_mut() {
            top.place(rect);
        }
    }

    pub fn draw(&self, cmds: &mut RendererCommands) {
        let Some(top) = self.top() else {
            return;
        };
        if self.nav_shown_for_top() {
            let [x, y, w, _] = self.rect;
            cmds.draw_view("Nav", [x, y, w, NAV_BAR_HEIGHT]);
        }
        top.draw(cmds, self.top_rect());
    }

    pub fn input_event(
        &mut self,
        event: &Event,
        events: &ControlEventSender,
    ) -> bool {
        match self.top_mut() {
            Some(top) => top.input_event(event, events),
            None => false,
        }
    }
}
