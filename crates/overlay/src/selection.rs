//! Selection state machine
//!
//! Pointer and key events go in, a list of [`Effect`]s comes out. The machine
//! knows nothing about the UI toolkit that produced the events; the overlay
//! window and the tests drive it the same way.
//!
//! A press starts a drag. Until the pointer moves further than the drag
//! threshold the gesture still counts as a click, and releasing it selects
//! the window under the pointer. Past the threshold a rectangle is dragged
//! out, computed separately in physical and in logical space.

use crate::coords::CoordinateMapper;
use crate::window_list::{WindowHandle, WindowInfo, WindowSnapshot};
use capture::{LogicalPoint, LogicalRect, PhysicalPoint, PhysicalRect};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Distance in physical pixels within which a press grabs a selection edge.
const HANDLE_TOLERANCE: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionConfig {
    /// Pointer travel (physical pixels) that turns a click into a drag.
    pub drag_threshold: f64,
    /// Confirm as soon as a selection is made instead of waiting for Enter.
    pub auto_confirm: bool,
    /// Arrow key step in physical pixels.
    pub nudge_step: i32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            drag_threshold: 5.0,
            auto_confirm: true,
            nudge_step: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    DragSelecting,
    Selected,
    /// Dragging an edge or corner of an existing selection.
    Adjusting,
}

/// Where the pointer is. Window-logical positions are relative to the
/// overlay window's logical origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerPosition {
    Physical(PhysicalPoint),
    WindowLogical(LogicalPoint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Lock the drag to a square.
    pub shift: bool,
    /// Arrow keys resize instead of move.
    pub ctrl: bool,
    /// Expand from the press point as centre.
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    /// `0`-`9`; 1-9 pick monitors one to nine, 0 picks the tenth.
    Digit(u8),
    /// Backtick or tilde: the monitor under the pointer.
    Backtick,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    PointerPressed {
        position: PointerPosition,
        button: PointerButton,
        modifiers: Modifiers,
    },
    PointerMoved {
        position: PointerPosition,
        modifiers: Modifiers,
    },
    PointerReleased {
        position: PointerPosition,
        button: PointerButton,
        modifiers: Modifiers,
    },
    KeyPressed {
        key: Key,
        modifiers: Modifiers,
    },
    ModifiersChanged(Modifiers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Drag,
    Window(WindowHandle),
    /// Index into the monitor snapshot.
    Monitor(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub physical: PhysicalRect,
    /// Relative to the overlay window, for drawing.
    pub logical: LogicalRect,
    pub source: SelectionSource,
}

/// Side effects for whoever drives the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Redraw,
    HoverChanged(Option<WindowInfo>),
    SelectionChanged(Selection),
    SelectionCleared,
    /// The session is done; capture this selection.
    Confirmed(Selection),
    /// The session is done without a selection.
    Cancelled,
}

/// Edges moved by an adjustment drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle {
    left: bool,
    right: bool,
    top: bool,
    bottom: bool,
}

impl Handle {
    /// Edges of `rect` within [`HANDLE_TOLERANCE`] of `point`, if any.
    fn hit(rect: &PhysicalRect, point: PhysicalPoint) -> Option<Self> {
        if rect.is_empty() {
            return None;
        }

        let t = HANDLE_TOLERANCE;
        let inside_band = point.x >= rect.x - t
            && point.x <= rect.right() + t
            && point.y >= rect.y - t
            && point.y <= rect.bottom() + t;
        if !inside_band {
            return None;
        }

        let left = (point.x - rect.x).abs() <= t;
        let right = !left && (point.x - rect.right()).abs() <= t;
        let top = (point.y - rect.y).abs() <= t;
        let bottom = !top && (point.y - rect.bottom()).abs() <= t;

        (left || right || top || bottom).then_some(Self {
            left,
            right,
            top,
            bottom,
        })
    }
}

pub struct SelectionMachine {
    config: SelectionConfig,
    mapper: CoordinateMapper,
    windows: Arc<WindowSnapshot>,
    window_origin: LogicalPoint,

    state: SelectionState,
    start_physical: PhysicalPoint,
    start_logical: LogicalPoint,
    current_physical: PhysicalPoint,
    current_logical: LogicalPoint,
    selection_physical: PhysicalRect,
    selection_logical: LogicalRect,
    source: SelectionSource,
    hovered_window: Option<WindowInfo>,
    drag_started: bool,
    modifiers: Modifiers,
    pointer: Option<PhysicalPoint>,
    handle: Option<Handle>,
    adjust_anchor: PhysicalRect,
    finished: bool,
}

impl SelectionMachine {
    /// `window_origin` is the overlay window's top-left in global logical
    /// space; window-logical positions are relative to it.
    pub fn new(
        config: SelectionConfig,
        mapper: CoordinateMapper,
        windows: Arc<WindowSnapshot>,
        window_origin: LogicalPoint,
    ) -> Self {
        Self {
            config,
            mapper,
            windows,
            window_origin,
            state: SelectionState::Idle,
            start_physical: PhysicalPoint::default(),
            start_logical: LogicalPoint::default(),
            current_physical: PhysicalPoint::default(),
            current_logical: LogicalPoint::default(),
            selection_physical: PhysicalRect::default(),
            selection_logical: LogicalRect::default(),
            source: SelectionSource::Drag,
            hovered_window: None,
            drag_started: false,
            modifiers: Modifiers::default(),
            pointer: None,
            handle: None,
            adjust_anchor: PhysicalRect::default(),
            finished: false,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn drag_started(&self) -> bool {
        self.drag_started
    }

    pub fn hovered_window(&self) -> Option<&WindowInfo> {
        self.hovered_window.as_ref()
    }

    pub fn start_point_physical(&self) -> PhysicalPoint {
        self.start_physical
    }

    pub fn start_point_logical(&self) -> LogicalPoint {
        self.start_logical
    }

    /// Confirmed or cancelled; further events are ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The rectangle currently shown, if there is one.
    pub fn current_selection(&self) -> Option<Selection> {
        let visible = match self.state {
            SelectionState::Idle => false,
            SelectionState::DragSelecting => self.drag_started,
            SelectionState::Selected | SelectionState::Adjusting => true,
        };
        visible.then(|| self.selection())
    }

    pub fn handle(&mut self, event: SelectionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.finished {
            trace!(?event, "session finished, event ignored");
            return effects;
        }

        match event {
            SelectionEvent::PointerPressed {
                position,
                button,
                modifiers,
            } => {
                self.modifiers = modifiers;
                match button {
                    PointerButton::Primary => self.on_press(position, &mut effects),
                    PointerButton::Secondary => self.cancel(&mut effects),
                }
            }
            SelectionEvent::PointerMoved { position, modifiers } => {
                self.modifiers = modifiers;
                self.on_move(position, &mut effects);
            }
            SelectionEvent::PointerReleased {
                position,
                button,
                modifiers,
            } => {
                if button == PointerButton::Primary {
                    self.modifiers = modifiers;
                    self.on_release(position, &mut effects);
                }
            }
            SelectionEvent::KeyPressed { key, modifiers } => {
                self.modifiers = modifiers;
                self.on_key(key, &mut effects);
            }
            SelectionEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers;
                if self.state == SelectionState::DragSelecting && self.drag_started {
                    self.update_drag_rect(&mut effects);
                }
            }
        }

        effects
    }

    fn resolve(&self, position: PointerPosition) -> (PhysicalPoint, LogicalPoint) {
        match position {
            PointerPosition::Physical(p) => {
                (p, self.mapper.physical_to_window_logical(p, self.window_origin))
            }
            PointerPosition::WindowLogical(l) => {
                (self.mapper.window_logical_to_physical(l, self.window_origin), l)
            }
        }
    }

    fn on_press(&mut self, position: PointerPosition, effects: &mut Vec<Effect>) {
        let (physical, logical) = self.resolve(position);
        self.pointer = Some(physical);

        if self.state == SelectionState::Selected {
            if let Some(handle) = Handle::hit(&self.selection_physical, physical) {
                debug!(?handle, rect = %self.selection_physical, "adjusting selection");
                self.state = SelectionState::Adjusting;
                self.handle = Some(handle);
                self.adjust_anchor = self.selection_physical;
                effects.push(Effect::Redraw);
                return;
            }
            effects.push(Effect::SelectionCleared);
        }

        self.state = SelectionState::DragSelecting;
        self.start_physical = physical;
        self.start_logical = logical;
        self.current_physical = physical;
        self.current_logical = logical;
        self.selection_physical = PhysicalRect::new(physical.x, physical.y, 0, 0);
        self.selection_logical = LogicalRect::new(logical.x, logical.y, 0.0, 0.0);
        self.source = SelectionSource::Drag;
        self.drag_started = false;
        self.handle = None;
        debug!(%physical, %logical, "pointer pressed");

        self.update_hover(physical, effects);
        effects.push(Effect::Redraw);
    }

    fn on_move(&mut self, position: PointerPosition, effects: &mut Vec<Effect>) {
        let (physical, logical) = self.resolve(position);
        self.pointer = Some(physical);

        match self.state {
            SelectionState::Idle => self.update_hover(physical, effects),
            SelectionState::DragSelecting => self.drag_to(physical, logical, effects),
            SelectionState::Adjusting => self.adjust_to(physical, effects),
            SelectionState::Selected => {}
        }
    }

    fn on_release(&mut self, position: PointerPosition, effects: &mut Vec<Effect>) {
        match self.state {
            SelectionState::DragSelecting => {
                let (physical, logical) = self.resolve(position);
                self.pointer = Some(physical);

                // The release point itself never turns a window click into a
                // drag; only moves past the threshold do.
                if !self.drag_started {
                    if let Some(window) = self.hovered_window.clone() {
                        info!(handle = %window.handle, title = %window.title, "window selected");
                        let logical = self.window_logical_rect(&window.bounds);
                        self.select(
                            window.bounds,
                            logical,
                            SelectionSource::Window(window.handle),
                            effects,
                        );
                        return;
                    }
                }

                self.drag_to(physical, logical, effects);
                if !self.drag_started {
                    debug!("click outside any window, nothing selected");
                    self.clear(effects);
                    return;
                }

                if self.selection_physical.is_empty() {
                    warn!(rect = %self.selection_physical, "degenerate selection ignored");
                    self.clear(effects);
                    return;
                }

                self.select(
                    self.selection_physical,
                    self.selection_logical,
                    SelectionSource::Drag,
                    effects,
                );
            }
            SelectionState::Adjusting => {
                self.handle = None;
                if self.selection_physical.is_empty() {
                    warn!("selection adjusted to nothing");
                    self.clear(effects);
                    return;
                }
                self.state = SelectionState::Selected;
                effects.push(Effect::SelectionChanged(self.selection()));
                effects.push(Effect::Redraw);
            }
            SelectionState::Idle | SelectionState::Selected => {}
        }
    }

    fn on_key(&mut self, key: Key, effects: &mut Vec<Effect>) {
        match key {
            Key::Escape => self.cancel(effects),
            Key::Enter => self.on_enter(effects),
            Key::Digit(digit) if digit <= 9 => {
                let index = if digit == 0 { 9 } else { usize::from(digit) - 1 };
                self.select_monitor(index, effects);
            }
            Key::Digit(_) => {}
            Key::Backtick => {
                let monitors = self.mapper.monitors();
                let index = match self.pointer {
                    Some(p) => monitors
                        .index_containing_physical(p)
                        .or_else(|| monitors.nearest_physical(p)),
                    None => (!monitors.is_empty()).then_some(0),
                };
                if let Some(index) = index {
                    self.select_monitor(index, effects);
                }
            }
            Key::Left => self.on_arrow(-1, 0, effects),
            Key::Right => self.on_arrow(1, 0, effects),
            Key::Up => self.on_arrow(0, -1, effects),
            Key::Down => self.on_arrow(0, 1, effects),
        }
    }

    fn on_enter(&mut self, effects: &mut Vec<Effect>) {
        match self.state {
            SelectionState::Selected if !self.selection_physical.is_empty() => {
                self.confirm(effects);
            }
            SelectionState::DragSelecting
                if self.drag_started && !self.selection_physical.is_empty() =>
            {
                self.select(
                    self.selection_physical,
                    self.selection_logical,
                    SelectionSource::Drag,
                    effects,
                );
                if !self.finished {
                    self.confirm(effects);
                }
            }
            _ => {}
        }
    }

    fn on_arrow(&mut self, dx: i32, dy: i32, effects: &mut Vec<Effect>) {
        let step = self.config.nudge_step.max(1);
        let (dx, dy) = (dx * step, dy * step);

        match self.state {
            SelectionState::DragSelecting => {
                let target = self.current_physical.offset(dx, dy);
                let logical = self.mapper.physical_to_window_logical(target, self.window_origin);
                self.drag_to(target, logical, effects);
            }
            SelectionState::Selected => {
                let rect = self.selection_physical;
                self.selection_physical = if self.modifiers.ctrl {
                    PhysicalRect::new(
                        rect.x,
                        rect.y,
                        resize_extent(rect.width, dx),
                        resize_extent(rect.height, dy),
                    )
                } else {
                    rect.offset(dx, dy)
                };
                self.selection_logical = self.window_logical_rect(&self.selection_physical);
                trace!(rect = %self.selection_physical, "selection nudged");
                effects.push(Effect::SelectionChanged(self.selection()));
                effects.push(Effect::Redraw);
            }
            SelectionState::Idle | SelectionState::Adjusting => {}
        }
    }

    fn drag_to(&mut self, physical: PhysicalPoint, logical: LogicalPoint, effects: &mut Vec<Effect>) {
        self.current_physical = physical;
        self.current_logical = logical;

        if !self.drag_started {
            let distance = self.start_physical.distance_to(physical);
            if distance <= self.config.drag_threshold {
                self.update_hover(physical, effects);
                return;
            }

            debug!(distance, "drag started");
            self.drag_started = true;
            if self.hovered_window.take().is_some() {
                effects.push(Effect::HoverChanged(None));
            }
        }

        self.update_drag_rect(effects);
    }

    /// Both rectangles are computed from their own start/current points.
    fn update_drag_rect(&mut self, effects: &mut Vec<Effect>) {
        let (a, b) = shape_drag(
            (f64::from(self.start_physical.x), f64::from(self.start_physical.y)),
            (f64::from(self.current_physical.x), f64::from(self.current_physical.y)),
            self.modifiers,
        );
        self.selection_physical = PhysicalRect::from_corners(to_physical(a), to_physical(b));

        let (a, b) = shape_drag(
            (self.start_logical.x, self.start_logical.y),
            (self.current_logical.x, self.current_logical.y),
            self.modifiers,
        );
        self.selection_logical =
            LogicalRect::from_corners(LogicalPoint::new(a.0, a.1), LogicalPoint::new(b.0, b.1));

        effects.push(Effect::SelectionChanged(self.selection()));
        effects.push(Effect::Redraw);
    }

    fn adjust_to(&mut self, physical: PhysicalPoint, effects: &mut Vec<Effect>) {
        let Some(handle) = self.handle else {
            return;
        };

        let anchor = self.adjust_anchor;
        let left = if handle.left { physical.x } else { anchor.x };
        let right = if handle.right { physical.x } else { anchor.right() };
        let top = if handle.top { physical.y } else { anchor.y };
        let bottom = if handle.bottom { physical.y } else { anchor.bottom() };

        self.selection_physical =
            PhysicalRect::from_corners(PhysicalPoint::new(left, top), PhysicalPoint::new(right, bottom));
        self.selection_logical = self.window_logical_rect(&self.selection_physical);

        effects.push(Effect::SelectionChanged(self.selection()));
        effects.push(Effect::Redraw);
    }

    fn update_hover(&mut self, physical: PhysicalPoint, effects: &mut Vec<Effect>) {
        let hit = self.windows.hit_test(physical).cloned();
        let changed = hit.as_ref().map(|w| w.handle) != self.hovered_window.as_ref().map(|w| w.handle);
        if changed {
            trace!(handle = ?hit.as_ref().map(|w| w.handle), "hover changed");
            self.hovered_window = hit.clone();
            effects.push(Effect::HoverChanged(hit));
            effects.push(Effect::Redraw);
        }
    }

    fn select_monitor(&mut self, index: usize, effects: &mut Vec<Effect>) {
        let Some(monitor) = self.mapper.monitors().monitor(index) else {
            debug!(index, "no such monitor");
            return;
        };

        info!(index, name = %monitor.name, "monitor selected");
        let bounds = monitor.bounds;
        let logical = self.window_logical_rect(&bounds);
        self.drag_started = false;
        self.handle = None;
        self.select(bounds, logical, SelectionSource::Monitor(index), effects);
    }

    fn select(
        &mut self,
        physical: PhysicalRect,
        logical: LogicalRect,
        source: SelectionSource,
        effects: &mut Vec<Effect>,
    ) {
        self.state = SelectionState::Selected;
        self.selection_physical = physical;
        self.selection_logical = logical;
        self.source = source;

        effects.push(Effect::SelectionChanged(self.selection()));
        if self.config.auto_confirm {
            self.confirm(effects);
        } else {
            effects.push(Effect::Redraw);
        }
    }

    fn confirm(&mut self, effects: &mut Vec<Effect>) {
        let selection = self.selection();
        info!(rect = %selection.physical, source = ?selection.source, "selection confirmed");
        self.finished = true;
        effects.push(Effect::Confirmed(selection));
        effects.push(Effect::Redraw);
    }

    /// Escape or right-click: drop the selection, or end the session when
    /// there is nothing to drop.
    fn cancel(&mut self, effects: &mut Vec<Effect>) {
        if self.state == SelectionState::Idle {
            info!("selection session cancelled");
            self.finished = true;
            effects.push(Effect::Cancelled);
            return;
        }

        debug!(state = ?self.state, "selection discarded");
        self.clear(effects);
    }

    fn clear(&mut self, effects: &mut Vec<Effect>) {
        self.state = SelectionState::Idle;
        self.drag_started = false;
        self.handle = None;
        self.selection_physical = PhysicalRect::new(self.start_physical.x, self.start_physical.y, 0, 0);
        self.selection_logical = LogicalRect::new(self.start_logical.x, self.start_logical.y, 0.0, 0.0);
        effects.push(Effect::SelectionCleared);
        effects.push(Effect::Redraw);
    }

    fn selection(&self) -> Selection {
        Selection {
            physical: self.selection_physical,
            logical: self.selection_logical,
            source: self.source,
        }
    }

    fn window_logical_rect(&self, rect: &PhysicalRect) -> LogicalRect {
        let global = self.mapper.physical_rect_to_logical(rect);
        LogicalRect::new(
            global.x - self.window_origin.x,
            global.y - self.window_origin.y,
            global.width,
            global.height,
        )
    }
}

/// Corners of the dragged rectangle with the modifiers applied: Shift locks
/// to a square on the longer side, Alt mirrors around the start point.
fn shape_drag(start: (f64, f64), end: (f64, f64), modifiers: Modifiers) -> ((f64, f64), (f64, f64)) {
    let mut dx = end.0 - start.0;
    let mut dy = end.1 - start.1;

    if modifiers.shift {
        let side = dx.abs().max(dy.abs());
        dx = side * direction(dx);
        dy = side * direction(dy);
    }

    if modifiers.alt {
        ((start.0 - dx, start.1 - dy), (start.0 + dx, start.1 + dy))
    } else {
        (start, (start.0 + dx, start.1 + dy))
    }
}

fn direction(delta: f64) -> f64 {
    if delta < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn to_physical((x, y): (f64, f64)) -> PhysicalPoint {
    PhysicalPoint::new(x.round() as i32, y.round() as i32)
}

fn resize_extent(extent: u32, delta: i32) -> u32 {
    (i64::from(extent) + i64::from(delta)).clamp(1, i64::from(u32::MAX)) as u32
}
